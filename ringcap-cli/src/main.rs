// ringcap-cli/src/main.rs
//! Thin demonstration binary: wires a real [`LinuxBackend`] up to one or
//! more Receive Workers and runs them until `SIGINT`.
//!
//! The downstream pipeline, BPF compilation, and configuration loading are
//! all external collaborators out of scope for this crate; this binary
//! supplies the smallest stand-ins needed to actually run the core end to
//! end.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use ringcap::{
    ChecksumMode, CopyMode, DeviceRegistry, DownstreamSlot, Error, Frame, FramePool,
    InterfaceConfig, LinuxBackend, WorkerContext,
};

#[cfg(feature = "pcap-filter")]
use ringcap::PcapFilterCompiler;

/// Accepts every frame without inspecting it. The real decode/slot chain
/// lives outside this crate; this just proves frames reach a downstream.
struct AcceptAll;

impl DownstreamSlot for AcceptAll {
    fn process(&self, _worker_thread: u32, _ring_index: u32, frame: &mut Frame) -> Result<(), ()> {
        log::trace!("frame: {} bytes", frame.data.as_bytes().len());
        Ok(())
    }
}

/// Address of the `AtomicBool` every worker's shutdown flag points at,
/// stashed here so the `SIGINT` handler can reach it. Zero means
/// "not yet installed".
static SHUTDOWN_ADDR: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_sigint(_signum: libc::c_int) {
    let addr = SHUTDOWN_ADDR.load(Ordering::Relaxed);
    if addr != 0 {
        // SAFETY: `addr` is only ever set to the address of an `AtomicBool`
        // kept alive for the remainder of `main` via `shutdown` below.
        let flag = unsafe { &*(addr as *const AtomicBool) };
        flag.store(true, Ordering::SeqCst);
    }
}

struct Args {
    interface_name: String,
    egress_interface_name: Option<String>,
    threads: u32,
    copy_mode: CopyMode,
    checksum_mode: ChecksumMode,
    promiscuous: bool,
    filter_source: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut raw = std::env::args().skip(1);
    let interface_name = raw.next().ok_or("usage: ringcap-cli <interface> [options]")?;

    let mut egress_interface_name = None;
    let mut threads = 1u32;
    let mut copy_mode = CopyMode::None;
    let mut checksum_mode = ChecksumMode::Auto;
    let mut promiscuous = false;
    let mut filter_source = None;

    while let Some(flag) = raw.next() {
        match flag.as_str() {
            "--egress" => egress_interface_name = Some(raw.next().ok_or("--egress needs a value")?),
            "--threads" => {
                let value = raw.next().ok_or("--threads needs a value")?;
                threads = value.parse().map_err(|_| format!("bad --threads value: {value}"))?;
            }
            "--copy-mode" => {
                copy_mode = match raw.next().ok_or("--copy-mode needs a value")?.as_str() {
                    "none" => CopyMode::None,
                    "ips" => CopyMode::Ips,
                    "tap" => CopyMode::Tap,
                    other => return Err(format!("unknown --copy-mode: {other}")),
                };
            }
            "--checksum" => {
                checksum_mode = match raw.next().ok_or("--checksum needs a value")?.as_str() {
                    "disable" => ChecksumMode::Disable,
                    "auto" => ChecksumMode::Auto,
                    "validate" => ChecksumMode::Validate,
                    other => return Err(format!("unknown --checksum: {other}")),
                };
            }
            "--promisc" => promiscuous = true,
            "--filter" => filter_source = Some(raw.next().ok_or("--filter needs a value")?),
            other => return Err(format!("unknown flag: {other}")),
        }
    }

    Ok(Args {
        interface_name,
        egress_interface_name,
        threads,
        copy_mode,
        checksum_mode,
        promiscuous,
        filter_source,
    })
}

fn run() -> Result<(), String> {
    let args = parse_args()?;

    let config = InterfaceConfig {
        interface_name: args.interface_name,
        egress_interface_name: args.egress_interface_name,
        threads: args.threads,
        copy_mode: args.copy_mode,
        checksum_mode: args.checksum_mode,
        promiscuous: args.promiscuous,
        filter_source: args.filter_source,
    };

    let registry = Arc::new(DeviceRegistry::new(Arc::new(LinuxBackend::new())));
    let pool = Arc::new(FramePool::new(4096));
    let downstream: Arc<dyn DownstreamSlot> = Arc::new(AcceptAll);
    let shutdown = Arc::new(AtomicBool::new(false));
    SHUTDOWN_ADDR.store(Arc::as_ptr(&shutdown) as usize, Ordering::Relaxed);

    // SAFETY: installing a process-wide signal handler; `on_sigint` only
    // performs an atomic store through the pointer published above.
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
    }

    #[cfg(feature = "pcap-filter")]
    let compiler = PcapFilterCompiler::new();
    #[cfg(feature = "pcap-filter")]
    let compiler_ref = Some(&compiler as &dyn ringcap::FilterCompiler);
    #[cfg(not(feature = "pcap-filter"))]
    let compiler_ref = None;

    let mut handles = Vec::with_capacity(config.threads as usize);
    for _ in 0..config.threads {
        let mut worker = WorkerContext::init(
            registry.clone(),
            &config,
            compiler_ref,
            pool.clone(),
            downstream.clone(),
            shutdown.clone(),
        )
        .map_err(|e: Error| e.to_string())?;
        handles.push(thread::spawn(move || worker.run()));
    }

    for handle in handles {
        let _ = handle.join();
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ringcap-cli: {e}");
            ExitCode::FAILURE
        }
    }
}
