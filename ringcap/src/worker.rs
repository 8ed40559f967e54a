// ringcap/src/worker.rs
//! The Receive Worker: init, the main poll loop, ring drain, the
//! Zero-Copy Forwarder release path, and teardown.
//!
//! An adaptive poll → drain → flush-counters → check-shutdown cycle over
//! a mutex-guarded registry of ring contexts. The zero-copy buffer swap
//! generalizes a pinned-buffer table down to a single TX slot swap under
//! a spinlock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use ringcap_abi::{FrameFlags, LinkType, RingHeader};

use crate::checksum::should_skip_checksum;
use crate::config::{ChecksumMode, CopyMode, InterfaceConfig};
use crate::counters::{DeviceCounters, WorkerCounters};
use crate::device::DeviceHandle;
use crate::error::{Error, Result};
use crate::filter::{CompiledFilter, FilterCompiler, DEFAULT_SNAP_LEN};
use crate::frame::{Frame, FrameData, FrameReference, ReleaseAction, SourceTag};
use crate::pool::FramePool;
use crate::registry::DeviceRegistry;

const POLL_TIMEOUT_MS: i32 = 100;

/// The downstream processing stage a Receive Worker hands frames to.
///
/// An external collaborator; this is only the contract:
/// `process(worker_thread, ring_index, frame) → OK | FAIL`. On `Err`, the
/// worker returns the frame to the pool and aborts the current drain
/// iteration.
pub trait DownstreamSlot: Send + Sync {
    /// Consumes one frame. `Err` signals FAIL; the frame is not consumed
    /// on error (the caller still owns it and will return it to the pool).
    fn process(&self, worker_thread: u32, ring_index: u32, frame: &mut Frame) -> std::result::Result<(), ()>;
}

/// Number of slots currently available to read (RX) or write (TX) between
/// `cur` and `tail` on a ring with `num_slots` slots.
///
/// Like any two-pointer circular buffer, `cur == tail` is ambiguous
/// between "empty" and "completely full"; this core treats it as empty,
/// matching the ring fabric's own convention of never fully filling a
/// ring (the NIC always leaves at least one slot as a separator).
fn ring_available(header: &RingHeader) -> u32 {
    let tail = header.tail.load(Ordering::Acquire);
    let cur = header.cur.load(Ordering::Acquire);
    if header.num_slots == 0 {
        return 0;
    }
    (tail + header.num_slots - cur) % header.num_slots
}

/// Splits `rings_cnt` rings into `threads` contiguous, non-overlapping
/// ranges, returning the inclusive `(from, to)` range for `worker_index`.
/// When `rings_cnt` doesn't divide evenly, the last worker's range absorbs
/// the remainder so every ring is always owned by exactly one worker.
fn partition_ring_range(rings_cnt: u32, threads: u32, worker_index: u32) -> (u32, u32) {
    let chunk = rings_cnt / threads;
    let extra = rings_cnt % threads;
    let ring_from = worker_index * chunk;
    let this_chunk = chunk + if worker_index == threads - 1 { extra } else { 0 };
    (ring_from, ring_from + this_chunk - 1)
}

/// One Receive Worker's state: its claimed ring range, compiled filter,
/// and the downstream/pool/counters it drives.
pub struct WorkerContext {
    registry: Arc<DeviceRegistry>,
    interface_name: String,
    egress_interface_name: Option<String>,
    source: Arc<DeviceHandle>,
    egress: Option<Arc<DeviceHandle>>,
    ring_from: u32,
    ring_to: u32,
    worker_index: u32,
    zero_copy: bool,
    copy_mode: CopyMode,
    filter: CompiledFilter,
    checksum_mode: ChecksumMode,
    counters: WorkerCounters,
    device_counters: Arc<DeviceCounters>,
    pool: Arc<FramePool>,
    downstream: Arc<dyn DownstreamSlot>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerContext {
    /// Initializes a Receive Worker: opens its source (and, for inline copy
    /// modes, egress) device, claims a contiguous ring range, and compiles
    /// its filter.
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        registry: Arc<DeviceRegistry>,
        config: &InterfaceConfig,
        filter_compiler: Option<&dyn FilterCompiler>,
        pool: Arc<FramePool>,
        downstream: Arc<dyn DownstreamSlot>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let source = registry.open(&config.interface_name, config.promiscuous)?;

        if config.threads == 0 || config.threads > source.rings_count() {
            registry.release(&config.interface_name);
            return Err(Error::Config(format!(
                "{}: threads ({}) exceed ring count ({})",
                config.interface_name,
                config.threads,
                source.rings_count()
            )));
        }

        let worker_index = source.claim_worker_index();
        let rings_cnt = source.rings_count();
        let (ring_from, ring_to) = partition_ring_range(rings_cnt, config.threads, worker_index);

        let egress = match Self::open_egress(&registry, config) {
            Ok(egress) => egress,
            Err(e) => {
                registry.release(&config.interface_name);
                return Err(e);
            }
        };

        let filter = match (&config.filter_source, filter_compiler) {
            (Some(src), Some(compiler)) if !src.trim().is_empty() => {
                match compiler.compile(src, LinkType::Ethernet, DEFAULT_SNAP_LEN) {
                    Ok(filter) => filter,
                    Err(e) => {
                        if egress.is_some() {
                            registry.release(config.egress_interface_name.as_deref().unwrap());
                        }
                        registry.release(&config.interface_name);
                        return Err(e);
                    }
                }
            }
            _ => CompiledFilter::empty(),
        };

        if source.hw_offload_enabled() {
            log::warn!(
                "{}: hardware segmentation offload is enabled; frames may exceed ring slot size",
                config.interface_name
            );
        }

        let device_counters = registry.counters_for(&config.interface_name);

        Ok(Self {
            registry,
            interface_name: config.interface_name.clone(),
            egress_interface_name: egress.is_some().then(|| config.egress_interface_name.clone().unwrap()),
            source,
            egress,
            ring_from,
            ring_to,
            worker_index,
            zero_copy: config.is_inline(),
            copy_mode: config.copy_mode,
            filter,
            checksum_mode: config.checksum_mode,
            counters: WorkerCounters::new(),
            device_counters,
            pool,
            downstream,
            shutdown,
        })
    }

    /// Opens the egress device for inline copy modes, or returns `None`
    /// for capture-only configs. Does not touch `source`'s reference
    /// count; the caller releases it on error.
    fn open_egress(registry: &Arc<DeviceRegistry>, config: &InterfaceConfig) -> Result<Option<Arc<DeviceHandle>>> {
        if !config.is_inline() {
            return Ok(None);
        }
        let egress_name = config.egress_interface_name.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "{}: inline copy mode requires an egress interface",
                config.interface_name
            ))
        })?;
        Ok(Some(registry.open(egress_name, false)?))
    }

    /// This worker's index within its source device.
    #[must_use]
    pub fn worker_index(&self) -> u32 {
        self.worker_index
    }

    /// The inclusive ring range this worker owns.
    #[must_use]
    pub fn ring_range(&self) -> (u32, u32) {
        (self.ring_from, self.ring_to)
    }

    /// This worker's lifetime packet/byte/drop totals.
    #[must_use]
    pub fn stats(&self) -> crate::counters::WorkerStats {
        self.counters.totals()
    }

    /// Runs the main poll loop until the shutdown flag is set, then tears
    /// down.
    pub fn run(&mut self) {
        while !self.shutdown.load(Ordering::Acquire) {
            if let Err(e) = self.poll_once() {
                log::warn!("{}: {e}", self.interface_name);
            }
        }
        self.teardown();
    }

    /// Runs exactly one poll→drain→flush cycle, split out from the driving
    /// loop below so it can be called on its own.
    /// Exposed so tests can drive deterministic cycles against a
    /// [`MockBackend`](crate::backend::MockBackend) without running the
    /// shutdown-checking loop in [`WorkerContext::run`].
    pub fn poll_once(&mut self) -> Result<()> {
        self.pool.wait_for_capacity();

        let events = self.source.poll_range(self.ring_from, self.ring_to, POLL_TIMEOUT_MS)?;

        let mut logged_fatal_this_cycle = false;
        for (offset, ev) in events.iter().enumerate() {
            let ring_index = self.ring_from + offset as u32;

            if ev.is_fatal() {
                if !logged_fatal_this_cycle {
                    log::error!(
                        "{}: ring {ring_index} reported a fatal poll event: {ev:?}",
                        self.interface_name
                    );
                    logged_fatal_this_cycle = true;
                }
                continue;
            }

            if !ev.readable {
                continue;
            }

            if let Err(e) = self.drain_ring(ring_index) {
                log::warn!("{}: {e}", self.interface_name);
                continue;
            }

            self.maybe_tx_sync(ring_index);
        }

        self.counters.flush_into(&self.device_counters);
        Ok(())
    }

    /// Releases this worker's device handles. Call after the last
    /// [`WorkerContext::poll_once`] when driving a worker manually instead
    /// of through [`WorkerContext::run`].
    pub fn finish(mut self) {
        self.teardown();
    }

    fn maybe_tx_sync(&self, src_ring: u32) {
        if self.copy_mode == CopyMode::None {
            return;
        }
        let Some(egress) = &self.egress else { return };
        let dst_ring = src_ring % egress.rings_count();
        let egress_ring = egress.ring(dst_ring);
        // Non-blocking: the release callback may be mutating this same TX
        // ring concurrently; skipping sync here is fine since the next
        // poll cycle retries.
        if egress_ring.tx_lock.try_lock().is_some() {
            if let Err(e) = egress.tx_sync(dst_ring) {
                log::warn!("{}: tx_sync on ring {dst_ring} failed: {e}", self.interface_name);
            }
        }
    }

    /// Drains all currently-readable slots of ring `ring_index`.
    fn drain_ring(&mut self, ring_index: u32) -> Result<()> {
        let rx = self.source.ring(ring_index).rx.clone();
        let header = rx.header();
        let avail = ring_available(header);
        let mut cur = header.cur.load(Ordering::Acquire);

        for _ in 0..avail {
            // SAFETY: this worker is the single writer for every ring in
            // its claimed [ring_from, ring_to] range.
            let slot = unsafe { &mut *rx.slot_ptr(cur) };
            let buf_idx = slot.buf_idx;
            let len = slot.len;

            if !self.filter.is_empty() {
                let bytes = rx.buffer(buf_idx, len as usize);
                if !self.filter.evaluate(bytes) {
                    cur = header.next_index(cur);
                    continue;
                }
            }

            let mut frame = self.pool.try_allocate().ok_or_else(|| {
                Error::DrainFailure(format!("{}: packet pool exhausted", self.interface_name))
            })?;

            frame.source_tag = SourceTag::Wire;
            frame.link_type = LinkType::Ethernet;
            frame.timestamp = SystemTime::now();
            self.counters.record_packet(len);

            if should_skip_checksum(self.checksum_mode, self.counters.totals().packets, &self.device_counters) {
                frame.flags |= FrameFlags::SKIP_CHECKSUM;
            }

            let reference = FrameReference {
                worker_index: self.worker_index,
                ring_index,
                slot_index: cur,
            };

            if self.zero_copy {
                let bytes = rx.buffer(buf_idx, len as usize);
                frame.data = FrameData::Borrowed { ptr: bytes.as_ptr(), len: bytes.len() };
                frame.reference = Some(reference);
                frame.release_action = match &self.egress {
                    Some(egress) => ReleaseAction::ForwardThenPoolReturn {
                        egress: egress.clone(),
                        source: self.source.clone(),
                        reference,
                    },
                    None => ReleaseAction::PoolReturn,
                };
            } else {
                let bytes = rx.buffer(buf_idx, len as usize).to_vec();
                frame.data = FrameData::Owned(bytes);
                frame.release_action = ReleaseAction::PoolReturn;
            }

            match self.downstream.process(self.worker_index, ring_index, &mut frame) {
                Ok(()) => self.release_frame(frame),
                Err(()) => {
                    self.pool.release(frame);
                    return Err(Error::DrainFailure(format!(
                        "{}: downstream rejected a frame on ring {ring_index}",
                        self.interface_name
                    )));
                }
            }

            cur = header.next_index(cur);
        }

        // Publish head=cur together: every slot visited is now owned by
        // the NIC again, whether or not it was forwarded.
        header.cur.store(cur, Ordering::Release);
        header.head.store(cur, Ordering::Release);
        Ok(())
    }

    /// Executes a frame's release action, then returns it to the pool.
    fn release_frame(&mut self, frame: Frame) {
        match &frame.release_action {
            ReleaseAction::PoolReturn => self.pool.release(frame),
            ReleaseAction::ForwardThenPoolReturn { .. } => self.zero_copy_forward(frame),
        }
    }

    /// The Zero-Copy Forwarder release callback.
    fn zero_copy_forward(&mut self, frame: Frame) {
        let ReleaseAction::ForwardThenPoolReturn { egress, source, reference } = frame.release_action.clone()
        else {
            unreachable!("zero_copy_forward called on a non-forwarding frame")
        };

        if frame.is_pseudo() {
            self.pool.release(frame);
            return;
        }

        if self.copy_mode == CopyMode::Ips && frame.flags.contains(FrameFlags::DROP) {
            self.pool.release(frame);
            return;
        }

        let dst_ring = reference.ring_index % egress.rings_count();
        let egress_ring = egress.ring(dst_ring);
        let _guard = egress_ring.tx_lock.lock();

        let tx_header = egress_ring.tx.header();
        let tx_cur = tx_header.cur.load(Ordering::Acquire);
        if ring_available(tx_header) == 0 {
            self.counters.record_drop();
            drop(_guard);
            self.pool.release(frame);
            return;
        }

        let rx_ring = source.ring(reference.ring_index);
        // SAFETY: the RX side is this worker's single-writer ring; the TX
        // side is held under `egress_ring.tx_lock` above.
        unsafe {
            let rx_slot = &mut *rx_ring.rx.slot_ptr(reference.slot_index);
            let tx_slot = &mut *egress_ring.tx.slot_ptr(tx_cur);
            rx_slot.swap_buffer(tx_slot);
        }

        let next_tx = tx_header.next_index(tx_cur);
        tx_header.cur.store(next_tx, Ordering::Release);
        tx_header.head.store(next_tx, Ordering::Release);

        drop(_guard);
        self.pool.release(frame);
    }

    /// Releases the egress handle first, then the source handle; the
    /// compiled filter frees itself when `self` drops.
    fn teardown(&mut self) {
        self.counters.log_summary(&self.interface_name, self.worker_index);
        if let Some(egress_name) = &self.egress_interface_name {
            self.registry.release(egress_name);
        }
        self.registry.release(&self.interface_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_math_splits_ring_ranges_across_workers() {
        // threads == rings_cnt: each worker owns exactly one ring.
        let rings_cnt = 4u32;
        let threads = 4u32;
        for index in 0..threads {
            let (from, to) = partition_ring_range(rings_cnt, threads, index);
            assert_eq!(from, to);
            assert_eq!(from, index);
        }

        // threads == 1: one worker owns all rings.
        let (from, to) = partition_ring_range(rings_cnt, 1, 0);
        assert_eq!((from, to), (0, rings_cnt - 1));

        // rings_cnt % threads != 0: the last worker absorbs the remainder.
        let rings_cnt = 5u32;
        let threads = 2u32;
        assert_eq!(partition_ring_range(rings_cnt, threads, 0), (0, 1));
        assert_eq!(partition_ring_range(rings_cnt, threads, 1), (2, 4)); // absorbs ring 4, the remainder
    }

    #[test]
    fn ring_available_treats_equal_cursors_as_empty() {
        let header = RingHeader::new(8);
        assert_eq!(ring_available(&header), 0);
        header.tail.store(3, Ordering::Relaxed);
        assert_eq!(ring_available(&header), 3);
        header.cur.store(6, Ordering::Relaxed);
        header.tail.store(6, Ordering::Relaxed);
        assert_eq!(ring_available(&header), 0);
    }
}
