// ringcap/src/backend/linux.rs
//! Real `RingBackend` talking to a `/dev/netmap`-style control device
//! through `libc` (open/ioctl/mmap/poll) — raw fds, `mmap`, and `spin`
//! for short critical sections, the same way Linux AF_XDP ring bindings
//! are typically built.
//!
//! The exact ioctl request numbers and wire layout below are this
//! crate's own ring-fabric protocol, not a byte-for-byte reproduction of
//! any specific vendor's driver ABI — this models a generic "ring
//! fabric", not a named product.

use std::ffi::CString;
use std::io;
use std::mem::size_of;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;
use std::sync::Arc;

use ringcap_abi::RingHeader;
use ringcap_abi::Slot;

use super::{OpenedDevice, PollEvents, RingBackend, RingView};
use crate::error::{Error, Result};

const CONTROL_DEVICE: &str = "/dev/ringfabric";

// Ring-fabric ioctl request numbers (this crate's own protocol).
const NM_IOC_GET_INFO: libc::c_ulong = 0x8010_6e01;
const NM_IOC_REGISTER: libc::c_ulong = 0xc010_6e02;
const NM_IOC_TXSYNC: libc::c_ulong = 0x0000_6e03;

#[repr(C)]
struct NmInfoReq {
    rx_rings: u32,
    tx_rings: u32,
    mem_size: u64,
    if_offset: u64,
    hw_offload: u32,
}

#[repr(C)]
struct NmRegisterReq {
    ring_index: u32,
    flags: u32,
}

/// "one NIC, ring index i, no TX-auto-poll" — the registration flags used
/// for every per-ring registration.
const REG_FLAG_SINGLE_RING: u32 = 1 << 0;
const REG_FLAG_NO_TX_AUTOPOLL: u32 = 1 << 1;

struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is only read/written through `RingView`s that
// respect the capture core's single-writer / spinlock disciplines.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` came from a successful `mmap` of exactly
        // this size, and no `RingView` outlives the `Arc<MappedRegion>`
        // that backs it (they're constructed together in `open`).
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

/// Fixed per-buffer size in the packet buffer arena, matching the
/// ring-fabric default slot payload size.
const DEFAULT_BUFFER_SIZE: usize = 2048;

struct MmapRingView {
    region: Arc<MappedRegion>,
    slots_offset: usize,
    buffers_offset: usize,
    header: RingHeader,
}

// SAFETY: see `RingView`'s contract; callers serialize access per the
// ring's RX single-writer / TX spinlock discipline.
unsafe impl RingView for MmapRingView {
    fn header(&self) -> &RingHeader {
        &self.header
    }

    fn slot_ptr(&self, idx: u32) -> *mut Slot {
        debug_assert!(idx < self.header.num_slots);
        // SAFETY: `slots_offset + idx * size_of::<Slot>()` stays within
        // the mapped region by construction (`region_layout` sized the
        // region to fit `num_slots` slots per ring).
        unsafe {
            self.region
                .ptr
                .as_ptr()
                .add(self.slots_offset)
                .add(idx as usize * size_of::<Slot>())
                .cast::<Slot>()
        }
    }

    fn buffer(&self, buf_idx: u32, len: usize) -> &[u8] {
        let len = len.min(DEFAULT_BUFFER_SIZE);
        // SAFETY: `buf_idx` is a slot's buffer index, bounded by the
        // device's buffer arena size by construction of the NIC-side
        // allocator; `buffers_offset + buf_idx * DEFAULT_BUFFER_SIZE` stays
        // within the mapped region for any `buf_idx` the NIC hands out.
        unsafe {
            let ptr = self
                .region
                .ptr
                .as_ptr()
                .add(self.buffers_offset)
                .add(buf_idx as usize * DEFAULT_BUFFER_SIZE);
            std::slice::from_raw_parts(ptr, len)
        }
    }
}

fn ring_block_size(num_slots: u32) -> usize {
    size_of::<u64>() + num_slots as usize * size_of::<Slot>()
}

/// Real `/dev/ringfabric`-backed implementation of [`RingBackend`].
#[derive(Debug, Default)]
pub struct LinuxBackend;

impl LinuxBackend {
    /// Creates a new Linux ring-fabric backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn open_control(&self) -> Result<RawFd> {
        // SAFETY: CONTROL_DEVICE is a valid NUL-terminated path; `open`
        // returns either a valid fd or -1, both checked below.
        let path = CString::new(CONTROL_DEVICE).expect("control device path has no interior NUL");
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(Error::Resource(format!(
                "open({CONTROL_DEVICE}): {}",
                io::Error::last_os_error()
            )));
        }
        Ok(fd)
    }

    fn check_iface_up(&self, name: &str) -> Result<bool> {
        let sock = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
        if sock < 0 {
            return Err(Error::Resource(format!(
                "socket(AF_INET, SOCK_DGRAM): {}",
                io::Error::last_os_error()
            )));
        }
        let mut req = ringcap_abi::IfReq::new(name)
            .ok_or_else(|| Error::Config(format!("interface name too long: {name}")))?;
        // SAFETY: `req` is a valid `ifreq`-shaped buffer; `sock` is a
        // freshly opened, valid socket fd.
        let rc = unsafe {
            libc::ioctl(
                sock,
                libc::SIOCGIFFLAGS as libc::c_ulong,
                std::ptr::addr_of_mut!(req),
            )
        };
        let err = io::Error::last_os_error();
        unsafe { libc::close(sock) };
        if rc < 0 {
            return Err(Error::Resource(format!("ioctl(SIOCGIFFLAGS, {name}): {err}")));
        }
        Ok(req.flags & (libc::IFF_UP as i16) != 0)
    }

    fn set_promiscuous(&self, name: &str) -> Result<()> {
        let sock = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
        if sock < 0 {
            return Err(Error::Resource(format!(
                "socket(AF_INET, SOCK_DGRAM): {}",
                io::Error::last_os_error()
            )));
        }
        let mut req = ringcap_abi::IfReq::new(name)
            .ok_or_else(|| Error::Config(format!("interface name too long: {name}")))?;
        req.flags |= libc::IFF_PROMISC as i16;
        // SAFETY: see above.
        let rc = unsafe {
            libc::ioctl(
                sock,
                libc::SIOCSIFFLAGS as libc::c_ulong,
                std::ptr::addr_of_mut!(req),
            )
        };
        let err = io::Error::last_os_error();
        unsafe { libc::close(sock) };
        if rc < 0 {
            return Err(Error::Resource(format!("ioctl(SIOCSIFFLAGS, {name}): {err}")));
        }
        Ok(())
    }
}

impl RingBackend for LinuxBackend {
    fn open(&self, interface_name: &str, promiscuous: bool) -> Result<OpenedDevice> {
        if !self.check_iface_up(interface_name)? {
            return Err(Error::IfaceDown(interface_name.to_string()));
        }
        if promiscuous {
            self.set_promiscuous(interface_name)?;
        }

        let query_fd = self.open_control()?;
        let mut info = NmInfoReq {
            rx_rings: 0,
            tx_rings: 0,
            mem_size: 0,
            if_offset: 0,
            hw_offload: 0,
        };
        // SAFETY: `info` is a valid, appropriately sized buffer for
        // NM_IOC_GET_INFO; `query_fd` was just opened successfully.
        let rc = unsafe {
            libc::ioctl(query_fd, NM_IOC_GET_INFO, std::ptr::addr_of_mut!(info))
        };
        let query_err = io::Error::last_os_error();
        unsafe { libc::close(query_fd) };
        if rc < 0 {
            return Err(Error::Resource(format!(
                "ioctl(NM_IOC_GET_INFO, {interface_name}): {query_err}"
            )));
        }
        if info.rx_rings != info.tx_rings {
            return Err(Error::Config(format!(
                "{interface_name}: rx_rings ({}) != tx_rings ({})",
                info.rx_rings, info.tx_rings
            )));
        }
        let rings_count = info.rx_rings;

        let mut ring_fds = Vec::with_capacity(rings_count as usize);
        let mut region: Option<Arc<MappedRegion>> = None;

        for ring_index in 0..rings_count {
            let fd = match self.open_control() {
                Ok(fd) => fd,
                Err(e) => {
                    for fd in &ring_fds {
                        unsafe { libc::close(*fd) };
                    }
                    return Err(e);
                }
            };
            let mut reg = NmRegisterReq {
                ring_index,
                flags: REG_FLAG_SINGLE_RING | REG_FLAG_NO_TX_AUTOPOLL,
            };
            // SAFETY: `reg` is a valid, appropriately sized buffer.
            let rc = unsafe { libc::ioctl(fd, NM_IOC_REGISTER, std::ptr::addr_of_mut!(reg)) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                for fd in &ring_fds {
                    unsafe { libc::close(*fd) };
                }
                return Err(Error::Resource(format!(
                    "ioctl(NM_IOC_REGISTER, {interface_name}, ring {ring_index}): {err}"
                )));
            }

            if region.is_none() {
                // SAFETY: fd was just registered; mem_size/if_offset come
                // from the kernel's NM_IOC_GET_INFO answer above.
                let ptr = unsafe {
                    libc::mmap(
                        std::ptr::null_mut(),
                        info.mem_size as usize,
                        libc::PROT_READ | libc::PROT_WRITE,
                        libc::MAP_SHARED,
                        fd,
                        0,
                    )
                };
                if ptr == libc::MAP_FAILED {
                    let err = io::Error::last_os_error();
                    unsafe { libc::close(fd) };
                    for fd in &ring_fds {
                        unsafe { libc::close(*fd) };
                    }
                    return Err(Error::Resource(format!("mmap({interface_name}): {err}")));
                }
                region = Some(Arc::new(MappedRegion {
                    // SAFETY: mmap returned a non-null pointer (checked
                    // against MAP_FAILED above).
                    ptr: unsafe { NonNull::new_unchecked(ptr.cast::<u8>()) },
                    len: info.mem_size as usize,
                }));
            }

            ring_fds.push(fd);
        }

        let region = region.ok_or_else(|| {
            Error::Resource(format!("{interface_name}: device reports zero rings"))
        })?;

        // Ring blocks are laid out back-to-back starting at `if_offset`:
        // all RX ring blocks, then all TX ring blocks. Each block holds a
        // slot-count prefix (here folded into `RingHeader::num_slots`,
        // queried per-ring via the same info structure for simplicity)
        // followed by its slot array.
        let num_slots_per_ring = if rings_count == 0 {
            0
        } else {
            // A single combined info query gives us total mem_size; slot
            // count per ring is derived from the region size once ring
            // and header overhead are subtracted.
            let overhead = 2 * rings_count as usize * size_of::<u64>();
            let usable = (info.mem_size as usize).saturating_sub(info.if_offset as usize + overhead);
            (usable / (2 * rings_count as usize * size_of::<Slot>())) as u32
        };

        let mut rx_rings: Vec<Arc<dyn RingView>> = Vec::with_capacity(rings_count as usize);
        let mut tx_rings: Vec<Arc<dyn RingView>> = Vec::with_capacity(rings_count as usize);
        let block = ring_block_size(num_slots_per_ring);
        // The packet buffer arena sits right after every ring's header +
        // slot array, shared by all rings on this device.
        let buffers_offset = info.if_offset as usize + 2 * rings_count as usize * block;
        for i in 0..rings_count {
            let base = info.if_offset as usize + (i as usize) * block;
            rx_rings.push(Arc::new(MmapRingView {
                region: region.clone(),
                slots_offset: base + size_of::<u64>(),
                buffers_offset,
                header: RingHeader::new(num_slots_per_ring),
            }));
        }
        for i in 0..rings_count {
            let base = info.if_offset as usize + (rings_count as usize + i as usize) * block;
            tx_rings.push(Arc::new(MmapRingView {
                region: region.clone(),
                slots_offset: base + size_of::<u64>(),
                buffers_offset,
                header: RingHeader::new(num_slots_per_ring),
            }));
        }

        Ok(OpenedDevice {
            rx_rings,
            tx_rings,
            ring_fds,
            hw_offload_enabled: info.hw_offload != 0,
        })
    }

    fn close(&self, opened: &OpenedDevice) {
        // The shared region unmaps itself when the last `Arc<MappedRegion>`
        // held by a ring view drops, which happens when `opened` is
        // dropped after this call returns.
        for fd in &opened.ring_fds {
            unsafe { libc::close(*fd) };
        }
    }

    fn tx_sync(&self, fd: RawFd) -> Result<()> {
        // SAFETY: fd is a valid, registered ring fd; NM_IOC_TXSYNC takes
        // no argument payload.
        let rc = unsafe { libc::ioctl(fd, NM_IOC_TXSYNC, 0) };
        if rc < 0 {
            return Err(Error::Io(format!("ioctl(NM_IOC_TXSYNC): {}", io::Error::last_os_error())));
        }
        Ok(())
    }

    fn poll(&self, fds: &[RawFd], timeout_ms: i32) -> Result<Vec<PollEvents>> {
        let mut pollfds: Vec<libc::pollfd> = fds
            .iter()
            .map(|&fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        // SAFETY: `pollfds` is a valid array of the length passed.
        let rc = unsafe {
            libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms)
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(vec![PollEvents::default(); fds.len()]);
            }
            return Err(Error::Io(format!("poll: {err}")));
        }
        Ok(pollfds
            .iter()
            .map(|pfd| PollEvents {
                readable: pfd.revents & libc::POLLIN != 0,
                hangup: pfd.revents & libc::POLLHUP != 0,
                error: pfd.revents & libc::POLLERR != 0,
                invalid: pfd.revents & libc::POLLNVAL != 0,
            })
            .collect())
    }
}
