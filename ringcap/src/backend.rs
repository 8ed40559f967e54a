// ringcap/src/backend.rs
//! The OS/hardware boundary: everything that actually talks to the ring
//! fabric's control device lives behind [`RingBackend`].
//!
//! Separates the ABI-level ring layout from the process/worker-facing
//! context that drives it: that boundary is made explicit as a trait so
//! the registry and worker can be exercised in tests without a real NIC.

use std::os::unix::io::RawFd;
use std::sync::Arc;

use ringcap_abi::{RingHeader, Slot};

use crate::error::Result;

pub mod linux;
pub use linux::LinuxBackend;

#[cfg(feature = "test-support")]
pub mod mock;
#[cfg(feature = "test-support")]
pub use mock::{MockBackend, MockDeviceRings, MockRingView, MockTopology};

/// Events a poll cycle observed on one ring's file descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollEvents {
    /// The ring has frames ready to read (RX) or space has freed (TX).
    pub readable: bool,
    /// The peer hung up; the ring is going away.
    pub hangup: bool,
    /// An error condition was reported on the fd.
    pub error: bool,
    /// The fd is invalid (closed out from under us).
    pub invalid: bool,
}

impl PollEvents {
    /// True if any of the fatal conditions (hangup/error/invalid) fired.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        self.hangup || self.error || self.invalid
    }
}

/// Read/write access to one ring's header and slot array, wherever they
/// physically live (a real mmap'd region, or an in-process fake for
/// tests).
///
/// # Safety
///
/// `slot_ptr` must return a pointer valid for `header().num_slots`
/// contiguous [`Slot`] values for the lifetime of the `RingView`, with no
/// other `RingView` aliasing the same index range mutably at the same
/// time outside of the single-writer / spinlock disciplines the capture
/// core itself enforces.
pub unsafe trait RingView: Send + Sync {
    /// The ring's header (slot count, head/cur/tail cursors).
    fn header(&self) -> &RingHeader;
    /// Raw pointer to slot `idx`. Caller must respect the single-writer
    /// (RX) or spinlock (TX) discipline documented on the ring.
    fn slot_ptr(&self, idx: u32) -> *mut Slot;
    /// Borrows `len` bytes of the packet buffer a slot's `buf_idx`
    /// currently points at. `len` is clamped to the backend's fixed
    /// buffer size.
    fn buffer(&self, buf_idx: u32, len: usize) -> &[u8];
}

/// Everything the backend produced by opening one device: per-ring views,
/// the ring file descriptors (one per ring, independently poll-able), and
/// whatever ambient facts the worker needs at init time.
pub struct OpenedDevice {
    /// RX ring views, indexed by ring number.
    pub rx_rings: Vec<Arc<dyn RingView>>,
    /// TX ring views, indexed by ring number.
    pub tx_rings: Vec<Arc<dyn RingView>>,
    /// One fd per ring (RX and TX share a ring's fd on most ring fabrics).
    pub ring_fds: Vec<RawFd>,
    /// Whether hardware segmentation offload is enabled on the source
    /// interface. The worker warns if so, since frames may exceed slot
    /// size.
    pub hw_offload_enabled: bool,
}

impl OpenedDevice {
    /// Number of hardware queues (RX count, which always equals TX count).
    #[must_use]
    pub fn rings_count(&self) -> u32 {
        self.rx_rings.len() as u32
    }
}

/// The OS/hardware boundary the registry and worker drive.
pub trait RingBackend: Send + Sync {
    /// Opens and fully initializes a device by interface name: checks the
    /// interface is administratively up, optionally sets promiscuous mode,
    /// queries ring counts and shared-region size, opens and registers one
    /// fd per ring, and maps the shared region once on the first ring.
    fn open(&self, interface_name: &str, promiscuous: bool) -> Result<OpenedDevice>;

    /// Unmaps the shared region and closes every ring fd. Called exactly
    /// once, when a handle's reference count drops to zero.
    fn close(&self, opened: &OpenedDevice);

    /// Issues a non-blocking TX-sync ioctl on one ring's fd, telling the
    /// NIC to DMA out whatever is queued in that ring's TX slots.
    fn tx_sync(&self, fd: RawFd) -> Result<()>;

    /// Polls the given fds for readable/hangup/error/invalid events with
    /// the given timeout in milliseconds. Returns one [`PollEvents`] per
    /// input fd, in the same order.
    fn poll(&self, fds: &[RawFd], timeout_ms: i32) -> Result<Vec<PollEvents>>;
}
