// ringcap/src/device.rs
//! Device handles and per-ring descriptors.
//!
//! A small `Arc`-shared context carrying the state a worker needs to
//! reach into a ring, plus whatever lifecycle bookkeeping the owning
//! registry (keyed by interface name) needs to tear it down exactly once.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use spin::Mutex as SpinMutex;

use crate::backend::{OpenedDevice, PollEvents, RingBackend, RingView};
use crate::error::{Error, Result};

/// One hardware queue's RX/TX pair plus the TX-side exclusion lock.
///
/// The RX side is single-writer (the one Receive Worker that owns this
/// ring) and lock-free; the TX side is shared between the owning worker's
/// periodic sync and any release callback forwarding into it, so it's
/// guarded by a spinlock (short critical sections: a slot swap and a
/// cursor bump).
pub struct RingDescriptor {
    /// File descriptor for this queue, independently poll-able.
    pub fd: RawFd,
    /// RX ring view.
    pub rx: Arc<dyn RingView>,
    /// TX ring view.
    pub tx: Arc<dyn RingView>,
    /// Guards mutation of the TX ring (slot swap + cursor advance).
    pub tx_lock: SpinMutex<()>,
}

/// One open NIC device: its rings and the bookkeeping the registry needs
/// to share it safely across worker threads.
pub struct DeviceHandle {
    name: String,
    backend: Arc<dyn RingBackend>,
    opened: OpenedDevice,
    rings: Vec<RingDescriptor>,
    ref_count: AtomicUsize,
    claim_counter: AtomicU32,
}

impl DeviceHandle {
    pub(crate) fn open(
        backend: Arc<dyn RingBackend>,
        name: &str,
        promiscuous: bool,
    ) -> Result<Self> {
        let opened = backend.open(name, promiscuous)?;
        if opened.rx_rings.len() != opened.tx_rings.len() {
            return Err(Error::Config(format!(
                "{name}: rx ring count ({}) != tx ring count ({})",
                opened.rx_rings.len(),
                opened.tx_rings.len()
            )));
        }
        let rings = opened
            .ring_fds
            .iter()
            .zip(opened.rx_rings.iter())
            .zip(opened.tx_rings.iter())
            .map(|((&fd, rx), tx)| RingDescriptor {
                fd,
                rx: rx.clone(),
                tx: tx.clone(),
                tx_lock: SpinMutex::new(()),
            })
            .collect();
        Ok(Self {
            name: name.to_string(),
            backend,
            opened,
            rings,
            ref_count: AtomicUsize::new(1),
            claim_counter: AtomicU32::new(0),
        })
    }

    /// The interface name this handle was opened for.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of hardware queues (RX count, equal to TX count).
    #[must_use]
    pub fn rings_count(&self) -> u32 {
        self.rings.len() as u32
    }

    /// Whether hardware segmentation offload was reported enabled at open
    /// time.
    #[must_use]
    pub fn hw_offload_enabled(&self) -> bool {
        self.opened.hw_offload_enabled
    }

    /// Borrow ring `index`. Panics if out of range; callers validate
    /// ranges against [`DeviceHandle::rings_count`] at worker init time.
    #[must_use]
    pub fn ring(&self, index: u32) -> &RingDescriptor {
        &self.rings[index as usize]
    }

    /// Issues a TX-sync ioctl on ring `index`'s fd.
    pub fn tx_sync(&self, index: u32) -> Result<()> {
        self.backend.tx_sync(self.rings[index as usize].fd)
    }

    /// Polls the fds for rings `ring_from..=ring_to`, in that order, with
    /// the given timeout. Returns one [`PollEvents`] per ring in range.
    pub fn poll_range(&self, ring_from: u32, ring_to: u32, timeout_ms: i32) -> Result<Vec<PollEvents>> {
        let fds: Vec<_> = (ring_from..=ring_to)
            .map(|i| self.rings[i as usize].fd)
            .collect();
        self.backend.poll(&fds, timeout_ms)
    }

    /// Atomically claims the next worker index for this device, handing
    /// out sequential indices to however many workers call this during
    /// startup.
    #[must_use]
    pub fn claim_worker_index(&self) -> u32 {
        self.claim_counter.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(crate) fn incref(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the reference count and returns the count after
    /// decrementing.
    pub(crate) fn decref(&self) -> usize {
        self.ref_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub(crate) fn teardown(&self) {
        self.backend.close(&self.opened);
    }
}
