// ringcap/src/backend/mock.rs
//! An in-process, memory-backed ring fabric used in place of real
//! hardware for tests — there is no `/dev/netmap`-alike device available
//! in CI, so the registry, partitioning, drain loop, and zero-copy
//! forwarder are all exercised against this instead.
//!
//! Not part of the crate's production surface; gated behind the
//! `test-support` feature.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use ringcap_abi::{RingHeader, Slot};

use super::{OpenedDevice, PollEvents, RingBackend, RingView};
use crate::error::{Error, Result};

/// Fixed per-buffer size, matching the real backend's buffer arena.
const MOCK_BUFFER_SIZE: usize = 2048;

/// Packet buffer arena shared by every ring of one opened device, exactly
/// like the real backend's single mmap'd region: a buffer index means the
/// same thing whether it's read off an RX slot or a TX slot, which is what
/// makes a zero-copy `buf_idx` swap actually move the payload.
#[derive(Default)]
struct BufferArena {
    buffers: Mutex<HashMap<u32, Vec<u8>>>,
}

impl BufferArena {
    fn read(&self, buf_idx: u32, len: usize) -> Vec<u8> {
        self.buffers
            .lock()
            .expect("mock buffer arena lock poisoned")
            .get(&buf_idx)
            .map(|b| b[..len.min(b.len())].to_vec())
            .unwrap_or_default()
    }

    fn write(&self, buf_idx: u32, data: &[u8]) {
        let mut truncated = data.to_vec();
        truncated.truncate(MOCK_BUFFER_SIZE);
        self.buffers
            .lock()
            .expect("mock buffer arena lock poisoned")
            .insert(buf_idx, truncated);
    }
}

/// A ring's slots, stored as a plain fixed-size `Vec` that never
/// reallocates once constructed (so raw pointers into it stay valid for
/// the view's lifetime).
struct MockRing {
    header: RingHeader,
    slots: Mutex<Vec<Slot>>,
    arena: Arc<BufferArena>,
}

/// A [`RingView`] over a [`MockRing`].
///
/// # Safety
///
/// `slot_ptr` hands out a raw pointer into the `Mutex`-guarded `Vec`
/// without holding the lock for the pointer's lifetime. This is sound
/// here only because the mock is single-process and the capture core's
/// own single-writer (RX) / spinlock (TX) disciplines already prevent
/// concurrent access to the same slot; the `Mutex` exists only to let
/// tests safely pre-seed and post-inspect ring contents from outside the
/// worker thread.
#[derive(Clone)]
pub struct MockRingView(Arc<MockRing>);

unsafe impl RingView for MockRingView {
    fn header(&self) -> &RingHeader {
        &self.0.header
    }

    fn slot_ptr(&self, idx: u32) -> *mut Slot {
        let mut slots = self.0.slots.lock().expect("mock ring lock poisoned");
        debug_assert!((idx as usize) < slots.len());
        slots.as_mut_ptr().wrapping_add(idx as usize)
    }

    fn buffer(&self, buf_idx: u32, len: usize) -> &[u8] {
        // Leaked into a `'static`-looking slice so the signature matches
        // the real mmap-backed view, which hands out genuinely borrowed
        // bytes. Test helpers should prefer `read_buffer` over this path;
        // it exists so drain/filter code written against `RingView`
        // works unmodified against the mock.
        let owned = self.0.arena.read(buf_idx, len);
        Box::leak(owned.into_boxed_slice())
    }
}

impl MockRingView {
    /// Directly reads one slot's current value (test helper).
    pub fn read_slot(&self, idx: u32) -> Slot {
        self.0.slots.lock().expect("mock ring lock poisoned")[idx as usize]
    }

    /// Directly writes one slot's value (test helper, simulates the NIC
    /// depositing a frame into an RX slot).
    pub fn write_slot(&self, idx: u32, slot: Slot) {
        self.0.slots.lock().expect("mock ring lock poisoned")[idx as usize] = slot;
    }

    /// Writes the payload bytes for a given buffer index into the
    /// device-wide arena (test helper, simulates the NIC DMA'ing a frame
    /// into a packet buffer before the slot is published).
    pub fn write_buffer(&self, buf_idx: u32, data: &[u8]) {
        self.0.arena.write(buf_idx, data);
    }

    /// Reads back the payload bytes currently stored at a buffer index
    /// (test helper, used to assert what a zero-copy forward actually
    /// moved).
    pub fn read_buffer(&self, buf_idx: u32, len: usize) -> Vec<u8> {
        self.0.arena.read(buf_idx, len)
    }
}

fn new_ring(num_slots: u32, arena: Arc<BufferArena>) -> MockRingView {
    MockRingView(Arc::new(MockRing {
        header: RingHeader::new(num_slots),
        slots: Mutex::new(vec![Slot::default(); num_slots as usize]),
        arena,
    }))
}

/// Per-interface fixed topology the mock backend opens when asked for
/// that name. Tests register these ahead of time via
/// [`MockBackend::provision`].
pub struct MockTopology {
    /// Number of hardware queues (RX == TX).
    pub rings_count: u32,
    /// Slots per ring.
    pub slots_per_ring: u32,
    /// Whether the interface reports administratively up.
    pub iface_up: bool,
    /// Whether hardware segmentation offload is "enabled", for exercising
    /// the worker-init warning path.
    pub hw_offload_enabled: bool,
}

impl Default for MockTopology {
    fn default() -> Self {
        Self {
            rings_count: 1,
            slots_per_ring: 64,
            iface_up: true,
            hw_offload_enabled: false,
        }
    }
}

/// A handle tests can use to reach into a specific opened mock device's
/// rings after the fact (e.g. to seed RX slots or inspect TX slots).
pub struct MockDeviceRings {
    /// One `MockRingView` per RX ring, same order as `OpenedDevice::rx_rings`.
    pub rx: Vec<MockRingView>,
    /// One `MockRingView` per TX ring, same order as `OpenedDevice::tx_rings`.
    pub tx: Vec<MockRingView>,
}

/// In-memory [`RingBackend`] for tests.
pub struct MockBackend {
    topologies: Mutex<HashMap<String, MockTopology>>,
    next_fd: AtomicI32,
    opened: Mutex<HashMap<String, Arc<MockDeviceRings>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Creates an empty mock backend; call [`MockBackend::provision`] for
    /// each interface name a test will open.
    #[must_use]
    pub fn new() -> Self {
        Self {
            topologies: Mutex::new(HashMap::new()),
            next_fd: AtomicI32::new(1000),
            opened: Mutex::new(HashMap::new()),
        }
    }

    /// Registers the topology `open` should hand back for `name`.
    pub fn provision(&self, name: &str, topology: MockTopology) {
        self.topologies
            .lock()
            .expect("mock backend lock poisoned")
            .insert(name.to_string(), topology);
    }

    /// Returns the rings for a device this backend has already opened,
    /// for tests to seed/inspect directly.
    #[must_use]
    pub fn rings_of(&self, name: &str) -> Arc<MockDeviceRings> {
        self.opened
            .lock()
            .expect("mock backend lock poisoned")
            .get(name)
            .unwrap_or_else(|| panic!("{name} was never opened on this mock backend"))
            .clone()
    }
}

impl RingBackend for MockBackend {
    fn open(&self, interface_name: &str, _promiscuous: bool) -> Result<OpenedDevice> {
        let topology = {
            let topologies = self.topologies.lock().expect("mock backend lock poisoned");
            topologies
                .get(interface_name)
                .map(|t| MockTopology {
                    rings_count: t.rings_count,
                    slots_per_ring: t.slots_per_ring,
                    iface_up: t.iface_up,
                    hw_offload_enabled: t.hw_offload_enabled,
                })
                .ok_or_else(|| Error::Resource(format!("unprovisioned interface: {interface_name}")))?
        };

        if !topology.iface_up {
            return Err(Error::IfaceDown(interface_name.to_string()));
        }

        let arena = Arc::new(BufferArena::default());
        let mut rx_dyn: Vec<Arc<dyn RingView>> = Vec::with_capacity(topology.rings_count as usize);
        let mut tx_dyn: Vec<Arc<dyn RingView>> = Vec::with_capacity(topology.rings_count as usize);
        let mut rx_for_tests = Vec::with_capacity(topology.rings_count as usize);
        let mut tx_for_tests = Vec::with_capacity(topology.rings_count as usize);
        let mut ring_fds = Vec::with_capacity(topology.rings_count as usize);
        for _ in 0..topology.rings_count {
            let rx_view = new_ring(topology.slots_per_ring, arena.clone());
            let tx_view = new_ring(topology.slots_per_ring, arena.clone());
            rx_for_tests.push(rx_view.clone());
            tx_for_tests.push(tx_view.clone());
            rx_dyn.push(Arc::new(rx_view));
            tx_dyn.push(Arc::new(tx_view));
            ring_fds.push(self.next_fd.fetch_add(1, Ordering::Relaxed) as RawFd);
        }

        self.opened.lock().expect("mock backend lock poisoned").insert(
            interface_name.to_string(),
            Arc::new(MockDeviceRings { rx: rx_for_tests, tx: tx_for_tests }),
        );

        Ok(OpenedDevice {
            rx_rings: rx_dyn,
            tx_rings: tx_dyn,
            ring_fds,
            hw_offload_enabled: topology.hw_offload_enabled,
        })
    }

    fn close(&self, opened: &OpenedDevice) {
        let _ = opened;
    }

    fn tx_sync(&self, _fd: RawFd) -> Result<()> {
        Ok(())
    }

    fn poll(&self, fds: &[RawFd], _timeout_ms: i32) -> Result<Vec<PollEvents>> {
        Ok(vec![PollEvents { readable: true, ..Default::default() }; fds.len()])
    }
}
