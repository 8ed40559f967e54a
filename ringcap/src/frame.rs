// ringcap/src/frame.rs
//! The frame object handed from a Receive Worker to the downstream slot.
//!
//! The downstream pipeline itself (the packet-decode stage, the slot
//! chain) is an external collaborator; this module defines only the
//! frame contract, plus one concrete `Frame` type so the worker has
//! something to construct and this crate is runnable standalone.

use std::sync::Arc;
use std::time::SystemTime;

use ringcap_abi::{FrameFlags, LinkType};

use crate::device::DeviceHandle;

/// Where a frame's payload bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTag {
    /// Captured off the wire by a Receive Worker.
    Wire,
    /// Constructed in-process, not backed by a ring slot (carries
    /// [`FrameFlags::PSEUDO`] and must never reach the zero-copy
    /// forwarder).
    Synthetic,
}

/// The back-reference a zero-copy frame carries so the release callback
/// can locate the exact slot whose buffer index must be swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReference {
    /// Index of the worker that captured this frame within its device.
    pub worker_index: u32,
    /// Ring index within the source handle.
    pub ring_index: u32,
    /// Slot index within that ring.
    pub slot_index: u32,
}

/// What happens to a frame when the downstream pipeline releases it.
///
/// Modeled as a small tagged variant rather than a function pointer:
/// "pool-return" needs no extra state, "forward" needs the egress handle
/// and the originating slot's coordinates.
#[derive(Clone)]
pub enum ReleaseAction {
    /// Return the frame to its pool; no forwarding.
    PoolReturn,
    /// Run the Zero-Copy Forwarder against `egress`, using `reference` to
    /// locate the source slot, then return the frame to its pool.
    ForwardThenPoolReturn {
        /// Egress device to forward onto.
        egress: Arc<DeviceHandle>,
        /// Source handle the frame was captured from.
        source: Arc<DeviceHandle>,
        /// Back-reference locating the originating RX slot.
        reference: FrameReference,
    },
}

/// Where a frame's bytes currently live.
pub enum FrameData {
    /// Points directly at a ring-mapped packet buffer (zero-copy mode):
    /// no bytes are copied, only the pointer and length are attached.
    /// Sound as long as the owning `DeviceHandle` (and therefore its
    /// mapped region) outlives the frame, which holds here because a
    /// frame is always released back to its pool before the worker loop
    /// that produced it can release the device handle: handles are only
    /// released during worker teardown.
    Borrowed {
        /// Pointer to the first payload byte within the mapped region.
        ptr: *const u8,
        /// Valid payload length.
        len: usize,
    },
    /// Copied into a buffer owned by the frame itself.
    Owned(Vec<u8>),
    /// No payload attached yet (fresh from the pool).
    Empty,
}

// SAFETY: `Borrowed`'s pointer addresses memory owned by a `DeviceHandle`
// that outlives any frame referencing it; moving the pointer value across
// threads does not violate the single-writer/spinlock access discipline
// that already governs who may read through it.
unsafe impl Send for FrameData {}

impl FrameData {
    /// Borrows the current payload bytes, if any.
    ///
    /// # Safety
    ///
    /// For `Borrowed`, the caller must not call this after the originating
    /// ring's cursor has advanced past the source slot.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            // SAFETY: see the type's own safety comment.
            FrameData::Borrowed { ptr, len } => unsafe { std::slice::from_raw_parts(*ptr, *len) },
            FrameData::Owned(b) => b,
            FrameData::Empty => &[],
        }
    }
}

/// A captured or synthetic frame, pooled and reused across drain cycles.
pub struct Frame {
    /// Tags set by the Receive Worker or the release callback.
    pub flags: FrameFlags,
    /// Where the payload came from.
    pub source_tag: SourceTag,
    /// Link type the payload is framed as. Always `Ethernet` for frames
    /// captured by this core.
    pub link_type: LinkType,
    /// Capture timestamp.
    pub timestamp: SystemTime,
    /// Payload bytes.
    pub data: FrameData,
    /// Present only for zero-copy frames.
    pub reference: Option<FrameReference>,
    /// What the release path does with this frame.
    pub release_action: ReleaseAction,
}

impl Frame {
    /// A freshly pooled, empty frame ready to be populated by a drain
    /// iteration.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            flags: FrameFlags::empty(),
            source_tag: SourceTag::Synthetic,
            link_type: LinkType::Ethernet,
            timestamp: SystemTime::UNIX_EPOCH,
            data: FrameData::Empty,
            reference: None,
            release_action: ReleaseAction::PoolReturn,
        }
    }

    /// Resets a frame to its pristine, pool-ready state, dropping any
    /// attached payload or reference.
    pub fn reset(&mut self) {
        self.flags = FrameFlags::empty();
        self.source_tag = SourceTag::Synthetic;
        self.timestamp = SystemTime::UNIX_EPOCH;
        self.data = FrameData::Empty;
        self.reference = None;
        self.release_action = ReleaseAction::PoolReturn;
    }

    /// Whether this frame is a pseudo/synthetic frame that must never be
    /// handed to the Zero-Copy Forwarder.
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        self.flags.contains(FrameFlags::PSEUDO) || matches!(self.source_tag, SourceTag::Synthetic)
    }
}
