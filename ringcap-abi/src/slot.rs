// ringcap-abi/src/slot.rs
//! Ring header and per-slot layout shared with the mapped NIC region.

use core::sync::atomic::AtomicU32;

use bitflags::bitflags;

bitflags! {
    /// Per-slot flags, mirrored from the ring fabric's own slot flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlotFlags: u16 {
        /// The slot's `buf_idx` was swapped and the NIC must not reuse the
        /// buffer's previous contents.
        const BUF_CHANGED = 1 << 0;
        /// Ask the NIC to report completion of this slot via an interrupt.
        const REPORT = 1 << 1;
        /// This slot is a fragment continued by the next slot in the ring.
        const MORE_FRAG = 1 << 2;
    }
}

/// One descriptor entry in a ring.
///
/// Layout matches the mapped region byte-for-byte: `buf_idx` identifies
/// which packet buffer in the shared pool this slot currently points at,
/// `len` is the valid payload length, `flags` carries [`SlotFlags`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Slot {
    /// Index of the packet buffer this slot currently owns.
    pub buf_idx: u32,
    /// Valid payload length in bytes.
    pub len: u16,
    /// Slot flags (see [`SlotFlags`]).
    pub flags: u16,
}

impl Slot {
    /// Returns the slot's [`SlotFlags`], ignoring any unknown bits.
    #[must_use]
    pub fn flags(&self) -> SlotFlags {
        SlotFlags::from_bits_truncate(self.flags)
    }

    /// Sets (ORs in) the given flags.
    pub fn set_flags(&mut self, flags: SlotFlags) {
        self.flags |= flags.bits();
    }

    /// Swaps this slot's `buf_idx` and `len` with `other`'s, and tags both
    /// as buffer-changed. Used by the zero-copy forwarder to move a frame
    /// from an RX slot to a TX slot without copying payload bytes.
    pub fn swap_buffer(&mut self, other: &mut Slot) {
        core::mem::swap(&mut self.buf_idx, &mut other.buf_idx);
        other.len = self.len;
        self.set_flags(SlotFlags::BUF_CHANGED);
        other.set_flags(SlotFlags::BUF_CHANGED);
    }
}

/// Header of one ring (RX or TX) within the mapped region.
///
/// `head` and `cur` are published together by the single writer on that
/// side (the owning Receive Worker for RX, the TX spinlock holder for TX);
/// `tail` marks the boundary the NIC currently guarantees ownership up to.
#[derive(Debug, Default)]
pub struct RingHeader {
    /// Number of slots in this ring.
    pub num_slots: u32,
    /// Index of the first slot still owned by the user side.
    pub head: AtomicU32,
    /// Cursor used while draining/filling; published to `head` together.
    pub cur: AtomicU32,
    /// Index up to which the NIC has made slots available (RX) or freed
    /// them after DMA (TX).
    pub tail: AtomicU32,
}

impl RingHeader {
    /// Creates a new, empty ring header for a ring with `num_slots` slots.
    #[must_use]
    pub fn new(num_slots: u32) -> Self {
        Self {
            num_slots,
            head: AtomicU32::new(0),
            cur: AtomicU32::new(0),
            tail: AtomicU32::new(0),
        }
    }

    /// Returns the next slot index after `idx`, wrapping at `num_slots`.
    #[must_use]
    pub fn next_index(&self, idx: u32) -> u32 {
        let next = idx + 1;
        if next >= self.num_slots { 0 } else { next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_index_wraps() {
        let hdr = RingHeader::new(4);
        assert_eq!(hdr.next_index(0), 1);
        assert_eq!(hdr.next_index(3), 0);
    }

    #[test]
    fn swap_buffer_tags_both_slots() {
        let mut rx = Slot { buf_idx: 7, len: 100, flags: 0 };
        let mut tx = Slot { buf_idx: 3, len: 0, flags: 0 };
        rx.swap_buffer(&mut tx);
        assert_eq!(rx.buf_idx, 3);
        assert_eq!(tx.buf_idx, 7);
        assert_eq!(tx.len, 100);
        assert!(rx.flags().contains(SlotFlags::BUF_CHANGED));
        assert!(tx.flags().contains(SlotFlags::BUF_CHANGED));
    }
}
