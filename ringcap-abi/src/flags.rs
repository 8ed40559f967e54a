// ringcap-abi/src/flags.rs
//! Frame-level tags carried on a captured frame object.

use bitflags::bitflags;

bitflags! {
    /// Tags a Receive Worker or release callback may set on a frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameFlags: u8 {
        /// Downstream checksum validation should be skipped for this frame.
        const SKIP_CHECKSUM = 1 << 0;
        /// The downstream pipeline's verdict for this frame is "drop" (only
        /// meaningful in IPS copy mode).
        const DROP = 1 << 1;
        /// The frame is synthetic (not backed by a real ring slot) and must
        /// never be handed to the zero-copy forwarder.
        const PSEUDO = 1 << 2;
    }
}
