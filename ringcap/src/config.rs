// ringcap/src/config.rs
//! Per-interface configuration consumed by a Receive Worker at init time.
//!
//! The loader that produces one of these from a config file or CLI flags
//! lives outside this crate; this module only defines the shape it hands
//! over.

/// How a worker forwards or copies a frame after capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Capture-only: no egress device, frames are never forwarded.
    None,
    /// Inline intrusion-prevention: zero-copy forward to an egress device,
    /// subject to the downstream verdict.
    Ips,
    /// Inline tap: mirrors frames toward an egress device without acting
    /// on a drop verdict.
    Tap,
}

/// Checksum-validation policy applied to each captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumMode {
    /// Always tag frames "skip checksum".
    Disable,
    /// Decide once per live device whether to skip, based on observed
    /// invalid-checksum history, then stick with that decision.
    Auto,
    /// Never tag; the downstream stage validates.
    Validate,
}

/// Configuration for one interface's Receive Worker pool.
#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    /// Interface to capture from.
    pub interface_name: String,
    /// Interface to forward onto, required when `copy_mode` is not `None`.
    pub egress_interface_name: Option<String>,
    /// Number of Receive Worker threads to start for this interface.
    pub threads: u32,
    /// Forwarding behavior.
    pub copy_mode: CopyMode,
    /// Checksum-validation policy.
    pub checksum_mode: ChecksumMode,
    /// Whether to request promiscuous mode on open.
    pub promiscuous: bool,
    /// Optional BPF filter expression source; `None` or empty means
    /// "accept all".
    pub filter_source: Option<String>,
}

impl InterfaceConfig {
    /// Whether this configuration requires an egress device.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.copy_mode != CopyMode::None
    }
}
