// ringcap-abi/src/linktype.rs
//! Link-layer type used when compiling a filter program.

/// Link-layer type a BPF filter program is compiled against.
///
/// The core always compiles for [`LinkType::Ethernet`]; the enum exists
/// so the compiler boundary isn't hard-coded to a bare integer constant
/// at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LinkType {
    /// DLT_EN10MB — Ethernet, the only link type this core ever requests.
    Ethernet = 1,
}

impl LinkType {
    /// Returns the numeric `DLT_*` value libpcap uses for this link type.
    #[must_use]
    pub const fn dlt(self) -> i32 {
        self as i32
    }
}
