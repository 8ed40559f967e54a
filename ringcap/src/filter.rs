// ringcap/src/filter.rs
//! The Filter Evaluator: a stateless wrapper over a pre-compiled packet
//! filter program, plus the compilation boundary to an external compiler.
//!
//! BPF bytecode compilation itself is an external collaborator; this
//! module defines the `CompiledFilter`/`FilterCompiler` boundary and,
//! behind the `pcap-filter` feature, one concrete compiler
//! backed by libpcap's offline ("dead capture") compile path — the
//! idiomatic way to turn a filter expression into a bytecode program
//! without a live capture handle.

use std::sync::Arc;

use ringcap_abi::LinkType;

use crate::error::Result;

/// A pre-compiled packet filter program. Evaluation is pure: no state, no
/// allocation. An empty program accepts every frame.
#[derive(Clone)]
pub struct CompiledFilter {
    eval: Option<Arc<dyn Fn(&[u8]) -> bool + Send + Sync>>,
}

impl CompiledFilter {
    /// The empty program: accepts all frames.
    #[must_use]
    pub fn empty() -> Self {
        Self { eval: None }
    }

    /// Evaluates the program over one frame's bytes.
    #[must_use]
    pub fn evaluate(&self, data: &[u8]) -> bool {
        match &self.eval {
            None => true,
            Some(f) => f(data),
        }
    }

    /// Whether this is the empty ("accept all") program.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.eval.is_none()
    }

    /// Builds a filter from an arbitrary predicate, bypassing compilation.
    /// Only for exercising the drain/forward paths in tests without a
    /// real BPF compiler backend.
    #[cfg(feature = "test-support")]
    #[must_use]
    pub fn from_predicate(f: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        Self { eval: Some(Arc::new(f)) }
    }
}

/// Compiles a filter expression into a [`CompiledFilter`] for a given link
/// type and maximum snapshot length.
pub trait FilterCompiler: Send + Sync {
    /// Compiles `source` for `link_type`. Returns `CONFIG_ERROR` on a
    /// compile failure.
    fn compile(&self, source: &str, link_type: LinkType, snap_len: i32) -> Result<CompiledFilter>;
}

/// Default maximum snapshot length used when none is otherwise configured.
pub const DEFAULT_SNAP_LEN: i32 = 65535;

#[cfg(feature = "pcap-filter")]
pub use pcap_backed::PcapFilterCompiler;

#[cfg(feature = "pcap-filter")]
mod pcap_backed {
    use std::sync::Arc;

    use pcap::{Capture, Linktype};

    use super::{CompiledFilter, FilterCompiler};
    use crate::error::{Error, Result};
    use ringcap_abi::LinkType;

    /// [`FilterCompiler`] backed by libpcap's dead-capture compile path —
    /// the standard way to compile a filter expression offline, without an
    /// open network device.
    #[derive(Debug, Default)]
    pub struct PcapFilterCompiler;

    impl PcapFilterCompiler {
        /// Creates a new libpcap-backed filter compiler.
        #[must_use]
        pub fn new() -> Self {
            Self
        }
    }

    impl FilterCompiler for PcapFilterCompiler {
        fn compile(&self, source: &str, link_type: LinkType, snap_len: i32) -> Result<CompiledFilter> {
            if source.trim().is_empty() {
                return Ok(CompiledFilter::empty());
            }
            let dead = Capture::dead(Linktype(link_type.dlt()))
                .map_err(|e| Error::Config(format!("pcap dead capture: {e}")))?;
            let program = dead
                .compile(source, true)
                .map_err(|e| Error::Config(format!("filter compile {source:?}: {e}")))?;
            // A dead capture has no separate snaplen knob; it only affects
            // how libpcap itself would truncate frames, not how the
            // compiled program matches against bytes we hand it.
            let _ = snap_len;
            Ok(CompiledFilter {
                eval: Some(Arc::new(move |data: &[u8]| program.filter(data))),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_program_accepts_everything() {
        let filter = CompiledFilter::empty();
        assert!(filter.is_empty());
        assert!(filter.evaluate(&[]));
        assert!(filter.evaluate(&[1, 2, 3]));
    }

    #[test]
    fn custom_program_delegates_to_closure() {
        let filter = CompiledFilter {
            eval: Some(Arc::new(|data: &[u8]| data.first() == Some(&0xAA))),
        };
        assert!(!filter.is_empty());
        assert!(filter.evaluate(&[0xAA, 0x00]));
        assert!(!filter.evaluate(&[0x01]));
    }
}
