// ringcap/src/lib.rs
//! Multi-threaded receive engine and zero-copy forwarder for a
//! kernel-bypass, memory-mapped ring-fabric NIC.
//!
//! This crate is the CORE of a packet capture module that feeds a
//! downstream intrusion-detection pipeline: a reference-counted [`Device
//! Registry`](registry::DeviceRegistry) over memory-mapped NIC devices, a
//! [`Receive Worker`](worker::WorkerContext) that partitions hardware
//! rings among threads and drains them, and a zero-copy forwarding path
//! used in inline (IPS/TAP) mode that swaps buffer indices between an
//! ingress RX ring and an egress TX ring.
//!
//! The packet decode stage, the downstream processing slot chain, the
//! counter/statistics subsystem's live-device registry, BPF bytecode
//! compilation internals, configuration loading, and module registration
//! glue are all external collaborators; this crate only implements the
//! contracts it needs from them.

#![warn(missing_docs)]

pub mod backend;
pub mod checksum;
pub mod config;
pub mod counters;
pub mod device;
pub mod error;
pub mod filter;
pub mod frame;
pub mod pool;
pub mod registry;
pub mod worker;

pub use backend::{LinuxBackend, PollEvents, RingBackend, RingView};
#[cfg(feature = "test-support")]
pub use backend::{MockBackend, MockDeviceRings, MockRingView, MockTopology};
pub use checksum::should_skip_checksum;
pub use config::{ChecksumMode, CopyMode, InterfaceConfig};
pub use counters::{DeviceCounterSnapshot, DeviceCounters, WorkerCounters, WorkerStats};
pub use device::{DeviceHandle, RingDescriptor};
pub use error::{Error, Result};
pub use filter::{CompiledFilter, FilterCompiler, DEFAULT_SNAP_LEN};
pub use frame::{Frame, FrameData, FrameReference, ReleaseAction, SourceTag};
pub use pool::FramePool;
pub use registry::{DeviceRegistry, ReleaseOutcome};
pub use worker::{DownstreamSlot, WorkerContext};

#[cfg(feature = "pcap-filter")]
pub use filter::PcapFilterCompiler;
