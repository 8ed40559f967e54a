// ringcap-abi/src/lib.rs
//! Shared wire-format definitions for the ring fabric.
//!
//! This crate holds the types that describe the memory-mapped layout of a
//! kernel-bypass NIC device: the ring header (head/cur/tail cursors), the
//! per-slot descriptor (buffer index, length, flags), and the ioctl request
//! shapes used to register a ring and query a device's interface. Nothing
//! here owns memory or talks to an OS — it only describes shapes and
//! constants shared between the registry/worker code in `ringcap` and any
//! other consumer.
//!
//! # Modules
//!
//! - [`slot`]: ring slot layout and per-slot flags
//! - [`flags`]: frame-level tags (checksum policy, drop verdict, pseudo)
//! - [`linktype`]: link-layer type used when compiling a filter program
//! - [`ioctl`]: ring-fabric ioctl request numbers and argument structs

#![warn(missing_docs)]

pub mod flags;
pub mod ioctl;
pub mod linktype;
pub mod slot;

pub use flags::FrameFlags;
pub use ioctl::IfReq;
pub use linktype::LinkType;
pub use slot::{RingHeader, Slot, SlotFlags};
