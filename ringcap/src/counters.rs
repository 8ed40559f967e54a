// ringcap/src/counters.rs
//! Aggregate and per-worker packet counters.
//!
//! Stands in for the out-of-scope "live-device registry that tracks
//! interface-wide counters" — the Receive Worker needs something concrete
//! to flush into even though the real counters subsystem lives elsewhere.
//! A plain-struct-of-atomics design: a handful of `AtomicU64` fields plus
//! a `snapshot()` that returns a plain `Copy` struct for the caller to
//! format or compare.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Device-wide aggregate counters, flushed into once per poll cycle by
/// every worker owning a ring on that device.
#[derive(Debug, Default)]
pub struct DeviceCounters {
    pkts: AtomicU64,
    drops: AtomicU64,
    invalid_checksums: AtomicU64,
    ignore_checksum: AtomicBool,
}

/// A point-in-time snapshot of [`DeviceCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounterSnapshot {
    /// Total packets delivered across every worker on this device.
    pub pkts: u64,
    /// Total drops across every worker on this device.
    pub drops: u64,
    /// Total invalid checksums observed.
    pub invalid_checksums: u64,
}

impl DeviceCounters {
    /// Creates a zeroed counter set with checksum auto-mode undecided.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_pkts(&self, n: u64) {
        self.pkts.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_drops(&self, n: u64) {
        self.drops.fetch_add(n, Ordering::Relaxed);
    }

    /// Records `n` additional invalid checksums observed on this device.
    pub fn add_invalid_checksums(&self, n: u64) {
        self.invalid_checksums.fetch_add(n, Ordering::Relaxed);
    }

    /// Current packet total.
    #[must_use]
    pub fn pkts(&self) -> u64 {
        self.pkts.load(Ordering::Relaxed)
    }

    /// Current drop total.
    #[must_use]
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Current invalid-checksum total.
    #[must_use]
    pub fn invalid_checksums(&self) -> u64 {
        self.invalid_checksums.load(Ordering::Relaxed)
    }

    /// Whether this device has already decided to skip checksum
    /// validation under the `AUTO` policy.
    #[must_use]
    pub fn ignore_checksum(&self) -> bool {
        self.ignore_checksum.load(Ordering::Acquire)
    }

    /// Latches the "skip checksum" decision for this device. Idempotent.
    pub fn set_ignore_checksum(&self) {
        self.ignore_checksum.store(true, Ordering::Release);
    }

    /// Takes a consistent-enough snapshot for logging or external export.
    #[must_use]
    pub fn snapshot(&self) -> DeviceCounterSnapshot {
        DeviceCounterSnapshot {
            pkts: self.pkts(),
            drops: self.drops(),
            invalid_checksums: self.invalid_checksums(),
        }
    }
}

/// Per-worker totals, accumulated locally during drain and flushed into a
/// [`DeviceCounters`] once per poll cycle (never read-modify-written from
/// two threads, per the concurrency model: this type is only ever touched
/// by the one Receive Worker that owns it).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    /// Packets delivered downstream by this worker.
    pub packets: u64,
    /// Bytes across all delivered packets.
    pub bytes: u64,
    /// Frames dropped by this worker (filter reject does not count; TX-full
    /// and downstream FAIL do).
    pub drops: u64,
}

/// Mutable per-worker counters plus the bookkeeping needed to flush only
/// the delta since the last flush into the device-wide totals.
#[derive(Debug, Default)]
pub struct WorkerCounters {
    totals: WorkerStats,
    flushed: WorkerStats,
}

impl WorkerCounters {
    /// Creates a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one delivered packet of `len` bytes.
    pub fn record_packet(&mut self, len: u16) {
        self.totals.packets += 1;
        self.totals.bytes += u64::from(len);
    }

    /// Records one drop.
    pub fn record_drop(&mut self) {
        self.totals.drops += 1;
    }

    /// Current lifetime totals for this worker.
    #[must_use]
    pub fn totals(&self) -> WorkerStats {
        self.totals
    }

    /// Adds the delta accumulated since the last flush into `device`, then
    /// marks it flushed.
    pub fn flush_into(&mut self, device: &DeviceCounters) {
        let delta_pkts = self.totals.packets - self.flushed.packets;
        let delta_drops = self.totals.drops - self.flushed.drops;
        if delta_pkts > 0 {
            device.add_pkts(delta_pkts);
        }
        if delta_drops > 0 {
            device.add_drops(delta_drops);
        }
        self.flushed = self.totals;
    }

    /// Logs the per-worker summary line expected on shutdown.
    pub fn log_summary(&self, interface_name: &str, worker_index: u32) {
        log::info!(
            "{interface_name} worker {worker_index}: packets={} drops={} bytes={}",
            self.totals.packets,
            self.totals.drops,
            self.totals.bytes,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_sends_only_the_delta() {
        let device = DeviceCounters::new();
        let mut worker = WorkerCounters::new();
        worker.record_packet(100);
        worker.record_packet(50);
        worker.flush_into(&device);
        assert_eq!(device.pkts(), 2);

        worker.record_packet(10);
        worker.flush_into(&device);
        assert_eq!(device.pkts(), 3);
    }

    #[test]
    fn ignore_checksum_latches() {
        let device = DeviceCounters::new();
        assert!(!device.ignore_checksum());
        device.set_ignore_checksum();
        assert!(device.ignore_checksum());
    }
}
