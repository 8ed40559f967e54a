// ringcap/src/checksum.rs
//! Checksum-validation policy applied during ring drain.

use crate::config::ChecksumMode;
use crate::counters::DeviceCounters;

/// Number of device-wide packets to observe before the `AUTO` policy will
/// consider latching "skip checksum" — avoids deciding off a handful of
/// samples right after the device opens.
const AUTO_WARMUP_PACKETS: u64 = 1000;

/// Decides whether a just-captured frame should be tagged "skip checksum",
/// and updates the live device's latched decision under `AUTO`.
///
/// `worker_packets` is this worker's own lifetime packet count, observed
/// as one input to the auto-mode heuristic alongside the device-wide
/// totals (this worker's packets, the device's packets, and the device's
/// invalid-checksum count).
#[must_use]
pub fn should_skip_checksum(
    mode: ChecksumMode,
    worker_packets: u64,
    device: &DeviceCounters,
) -> bool {
    match mode {
        ChecksumMode::Disable => true,
        ChecksumMode::Validate => false,
        ChecksumMode::Auto => {
            if device.ignore_checksum() {
                return true;
            }
            if auto_mode_checker(worker_packets, device.pkts(), device.invalid_checksums()) {
                device.set_ignore_checksum();
                true
            } else {
                false
            }
        }
    }
}

/// Heuristic backing the `AUTO` checksum policy: once the device has seen
/// a warmup-sized sample of packets with zero invalid checksums, assume
/// the NIC (or a hop upstream) is already validating checksums in hardware
/// and stop bothering downstream with software validation.
fn auto_mode_checker(worker_packets: u64, device_packets: u64, device_invalid_checksums: u64) -> bool {
    let _ = worker_packets;
    device_packets >= AUTO_WARMUP_PACKETS && device_invalid_checksums == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disable_always_skips() {
        let device = DeviceCounters::new();
        assert!(should_skip_checksum(ChecksumMode::Disable, 0, &device));
    }

    #[test]
    fn validate_never_skips() {
        let device = DeviceCounters::new();
        device.add_invalid_checksums(0);
        assert!(!should_skip_checksum(ChecksumMode::Validate, 1, &device));
    }

    #[test]
    fn auto_latches_after_warmup_with_no_invalid_checksums() {
        let device = DeviceCounters::new();
        device.add_pkts(AUTO_WARMUP_PACKETS);
        assert!(should_skip_checksum(ChecksumMode::Auto, 10, &device));
        assert!(device.ignore_checksum());
    }

    #[test]
    fn auto_does_not_latch_before_warmup() {
        let device = DeviceCounters::new();
        device.add_pkts(10);
        assert!(!should_skip_checksum(ChecksumMode::Auto, 10, &device));
        assert!(!device.ignore_checksum());
    }
}
