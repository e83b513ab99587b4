//! Interval statistics: per-port packet/byte/drop deltas since the
//! previous report, plus ring fill-level accounting, logged at `info`.

use log::info;

use crate::ring::SharedRing;
use crate::session::{Session, PACKNO_UNSET};

/// Logs one line per port with counts accumulated since the previous call,
/// then one line for the ring's fill level. Called uniformly on every
/// interval tick and every file close, regardless of whether `--check` is
/// enabled, so the two code paths can never diverge in what they report.
pub fn report(session: &Session, ring: &SharedRing) {
    for (port, (current, previous)) in session.ports().iter().zip(session.take_deltas()) {
        let seen = current.packs_seen - previous.packs_seen;
        let dropped = current.packs_dropped - previous.packs_dropped;
        let bytes = current.bytes_written - previous.bytes_written;
        if seen == 0 && dropped == 0 && bytes == 0 {
            continue;
        }
        info!(
            "port {}: {} packets ({} dropped), {} bytes",
            port.port, seen, dropped, bytes
        );
        let good = current.beamformed_good - previous.beamformed_good;
        if good > 0 {
            // Reconciliation per §4.5: the packno range that should have
            // been seen since the last report, versus how many actually were.
            // On the very first report for a port, "since the last report"
            // means "since the first packno observed".
            let baseline = if previous.beamformed_last_packno != PACKNO_UNSET {
                previous.beamformed_last_packno
            } else {
                current.beamformed_first_packno - 1
            };
            let expected = current.beamformed_last_packno - baseline;
            let missed = expected - seen as i64;
            info!(
                "port {}: beamformed expected={} seen={} missed={} good={}",
                port.port, expected, seen, missed, good
            );
        }
    }
    info!(
        "ring: fill {}/{} bytes, high-water {}, mean {:.1}%",
        ring.fill(),
        ring.capacity(),
        ring.max_fill(),
        ring.mean_fill_fraction() * 100.0
    );
}
