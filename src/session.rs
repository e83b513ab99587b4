//! Session state shared by the producer, consumer, and signal-supervisor
//! threads: the `stopped` tri-state and per-port counters.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::ring::SharedRing;

/// Capture continues normally.
pub const RUNNING: i8 = 0;
/// Close the current file, then keep listening for a fresh one.
pub const END_FILE: i8 = 1;
/// Stop capturing and exit.
pub const TERMINATE: i8 = 2;
/// Close the current file and immediately open the next, without stopping.
pub const SPLIT_NOW: i8 = -1;

/// Sentinel for "no beamformed packet observed yet" in
/// `beamformed_{first,last}_packno`.
pub const PACKNO_UNSET: i64 = i64::MIN;

/// Per-port counters. Written only by the producer thread; read by the
/// consumer thread (for interval stats) and so held in atomics rather than
/// plain integers even though there is never concurrent writing.
pub struct PortCounters {
    pub port: u16,
    packs_seen: AtomicU64,
    packs_dropped: AtomicU64,
    bytes_written: AtomicU64,
    beamformed_good: AtomicU64,
    beamformed_first_packno: AtomicI64,
    beamformed_last_packno: AtomicI64,
}

/// A point-in-time copy of a [`PortCounters`], used to compute per-interval
/// deltas for stats reporting.
#[derive(Clone, Copy, Debug)]
pub struct PortSnapshot {
    pub packs_seen: u64,
    pub packs_dropped: u64,
    pub bytes_written: u64,
    pub beamformed_good: u64,
    pub beamformed_first_packno: i64,
    pub beamformed_last_packno: i64,
}

impl Default for PortSnapshot {
    fn default() -> Self {
        Self {
            packs_seen: 0,
            packs_dropped: 0,
            bytes_written: 0,
            beamformed_good: 0,
            beamformed_first_packno: PACKNO_UNSET,
            beamformed_last_packno: PACKNO_UNSET,
        }
    }
}

impl PortCounters {
    fn new(port: u16) -> Self {
        Self {
            port,
            packs_seen: AtomicU64::new(0),
            packs_dropped: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            beamformed_good: AtomicU64::new(0),
            beamformed_first_packno: AtomicI64::new(PACKNO_UNSET),
            beamformed_last_packno: AtomicI64::new(PACKNO_UNSET),
        }
    }

    pub fn record_seen(&self) {
        self.packs_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.packs_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Updates `beamformed_{first,last}_packno` from a decoded header's
    /// packno, regardless of whether that header was "good" — only a
    /// header with no usable timestamp should be kept out of the packno
    /// span entirely, since the reconciliation in `stats::report` needs the
    /// full span of packets observed, not just the ones without an error bit.
    pub fn observe_packno(&self, packno: i64) {
        let _ = self.beamformed_first_packno.compare_exchange(
            PACKNO_UNSET,
            packno,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
        self.beamformed_last_packno.store(packno, Ordering::Relaxed);
    }

    /// Records a packet whose LOFAR header passed `--check`'s good test.
    pub fn record_beamformed_good(&self) {
        self.beamformed_good.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PortSnapshot {
        PortSnapshot {
            packs_seen: self.packs_seen.load(Ordering::Relaxed),
            packs_dropped: self.packs_dropped.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            beamformed_good: self.beamformed_good.load(Ordering::Relaxed),
            beamformed_first_packno: self.beamformed_first_packno.load(Ordering::Relaxed),
            beamformed_last_packno: self.beamformed_last_packno.load(Ordering::Relaxed),
        }
    }
}

/// Shared session state: the `stopped` tri-state plus its condvar, and
/// per-port counters. `stopped` is read under the lock at every decision
/// point so producer, consumer, and the signal supervisor always observe a
/// consistent value (spec's mutex `S`); `data_available` doubles as the
/// wake signal for both "stopped changed" and "new data committed" since
/// the consumer cares about either.
pub struct Session {
    stopped: Mutex<i8>,
    data_available: Condvar,
    ports: Vec<PortCounters>,
    last_snapshot: Mutex<Vec<PortSnapshot>>,
    /// Whether the consumer currently has an output file open. Read by the
    /// producer's idle-timeout handling, which reacts differently depending
    /// on it (§4.4: idle with a file open ends the file; idle with none
    /// open is a no-op, still waiting for the first packet).
    file_open: AtomicBool,
}

impl Session {
    pub fn new(port_numbers: &[u16]) -> Self {
        let ports: Vec<PortCounters> = port_numbers.iter().copied().map(PortCounters::new).collect();
        let last_snapshot = vec![PortSnapshot::default(); ports.len()];
        Self {
            stopped: Mutex::new(RUNNING),
            data_available: Condvar::new(),
            ports,
            last_snapshot: Mutex::new(last_snapshot),
            file_open: AtomicBool::new(false),
        }
    }

    pub fn mark_file_open(&self) {
        self.file_open.store(true, Ordering::Relaxed);
    }

    pub fn mark_file_closed(&self) {
        self.file_open.store(false, Ordering::Relaxed);
    }

    pub fn is_file_open(&self) -> bool {
        self.file_open.load(Ordering::Relaxed)
    }

    pub fn ports(&self) -> &[PortCounters] {
        &self.ports
    }

    pub fn port(&self, index: usize) -> &PortCounters {
        &self.ports[index]
    }

    /// Current `stopped` value.
    pub fn stopped(&self) -> i8 {
        *self.stopped.lock().unwrap()
    }

    /// Sets `stopped` and wakes anyone waiting on `data_available`. Called
    /// by the signal supervisor and by the consumer after it has acted on
    /// [`SPLIT_NOW`] or [`END_FILE`] (to reset back to [`RUNNING`]).
    pub fn set_stopped(&self, value: i8) {
        let mut guard = self.stopped.lock().unwrap();
        *guard = value;
        self.data_available.notify_all();
    }

    /// Wakes the consumer after the producer commits a record, without
    /// changing `stopped`.
    pub fn notify_data_available(&self) {
        let _guard = self.stopped.lock().unwrap();
        self.data_available.notify_all();
    }

    /// Blocks the consumer until either the ring has data, `stopped` is no
    /// longer [`RUNNING`], or `timeout` elapses (the interval-stats tick).
    /// Returns the `stopped` value observed on wake.
    pub fn wait_for_activity(&self, ring: &SharedRing, timeout: Duration) -> i8 {
        let guard = self.stopped.lock().unwrap();
        if ring.fill() > 0 || *guard != RUNNING {
            return *guard;
        }
        let (guard, _) = self.data_available.wait_timeout(guard, timeout).unwrap();
        *guard
    }

    /// Rearms `stopped` back to [`RUNNING`] after the consumer has acted on
    /// a transition, but only if nothing else changed it since `old` was
    /// snapshotted (and `ms` is not [`TERMINATE`], which exits regardless).
    /// Returns the value now in effect.
    pub fn clear_if_unchanged(&self, old: i8, ms: i8) -> i8 {
        let mut guard = self.stopped.lock().unwrap();
        if ms == TERMINATE {
            return *guard;
        }
        if *guard == old {
            *guard = RUNNING;
            self.data_available.notify_all();
            RUNNING
        } else {
            let current = *guard;
            log::warn!("stopped changed concurrently while consumer was acting on {old}: now {current}");
            current
        }
    }

    /// Returns `(current, previous)` snapshots for every port and replaces
    /// the stored snapshot with `current`, for computing interval deltas.
    pub fn take_deltas(&self) -> Vec<(PortSnapshot, PortSnapshot)> {
        let mut last = self.last_snapshot.lock().unwrap();
        let mut out = Vec::with_capacity(self.ports.len());
        for (port, prev) in self.ports.iter().zip(last.iter_mut()) {
            let current = port.snapshot();
            out.push((current, *prev));
            *prev = current;
        }
        out
    }
}
