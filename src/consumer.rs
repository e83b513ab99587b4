//! Egress side: drains the ring to disk, manages the output file's
//! lifecycle (open, split, close, reopen) exactly per the session
//! controller's `stopped` transitions, and drives periodic stats reporting.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{error, info};

use crate::cli::Config;
use crate::compress::Compressor;
use crate::error::{Error, Result};
use crate::filename;
use crate::ring::SharedRing;
use crate::session::{Session, RUNNING, SPLIT_NOW, TERMINATE};
use crate::stats;

const STATS_INTERVAL: Duration = Duration::from_secs(10);

enum SinkWriter {
    Plain(BufWriter<File>),
    Compressed(Compressor),
}

impl SinkWriter {
    fn open(path: &str, cfg: &Config) -> Result<Self> {
        if cfg.compress {
            Ok(Self::Compressed(Compressor::spawn(
                &cfg.compcommand,
                path,
                cfg.path_override.as_deref(),
            )?))
        } else {
            Ok(Self::Plain(BufWriter::new(File::create(path)?)))
        }
    }

    fn finish(self) -> Result<()> {
        match self {
            Self::Plain(mut w) => {
                w.flush()?;
                Ok(())
            }
            Self::Compressed(c) => c.finish(),
        }
    }
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Compressed(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Compressed(w) => w.flush(),
        }
    }
}

/// How many bytes of the current readable window to drain in one pass:
/// bounded by `--maxwrite`, by the bytes remaining before the current file
/// hits `--Maxfilesize` (so a file's own split point is honored even when
/// the ring is holding far more than one file's worth of backlog), and
/// rounded down to a whole number of records when `--len` fixes a record
/// width, so a file never ends mid-record. Drains at least one whole
/// record when available, even if that exceeds the other two bounds.
fn drain_chunk_len(cfg: &Config, available: usize, remaining_to_split: Option<u64>) -> usize {
    let mut cap = available.min(cfg.maxwrite);
    if let Some(remaining) = remaining_to_split {
        cap = cap.min(remaining as usize);
    }
    if cfg.packlen == 0 {
        return cap;
    }
    let record_len = cfg.packlen as usize + if cfg.sizehead { 2 } else { 0 };
    if available < record_len {
        // Committed records always land whole, so this means nothing
        // complete has arrived yet.
        return 0;
    }
    if cap < record_len {
        // `--maxwrite` is smaller than a single record; write exactly one
        // anyway rather than never draining at all.
        return record_len;
    }
    (cap / record_len) * record_len
}

/// File state carried across consumer loop iterations.
struct FileState {
    sink: Option<SinkWriter>,
    /// Timestamp baked into the current (or most recently closed) file's
    /// name; reused as-is across splits, refreshed on a genuine reopen.
    base_time: DateTime<Utc>,
    /// `-1` means unnumbered (no `_NNNN` suffix ever emitted); otherwise
    /// the next split's suffix.
    file_number: i64,
    bytes_in_file: u64,
}

impl FileState {
    fn new() -> Self {
        Self { sink: None, base_time: Utc::now(), file_number: -1, bytes_in_file: 0 }
    }

    fn sequence(&self) -> Option<u64> {
        if self.file_number < 0 {
            None
        } else {
            Some(self.file_number as u64)
        }
    }
}

/// Runs the consumer until the session reaches [`TERMINATE`] with an empty
/// ring. `portlist` and `hostname` feed the output filename (spec §6:
/// `<out>_<portlist>.<hostname>.<timestamp>`).
pub fn run(cfg: &Config, session: &Session, ring: &SharedRing, portlist: &str, hostname: &str) -> Result<()> {
    let numbered = cfg.maxfilesize != 0;
    // Positive --Maxfilesize reports stats at every split; negative keeps
    // splitting (by magnitude) but only reports at genuine file closes —
    // this is the "per-file vs combined stats" distinction from §6, whose
    // exact mechanics §4.3 leaves as an open question.
    let stats_per_split = cfg.maxfilesize > 0;
    let split_threshold = cfg.maxfilesize.unsigned_abs();

    let mut file = FileState::new();
    let mut last_stats = Instant::now();

    loop {
        let old = session.wait_for_activity(ring, STATS_INTERVAL);
        let mut ms = old;

        // 1. File-size split.
        if ms == RUNNING && split_threshold > 0 && file.bytes_in_file >= split_threshold {
            ms = SPLIT_NOW;
        }
        // A manual split request (SIGUSR1) only makes sense when numbering
        // is active; otherwise there's no distinct name for the new file.
        if ms == SPLIT_NOW && !numbered {
            ms = RUNNING;
        }

        // 2. File close decision.
        let ring_empty = ring.fill() == 0;
        if file.sink.is_some() && ((ms == TERMINATE && ring_empty) || ms.abs() == 1) {
            let print_stats = ms != SPLIT_NOW || stats_per_split;
            close_file(&mut file, session)?;
            if print_stats {
                stats::report(session, ring);
            }
        }

        // 3. Terminate.
        if ms == TERMINATE && ring_empty {
            return Ok(());
        }

        // 4. Reopen (split): same base timestamp, incremented suffix.
        if ms == SPLIT_NOW {
            file.file_number += 1;
            let path = filename::build(&cfg.out, portlist, hostname, file.base_time, file.sequence(), cfg.compress);
            info!("opening split output file {path}");
            file.sink = Some(SinkWriter::open(&path, cfg)?);
            session.mark_file_open();
            file.bytes_in_file = 0;
        }

        // 5. Clear.
        let cleared = session.clear_if_unchanged(old, ms);

        // 6. Drain.
        if let Some(snapshot) = ring.read_snapshot() {
            if file.sink.is_none() {
                file.base_time = Utc::now();
                file.file_number = if numbered { 0 } else { -1 };
                let path =
                    filename::build(&cfg.out, portlist, hostname, file.base_time, file.sequence(), cfg.compress);
                info!("opening output file {path}");
                file.sink = Some(SinkWriter::open(&path, cfg)?);
                session.mark_file_open();
            }
            let remaining_to_split =
                (split_threshold > 0).then(|| split_threshold.saturating_sub(file.bytes_in_file));
            let chunk_len = drain_chunk_len(cfg, snapshot.len, remaining_to_split);
            if chunk_len > 0 {
                let bytes = ring.slice_at(snapshot.offset, chunk_len);
                file.sink.as_mut().unwrap().write_all(bytes)?;
                ring.commit_read(chunk_len);
                file.bytes_in_file += chunk_len as u64;
            }
        }

        if cleared == TERMINATE && ring.fill() == 0 && file.sink.is_none() {
            return Ok(());
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            stats::report(session, ring);
            last_stats = Instant::now();
        }
    }
}

/// Closes the current sink. A non-zero compressor exit is reported but does
/// not abort the session — the data written up to that point is accepted,
/// distinct from a `Setup`/`Runtime` fatal.
fn close_file(file: &mut FileState, session: &Session) -> Result<()> {
    if let Some(sink) = file.sink.take() {
        match sink.finish() {
            Ok(()) => {}
            Err(err @ Error::Compressor { .. }) => error!("{err}"),
            Err(err) => return Err(err),
        }
        session.mark_file_closed();
    }
    Ok(())
}
