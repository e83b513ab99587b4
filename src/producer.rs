//! Ingress side: reads datagrams (or framed stdin records) and enqueues
//! them onto the shared ring, dropping on overrun rather than blocking —
//! except in stdin mode, where there is no "drop" and the producer blocks
//! for space instead.

use std::io::{self, Read};
use std::net::SocketAddr;

use log::{debug, info, warn};
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};

use crate::cli::{Config, PortSpec};
use crate::error::Result;
use crate::lofar::{LofarHeader, HEADER_LEN as LOFAR_HEADER_LEN};
use crate::ring::SharedRing;
use crate::session::{PortCounters, Session, END_FILE, RUNNING, TERMINATE};
use crate::stats;

/// Cumulative bytes captured between progress reports.
const MILESTONE_BYTES: u64 = 1 << 30;

/// Maximum UDP payload size; one recv buffer is reused across all sockets.
const MAX_DATAGRAM: usize = 65_536;

/// Runs the socket-mode producer until `Session::stopped` reaches
/// [`TERMINATE`]. Binds one UDP socket per configured port and waits on all
/// of them with a single `mio::Poll`.
pub fn run_sockets(cfg: &Config, session: &Session, ring: &SharedRing) -> Result<()> {
    let ports = match &cfg.ports {
        PortSpec::Ports(ports) => ports.clone(),
        PortSpec::Stdin => unreachable!("run_sockets called in stdin mode"),
    };

    let mut poll = Poll::new()?;
    let mut sockets = Vec::with_capacity(ports.len());
    for (index, &port) in ports.iter().enumerate() {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let mut socket = UdpSocket::bind(addr)?;
        poll.registry().register(&mut socket, Token(index), Interest::READABLE)?;
        sockets.push(socket);
    }

    let mut events = Events::with_capacity(ports.len().max(1));
    let mut buf = [0u8; MAX_DATAGRAM];
    let mut milestone_acc = 0u64;

    loop {
        if session.stopped() == TERMINATE {
            break;
        }
        match poll.poll(&mut events, Some(cfg.timeout)) {
            Ok(()) => {}
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
        if events.is_empty() {
            // Idle timeout: if a file is open, end it and wait for the next
            // burst to start a fresh one; with no file open yet, this is a
            // no-op (still waiting for the first packet).
            if session.is_file_open() && session.stopped() == RUNNING {
                debug!("producer idle for {:?}, ending current file", cfg.timeout);
                session.set_stopped(END_FILE);
            }
            continue;
        }
        for event in &events {
            let index = event.token().0;
            loop {
                match sockets[index].recv(&mut buf) {
                    Ok(n) => {
                        if session.stopped() == TERMINATE {
                            // Already told to stop; discard anything still
                            // arriving rather than enqueue past shutdown.
                            continue;
                        }
                        enqueue(cfg, session, ring, index, ports[index], &buf[..n], &mut milestone_acc);
                    }
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) => return Err(err.into()),
                }
            }
        }
        if session.stopped() == TERMINATE {
            break;
        }
    }
    Ok(())
}

/// Runs the stdin producer. Stdin has no datagram framing of its own, so
/// records are delimited either by a 2-byte little-endian length prefix
/// (`--sizehead`) or by a fixed `--len`; config validation guarantees one
/// of the two is set. Unlike socket mode, a full ring blocks rather than
/// drops a record — stdin has no "redial and miss packets" equivalent, and
/// EOF always ends the session rather than just the current file.
pub fn run_stdin(cfg: &Config, session: &Session, ring: &SharedRing) -> Result<()> {
    let mut stdin = io::stdin().lock();
    let mut milestone_acc = 0u64;

    loop {
        if session.stopped() == TERMINATE {
            return Ok(());
        }
        let payload_len = if cfg.sizehead {
            let mut len_buf = [0u8; 2];
            if !read_exact_or_eof(&mut stdin, &mut len_buf)? {
                info!("stdin EOF");
                session.set_stopped(TERMINATE);
                return Ok(());
            }
            u16::from_le_bytes(len_buf) as usize
        } else {
            cfg.packlen as usize
        };

        let mut payload = vec![0u8; payload_len];
        if !read_exact_or_eof(&mut stdin, &mut payload)? {
            info!("stdin EOF");
            session.set_stopped(TERMINATE);
            return Ok(());
        }

        let counters = session.port(0);
        counters.record_seen();
        let record_len = record_length(cfg, payload.len());
        let mut slot = ring.reserve_blocking(record_len);
        write_record(cfg, slot.as_mut_slice(), &payload);
        slot.commit();
        session.notify_data_available();
        counters.record_written(record_len as u64);
        check_beamformed(cfg, counters, &payload);
        if report_milestone(record_len as u64, &mut milestone_acc) {
            stats::report(session, ring);
        }
    }
}

/// Reads exactly `buf.len()` bytes, returning `Ok(false)` on a clean EOF
/// before any byte was read, and an error on a partial read followed by EOF.
fn read_exact_or_eof(r: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..])? {
            0 if filled == 0 => return Ok(false),
            0 => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated stdin record")),
            n => filled += n,
        }
    }
    Ok(true)
}

fn record_length(cfg: &Config, payload_len: usize) -> usize {
    let base = if cfg.packlen > 0 { cfg.packlen as usize } else { payload_len };
    if cfg.sizehead {
        base + 2
    } else {
        base
    }
}

/// Writes one record into a reserved ring slot: an optional 2-byte length
/// header, then the payload. `record_length` already guarantees the
/// destination is exactly sized for this payload, so no padding is needed.
fn write_record(cfg: &Config, dst: &mut [u8], payload: &[u8]) {
    let mut offset = 0;
    if cfg.sizehead {
        let body_len = (dst.len() - 2) as u16;
        dst[0..2].copy_from_slice(&body_len.to_le_bytes());
        offset = 2;
    }
    dst[offset..].copy_from_slice(payload);
}

/// Tracks the packno span from every decoded header whose timestamp is
/// usable, and separately counts the subset that are fully "good" — a
/// packet with a valid timestamp but a set error bit still belongs in the
/// observed packno range, or the first/last boundary of an interval can
/// silently shrink and throw off the `expected`/`missed` reconciliation.
fn check_beamformed(cfg: &Config, counters: &PortCounters, payload: &[u8]) {
    if cfg.beamformed_check && payload.len() >= LOFAR_HEADER_LEN {
        let header = LofarHeader::decode(payload);
        if header.timestamp != -1 {
            counters.observe_packno(header.packno());
        }
        if header.is_good() {
            counters.record_beamformed_good();
        }
    }
}

/// Accumulates `written` bytes and reports whether the cumulative total
/// just crossed a [`MILESTONE_BYTES`] boundary, for the caller to emit a
/// progress report through the same formatter as the periodic stats dump.
fn report_milestone(written: u64, acc: &mut u64) -> bool {
    *acc += written;
    if *acc >= MILESTONE_BYTES {
        *acc -= MILESTONE_BYTES;
        true
    } else {
        false
    }
}

fn enqueue(
    cfg: &Config,
    session: &Session,
    ring: &SharedRing,
    port_index: usize,
    port: u16,
    payload: &[u8],
    milestone_acc: &mut u64,
) {
    let counters = session.port(port_index);

    if cfg.packlen > 0 && payload.len() != cfg.packlen as usize {
        debug!(
            "port {port}: discarding {}-byte datagram, expected {}",
            payload.len(),
            cfg.packlen
        );
        return;
    }

    counters.record_seen();
    let len = record_length(cfg, payload.len());
    match ring.try_reserve(len) {
        Some(mut slot) => {
            write_record(cfg, slot.as_mut_slice(), payload);
            slot.commit();
            session.notify_data_available();
            counters.record_written(len as u64);
            check_beamformed(cfg, counters, payload);
            if report_milestone(len as u64, milestone_acc) {
                stats::report(session, ring);
            }
        }
        None => {
            counters.record_dropped();
            warn!("port {port}: dropped datagram, ring buffer full");
        }
    }
}
