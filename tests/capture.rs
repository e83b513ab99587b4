//! End-to-end capture scenarios driving the real producer/consumer pair
//! over loopback UDP sockets and a temporary output directory, matching the
//! documented testable scenarios.

mod common;

use std::fs;
use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use beamrec::ring::SharedRing;
use beamrec::session::Session;
use beamrec::{consumer, producer};
use common::{config_for_ports, files_with_prefix, free_udp_port};

const HOSTNAME: &str = "testhost";

fn run_capture(
    cfg: beamrec::cli::Config,
    ports: &[u16],
    portlist: &str,
    send: impl FnOnce(),
) -> (Arc<Session>, Arc<SharedRing>) {
    let session = Arc::new(Session::new(ports));
    let ring = Arc::new(SharedRing::create(cfg.bufsize as usize).unwrap());
    let cfg = Arc::new(cfg);

    let producer_handle = {
        let cfg = cfg.clone();
        let session = session.clone();
        let ring = ring.clone();
        thread::spawn(move || producer::run_sockets(&cfg, &session, &ring))
    };
    let consumer_handle = {
        let cfg = cfg.clone();
        let session = session.clone();
        let ring = ring.clone();
        let portlist = portlist.to_string();
        thread::spawn(move || consumer::run(&cfg, &session, &ring, &portlist, HOSTNAME))
    };

    send();

    // Give the producer's poll loop (timeout 200ms in the test config) a
    // chance to drain the last burst before asking everything to stop.
    thread::sleep(Duration::from_millis(300));
    session.set_stopped(beamrec::session::TERMINATE);

    producer_handle.join().unwrap().unwrap();
    consumer_handle.join().unwrap().unwrap();

    (session, ring)
}

/// Scenario 1: single UDP port, fixed-length records.
#[test]
fn single_port_fixed_length() {
    let dir = tempdir::TempDir::new("beamrec-test").unwrap();
    let port = free_udp_port();
    let out = dir.path().join("rec").to_str().unwrap().to_string();

    let mut cfg = config_for_ports(vec![port], out.clone());
    cfg.packlen = 7824;

    let payload = vec![0xABu8; 7824];
    let (session, _ring) = run_capture(cfg, &[port], &port.to_string(), || {
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        for _ in 0..1000 {
            sender.send_to(&payload, ("127.0.0.1", port)).unwrap();
        }
    });

    let snap = session.port(0).snapshot();
    assert_eq!(snap.packs_seen, 1000);
    assert_eq!(snap.packs_dropped, 0);
    assert_eq!(snap.bytes_written, 1000 * 7824);

    let files = files_with_prefix(dir.path(), &format!("rec_{port}.{HOSTNAME}."));
    assert_eq!(files.len(), 1);
    assert_eq!(fs::metadata(&files[0]).unwrap().len(), 7_824_000);
}

/// Scenario 2: deliberate overrun with an undersized ring and a consumer
/// that only starts draining once every datagram has already been sent.
#[test]
fn overrun_drops_but_keeps_order() {
    let dir = tempdir::TempDir::new("beamrec-test").unwrap();
    let port = free_udp_port();
    let out = dir.path().join("rec").to_str().unwrap().to_string();

    let mut cfg = config_for_ports(vec![port], out.clone());
    cfg.packlen = 7824;
    cfg.bufsize = 10_000; // room for roughly one datagram

    let session = Arc::new(Session::new(&[port]));
    let ring = Arc::new(SharedRing::create(cfg.bufsize as usize).unwrap());
    let cfg = Arc::new(cfg);

    let producer_handle = {
        let cfg = cfg.clone();
        let session = session.clone();
        let ring = ring.clone();
        thread::spawn(move || producer::run_sockets(&cfg, &session, &ring))
    };

    // Each payload starts with its send index as a 4-byte LE counter so the
    // written stream's order can be checked despite drops.
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    for i in 0..500u32 {
        let mut payload = vec![0u8; 7824];
        payload[0..4].copy_from_slice(&i.to_le_bytes());
        sender.send_to(&payload, ("127.0.0.1", port)).unwrap();
    }
    // Let the producer race ahead of any draining, guaranteeing drops.
    thread::sleep(Duration::from_millis(300));

    // Only now start the consumer.
    let consumer_handle = {
        let cfg = cfg.clone();
        let session = session.clone();
        let ring = ring.clone();
        thread::spawn(move || consumer::run(&cfg, &session, &ring, &port.to_string(), HOSTNAME))
    };

    thread::sleep(Duration::from_millis(300));
    session.set_stopped(beamrec::session::TERMINATE);
    producer_handle.join().unwrap().unwrap();
    consumer_handle.join().unwrap().unwrap();

    let snap = session.port(0).snapshot();
    assert_eq!(snap.packs_seen, 500);
    assert!(snap.packs_dropped > 0, "overrun scenario should drop at least one datagram");
    assert_eq!(snap.bytes_written, (500 - snap.packs_dropped) * 7824);

    let files = files_with_prefix(dir.path(), &format!("rec_{port}.{HOSTNAME}."));
    assert_eq!(files.len(), 1);
    let data = fs::read(&files[0]).unwrap();
    assert_eq!(data.len() as u64, snap.bytes_written);

    let mut last_index: Option<u32> = None;
    for chunk in data.chunks(7824) {
        let index = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
        if let Some(prev) = last_index {
            assert!(index > prev, "written stream must preserve arrival order");
        }
        last_index = Some(index);
    }
}

/// Scenario 4: `--Maxfilesize` splits into numbered files of the expected
/// sizes.
#[test]
fn split_files_by_maxfilesize() {
    let dir = tempdir::TempDir::new("beamrec-test").unwrap();
    let port = free_udp_port();
    let out = dir.path().join("rec").to_str().unwrap().to_string();

    let mut cfg = config_for_ports(vec![port], out.clone());
    cfg.packlen = 1000;
    cfg.maxfilesize = 100_000;

    let payload = vec![0x11u8; 1000];
    let (_session, _ring) = run_capture(cfg, &[port], &port.to_string(), || {
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        for _ in 0..350 {
            sender.send_to(&payload, ("127.0.0.1", port)).unwrap();
        }
    });

    let files = files_with_prefix(dir.path(), &format!("rec_{port}.{HOSTNAME}."));
    assert_eq!(files.len(), 4);
    let sizes: Vec<u64> = files.iter().map(|f| fs::metadata(f).unwrap().len()).collect();
    assert_eq!(sizes, vec![100_000, 100_000, 100_000, 50_000]);
    assert!(files[0].to_str().unwrap().ends_with("_0000"));
    assert!(files[3].to_str().unwrap().ends_with("_0003"));
}

/// Scenario 6: `--sizehead` preserves variable-length records with their
/// 2-byte little-endian length prefix.
#[test]
fn sizehead_round_trip() {
    let dir = tempdir::TempDir::new("beamrec-test").unwrap();
    let port = free_udp_port();
    let out = dir.path().join("rec").to_str().unwrap().to_string();

    let mut cfg = config_for_ports(vec![port], out.clone());
    cfg.sizehead = true;

    let sizes = [100usize, 7824, 4096];
    let payloads: Vec<Vec<u8>> = sizes
        .iter()
        .enumerate()
        .map(|(i, &len)| vec![(i + 1) as u8; len])
        .collect();

    let (_session, _ring) = run_capture(cfg, &[port], &port.to_string(), || {
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        for payload in &payloads {
            sender.send_to(payload, ("127.0.0.1", port)).unwrap();
            thread::sleep(Duration::from_millis(5));
        }
    });

    let files = files_with_prefix(dir.path(), &format!("rec_{port}.{HOSTNAME}."));
    assert_eq!(files.len(), 1);
    let data = fs::read(&files[0]).unwrap();

    let mut expected = Vec::new();
    for payload in &payloads {
        expected.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        expected.extend_from_slice(payload);
    }
    assert_eq!(data, expected);
}

/// Scenario 3: beamformed packet-number reconciliation counts a known
/// number of gaps correctly.
///
/// The very first packet (index 0, the left edge of the observed packno
/// span) carries a set error bit but an otherwise valid timestamp: it must
/// still move `beamformed_first_packno`, even though it isn't "good" and so
/// doesn't count toward `beamformed_good`. If packno tracking were gated on
/// `is_good()` instead, this boundary packet would be invisible to the span
/// and `beamformed_first_packno` would start one packet later than it
/// should.
#[test]
fn beamformed_reconciliation_counts_gaps() {
    let dir = tempdir::TempDir::new("beamrec-test").unwrap();
    let port = free_udp_port();
    let out = dir.path().join("rec").to_str().unwrap().to_string();

    let mut cfg = config_for_ports(vec![port], out.clone());
    cfg.packlen = 7824;
    cfg.beamformed_check = true;

    // timestamp=0 makes packno == sequence/16 (see LofarHeader::packno), so
    // sequence = i*16 gives packno == i for a clean, known index space.
    let skip: [u32; 7] = [10, 20, 30, 40, 50, 60, 70];
    let (session, _ring) = run_capture(cfg, &[port], &port.to_string(), || {
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        for i in 0u32..100 {
            if skip.contains(&i) {
                continue;
            }
            let mut payload = vec![0u8; 7824];
            payload[0] = 1; // version
            // source word: rsp_id=3, is200mhz=0, bm=0; error bit set only
            // for the boundary packet at i=0.
            let mut source: u16 = 3;
            if i == 0 {
                source |= 1 << 6; // error
            }
            payload[1..3].copy_from_slice(&source.to_le_bytes());
            payload[4..6].copy_from_slice(&1u16.to_le_bytes()); // station
            payload[6] = 244; // num_beamlets
            payload[7] = 16; // num_slices
            payload[8..12].copy_from_slice(&0i32.to_le_bytes()); // timestamp
            payload[12..16].copy_from_slice(&((i * 16) as i32).to_le_bytes()); // sequence
            sender.send_to(&payload, ("127.0.0.1", port)).unwrap();
        }
    });

    let snap = session.port(0).snapshot();
    assert_eq!(snap.packs_seen, 93);
    // Packet 0 has a set error bit, so it's excluded from beamformed_good
    // even though its packno is still tracked.
    assert_eq!(snap.beamformed_good, 92);
    assert_eq!(snap.beamformed_first_packno, 0);
    assert_eq!(snap.beamformed_last_packno, 99);

    let expected = snap.beamformed_last_packno - snap.beamformed_first_packno + 1;
    let missed = expected - snap.packs_seen as i64;
    assert_eq!(expected, 100);
    assert_eq!(missed, 7);
}
