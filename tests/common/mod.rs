//! Shared helpers for the end-to-end capture tests: picking a free loopback
//! UDP port and building a minimal [`Config`] without going through `clap`.

use std::net::UdpSocket;
use std::time::Duration;

use beamrec::cli::{Config, PortSpec};

/// Binds an ephemeral UDP socket just long enough to learn a free port,
/// then releases it. Good enough for this crate's own tests; a real
/// port-picker crate would retry on the rare reuse race, but loopback ports
/// in a short-lived test process aren't contended enough to need that.
pub fn free_udp_port() -> u16 {
    let socket = UdpSocket::bind(("127.0.0.1", 0)).expect("bind ephemeral port");
    socket.local_addr().expect("local_addr").port()
}

pub fn config_for_ports(ports: Vec<u16>, out: String) -> Config {
    Config {
        ports: PortSpec::Ports(ports),
        out,
        packlen: 0,
        sizehead: false,
        beamformed_check: false,
        timeout: Duration::from_millis(200),
        start: None,
        end: None,
        duration: None,
        maxfilesize: 0,
        bufsize: 10_000_000,
        maxwrite: 1_048_576,
        compress: false,
        compcommand: "zstd -q -f -o %s".to_string(),
        path_override: None,
        verbose: false,
    }
}

/// Lists files in `dir` whose name starts with `prefix`, sorted.
pub fn files_with_prefix(dir: &std::path::Path, prefix: &str) -> Vec<std::path::PathBuf> {
    let mut found: Vec<_> = std::fs::read_dir(dir)
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(prefix))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found
}
