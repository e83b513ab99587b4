//! Scenario 5: stdin-mode capture ends cleanly on EOF. Driven through the
//! real binary since stdin framing can only be exercised against the
//! process's actual standard input.

mod common;

use std::io::Write;
use std::process::{Command, Stdio};

use common::files_with_prefix;

#[test]
fn stdin_eof_writes_all_records_and_exits_cleanly() {
    let dir = tempdir::TempDir::new("beamrec-test").unwrap();
    let out = dir.path().join("rec");

    let mut child = Command::new(env!("CARGO_BIN_EXE_beamrec"))
        .args(["--ports", "0", "--out", out.to_str().unwrap(), "--len", "512"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn beamrec");

    {
        let stdin = child.stdin.as_mut().expect("piped stdin");
        for value in 0u8..3 {
            stdin.write_all(&[value; 512]).unwrap();
        }
    }
    // Dropping the piped stdin handle closes the write end, delivering EOF.
    drop(child.stdin.take());

    let status = child.wait().expect("wait on beamrec");
    assert!(status.success(), "stdin EOF should exit cleanly: {status:?}");

    let files = files_with_prefix(dir.path(), "rec_stdin.");
    assert_eq!(files.len(), 1);
    let data = std::fs::read(&files[0]).unwrap();
    assert_eq!(data.len(), 3 * 512);
    for (i, chunk) in data.chunks(512).enumerate() {
        assert!(chunk.iter().all(|&b| b == i as u8));
    }
}
