//! Output filename construction.
//!
//! Format (spec's external interface, not generic templating):
//! `<base>_<portlist>.<hostname>.<utc-timestamp>` plus an `_NNNN` suffix when
//! numbered and a `.zst` suffix when compressing. `/dev/null` is always
//! passed through verbatim. Timestamps are `YYYY-MM-DDTHH:MM:SS.mmm` UTC.

use chrono::{DateTime, Utc};

const DEV_NULL: &str = "/dev/null";

/// The local hostname, or `"unknown-host"` if it can't be queried.
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "unknown-host".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Builds the base (unnumbered, uncompressed) output path for one file.
pub fn base_path(out: &str, portlist: &str, hostname: &str, when: DateTime<Utc>) -> String {
    if out == DEV_NULL {
        return out.to_string();
    }
    format!("{out}_{portlist}.{hostname}.{}", when.format("%Y-%m-%dT%H:%M:%S%.3f"))
}

/// Appends the `_NNNN` numbering suffix, if `sequence` is `Some`.
pub fn with_sequence(path: &str, sequence: Option<u64>) -> String {
    if path == DEV_NULL {
        return path.to_string();
    }
    match sequence {
        Some(n) => format!("{path}_{n:04}"),
        None => path.to_string(),
    }
}

/// Appends the `.zst` compressed-output suffix.
pub fn with_compression_suffix(path: &str, compress: bool) -> String {
    if path == DEV_NULL || !compress {
        return path.to_string();
    }
    format!("{path}.zst")
}

/// Builds the final output path: base, numbering, then compression suffix.
pub fn build(
    out: &str,
    portlist: &str,
    hostname: &str,
    when: DateTime<Utc>,
    sequence: Option<u64>,
    compress: bool,
) -> String {
    if out == DEV_NULL {
        return out.to_string();
    }
    let path = base_path(out, portlist, hostname, when);
    let path = with_sequence(&path, sequence);
    with_compression_suffix(&path, compress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 31, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(250)
    }

    #[test]
    fn base_path_matches_documented_format() {
        let out = base_path("/data/rec", "16011", "lcu001", fixed_time());
        assert_eq!(out, "/data/rec_16011.lcu001.2026-07-31T12:00:00.250");
    }

    #[test]
    fn numbering_and_compression_compose() {
        let out = build("/data/rec", "16011", "lcu001", fixed_time(), Some(3), true);
        assert_eq!(out, "/data/rec_16011.lcu001.2026-07-31T12:00:00.250_0003.zst");
    }

    #[test]
    fn unnumbered_has_no_suffix() {
        let out = build("/data/rec", "16011", "lcu001", fixed_time(), None, false);
        assert_eq!(out, "/data/rec_16011.lcu001.2026-07-31T12:00:00.250");
    }

    #[test]
    fn dev_null_bypasses_everything() {
        assert_eq!(base_path(DEV_NULL, "16011", "lcu001", fixed_time()), DEV_NULL);
        assert_eq!(build(DEV_NULL, "16011", "lcu001", fixed_time(), Some(1), true), DEV_NULL);
    }
}
