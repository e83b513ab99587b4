//! Command-line parsing and the validated [`Config`] built from it.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use clap::Parser;

use crate::error::{Error, Result};

const LOFAR_HEADER_LEN: u32 = 7824;
const DEFAULT_COMPCOMMAND: &str = "zstd -q -f -o %s";
const MIN_BUFSIZE: u64 = 10_000;
const MAX_BUFSIZE: u64 = 16_000_000_000;
const MIN_MAXWRITE: usize = 1024;

/// Raw CLI arguments, one field per option.
#[derive(Parser, Debug)]
#[command(name = "beamrec", about = "Captures beamformed UDP datagram streams to disk")]
pub struct Args {
    /// Comma-separated UDP ports, a `start x count` range, or `0` for stdin.
    #[arg(short = 'p', long = "ports")]
    pub ports: String,

    /// Output filename template.
    #[arg(short = 'o', long = "out")]
    pub out: String,

    /// Fixed record length in bytes, or 0 for datagram-sized records.
    #[arg(short = 'l', long = "len", default_value_t = 0)]
    pub len: u32,

    /// Prefix each record with its 2-byte little-endian length.
    #[arg(short = 's', long = "sizehead")]
    pub sizehead: bool,

    /// Reconcile LOFAR packet numbers; forces `--len 7824`.
    #[arg(short = 'c', long = "check")]
    pub check: bool,

    /// Idle-socket timeout in seconds.
    #[arg(short = 't', long = "timeout", default_value_t = 10)]
    pub timeout: u64,

    /// Capture start time (unix seconds or ISO-8601); waits until then.
    #[arg(short = 'S', long = "Start")]
    pub start: Option<String>,

    /// Capture end time (unix seconds or ISO-8601).
    #[arg(short = 'E', long = "End", conflicts_with = "duration")]
    pub end: Option<String>,

    /// Capture duration in seconds from start.
    #[arg(short = 'd', long = "duration", conflicts_with = "end")]
    pub duration: Option<i64>,

    /// Split threshold in bytes; negative keeps cumulative stats across splits.
    #[arg(short = 'M', long = "Maxfilesize", default_value_t = 0)]
    pub maxfilesize: i64,

    /// Ring buffer capacity in bytes.
    #[arg(short = 'b', long = "bufsize", default_value_t = 10_000_000)]
    pub bufsize: u64,

    /// Maximum bytes drained to disk per consumer iteration.
    #[arg(short = 'm', long = "maxwrite", default_value_t = 1_048_576)]
    pub maxwrite: usize,

    /// Pipe output through a compressor subprocess.
    #[arg(short = 'z', long = "compress")]
    pub compress: bool,

    /// Compressor command template; `%s` is replaced with the output path.
    #[arg(short = 'Z', long = "compcommand")]
    pub compcommand: Option<String>,

    /// PATH override for the compressor subprocess.
    #[arg(short = 'P', long = "path")]
    pub path_override: Option<String>,

    /// Raise the log level from info to debug.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// What to listen on: concrete UDP ports, or stdin.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PortSpec {
    Stdin,
    Ports(Vec<u16>),
}

/// Validated, immutable configuration built from [`Args`].
#[derive(Debug)]
pub struct Config {
    pub ports: PortSpec,
    pub out: String,
    pub packlen: u32,
    pub sizehead: bool,
    pub beamformed_check: bool,
    pub timeout: Duration,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
    pub maxfilesize: i64,
    pub bufsize: u64,
    pub maxwrite: usize,
    pub compress: bool,
    pub compcommand: String,
    pub path_override: Option<String>,
    pub verbose: bool,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self> {
        let ports = parse_ports(&args.ports)?;

        if !(MIN_BUFSIZE..=MAX_BUFSIZE).contains(&args.bufsize) {
            return Err(Error::Setup(format!(
                "--bufsize must be between {MIN_BUFSIZE} and {MAX_BUFSIZE} bytes"
            )));
        }
        if args.maxwrite < MIN_MAXWRITE {
            return Err(Error::Setup(format!("--maxwrite must be at least {MIN_MAXWRITE} bytes")));
        }

        let packlen = if args.check {
            if args.len != 0 && args.len != LOFAR_HEADER_LEN {
                return Err(Error::Setup(format!(
                    "--check forces --len {LOFAR_HEADER_LEN}, but --len {} was also given",
                    args.len
                )));
            }
            LOFAR_HEADER_LEN
        } else {
            args.len
        };

        let compcommand = match args.compcommand {
            Some(cmd) => cmd,
            None => DEFAULT_COMPCOMMAND.to_string(),
        };
        if args.compress && !compcommand.contains("%s") {
            return Err(Error::Setup("--compcommand must contain a %s placeholder".into()));
        }

        if matches!(ports, PortSpec::Stdin) && packlen == 0 && !args.sizehead {
            return Err(Error::Setup(
                "stdin mode requires --len or --sizehead to frame records".into(),
            ));
        }

        let start = args.start.as_deref().map(parse_time).transpose()?;
        let end = args.end.as_deref().map(parse_time).transpose()?;

        Ok(Self {
            ports,
            out: args.out,
            packlen,
            sizehead: args.sizehead,
            beamformed_check: args.check,
            timeout: Duration::from_secs(args.timeout),
            start,
            end,
            duration: args.duration,
            maxfilesize: args.maxfilesize,
            bufsize: args.bufsize,
            maxwrite: args.maxwrite,
            compress: args.compress,
            compcommand,
            path_override: args.path_override,
            verbose: args.verbose,
        })
    }
}

fn parse_ports(spec: &str) -> Result<PortSpec> {
    let trimmed = spec.trim();
    if trimmed == "0" {
        return Ok(PortSpec::Stdin);
    }
    if let Some((start, count)) = trimmed.split_once(['x', 'X']) {
        let start: u16 = start
            .trim()
            .parse()
            .map_err(|_| Error::Setup(format!("invalid port start in '{spec}'")))?;
        let count: u16 = count
            .trim()
            .parse()
            .map_err(|_| Error::Setup(format!("invalid port count in '{spec}'")))?;
        if count == 0 {
            return Err(Error::Setup("port count must be non-zero".into()));
        }
        return Ok(PortSpec::Ports((0..count).map(|i| start + i).collect()));
    }
    let mut ports = Vec::new();
    for part in trimmed.split(',') {
        let port: u16 = part
            .trim()
            .parse()
            .map_err(|_| Error::Setup(format!("invalid port '{part}' in '{spec}'")))?;
        ports.push(port);
    }
    if ports.is_empty() {
        return Err(Error::Setup("--ports must name at least one port".into()));
    }
    Ok(PortSpec::Ports(ports))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(secs) = s.parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| Error::Setup(format!("invalid unix timestamp '{s}'")));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| Error::Setup(format!("unrecognized time '{s}': expected unix seconds or ISO-8601")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_csv() {
        assert_eq!(parse_ports("16011,16012").unwrap(), PortSpec::Ports(vec![16011, 16012]));
    }

    #[test]
    fn ports_range_shorthand() {
        assert_eq!(
            parse_ports("16011x4").unwrap(),
            PortSpec::Ports(vec![16011, 16012, 16013, 16014])
        );
    }

    #[test]
    fn ports_zero_is_stdin() {
        assert_eq!(parse_ports("0").unwrap(), PortSpec::Stdin);
    }

    #[test]
    fn check_forces_packlen() {
        let args = Args {
            ports: "0".into(),
            out: "/dev/null".into(),
            len: 0,
            sizehead: false,
            check: true,
            timeout: 10,
            start: None,
            end: None,
            duration: None,
            maxfilesize: 0,
            bufsize: 10_000_000,
            maxwrite: 1_048_576,
            compress: false,
            compcommand: None,
            path_override: None,
            verbose: false,
        };
        let cfg = Config::from_args(args).unwrap();
        assert_eq!(cfg.packlen, LOFAR_HEADER_LEN);
    }

    #[test]
    fn check_rejects_conflicting_len() {
        let args = Args {
            ports: "0".into(),
            out: "/dev/null".into(),
            len: 100,
            sizehead: false,
            check: true,
            timeout: 10,
            start: None,
            end: None,
            duration: None,
            maxfilesize: 0,
            bufsize: 10_000_000,
            maxwrite: 1_048_576,
            compress: false,
            compcommand: None,
            path_override: None,
            verbose: false,
        };
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn parses_unix_seconds_and_rfc3339() {
        let a = parse_time("1700000000").unwrap();
        let b = parse_time("2023-11-14T22:13:20Z").unwrap();
        assert_eq!(a, b);
    }
}
