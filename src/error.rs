//! Crate-wide error type for the `beamrec` application layer.
//!
//! Distinct from [`ring::Error`](crate::ring::Error): that one covers the
//! low-level double-mapping mechanism, this one covers everything built on
//! top of it (config validation, socket/file I/O, the compressor child).

use thiserror::Error as ThisError;

/// A specialized `Result` for the application layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error raised by configuration, capture, or teardown.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid configuration discovered before capture starts: a bad CLI
    /// argument, an unparsable filename template, an unopenable output
    /// path. Never raised once the producer/consumer threads are running.
    #[error("{0}")]
    Setup(String),

    /// An I/O failure during capture: a socket error, a write to the
    /// output file, a failure tearing down the ring mapping.
    #[error("runtime error: {0}")]
    Runtime(#[source] std::io::Error),

    /// The compressor child process exited with a non-zero status.
    #[error("compressor exited with status {status}")]
    Compressor { status: i32 },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Runtime(err)
    }
}

impl From<crate::ring::Error> for Error {
    fn from(err: crate::ring::Error) -> Self {
        Error::Setup(err.to_string())
    }
}
