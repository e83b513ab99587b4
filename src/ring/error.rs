//! Error type for the low-level double-mapping operations.
//!
//! Mirrors the `vmap` crate's `Error`/`Operation` split this module is
//! adapted from, trimmed to the operations a ring allocation can actually
//! fail at (no file-backed mapping is used by this crate).

use std::io;
use std::{error, fmt};

/// A specialized `Result` for ring map operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error raised while creating, using, or tearing down a [`VirtualRing`](super::VirtualRing).
#[derive(Debug)]
pub struct Error {
    repr: Repr,
    op: Operation,
}

#[derive(Debug)]
enum Repr {
    Io(io::Error),
    Input(&'static str),
}

impl Error {
    pub(crate) fn io(op: Operation, err: io::Error) -> Self {
        Self { repr: Repr::Io(err), op }
    }

    pub(crate) fn input(op: Operation, msg: &'static str) -> Self {
        Self { repr: Repr::Input(msg), op }
    }

    pub(crate) fn last_os_error(op: Operation) -> Self {
        Self::io(op, io::Error::last_os_error())
    }

    /// The operation that failed.
    pub fn operation(&self) -> Operation {
        self.op
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            Repr::Io(err) => Some(err),
            Repr::Input(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Io(err) => write!(fmt, "failed to {}: {}", self.op, err),
            Repr::Input(msg) => write!(fmt, "failed to {}: {}", self.op, msg),
        }
    }
}

/// Which step of a ring allocation failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Operation {
    /// A temporary memory file descriptor failed to open.
    MemoryFd,
    /// The full address space for a ring could not be allocated.
    RingAllocate,
    /// The full address space for a ring could not be deallocated.
    RingDeallocate,
}

impl fmt::Display for Operation {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::MemoryFd => "open memory fd",
            Operation::RingAllocate => "allocate ring mapping",
            Operation::RingDeallocate => "deallocate ring mapping",
        };
        fmt.write_str(s)
    }
}
