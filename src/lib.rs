//! Captures beamformed UDP datagram streams to disk through a bounded,
//! double-mapped ring buffer so a slow disk never blocks the network
//! receive path.
//!
//! The binary (`src/main.rs`) wires these modules together; this library
//! exists so the ring buffer, LOFAR header decode, and session state
//! machine can be unit- and integration-tested independently of socket I/O.

pub mod cli;
pub mod compress;
pub mod consumer;
pub mod error;
pub mod filename;
pub mod lofar;
pub mod producer;
pub mod ring;
pub mod session;
pub mod signals;
pub mod stats;

pub use error::{Error, Result};
