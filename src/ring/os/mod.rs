//! Platform-specific double-mapping primitives.
//!
//! Only unix targets are implemented: the stations this tool captures from
//! are Linux hosts, and macOS is carried along for free since the Mach VM
//! path costs nothing extra to keep working.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use self::unix::*;
