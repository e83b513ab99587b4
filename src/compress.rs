//! Compressor subprocess wrapper: pipes file output through an external
//! command (default `zstd`) rather than linking a compression library, so
//! the compressor, its flags, and its version stay an operator choice.

use std::io::{self, Write};
use std::process::{Child, Command, Stdio};

use crate::error::{Error, Result};

/// A spawned compressor child whose stdin is the byte sink for one output
/// file. Implements [`Write`] so the consumer can use it exactly like a
/// plain `File`.
pub struct Compressor {
    child: Child,
}

impl Compressor {
    /// Spawns `command_template` with every `%s` replaced by `output_path`,
    /// run through `sh -c` so the template can itself be a pipeline. If
    /// `path_override` is set, it replaces `PATH` for the child only.
    pub fn spawn(command_template: &str, output_path: &str, path_override: Option<&str>) -> Result<Self> {
        let command_line = command_template.replace("%s", output_path);
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&command_line);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::null());
        if let Some(path) = path_override {
            cmd.env("PATH", path);
        }
        let child = cmd.spawn()?;
        Ok(Self { child })
    }

    /// Closes the child's stdin and waits for it to exit, reporting a
    /// non-zero exit status as [`Error::Compressor`].
    pub fn finish(mut self) -> Result<()> {
        drop(self.child.stdin.take());
        let status = self.child.wait()?;
        if !status.success() {
            return Err(Error::Compressor { status: status.code().unwrap_or(-1) });
        }
        Ok(())
    }
}

impl Write for Compressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.child
            .stdin
            .as_mut()
            .expect("compressor stdin was piped at spawn")
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.child
            .stdin
            .as_mut()
            .expect("compressor stdin was piped at spawn")
            .flush()
    }
}
