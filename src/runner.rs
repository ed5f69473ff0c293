//! External command execution boundary.
//!
//! Every native tool the pipeline needs (compiler, archiver, linker, section
//! dumper, section extractor) is driven through the [`CommandRunner`] trait:
//! one capability, run a command and capture its output and exit status.
//! Keeping the seam this narrow lets tests substitute canned tool output for
//! the real cross toolchain.

use crate::{
    Result,
    error::{parse_error, tool_error},
};
use std::process::Command;

/// Captured output of one external tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    /// Process exit status; `-1` if the process was killed by a signal.
    pub status: i32,
    /// Raw standard output.
    pub stdout: Vec<u8>,
    /// Raw standard error.
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// Whether the invocation exited with status zero.
    #[inline]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Standard output decoded as UTF-8 text.
    pub fn stdout_text(&self) -> Result<String> {
        String::from_utf8(self.stdout.clone())
            .map_err(|_| parse_error("tool produced non-UTF-8 output"))
    }

    /// A short, single-line excerpt of standard error for error messages.
    pub fn stderr_excerpt(&self) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        text.lines().next().unwrap_or("").trim().to_string()
    }
}

/// Runs a native command and captures its output.
pub trait CommandRunner {
    /// Executes `program` with `args`, blocking until it exits.
    ///
    /// Returns an error only when the process could not be started; a
    /// nonzero exit status is reported through [`ToolOutput::status`] so the
    /// caller can attach stage context to the failure.
    fn run(&mut self, program: &str, args: &[String]) -> Result<ToolOutput>;
}

/// The default [`CommandRunner`] backed by [`std::process::Command`].
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, program: &str, args: &[String]) -> Result<ToolOutput> {
        log::debug!("run: {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| tool_error(format!("failed to start `{program}`: {err}")))?;
        Ok(ToolOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
