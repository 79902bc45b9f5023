//! External command execution.
//!
//! `uci`, `wifi` and the randomization engine are all driven through this
//! trait so adapters can be tested against a scripted runner.

use std::io;
use std::path::Path;
use std::process::Command;

use tracing::trace;

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit status as reported by the OS, e.g. `exit status: 1`
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            success: true,
            status: "exit status: 0".into(),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            success: false,
            status: format!("exit status: {}", code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

pub trait CommandRunner {
    /// Run `program` with `args` to completion.
    ///
    /// `Err` only when the program could not be launched; a nonzero exit is
    /// reported through [`CommandOutput::success`].
    fn run(&self, program: &Path, args: &[&str]) -> io::Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, program: &Path, args: &[&str]) -> io::Result<CommandOutput> {
        (**self).run(program, args)
    }
}

/// Runs commands with `std::process::Command`, blocking until exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[&str]) -> io::Result<CommandOutput> {
        trace!(program = %program.display(), ?args, "exec");
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
