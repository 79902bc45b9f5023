//! Invokes the external randomization engine as a subprocess.

use std::path::{Path, PathBuf};

use bluecode_core::{RandomizeError, RandomizeRequest, Randomizer};
use tracing::info;

use crate::runner::{CommandRunner, SystemRunner};

pub struct CommandRandomizer<R = SystemRunner> {
    program: PathBuf,
    runner: R,
}

impl CommandRandomizer<SystemRunner> {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self::with_runner(program, SystemRunner)
    }
}

impl<R: CommandRunner> CommandRandomizer<R> {
    pub fn with_runner(program: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl<R: CommandRunner> Randomizer for CommandRandomizer<R> {
    fn randomize(&self, request: &RandomizeRequest) -> Result<(), RandomizeError> {
        let args = request.to_args();
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        info!(program = %self.program.display(), targets = %request.target_list(), "running randomization engine");

        let out = self.runner.run(&self.program, &argv).map_err(|e| RandomizeError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;
        if !out.success {
            return Err(RandomizeError::Failed {
                program: self.program.clone(),
                status: out.status,
                stderr: out.stderr,
            });
        }
        Ok(())
    }
}
