//! Stage executors.
//!
//! Each executor turns (config, detection, prior results) into exactly one
//! [`StageResult`]. Executors never return errors: a command that cannot be
//! spawned, times out or exits non-zero becomes a `failed` result, and a stage
//! with nothing to run becomes `skipped`.

pub mod bundle;
pub mod clone;
pub mod command;
pub mod detect;
pub mod security;

use std::time::Duration;

use bounty_vet_domain::VettingConfig;

use crate::error::RunnerError;
use crate::runner::{tail, CommandOutput, CommandRunner, CommandSpec};

/// Everything an executor needs besides detection and prior results.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub config: &'a VettingConfig,
    /// Effective timeout: the stage default clipped to the remaining run deadline.
    pub timeout: Option<Duration>,
    pub output_tail_chars: usize,
}

impl<'a> StageContext<'a> {
    /// Run a shell command line inside the work directory.
    pub async fn run_shell(&self, command_line: &str) -> Result<CommandOutput, RunnerError> {
        self.run(CommandSpec::shell(command_line)).await
    }

    /// Run `spec` inside the work directory under the stage timeout.
    pub async fn run(&self, spec: CommandSpec) -> Result<CommandOutput, RunnerError> {
        let mut spec = spec.cwd(self.config.work_dir());
        if let Some(timeout) = self.timeout {
            spec = spec.timeout(timeout);
        }
        self.runner.run(&spec).await
    }

    pub fn tail(&self, text: &str) -> String {
        tail(text, self.output_tail_chars)
    }
}

/// Failure message for a command that exited non-zero.
pub(crate) fn exit_failure(command: &str, output: &CommandOutput) -> String {
    if output.command_not_found() {
        format!("command not found: {command}")
    } else {
        format!("{command} exited with code {}", output.exit_code)
    }
}
