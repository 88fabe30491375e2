//! Scripted command runner for tests and dry runs.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::RunnerError;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec, EXIT_COMMAND_NOT_FOUND};

/// What a scripted command does when invoked.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Output(CommandOutput),
    TimedOut,
    SpawnFailure,
}

impl ScriptedResponse {
    pub fn ok(stdout: &str) -> Self {
        Self::exit(0, stdout)
    }

    pub fn exit(code: i32, stdout: &str) -> Self {
        ScriptedResponse::Output(CommandOutput {
            exit_code: code,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration_ms: 1,
        })
    }

    pub fn not_found() -> Self {
        ScriptedResponse::Output(CommandOutput {
            exit_code: EXIT_COMMAND_NOT_FOUND,
            stdout: String::new(),
            stderr: "sh: 1: command not found".to_string(),
            duration_ms: 1,
        })
    }
}

/// Answers commands from a prefix table; unmatched commands succeed silently.
///
/// Rules are matched against [`CommandSpec::display`] in insertion order.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, ScriptedResponse)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, prefix: impl Into<String>, response: ScriptedResponse) -> Self {
        self.rules.push((prefix.into(), response));
        self
    }

    /// Every command seen so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(spec.clone());

        let line = spec.display();
        let response = self
            .rules
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| ScriptedResponse::ok(""));

        match response {
            ScriptedResponse::Output(output) => Ok(output),
            ScriptedResponse::TimedOut => Err(RunnerError::TimedOut {
                program: line,
                timeout: spec.timeout.unwrap_or(Duration::ZERO),
            }),
            ScriptedResponse::SpawnFailure => Err(RunnerError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
        }
    }
}
