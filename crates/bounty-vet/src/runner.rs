//! External command execution.
//!
//! Every subprocess the pipeline starts (git, package managers, test runners,
//! auditors) goes through the [`CommandRunner`] trait so the orchestrator can be
//! driven by a scripted runner in tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::RunnerError;

/// Shell exit code for "command not found".
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

const TRUNCATION_MARKER: &str = "...[truncated]\n";

/// A command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,

    pub args: Vec<String>,

    pub cwd: Option<PathBuf>,

    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,

    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
            env: Vec::new(),
        }
    }

    /// Run a command line through `sh -c`.
    pub fn shell(command_line: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(command_line)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Human-readable command line (the shell payload for `sh -c`).
    pub fn display(&self) -> String {
        if self.program == "sh" && self.args.len() == 2 && self.args[0] == "-c" {
            return self.args[1].clone();
        }
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn command_not_found(&self) -> bool {
        self.exit_code == EXIT_COMMAND_NOT_FOUND
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Backend that executes commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        let start = Instant::now();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        // Own process group so a timeout reaches the whole tree, not just `sh`.
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(command = %spec.display(), "Spawning command");

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id();
        let stdout = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr = tokio::spawn(read_pipe(child.stderr.take()));

        let status = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    kill_tree(pid, &mut child).await;
                    stdout.abort();
                    stderr.abort();
                    return Err(RunnerError::TimedOut {
                        program: spec.display(),
                        timeout: limit,
                    });
                }
            },
            None => child.wait().await,
        };
        // Stragglers left behind by the leader must not outlive the command.
        kill_group(pid);
        let status = status?;

        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&join_pipe(stdout).await?).to_string(),
            stderr: String::from_utf8_lossy(&join_pipe(stderr).await?).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn join_pipe(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>, RunnerError> {
    handle
        .await
        .map_err(|e| RunnerError::Io(std::io::Error::other(e)))?
        .map_err(RunnerError::Io)
}

/// SIGKILL the process group led by `pid`. A group that already exited is fine.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "Failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// Kill the command's whole process tree and reap the leader.
async fn kill_tree(pid: Option<u32>, child: &mut Child) {
    kill_group(pid);
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Child already exited");
    }
}

/// Keep the last `max_chars` characters of `text`.
pub fn tail(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((0, _)) | None => text.to_string(),
        Some((idx, _)) => format!("{TRUNCATION_MARKER}{}", &text[idx..]),
    }
}
