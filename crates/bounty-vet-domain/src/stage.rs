//! Stage identities and per-stage outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Output marker for stages forced off by the caller.
pub const SKIPPED_BY_CONFIGURATION: &str = "skipped by configuration";

/// Free-form per-stage metrics (test counts, lint counts, severities, ...).
pub type Metrics = BTreeMap<String, serde_json::Value>;

/// The fixed vetting stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Clone,
    Detect,
    Install,
    Build,
    Lint,
    Test,
    Security,
    Bundle,
}

impl StageName {
    /// Every stage in execution order.
    pub const ALL: [StageName; 8] = [
        StageName::Clone,
        StageName::Detect,
        StageName::Install,
        StageName::Build,
        StageName::Lint,
        StageName::Test,
        StageName::Security,
        StageName::Bundle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageName::Clone => "clone",
            StageName::Detect => "detect",
            StageName::Install => "install",
            StageName::Build => "build",
            StageName::Lint => "lint",
            StageName::Test => "test",
            StageName::Security => "security",
            StageName::Bundle => "bundle",
        }
    }

    /// A failure here ends the run immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageName::Clone | StageName::Detect)
    }

    /// Stages backed by a detected shell command.
    pub fn is_command_stage(&self) -> bool {
        matches!(
            self,
            StageName::Install | StageName::Build | StageName::Lint | StageName::Test
        )
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        StageName::ALL
            .into_iter()
            .find(|stage| stage.name() == wanted)
            .ok_or_else(|| DomainError::InvalidStage(s.to_string()))
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Passed => write!(f, "passed"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of one stage. Exactly one per executed or skipped stage; never edited
/// after it is appended to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub stage: StageName,

    pub status: StageStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    pub duration_ms: u64,

    /// Captured stdout+stderr, tail-truncated.
    #[serde(default)]
    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub metrics: Metrics,
}

impl StageResult {
    /// Start building a result for a stage that began at `started_at`.
    pub fn begin(stage: StageName, started_at: DateTime<Utc>) -> StageResultBuilder {
        StageResultBuilder {
            stage,
            started_at,
            output: String::new(),
            error: None,
            metrics: Metrics::new(),
        }
    }

    /// A stage that ran no executor.
    pub fn skipped(stage: StageName, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            stage,
            status: StageStatus::Skipped,
            started_at: now,
            completed_at: now,
            duration_ms: 0,
            output: reason.into(),
            error: None,
            metrics: Metrics::new(),
        }
    }

    /// A failure recorded without running anything (deadline, lease mismatch).
    pub fn failed_now(stage: StageName, error: impl Into<String>) -> Self {
        StageResult::begin(stage, Utc::now()).failed(error)
    }

    pub fn passed(&self) -> bool {
        self.status == StageStatus::Passed
    }

    pub fn failed(&self) -> bool {
        self.status == StageStatus::Failed
    }

    pub fn skipped_stage(&self) -> bool {
        self.status == StageStatus::Skipped
    }

    pub fn metric_u64(&self, key: &str) -> u64 {
        self.metrics.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
    }

    pub fn metric_f64(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(|v| v.as_f64())
    }
}

/// Accumulates output and metrics while a stage runs, then seals the result.
#[derive(Debug, Clone)]
pub struct StageResultBuilder {
    stage: StageName,
    started_at: DateTime<Utc>,
    output: String,
    error: Option<String>,
    metrics: Metrics,
}

impl StageResultBuilder {
    pub fn output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn metric(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }

    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics.extend(metrics);
        self
    }

    pub fn passed(self) -> StageResult {
        self.finish(StageStatus::Passed)
    }

    pub fn failed(mut self, error: impl Into<String>) -> StageResult {
        self.error = Some(error.into());
        self.finish(StageStatus::Failed)
    }

    pub fn skipped(self) -> StageResult {
        self.finish(StageStatus::Skipped)
    }

    /// Passed when `ok`, otherwise failed with `error`.
    pub fn conclude(self, ok: bool, error: impl FnOnce() -> String) -> StageResult {
        if ok {
            self.passed()
        } else {
            self.failed(error())
        }
    }

    fn finish(self, status: StageStatus) -> StageResult {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        StageResult {
            stage: self.stage,
            status,
            started_at: self.started_at,
            completed_at,
            duration_ms,
            output: self.output,
            error: self.error,
            metrics: self.metrics,
        }
    }
}
