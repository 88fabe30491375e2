//! Aggregate view over a run's stage results.
//!
//! The summary is always derived, never stored independently: callers recompute
//! it from the stage list whenever they need it.

use serde::{Deserialize, Serialize};

use crate::stage::{StageName, StageResult, StageStatus};

/// Metric keys written by stage executors and read back by the summary.
pub mod keys {
    pub const TESTS_PASSED: &str = "passed";
    pub const TESTS_FAILED: &str = "failed";
    pub const TESTS_SKIPPED: &str = "skipped";
    pub const COVERAGE: &str = "coverage";
    pub const LINT_ERRORS: &str = "errors";
    pub const LINT_WARNINGS: &str = "warnings";
    pub const CRITICAL: &str = "critical";
    pub const HIGH: &str = "high";
    pub const MEDIUM: &str = "medium";
    pub const LOW: &str = "low";
    pub const LINES_ADDED: &str = "linesAdded";
    pub const LINES_DELETED: &str = "linesDeleted";
    pub const FILES_CHANGED: &str = "filesChanged";
}

/// Vulnerability counts by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl SeverityCounts {
    pub fn total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low
    }

    /// Critical or high findings fail the security gate.
    pub fn is_blocking(&self) -> bool {
        self.critical > 0 || self.high > 0
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn from_stage(result: &StageResult) -> Self {
        Self {
            critical: result.metric_u64(keys::CRITICAL),
            high: result.metric_u64(keys::HIGH),
            medium: result.metric_u64(keys::MEDIUM),
            low: result.metric_u64(keys::LOW),
        }
    }
}

/// Line and file counts of the submission's diff against its base branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub files_changed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VettingSummary {
    pub total_stages: u64,
    pub passed_stages: u64,
    pub failed_stages: u64,
    pub skipped_stages: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub files_changed: u64,
    pub tests_passed: u64,
    pub tests_failed: u64,
    pub tests_skipped: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    pub lint_errors: u64,
    pub lint_warnings: u64,
    pub vulnerabilities: SeverityCounts,
}

impl VettingSummary {
    /// Derive the summary from the stage list.
    pub fn from_stages(stages: &[StageResult]) -> Self {
        let mut summary = VettingSummary::default();

        for stage in stages {
            summary.total_stages += 1;
            match stage.status {
                StageStatus::Passed => summary.passed_stages += 1,
                StageStatus::Failed => summary.failed_stages += 1,
                StageStatus::Skipped => summary.skipped_stages += 1,
            }

            match stage.stage {
                StageName::Test => {
                    summary.tests_passed += stage.metric_u64(keys::TESTS_PASSED);
                    summary.tests_failed += stage.metric_u64(keys::TESTS_FAILED);
                    summary.tests_skipped += stage.metric_u64(keys::TESTS_SKIPPED);
                    if let Some(coverage) = stage.metric_f64(keys::COVERAGE) {
                        summary.coverage = Some(coverage);
                    }
                }
                StageName::Lint => {
                    summary.lint_errors += stage.metric_u64(keys::LINT_ERRORS);
                    summary.lint_warnings += stage.metric_u64(keys::LINT_WARNINGS);
                }
                StageName::Security => {
                    let counts = SeverityCounts::from_stage(stage);
                    summary.vulnerabilities.critical += counts.critical;
                    summary.vulnerabilities.high += counts.high;
                    summary.vulnerabilities.medium += counts.medium;
                    summary.vulnerabilities.low += counts.low;
                }
                StageName::Bundle => {
                    summary.lines_added += stage.metric_u64(keys::LINES_ADDED);
                    summary.lines_deleted += stage.metric_u64(keys::LINES_DELETED);
                    summary.files_changed += stage.metric_u64(keys::FILES_CHANGED);
                }
                _ => {}
            }
        }

        summary
    }

    /// Replace the diff counters (used before the bundle stage has a result).
    pub fn with_diff(mut self, diff: DiffStats) -> Self {
        self.lines_added = diff.lines_added;
        self.lines_deleted = diff.lines_deleted;
        self.files_changed = diff.files_changed;
        self
    }
}
