//! Lint output counting.
//!
//! A keyword count, not a structured parse: every case-insensitive occurrence
//! of `error` / `warning` in the combined output is counted, including ones in
//! file names or summary lines. Linters disagree on output formats, so the
//! numbers are approximate.

use regex::Regex;
use std::sync::LazyLock;

use bounty_vet_domain::{keys, Metrics};

static ERROR_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("error keyword pattern"));
static WARNING_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)warning").expect("warning keyword pattern"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LintCounts {
    pub errors: u64,
    pub warnings: u64,
}

impl LintCounts {
    pub fn to_metrics(&self) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert(keys::LINT_ERRORS.to_string(), self.errors.into());
        metrics.insert(keys::LINT_WARNINGS.to_string(), self.warnings.into());
        metrics
    }
}

pub fn parse_lint_output(output: &str) -> LintCounts {
    LintCounts {
        errors: ERROR_WORD.find_iter(output).count() as u64,
        warnings: WARNING_WORD.find_iter(output).count() as u64,
    }
}
