//! Per-stage timeouts and pipeline selection options.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use bounty_vet_domain::{StageName, SKIPPED_BY_CONFIGURATION};

/// Default number of trailing characters kept from a stage's output.
pub const DEFAULT_OUTPUT_TAIL_CHARS: usize = 2_000;

/// Timeout in seconds for every stage that runs external commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub clone_secs: u64,
    pub install_secs: u64,
    pub build_secs: u64,
    pub lint_secs: u64,
    pub test_secs: u64,
    pub security_secs: u64,
    pub bundle_secs: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            clone_secs: 300,
            install_secs: 600,
            build_secs: 600,
            lint_secs: 300,
            test_secs: 600,
            security_secs: 300,
            bundle_secs: 120,
        }
    }
}

impl StageTimeouts {
    /// Timeout for a stage's commands. Detection is in-process and has none.
    pub fn for_stage(&self, stage: StageName) -> Option<Duration> {
        let secs = match stage {
            StageName::Clone => self.clone_secs,
            StageName::Detect => return None,
            StageName::Install => self.install_secs,
            StageName::Build => self.build_secs,
            StageName::Lint => self.lint_secs,
            StageName::Test => self.test_secs,
            StageName::Security => self.security_secs,
            StageName::Bundle => self.bundle_secs,
        };
        Some(Duration::from_secs(secs))
    }

    /// Override one stage's timeout. Ignored for detection.
    pub fn set(&mut self, stage: StageName, secs: u64) {
        let slot = match stage {
            StageName::Clone => &mut self.clone_secs,
            StageName::Detect => return,
            StageName::Install => &mut self.install_secs,
            StageName::Build => &mut self.build_secs,
            StageName::Lint => &mut self.lint_secs,
            StageName::Test => &mut self.test_secs,
            StageName::Security => &mut self.security_secs,
            StageName::Bundle => &mut self.bundle_secs,
        };
        *slot = secs;
    }
}

/// Whether the orchestrator runs a stage or records it as skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageDecision {
    Run,
    Skip(String),
}

/// Caller-controlled knobs for one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Explicit stage list. `None` uses the list derived from detection.
    pub stages: Option<Vec<StageName>>,

    /// Stages to skip regardless of selection.
    pub skip: BTreeSet<StageName>,

    pub timeouts: StageTimeouts,

    pub output_tail_chars: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            stages: None,
            skip: BTreeSet::new(),
            timeouts: StageTimeouts::default(),
            output_tail_chars: DEFAULT_OUTPUT_TAIL_CHARS,
        }
    }
}

impl PipelineOptions {
    pub fn with_stages(mut self, stages: Vec<StageName>) -> Self {
        self.stages = Some(stages);
        self
    }

    pub fn with_skip(mut self, skip: impl IntoIterator<Item = StageName>) -> Self {
        self.skip = skip.into_iter().collect();
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_output_tail_chars(mut self, chars: usize) -> Self {
        self.output_tail_chars = chars;
        self
    }

    /// Fatal stages requested for skipping; they run anyway.
    pub fn ignored_skips(&self) -> Vec<StageName> {
        self.skip.iter().copied().filter(StageName::is_fatal).collect()
    }

    /// Decide a post-detection stage given the detection-derived default list.
    pub fn decide(&self, stage: StageName, defaults: &[StageName]) -> StageDecision {
        if stage.is_fatal() {
            return StageDecision::Run;
        }
        if self.skip.contains(&stage) {
            return StageDecision::Skip(SKIPPED_BY_CONFIGURATION.to_string());
        }
        match &self.stages {
            Some(selected) if !selected.contains(&stage) => {
                StageDecision::Skip("not selected".to_string())
            }
            Some(_) => StageDecision::Run,
            None if defaults.contains(&stage) => StageDecision::Run,
            None => StageDecision::Skip(format!("no {stage} command detected")),
        }
    }
}
