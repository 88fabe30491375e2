//! Root aggregate of a vetting run and its lifecycle.
//!
//! A run starts as [`RunningVetting`], accumulates stage results in order and is
//! turned into a [`VettingResult`] by [`finalize`]. `finalize` consumes the
//! running run, so a result can only be frozen once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::VettingConfig;
use crate::proof::ProofBundle;
use crate::stage::{StageName, StageResult, StageStatus};
use crate::summary::VettingSummary;

/// Lifecycle status of a vetting run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VettingStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl VettingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VettingStatus::Passed | VettingStatus::Failed)
    }
}

impl fmt::Display for VettingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VettingStatus::Pending => write!(f, "pending"),
            VettingStatus::Running => write!(f, "running"),
            VettingStatus::Passed => write!(f, "passed"),
            VettingStatus::Failed => write!(f, "failed"),
        }
    }
}

/// `failed` iff any stage failed; skipped stages never count against a run.
pub fn overall_status(stages: &[StageResult]) -> VettingStatus {
    if stages.iter().any(|s| s.status == StageStatus::Failed) {
        VettingStatus::Failed
    } else {
        VettingStatus::Passed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VettingResult {
    pub id: String,
    pub bounty_id: String,
    pub config: VettingConfig,
    pub status: VettingStatus,
    pub stages: Vec<StageResult>,
    pub summary: VettingSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_bundle: Option<ProofBundle>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl VettingResult {
    pub fn passed(&self) -> bool {
        self.status == VettingStatus::Passed
    }

    pub fn stage(&self, name: StageName) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn failed_stages(&self) -> impl Iterator<Item = &StageResult> {
        self.stages.iter().filter(|s| s.failed())
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
    }
}

/// A run in progress. Stage results are append-only.
#[derive(Debug)]
pub struct RunningVetting {
    id: String,
    bounty_id: String,
    config: VettingConfig,
    started_at: DateTime<Utc>,
    stages: Vec<StageResult>,
    proof_bundle: Option<ProofBundle>,
}

impl RunningVetting {
    pub fn start(bounty_id: impl Into<String>, config: VettingConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bounty_id: bounty_id.into(),
            config,
            started_at: Utc::now(),
            stages: Vec::new(),
            proof_bundle: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bounty_id(&self) -> &str {
        &self.bounty_id
    }

    pub fn config(&self) -> &VettingConfig {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    pub fn record(&mut self, result: StageResult) {
        self.stages.push(result);
    }

    pub fn attach_bundle(&mut self, bundle: ProofBundle) {
        self.proof_bundle = Some(bundle);
    }

    /// Point-in-time view with status `running`.
    pub fn snapshot(&self) -> VettingResult {
        VettingResult {
            id: self.id.clone(),
            bounty_id: self.bounty_id.clone(),
            config: self.config.clone(),
            status: VettingStatus::Running,
            stages: self.stages.clone(),
            summary: VettingSummary::from_stages(&self.stages),
            proof_bundle: self.proof_bundle.clone(),
            started_at: self.started_at,
            completed_at: None,
        }
    }
}

/// Freeze a run: status from the stage list, summary recomputed, completion stamped.
pub fn finalize(run: RunningVetting) -> VettingResult {
    let status = overall_status(&run.stages);
    let summary = VettingSummary::from_stages(&run.stages);
    VettingResult {
        id: run.id,
        bounty_id: run.bounty_id,
        config: run.config,
        status,
        stages: run.stages,
        summary,
        proof_bundle: run.proof_bundle,
        started_at: run.started_at,
        completed_at: Some(Utc::now()),
    }
}
