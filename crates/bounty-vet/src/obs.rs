//! Structured lifecycle events for vetting runs.
//!
//! Every event carries an `event` field (`vetting.started`, `stage.finished`,
//! ...) so log pipelines can filter on it. Stage-level events are emitted
//! inside the run span created by [`vetting_span`], which tags them with the
//! vetting and bounty ids.

use tracing::{info, warn, Span};

use bounty_vet_domain::{StageName, StageResult, StageStatus};

/// Span covering one whole run. Attach it with `tracing::Instrument`.
pub fn vetting_span(vetting_id: &str, bounty_id: &str) -> Span {
    tracing::info_span!("bounty_vet.run", vetting_id = %vetting_id, bounty_id = %bounty_id)
}

pub fn emit_vetting_started(vetting_id: &str, repo: &str, pr_number: u64, commit_sha: &str) {
    info!(
        event = "vetting.started",
        vetting_id = %vetting_id,
        repo = %repo,
        pr_number = pr_number,
        commit_sha = %commit_sha,
    );
}

pub fn emit_stage_started(stage: StageName) {
    info!(event = "stage.started", stage = %stage);
}

/// Failed stages are logged at warn level.
pub fn emit_stage_finished(result: &StageResult) {
    match result.status {
        StageStatus::Failed => warn!(
            event = "stage.finished",
            stage = %result.stage,
            status = %result.status,
            duration_ms = result.duration_ms,
            error = result.error.as_deref().unwrap_or_default(),
        ),
        _ => info!(
            event = "stage.finished",
            stage = %result.stage,
            status = %result.status,
            duration_ms = result.duration_ms,
        ),
    }
}

pub fn emit_vetting_finished(vetting_id: &str, passed: bool, failed_stages: u64, duration_ms: u64) {
    info!(
        event = "vetting.finished",
        vetting_id = %vetting_id,
        passed = passed,
        failed_stages = failed_stages,
        duration_ms = duration_ms,
    );
}

pub fn emit_bundle_written(bundle_id: &str, checksum: &str, file_count: usize) {
    info!(
        event = "bundle.written",
        bundle_id = %bundle_id,
        checksum = %checksum,
        file_count = file_count,
    );
}

pub fn emit_gate_evaluated(vetting_id: &str, passed: bool, violations: usize) {
    info!(
        event = "gate.evaluated",
        vetting_id = %vetting_id,
        passed = passed,
        violations = violations,
    );
}
