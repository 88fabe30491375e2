//! Bundle stage: diff, hash, summarize and persist the proof bundle.

use chrono::Utc;

use bounty_vet_domain::{keys, ProofBundle, StageName, StageResult};

use super::StageContext;
use crate::error::BundleError;
use crate::proof::{build_proof_bundle, collect_diff, write_proof_bundle};

async fn bundle(
    ctx: &StageContext<'_>,
    vetting_id: &str,
    prior_stages: &[StageResult],
) -> Result<(ProofBundle, String), BundleError> {
    let diff = collect_diff(ctx.runner, ctx.config, ctx.timeout).await?;
    let bundle = build_proof_bundle(vetting_id, ctx.config, prior_stages, diff).await?;
    let dir = write_proof_bundle(&bundle, ctx.config.work_dir()).await?;
    Ok((bundle, dir.display().to_string()))
}

/// Returns the stage result and the bundle when one was written.
pub async fn run(
    ctx: &StageContext<'_>,
    vetting_id: &str,
    prior_stages: &[StageResult],
) -> (StageResult, Option<ProofBundle>) {
    let builder = StageResult::begin(StageName::Bundle, Utc::now());
    match bundle(ctx, vetting_id, prior_stages).await {
        Ok((bundle, location)) => {
            let summary = &bundle.summary;
            let result = builder
                .output(format!("proof bundle written to {location}"))
                .metric(keys::LINES_ADDED, summary.lines_added)
                .metric(keys::LINES_DELETED, summary.lines_deleted)
                .metric(keys::FILES_CHANGED, summary.files_changed)
                .metric("fileCount", bundle.files.len() as u64)
                .metric("bundleId", bundle.id.as_str())
                .metric("checksum", bundle.checksum.as_str())
                .passed();
            (result, Some(bundle))
        }
        Err(e) => (builder.failed(e.to_string()), None),
    }
}
