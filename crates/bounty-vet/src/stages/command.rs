//! Install, build, lint and test stages.
//!
//! All four run the detected shell command in the work directory; the status
//! comes from the exit code. Lint and test additionally parse the full combined
//! output for metrics before it is tail-truncated.

use chrono::Utc;
use tracing::debug;

use bounty_vet_domain::{Metrics, ProjectDetection, StageName, StageResult};

use super::{exit_failure, StageContext};
use crate::parse::{parse_lint_output, parse_test_output};

fn output_metrics(stage: StageName, output: &str) -> Metrics {
    match stage {
        StageName::Lint => parse_lint_output(output).to_metrics(),
        StageName::Test => parse_test_output(output).to_metrics(),
        _ => Metrics::new(),
    }
}

pub async fn run(
    ctx: &StageContext<'_>,
    stage: StageName,
    detection: &ProjectDetection,
) -> StageResult {
    let Some(command) = detection.command_for(stage) else {
        return StageResult::skipped(stage, format!("no {stage} command detected"));
    };

    let builder = StageResult::begin(stage, Utc::now()).metric("command", command);
    debug!(stage = %stage, command, "Running stage command");

    let output = match ctx.run_shell(command).await {
        Ok(output) => output,
        Err(e) => return builder.failed(e.to_string()),
    };

    let combined = output.combined();
    builder
        .metrics(output_metrics(stage, &combined))
        .metric("exitCode", output.exit_code)
        .output(ctx.tail(&combined))
        .conclude(output.success(), || exit_failure(command, &output))
}
