//! Security stage: run the ecosystem auditor and gate on parsed severity.
//!
//! Auditors exit non-zero whenever they find anything, so the exit code is not
//! the verdict. The stage fails when critical or high findings are reported,
//! or when the auditor could not run at all (spawn failure, not installed,
//! timeout). Medium and low findings are recorded but never fail the stage.

use chrono::Utc;
use tracing::{debug, warn};

use bounty_vet_domain::{ProjectDetection, StageName, StageResult};

use super::{exit_failure, StageContext};
use crate::parse::parse_security_output;

pub async fn run(ctx: &StageContext<'_>, detection: &ProjectDetection) -> StageResult {
    let Some(command) = detection.audit_command.as_deref() else {
        return StageResult::skipped(
            StageName::Security,
            format!("no security auditor for {} projects", detection.project_type),
        );
    };

    let builder = StageResult::begin(StageName::Security, Utc::now()).metric("command", command);
    let output = match ctx.run_shell(command).await {
        Ok(output) => output,
        Err(e) => return builder.failed(format!("security auditor could not run: {e}")),
    };
    if output.command_not_found() {
        return builder
            .output(ctx.tail(&output.combined()))
            .failed(exit_failure(command, &output));
    }

    let combined = output.combined();
    let findings = parse_security_output(detection.project_type, &combined);
    let counts = findings.counts;
    debug!(
        critical = counts.critical,
        high = counts.high,
        medium = counts.medium,
        low = counts.low,
        parser = findings.parser,
        "Parsed audit output"
    );

    let builder = builder
        .metrics(findings.to_metrics())
        .metric("exitCode", output.exit_code)
        .output(ctx.tail(&combined));

    if counts.is_blocking() {
        warn!(critical = counts.critical, high = counts.high, "Blocking vulnerabilities found");
        return builder.failed(format!(
            "{} critical and {} high severity vulnerabilities found",
            counts.critical, counts.high
        ));
    }
    builder.passed()
}
