//! Acceptance gate over a finished vetting result.

use serde::{Deserialize, Serialize};

use bounty_vet_domain::{StageName, VettingResult, VettingStatus};

use crate::obs;

/// Gate evaluation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether the submission qualifies.
    pub passed: bool,

    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Acceptance rules applied to a finalized result.
pub struct VettingGate;

impl VettingGate {
    /// Evaluate whether a result qualifies.
    ///
    /// Gate rule:
    /// - every failed stage is a violation, reported with its error
    /// - a `failed` status with no failed stage is itself a violation
    /// - when the bundle stage passed, the result must carry its bundle, and
    ///   the bundle's `vettingPassed` must agree with the result status
    /// - the gate passes only for a `passed` result with no violations
    pub fn evaluate(result: &VettingResult) -> GateVerdict {
        let mut violations = Vec::new();

        for stage in result.failed_stages() {
            violations.push(format!(
                "Stage '{}' failed: {}",
                stage.stage,
                stage.error.as_deref().unwrap_or("unknown error")
            ));
        }

        if result.status == VettingStatus::Failed && violations.is_empty() {
            violations.push("Result is failed but no stage failed".to_string());
        }
        if !result.status.is_terminal() {
            violations.push(format!("Result is not finalized (status {})", result.status));
        }

        let bundle_ran = result
            .stage(StageName::Bundle)
            .is_some_and(|stage| stage.passed());
        match &result.proof_bundle {
            None if bundle_ran => {
                violations.push("Bundle stage passed but no proof bundle is attached".to_string())
            }
            Some(bundle) if bundle.manifest.vetting_passed != result.passed() => {
                violations.push(format!(
                    "Proof bundle {} records vettingPassed={} but result is {}",
                    bundle.id, bundle.manifest.vetting_passed, result.status
                ));
            }
            _ => {}
        }

        let passed = result.status == VettingStatus::Passed && violations.is_empty();
        let message = if passed {
            format!(
                "Vetting passed: {} stages passed, {} skipped",
                result.summary.passed_stages, result.summary.skipped_stages
            )
        } else {
            format!("Vetting failed: {} violation(s)", violations.len())
        };

        obs::emit_gate_evaluated(&result.id, passed, violations.len());

        GateVerdict {
            passed,
            violations,
            message,
        }
    }
}
