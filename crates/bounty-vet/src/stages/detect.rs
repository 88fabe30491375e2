//! Detect stage: infer the toolchain of the cloned tree.

use chrono::Utc;
use std::path::Path;

use bounty_vet_domain::{ProjectDetection, StageName, StageResult};

use crate::detector::detect_project;

/// Returns the stage result and, when detection succeeded, the detection.
pub fn run(work_dir: &Path) -> (StageResult, Option<ProjectDetection>) {
    let builder = StageResult::begin(StageName::Detect, Utc::now());
    match detect_project(work_dir) {
        Ok(detection) => {
            let output = serde_json::to_string(&detection).unwrap_or_default();
            let mut builder = builder
                .output(output)
                .metric("projectType", detection.project_type.as_str());
            if let Some(pm) = &detection.package_manager {
                builder = builder.metric("packageManager", pm.as_str());
            }
            (builder.passed(), Some(detection))
        }
        Err(e) => (builder.failed(e.to_string()), None),
    }
}
