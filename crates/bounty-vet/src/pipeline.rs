//! Vetting pipeline orchestration.
//!
//! Stages run strictly in canonical order: clone, detect, install, build,
//! lint, test, security, bundle. Clone and detect are fatal: without a tree or
//! a toolchain nothing else can run, so the run is finalized immediately.
//! Every later stage is recorded and the run continues regardless of its
//! outcome, so callers always get a complete multi-stage report.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn, Instrument};

use bounty_vet_domain::{
    finalize, ProjectDetection, RunningVetting, StageName, StageResult, VettingConfig,
    VettingResult,
};

use crate::detector::default_stages;
use crate::obs;
use crate::runner::{CommandRunner, ProcessRunner};
use crate::stage::{PipelineOptions, StageDecision};
use crate::stages::{bundle, clone, command, detect, security, StageContext};
use crate::workdir::WorkDirLease;

/// Error recorded for stages that could not start before the run deadline.
pub const DEADLINE_EXCEEDED: &str = "run deadline exceeded";

/// Stages that follow detection, in execution order.
const POST_DETECT_STAGES: [StageName; 6] = [
    StageName::Install,
    StageName::Build,
    StageName::Lint,
    StageName::Test,
    StageName::Security,
    StageName::Bundle,
];

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Run a stage future, converting a panic into a failed result for `stage`.
async fn guarded<F, T>(stage: StageName, fut: F) -> Result<T, StageResult>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(fut).catch_unwind().await.map_err(|payload| {
        let message = panic_message(payload.as_ref());
        warn!(stage = %stage, panic = %message, "Stage panicked");
        StageResult::failed_now(stage, format!("stage panicked: {message}"))
    })
}

/// Orchestrates one vetting run per call to [`VettingPipeline::run`].
pub struct VettingPipeline {
    runner: Arc<dyn CommandRunner>,
    options: PipelineOptions,
}

impl VettingPipeline {
    pub fn new(runner: Arc<dyn CommandRunner>, options: PipelineOptions) -> Self {
        Self { runner, options }
    }

    /// Pipeline that spawns real processes.
    pub fn with_process_runner(options: PipelineOptions) -> Self {
        Self::new(Arc::new(ProcessRunner), options)
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Vet one submission inside the leased work directory.
    ///
    /// Never fails: every problem, including an invalid config, ends up as a
    /// failed stage in the returned result. The lease is released on return.
    pub async fn run(
        &self,
        bounty_id: &str,
        config: VettingConfig,
        lease: WorkDirLease,
    ) -> VettingResult {
        let mut run = RunningVetting::start(bounty_id, config);
        let span = obs::vetting_span(run.id(), bounty_id);

        self.drive(&mut run, &lease).instrument(span).await;
        drop(lease);

        let result = finalize(run);
        obs::emit_vetting_finished(
            &result.id,
            result.passed(),
            result.summary.failed_stages,
            result.duration_ms().unwrap_or_default(),
        );
        result
    }

    async fn drive(&self, run: &mut RunningVetting, lease: &WorkDirLease) {
        let config = run.config().clone();
        obs::emit_vetting_started(run.id(), &config.repo, config.pr_number, &config.commit_sha);

        if let Err(e) = config.validate() {
            record(run, StageResult::failed_now(StageName::Clone, e.to_string()));
            return;
        }
        for stage in self.options.ignored_skips() {
            warn!(stage = %stage, "Ignoring request to skip a required stage");
        }

        let deadline = Instant::now() + config.timeout();

        // clone
        obs::emit_stage_started(StageName::Clone);
        let cloned = match self.context(&config, StageName::Clone, deadline) {
            Some(ctx) => guarded(StageName::Clone, clone::run(&ctx, lease))
                .await
                .unwrap_or_else(|failed| failed),
            None => StageResult::failed_now(StageName::Clone, DEADLINE_EXCEEDED),
        };
        if !record(run, cloned) {
            info!("Clone failed; stopping run");
            return;
        }

        // detect
        obs::emit_stage_started(StageName::Detect);
        let (detected, detection) = match self.context(&config, StageName::Detect, deadline) {
            Some(_) => guarded(StageName::Detect, async { detect::run(config.work_dir()) })
                .await
                .unwrap_or_else(|failed| (failed, None)),
            None => (
                StageResult::failed_now(StageName::Detect, DEADLINE_EXCEEDED),
                None,
            ),
        };
        let detection = match (record(run, detected), detection) {
            (true, Some(detection)) => detection,
            _ => {
                info!("Detection failed; stopping run");
                return;
            }
        };

        let defaults = default_stages(&detection);
        for stage in POST_DETECT_STAGES {
            if let StageDecision::Skip(reason) = self.options.decide(stage, &defaults) {
                record(run, StageResult::skipped(stage, reason));
                continue;
            }
            let Some(ctx) = self.context(&config, stage, deadline) else {
                record(run, StageResult::failed_now(stage, DEADLINE_EXCEEDED));
                continue;
            };
            obs::emit_stage_started(stage);
            self.run_stage(run, &ctx, stage, &detection).await;
        }
    }

    async fn run_stage(
        &self,
        run: &mut RunningVetting,
        ctx: &StageContext<'_>,
        stage: StageName,
        detection: &ProjectDetection,
    ) {
        let result = match stage {
            StageName::Security => guarded(stage, security::run(ctx, detection))
                .await
                .unwrap_or_else(|failed| failed),
            StageName::Bundle => {
                let (result, bundle) = guarded(stage, bundle::run(ctx, run.id(), run.stages()))
                    .await
                    .unwrap_or_else(|failed| (failed, None));
                if let Some(bundle) = bundle {
                    obs::emit_bundle_written(&bundle.id, &bundle.checksum, bundle.files.len());
                    run.attach_bundle(bundle);
                }
                result
            }
            _ => guarded(stage, command::run(ctx, stage, detection))
                .await
                .unwrap_or_else(|failed| failed),
        };
        record(run, result);
    }

    /// Stage context with the stage timeout clipped to the time left before
    /// `deadline`. `None` once the deadline has passed.
    fn context<'a>(
        &'a self,
        config: &'a VettingConfig,
        stage: StageName,
        deadline: Instant,
    ) -> Option<StageContext<'a>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining == Duration::ZERO {
            return None;
        }
        let timeout = match self.options.timeouts.for_stage(stage) {
            Some(limit) => limit.min(remaining),
            None => remaining,
        };
        Some(StageContext {
            runner: self.runner.as_ref(),
            config,
            timeout: Some(timeout),
            output_tail_chars: self.options.output_tail_chars,
        })
    }
}

/// Append a result and log it. Returns whether the stage did not fail.
fn record(run: &mut RunningVetting, result: StageResult) -> bool {
    obs::emit_stage_finished(&result);
    let ok = !result.failed();
    run.record(result);
    ok
}
