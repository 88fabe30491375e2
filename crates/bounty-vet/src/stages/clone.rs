//! Clone stage: fetch the pull request head into the leased work directory.

use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::debug;

use bounty_vet_domain::{StageName, StageResult};

use super::StageContext;
use crate::runner::CommandSpec;
use crate::workdir::WorkDirLease;

/// History depth fetched for the base branch and the pull request.
pub const CLONE_DEPTH: u32 = 50;

fn git(args: &[&str]) -> CommandSpec {
    CommandSpec::new("git")
        .args(args.iter().copied())
        .env("GIT_TERMINAL_PROMPT", "0")
}

/// Steps run in order; the stage fails on the first one that fails.
fn clone_steps(ctx: &StageContext<'_>) -> Vec<CommandSpec> {
    let config = ctx.config;
    let depth = CLONE_DEPTH.to_string();
    let pr_ref = config.pr_ref();
    let pr_fetch = format!("pull/{}/head:{pr_ref}", config.pr_number);
    let url = config.clone_url();
    vec![
        git(&[
            "clone",
            "--depth",
            depth.as_str(),
            "--branch",
            config.base_branch.as_str(),
            "--no-tags",
            url.as_str(),
            ".",
        ]),
        git(&["fetch", "--depth", depth.as_str(), "origin", pr_fetch.as_str()]),
        git(&["checkout", pr_ref.as_str()]),
        git(&["rev-parse", "HEAD"]),
    ]
}

pub async fn run(ctx: &StageContext<'_>, lease: &WorkDirLease) -> StageResult {
    let builder = StageResult::begin(StageName::Clone, Utc::now());
    let config = ctx.config;

    if lease.path() != config.work_dir() {
        return builder.failed(format!(
            "work directory {} is not leased to this run (lease holds {})",
            config.work_dir().display(),
            lease.path().display()
        ));
    }
    if let Err(e) = lease.reset().await {
        return builder.failed(format!("failed to prepare work directory: {e}"));
    }

    let started = Instant::now();
    let mut log = String::new();
    let mut head = String::new();

    for spec in clone_steps(ctx) {
        let line = spec.display();
        let remaining = match ctx.timeout {
            Some(limit) => match limit.checked_sub(started.elapsed()) {
                Some(left) if left > Duration::ZERO => Some(left),
                _ => {
                    return builder
                        .output(ctx.tail(&log))
                        .failed(format!("clone timed out after {limit:?}"))
                }
            },
            None => None,
        };
        let step = StageContext {
            timeout: remaining,
            ..*ctx
        };

        debug!(command = %line, "Clone step");
        let output = match step.run(spec).await {
            Ok(output) => output,
            Err(e) => return builder.output(ctx.tail(&log)).failed(e.to_string()),
        };
        log.push_str(&format!("$ {line}\n{}", output.combined()));
        if !log.ends_with('\n') {
            log.push('\n');
        }
        if !output.success() {
            let error = format!(
                "{line} exited with code {}: {}",
                output.exit_code,
                output.stderr.trim()
            );
            return builder.output(ctx.tail(&log)).failed(error);
        }
        head = output.stdout.trim().to_ascii_lowercase();
    }

    let expected = config.commit_sha.trim().to_ascii_lowercase();
    builder
        .output(ctx.tail(&log))
        .metric("headSha", head.clone())
        .metric("prRef", config.pr_ref())
        .conclude(!head.is_empty() && head.starts_with(&expected), || {
            format!("head commit {head} does not match expected {expected}")
        })
}
