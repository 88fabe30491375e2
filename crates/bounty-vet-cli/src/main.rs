//! Bounty Vet - submission vetting CLI
//!
//! The `bounty-vet` command vets a claimed bounty's pull request.
//!
//! ## Commands
//!
//! - `run`: clone, detect, build, lint, test, audit and bundle a pull request
//! - `detect`: print the toolchain detected for a local directory
//! - `verify`: re-check a written proof bundle against its work tree

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use bounty_vet::proof::PROOF_DIR;
use bounty_vet::{
    default_stages, detect_project, init_tracing, load_bundle, verify_bundle, PipelineOptions,
    StageTimeouts, VettingGate, VettingPipeline, WorkspaceArena,
};
use bounty_vet_domain::{
    StageName, StageStatus, VettingConfig, VettingResult, DEFAULT_RUN_TIMEOUT_SECS,
};

#[derive(Parser)]
#[command(name = "bounty-vet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Vet bounty pull requests and emit proof bundles", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Vet a pull request end to end
    Run(RunArgs),

    /// Detect the toolchain of a local directory
    Detect {
        /// Directory to inspect
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Verify a written proof bundle
    Verify {
        /// Path to bundle.json
        bundle: PathBuf,

        /// Work tree the bundle describes (default: derived from the bundle path)
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Bounty identifier; also names the work directory
    #[arg(long, env = "BOUNTY_VET_BOUNTY")]
    bounty: String,

    /// Repository as owner/name
    #[arg(long, env = "BOUNTY_VET_REPO")]
    repo: String,

    /// Pull request number
    #[arg(long, env = "BOUNTY_VET_PR")]
    pr: u64,

    /// Expected head commit SHA (full or prefix)
    #[arg(long, env = "BOUNTY_VET_COMMIT")]
    commit: String,

    /// Branch the pull request targets
    #[arg(long, env = "BOUNTY_VET_BASE", default_value = "main")]
    base: String,

    /// Submission author recorded in the proof manifest
    #[arg(long, env = "BOUNTY_VET_AUTHOR")]
    author: Option<String>,

    /// Directory under which per-bounty work directories are created
    #[arg(long, env = "BOUNTY_VET_WORK_ROOT")]
    work_root: Option<PathBuf>,

    /// Clone URL override (default: https://github.com/<repo>.git)
    #[arg(long, env = "BOUNTY_VET_REMOTE_URL")]
    remote_url: Option<String>,

    /// Comma-separated stage list (default: derived from detection)
    #[arg(long, env = "BOUNTY_VET_STAGES", value_delimiter = ',')]
    stages: Vec<StageName>,

    /// Comma-separated stages to skip
    #[arg(long, env = "BOUNTY_VET_SKIP", value_delimiter = ',')]
    skip: Vec<StageName>,

    /// Overall run deadline in seconds
    #[arg(long, env = "BOUNTY_VET_TIMEOUT_SECS", default_value_t = DEFAULT_RUN_TIMEOUT_SECS)]
    timeout_secs: u64,

    #[command(flatten)]
    stage_timeouts: StageTimeoutArgs,

    /// Write the full vetting result as JSON to this path
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Per-stage command timeouts in seconds.
#[derive(Args, Default)]
struct StageTimeoutArgs {
    #[arg(long, env = "BOUNTY_VET_CLONE_TIMEOUT_SECS")]
    clone_timeout_secs: Option<u64>,
    #[arg(long, env = "BOUNTY_VET_INSTALL_TIMEOUT_SECS")]
    install_timeout_secs: Option<u64>,
    #[arg(long, env = "BOUNTY_VET_BUILD_TIMEOUT_SECS")]
    build_timeout_secs: Option<u64>,
    #[arg(long, env = "BOUNTY_VET_LINT_TIMEOUT_SECS")]
    lint_timeout_secs: Option<u64>,
    #[arg(long, env = "BOUNTY_VET_TEST_TIMEOUT_SECS")]
    test_timeout_secs: Option<u64>,
    #[arg(long, env = "BOUNTY_VET_SECURITY_TIMEOUT_SECS")]
    security_timeout_secs: Option<u64>,
    #[arg(long, env = "BOUNTY_VET_BUNDLE_TIMEOUT_SECS")]
    bundle_timeout_secs: Option<u64>,
}

impl StageTimeoutArgs {
    fn resolve(&self) -> StageTimeouts {
        let mut timeouts = StageTimeouts::default();
        let overrides = [
            (StageName::Clone, self.clone_timeout_secs),
            (StageName::Install, self.install_timeout_secs),
            (StageName::Build, self.build_timeout_secs),
            (StageName::Lint, self.lint_timeout_secs),
            (StageName::Test, self.test_timeout_secs),
            (StageName::Security, self.security_timeout_secs),
            (StageName::Bundle, self.bundle_timeout_secs),
        ];
        for (stage, secs) in overrides {
            if let Some(secs) = secs {
                timeouts.set(stage, secs);
            }
        }
        timeouts
    }
}

impl RunArgs {
    fn options(&self) -> PipelineOptions {
        let mut options = PipelineOptions::default()
            .with_skip(self.skip.clone())
            .with_timeouts(self.stage_timeouts.resolve());
        if !self.stages.is_empty() {
            options = options.with_stages(self.stages.clone());
        }
        options
    }

    fn work_root(&self) -> PathBuf {
        self.work_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("bounty-vet"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Detect { path } => cmd_detect(&path),
        Commands::Verify { bundle, work_dir } => cmd_verify(&bundle, work_dir.as_deref()).await,
    }
}

async fn cmd_run(args: &RunArgs) -> Result<()> {
    let arena = WorkspaceArena::new(args.work_root());
    let lease = arena
        .lease(&args.bounty)
        .with_context(|| format!("Failed to lease work directory for {}", args.bounty))?;

    let mut config = VettingConfig::new(
        args.repo.clone(),
        args.pr,
        args.commit.clone(),
        args.base.clone(),
        lease.path(),
    )
    .with_timeout(std::time::Duration::from_secs(args.timeout_secs));
    if let Some(author) = &args.author {
        config = config.with_author(author.clone());
    }
    if let Some(url) = &args.remote_url {
        config = config.with_remote_url(url.clone());
    }

    println!("Vetting {}#{} at {}", config.repo, config.pr_number, config.commit_sha);
    println!("Work directory: {}", lease.path().display());
    println!();

    info!(bounty = %args.bounty, "Starting vetting run");
    let pipeline = VettingPipeline::with_process_runner(args.options());
    let result = pipeline.run(&args.bounty, config, lease).await;

    print_report(&result);

    let verdict = VettingGate::evaluate(&result);
    println!("Gate: {}", if verdict.passed { "✓ PASSED" } else { "✗ FAILED" });
    if !verdict.violations.is_empty() {
        println!("Violations:");
        for violation in &verdict.violations {
            println!("  - {}", violation);
        }
    }

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write result to {}", path.display()))?;
        println!("Result written to {}", path.display());
    }

    if result.passed() && verdict.passed {
        println!("\n✓ Submission qualifies");
        Ok(())
    } else {
        bail!("Vetting failed")
    }
}

fn print_report(result: &VettingResult) {
    println!("Vetting ID: {}", result.id);
    println!("Status: {}", if result.passed() { "✓ PASSED" } else { "✗ FAILED" });
    if let Some(ms) = result.duration_ms() {
        println!("Duration: {}ms", ms);
    }
    println!();

    for stage in &result.stages {
        match stage.status {
            StageStatus::Passed => println!("  ✓ {} ({}ms)", stage.stage, stage.duration_ms),
            StageStatus::Failed => println!(
                "  ✗ {} ({}ms): {}",
                stage.stage,
                stage.duration_ms,
                stage.error.as_deref().unwrap_or("failed")
            ),
            StageStatus::Skipped => println!("  - {} (skipped: {})", stage.stage, stage.output),
        }
    }

    let s = &result.summary;
    println!();
    println!(
        "Summary: {}/{} stages passed, {} failed, {} skipped",
        s.passed_stages, s.total_stages, s.failed_stages, s.skipped_stages
    );
    println!(
        "Diff: +{} -{} across {} files",
        s.lines_added, s.lines_deleted, s.files_changed
    );
    println!(
        "Tests: {} passed, {} failed, {} skipped{}",
        s.tests_passed,
        s.tests_failed,
        s.tests_skipped,
        s.coverage
            .map(|c| format!(" ({c:.1}% coverage)"))
            .unwrap_or_default()
    );
    println!("Lint: {} errors, {} warnings", s.lint_errors, s.lint_warnings);
    println!(
        "Vulnerabilities: {} critical, {} high, {} medium, {} low",
        s.vulnerabilities.critical,
        s.vulnerabilities.high,
        s.vulnerabilities.medium,
        s.vulnerabilities.low
    );
    if let Some(bundle) = &result.proof_bundle {
        println!("Proof bundle: {} (checksum {})", bundle.id, bundle.short_checksum());
    }
    println!();
}

fn cmd_detect(path: &Path) -> Result<()> {
    let detection = detect_project(path)
        .with_context(|| format!("Failed to inspect {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&detection)?);

    let stages: Vec<_> = default_stages(&detection)
        .iter()
        .map(StageName::name)
        .collect();
    println!("Default stages: {}", stages.join(", "));
    Ok(())
}

/// `<work_dir>/.vetting-proof/<id>/bundle.json` → `<work_dir>`.
fn work_dir_of(bundle_path: &Path) -> Option<PathBuf> {
    let bundle_dir = bundle_path.parent()?;
    let proof_dir = bundle_dir.parent()?;
    if proof_dir.file_name()? != PROOF_DIR {
        return None;
    }
    proof_dir.parent().map(Path::to_path_buf)
}

async fn cmd_verify(bundle_path: &Path, work_dir: Option<&Path>) -> Result<()> {
    let work_dir = match work_dir {
        Some(dir) => dir.to_path_buf(),
        None => work_dir_of(bundle_path).with_context(|| {
            format!(
                "Cannot derive work directory from {}; pass --work-dir",
                bundle_path.display()
            )
        })?,
    };

    let bundle = load_bundle(bundle_path)
        .await
        .with_context(|| format!("Failed to load bundle {}", bundle_path.display()))?;
    let verification = verify_bundle(&bundle, &work_dir).await?;

    println!("Bundle: {}", bundle.id);
    println!(
        "Subject: {}#{} at {}",
        bundle.subject.repo, bundle.subject.pr_number, bundle.subject.commit_sha
    );
    println!(
        "Checksum: {}",
        if verification.checksum_matches {
            "✓ matches"
        } else {
            "✗ MISMATCH"
        }
    );
    for path in &verification.mismatched_files {
        println!("  ✗ modified: {}", path);
    }
    for path in &verification.missing_files {
        println!("  ✗ missing: {}", path);
    }

    if verification.is_valid() {
        println!("\n✓ Bundle verified ({} files)", bundle.files.len());
        Ok(())
    } else {
        bail!("Bundle verification failed")
    }
}
