//! End-to-end pipeline runs against scripted and real git remotes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use bounty_vet::fakes::{ScriptedResponse, ScriptedRunner};
use bounty_vet::proof::{BUNDLE_FILE, PROOF_DIR};
use bounty_vet::{
    load_bundle, verify_bundle, CommandOutput, CommandRunner, CommandSpec, PipelineOptions,
    ProcessRunner, RunnerError, VettingGate, VettingPipeline, WorkspaceArena, DEADLINE_EXCEEDED,
};
use bounty_vet_domain::{
    sha256_hex, StageName, StageStatus, VettingConfig, VettingResult, VettingStatus,
    SKIPPED_BY_CONFIGURATION,
};

const SHA: &str = "4f2a9c1d0e8b7a6f5e4d3c2b1a09f8e7d6c5b4a3";
const GIT_DIFF: &str = "git -c core.quotepath=off diff";

/// Scripted runner that also materialises a project tree when `git clone`
/// runs, and can hang on chosen commands until their timeout elapses.
struct FixtureRunner {
    files: Vec<(String, String)>,
    remove_tree: bool,
    hang_on: Option<String>,
    scripted: ScriptedRunner,
}

impl FixtureRunner {
    fn new(files: &[(&str, &str)], scripted: ScriptedRunner) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            remove_tree: false,
            hang_on: None,
            scripted: scripted
                .on("git rev-parse HEAD", ScriptedResponse::ok(&format!("{SHA}\n"))),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.scripted.call_lines()
    }
}

#[async_trait]
impl CommandRunner for FixtureRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        let line = spec.display();
        if line.starts_with("git clone") {
            let dir = spec.cwd.clone().expect("clone runs in the work dir");
            for (path, content) in &self.files {
                let target = dir.join(path);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(target, content)?;
            }
            if self.remove_tree {
                std::fs::remove_dir_all(&dir)?;
            }
        }
        if let Some(prefix) = &self.hang_on {
            if line.starts_with(prefix.as_str()) {
                let limit = spec.timeout.unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(limit).await;
                return Err(RunnerError::TimedOut {
                    program: line,
                    timeout: limit,
                });
            }
        }
        self.scripted.run(spec).await
    }
}

const NODE_PACKAGE: &str = r#"{
  "name": "widgets",
  "scripts": { "build": "tsc", "lint": "eslint .", "test": "jest" }
}"#;

const AUDIT_LOW_AND_MODERATE: &str =
    r#"{"metadata":{"vulnerabilities":{"low":1,"moderate":1,"high":0,"critical":0}}}"#;

fn node_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("package.json", NODE_PACKAGE),
        ("package-lock.json", "{}"),
        ("src/index.ts", "export const answer = 42;\n"),
    ]
}

async fn vet(
    root: &Path,
    runner: Arc<dyn CommandRunner>,
    options: PipelineOptions,
    timeout: Duration,
) -> VettingResult {
    let arena = WorkspaceArena::new(root);
    let lease = arena.lease("bounty-17").unwrap();
    let config = VettingConfig::new("acme/widgets", 17, &SHA[..7], "main", lease.path())
        .with_author("octocat")
        .with_timeout(timeout);
    VettingPipeline::new(runner, options)
        .run("bounty-17", config, lease)
        .await
}

fn statuses(result: &VettingResult) -> Vec<(StageName, StageStatus)> {
    result.stages.iter().map(|s| (s.stage, s.status)).collect()
}

#[tokio::test]
async fn test_clone_failure_stops_the_run() {
    let root = tempfile::tempdir().unwrap();
    let scripted = ScriptedRunner::new().on(
        "git clone",
        ScriptedResponse::exit(128, "fatal: repository not found"),
    );
    let runner = Arc::new(FixtureRunner::new(&[], scripted));

    let result = vet(
        root.path(),
        runner.clone(),
        PipelineOptions::default(),
        Duration::from_secs(60),
    )
    .await;

    assert_eq!(result.status, VettingStatus::Failed);
    assert_eq!(statuses(&result), vec![(StageName::Clone, StageStatus::Failed)]);
    assert!(result.proof_bundle.is_none());
    assert!(result.completed_at.is_some());
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_detect_failure_stops_the_run() {
    let root = tempfile::tempdir().unwrap();
    let mut runner = FixtureRunner::new(&[], ScriptedRunner::new());
    runner.remove_tree = true;
    let runner = Arc::new(runner);

    let result = vet(
        root.path(),
        runner,
        PipelineOptions::default(),
        Duration::from_secs(60),
    )
    .await;

    assert_eq!(
        statuses(&result),
        vec![
            (StageName::Clone, StageStatus::Passed),
            (StageName::Detect, StageStatus::Failed)
        ]
    );
    assert_eq!(result.status, VettingStatus::Failed);
}

#[tokio::test]
async fn test_failing_tests_do_not_stop_later_stages() {
    let root = tempfile::tempdir().unwrap();
    let scripted = ScriptedRunner::new()
        .on("npm test", ScriptedResponse::exit(1, "Tests: 10 passed, 2 failed, 1 skipped"))
        .on("npm run lint", ScriptedResponse::ok("2:1 warning Unexpected console statement"))
        .on("npm audit", ScriptedResponse::exit(1, AUDIT_LOW_AND_MODERATE))
        .on(GIT_DIFF, ScriptedResponse::ok("1\t0\tsrc/index.ts\0"));
    let runner = Arc::new(FixtureRunner::new(&node_files(), scripted));

    let result = vet(
        root.path(),
        runner.clone(),
        PipelineOptions::default(),
        Duration::from_secs(60),
    )
    .await;

    assert_eq!(
        statuses(&result),
        vec![
            (StageName::Clone, StageStatus::Passed),
            (StageName::Detect, StageStatus::Passed),
            (StageName::Install, StageStatus::Passed),
            (StageName::Build, StageStatus::Passed),
            (StageName::Lint, StageStatus::Passed),
            (StageName::Test, StageStatus::Failed),
            (StageName::Security, StageStatus::Passed),
            (StageName::Bundle, StageStatus::Passed),
        ]
    );
    assert_eq!(result.status, VettingStatus::Failed);

    let summary = &result.summary;
    assert_eq!((summary.tests_passed, summary.tests_failed, summary.tests_skipped), (10, 2, 1));
    assert_eq!(summary.lint_warnings, 1);
    assert_eq!(summary.vulnerabilities.medium, 1);
    assert_eq!(summary.lines_added, 1);
    assert_eq!(summary.files_changed, 1);
    assert_eq!(summary.failed_stages, 1);

    let bundle = result.proof_bundle.as_ref().expect("bundle is still produced");
    assert!(!bundle.manifest.vetting_passed);
    assert_eq!(bundle.manifest.author.as_deref(), Some("octocat"));
    assert_eq!(bundle.files.len(), 1);

    let calls = runner.calls();
    assert!(calls.contains(&"npm ci".to_string()));
    assert!(calls.contains(&"npm run build".to_string()));

    let verdict = VettingGate::evaluate(&result);
    assert!(!verdict.passed);
    assert_eq!(verdict.violations.len(), 1);
    assert!(verdict.violations[0].contains("test"));
}

#[tokio::test]
async fn test_unknown_project_runs_only_required_stages() {
    let root = tempfile::tempdir().unwrap();
    let runner = Arc::new(FixtureRunner::new(
        &[("notes.txt", "hello")],
        ScriptedRunner::new().on(GIT_DIFF, ScriptedResponse::ok("1\t0\tnotes.txt\0")),
    ));

    let result = vet(
        root.path(),
        runner.clone(),
        PipelineOptions::default(),
        Duration::from_secs(60),
    )
    .await;

    assert_eq!(result.status, VettingStatus::Passed);
    assert_eq!(result.stages.len(), 8);
    for stage in [StageName::Install, StageName::Build, StageName::Lint, StageName::Test] {
        let r = result.stage(stage).unwrap();
        assert_eq!(r.status, StageStatus::Skipped);
        assert_eq!(r.output, format!("no {stage} command detected"));
    }
    assert!(result.stage(StageName::Security).unwrap().skipped_stage());
    assert!(result.stage(StageName::Bundle).unwrap().passed());

    // only git was ever invoked
    assert!(runner.calls().iter().all(|c| c.starts_with("git ")));

    let verdict = VettingGate::evaluate(&result);
    assert!(verdict.passed, "{:?}", verdict.violations);
}

#[tokio::test]
async fn test_critical_findings_fail_the_run() {
    let root = tempfile::tempdir().unwrap();
    let scripted = ScriptedRunner::new()
        .on("cargo audit", ScriptedResponse::ok("Crate: openssl\nSeverity: 9.8 (critical)\n"));
    let runner = Arc::new(FixtureRunner::new(
        &[("Cargo.toml", "[package]\nname = \"widgets\"\n")],
        scripted,
    ));

    let result = vet(
        root.path(),
        runner,
        PipelineOptions::default(),
        Duration::from_secs(60),
    )
    .await;

    assert_eq!(result.status, VettingStatus::Failed);
    let security = result.stage(StageName::Security).unwrap();
    assert!(security.failed());
    assert_eq!(result.summary.vulnerabilities.critical, 1);
    assert!(result.stage(StageName::Bundle).unwrap().passed());
}

#[tokio::test]
async fn test_skip_and_selection_overrides() {
    let root = tempfile::tempdir().unwrap();
    let runner = Arc::new(FixtureRunner::new(&node_files(), ScriptedRunner::new()));
    let options = PipelineOptions::default()
        .with_stages(vec![
            StageName::Clone,
            StageName::Detect,
            StageName::Lint,
            StageName::Test,
            StageName::Bundle,
        ])
        .with_skip(vec![StageName::Lint, StageName::Clone]);

    let result = vet(root.path(), runner.clone(), options, Duration::from_secs(60)).await;

    assert!(result.stage(StageName::Clone).unwrap().passed());
    let lint = result.stage(StageName::Lint).unwrap();
    assert!(lint.skipped_stage());
    assert_eq!(lint.output, SKIPPED_BY_CONFIGURATION);
    assert_eq!(result.stage(StageName::Install).unwrap().output, "not selected");
    assert_eq!(result.stage(StageName::Security).unwrap().output, "not selected");
    assert!(result.stage(StageName::Test).unwrap().passed());

    let calls = runner.calls();
    assert!(!calls.iter().any(|c| c.starts_with("npm run lint")));
    assert!(!calls.iter().any(|c| c.starts_with("npm ci")));
    assert_eq!(result.status, VettingStatus::Passed);
}

#[tokio::test]
async fn test_run_deadline_fails_remaining_stages() {
    let root = tempfile::tempdir().unwrap();
    let mut runner = FixtureRunner::new(&node_files(), ScriptedRunner::new());
    runner.hang_on = Some("npm ci".to_string());
    let runner = Arc::new(runner);

    let result = vet(
        root.path(),
        runner.clone(),
        PipelineOptions::default(),
        Duration::from_secs(1),
    )
    .await;

    let install = result.stage(StageName::Install).unwrap();
    assert!(install.failed());
    assert!(install.error.as_deref().unwrap().contains("timed out"));
    let after_install = [
        StageName::Build,
        StageName::Lint,
        StageName::Test,
        StageName::Security,
        StageName::Bundle,
    ];
    for stage in after_install {
        let r = result.stage(stage).unwrap();
        assert!(r.failed());
        assert_eq!(r.error.as_deref(), Some(DEADLINE_EXCEEDED));
    }
    assert_eq!(result.stages.len(), 8);
    assert!(!runner.calls().iter().any(|c| c.starts_with("npm run build")));
}

#[tokio::test]
async fn test_invalid_config_is_a_failed_run() {
    let root = tempfile::tempdir().unwrap();
    let arena = WorkspaceArena::new(root.path());
    let lease = arena.lease("bounty-17").unwrap();
    let config = VettingConfig::new("not-a-repo", 17, SHA, "main", lease.path());
    let runner = Arc::new(ScriptedRunner::new());

    let result = VettingPipeline::new(runner.clone(), PipelineOptions::default())
        .run("bounty-17", config, lease)
        .await;

    assert_eq!(result.status, VettingStatus::Failed);
    assert_eq!(statuses(&result), vec![(StageName::Clone, StageStatus::Failed)]);
    assert!(runner.calls().is_empty());
    assert!(!arena.is_leased("bounty-17"));
}

#[tokio::test]
async fn test_bundle_checksum_is_reproducible_across_runs() {
    let root = tempfile::tempdir().unwrap();
    let scripted = || {
        ScriptedRunner::new().on(
            GIT_DIFF,
            ScriptedResponse::ok("1\t0\tsrc/index.ts\x003\t1\tpackage.json\0"),
        )
    };

    let first = vet(
        root.path(),
        Arc::new(FixtureRunner::new(&node_files(), scripted())),
        PipelineOptions::default(),
        Duration::from_secs(60),
    )
    .await;
    let second = vet(
        root.path(),
        Arc::new(FixtureRunner::new(&node_files(), scripted())),
        PipelineOptions::default(),
        Duration::from_secs(60),
    )
    .await;

    let a = first.proof_bundle.unwrap();
    let b = second.proof_bundle.unwrap();
    assert_ne!(a.id, b.id);
    assert_ne!(first.id, second.id);
    assert_eq!(a.checksum, b.checksum);

    let work_dir = second.config.work_dir.clone();
    let written = work_dir.join(PROOF_DIR).join(&b.id).join(BUNDLE_FILE);
    let loaded = load_bundle(&written).await.unwrap();
    assert_eq!(loaded, b);
    assert!(verify_bundle(&loaded, &work_dir).await.unwrap().is_valid());
}

// Real git against a local file:// remote that exposes refs/pull/<n>/head.

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args([
            "-c",
            "user.name=Vet Test",
            "-c",
            "user.email=vet@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git runs");
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Origin with `main` plus a pull request ref; returns (origin dir, head sha).
fn make_origin(root: &Path) -> (PathBuf, String) {
    make_origin_with(root, &[])
}

/// Like [`make_origin`], with `extra` files added on the pull request branch.
fn make_origin_with(root: &Path, extra: &[(&str, &str)]) -> (PathBuf, String) {
    let origin = root.join("origin");
    std::fs::create_dir_all(&origin).unwrap();
    git(&origin, &["init", "-q"]);
    git(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(origin.join("README.md"), "# widgets\n").unwrap();
    std::fs::write(origin.join("old.txt"), "legacy\nstuff\n").unwrap();
    git(&origin, &["add", "."]);
    git(&origin, &["commit", "-q", "-m", "initial"]);

    git(&origin, &["checkout", "-q", "-b", "feature"]);
    std::fs::write(origin.join("README.md"), "# widgets\n\nNow with docs.\n").unwrap();
    std::fs::create_dir_all(origin.join("docs")).unwrap();
    std::fs::write(origin.join("docs/guide.md"), "step one\nstep two\n").unwrap();
    std::fs::remove_file(origin.join("old.txt")).unwrap();
    for (path, content) in extra {
        std::fs::write(origin.join(path), content).unwrap();
    }
    git(&origin, &["add", "-A"]);
    git(&origin, &["commit", "-q", "-m", "add guide"]);
    let head = git(&origin, &["rev-parse", "HEAD"]);
    git(&origin, &["update-ref", "refs/pull/5/head", &head]);
    git(&origin, &["checkout", "-q", "main"]);
    (origin, head)
}

#[tokio::test]
async fn test_real_git_clone_and_bundle() {
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let (origin, head) = make_origin(root.path());

    let arena = WorkspaceArena::new(root.path().join("work"));
    let lease = arena.lease("bounty-5").unwrap();
    let config = VettingConfig::new("acme/widgets", 5, &head, "main", lease.path())
        .with_remote_url(format!("file://{}", origin.display()));

    let result = VettingPipeline::new(Arc::new(ProcessRunner), PipelineOptions::default())
        .run("bounty-5", config, lease)
        .await;

    assert_eq!(result.status, VettingStatus::Passed, "{:#?}", result.stages);
    let clone = result.stage(StageName::Clone).unwrap();
    assert_eq!(clone.metrics["headSha"], head.as_str());

    let bundle = result.proof_bundle.as_ref().unwrap();
    let paths: Vec<_> = bundle.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["README.md", "docs/guide.md", "old.txt"]);
    assert!(bundle.files[2].is_deleted());
    assert_eq!(result.summary.lines_added, 4);
    assert_eq!(result.summary.lines_deleted, 2);
    assert_eq!(result.summary.files_changed, 3);

    let work_dir = root.path().join("work").join("bounty-5");
    assert!(verify_bundle(bundle, &work_dir).await.unwrap().is_valid());
}

#[cfg(unix)]
#[tokio::test]
async fn test_real_git_bundle_hashes_unusual_file_names() {
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let (origin, head) = make_origin_with(
        root.path(),
        &[("café.rs", "fn café() {}\n"), ("say \"hi\".txt", "hi\n")],
    );

    let arena = WorkspaceArena::new(root.path().join("work"));
    let lease = arena.lease("bounty-5").unwrap();
    let config = VettingConfig::new("acme/widgets", 5, &head, "main", lease.path())
        .with_remote_url(format!("file://{}", origin.display()));

    let result = VettingPipeline::new(Arc::new(ProcessRunner), PipelineOptions::default())
        .run("bounty-5", config, lease)
        .await;
    assert_eq!(result.status, VettingStatus::Passed, "{:#?}", result.stages);

    let bundle = result.proof_bundle.as_ref().unwrap();
    let file = |path: &str| {
        bundle
            .files
            .iter()
            .find(|f| f.path == path)
            .unwrap_or_else(|| panic!("{path} missing from {:?}", bundle.files))
    };
    assert_eq!(file("café.rs").checksum, sha256_hex(b"fn caf\xc3\xa9() {}\n"));
    assert_eq!(file("say \"hi\".txt").checksum, sha256_hex(b"hi\n"));
    assert!(!file("café.rs").is_deleted());
    assert!(file("old.txt").is_deleted());
    assert_eq!(result.summary.files_changed, 5);

    let work_dir = root.path().join("work").join("bounty-5");
    assert!(verify_bundle(bundle, &work_dir).await.unwrap().is_valid());
}
