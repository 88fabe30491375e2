//! Proof bundle construction, persistence and verification.
//!
//! A bundle captures every file the submission changed relative to its base
//! branch (content checksum, size, line counts), the run summary and the
//! subject it vouches for. The bundle checksum is content-addressed over those
//! three parts only, so rebuilding over an unchanged tree reproduces it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use bounty_vet_domain::{
    compute_bundle_checksum, sha256_hex, BundleSubject, DiffStats, ProofBundle, ProofFile,
    ProofFileKind, ProofManifest, StageResult, VettingConfig, VettingSummary, DELETED_MARKER,
    MANIFEST_VERSION,
};

use crate::error::BundleError;
use crate::runner::{CommandRunner, CommandSpec};

/// Directory under the work dir that holds written bundles.
pub const PROOF_DIR: &str = ".vetting-proof";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const BUNDLE_FILE: &str = "bundle.json";

/// One record of `git diff --numstat -z`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: String,
    pub insertions: u64,
    pub deletions: u64,
}

/// Parse `git diff --numstat -z` output: NUL-terminated `ins\tdel\tpath`
/// records with raw, unquoted paths. Binary files (`-\t-\tpath`) count as 0/0.
pub fn parse_numstat(text: &str) -> Result<Vec<DiffEntry>, BundleError> {
    let mut entries = Vec::new();
    for record in text.split('\0').filter(|r| !r.trim().is_empty()) {
        let record = record.trim_start_matches('\n');
        let mut parts = record.splitn(3, '\t');
        let (Some(ins), Some(del), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(BundleError::MalformedDiff(record.to_string()));
        };
        let count = |field: &str| -> Result<u64, BundleError> {
            if field == "-" {
                return Ok(0);
            }
            field
                .parse()
                .map_err(|_| BundleError::MalformedDiff(record.to_string()))
        };
        entries.push(DiffEntry {
            path: path.to_string(),
            insertions: count(ins)?,
            deletions: count(del)?,
        });
    }
    Ok(entries)
}

pub fn diff_stats(entries: &[DiffEntry]) -> DiffStats {
    DiffStats {
        lines_added: entries.iter().map(|e| e.insertions).sum(),
        lines_deleted: entries.iter().map(|e| e.deletions).sum(),
        files_changed: entries.len() as u64,
    }
}

/// Diff the checked-out head against `origin/<base>`.
pub async fn collect_diff(
    runner: &dyn CommandRunner,
    config: &VettingConfig,
    timeout: Option<Duration>,
) -> Result<Vec<DiffEntry>, BundleError> {
    let mut spec = CommandSpec::new("git")
        .args(["-c", "core.quotepath=off", "diff", "--numstat", "-z", "--no-renames"])
        .arg(config.base_ref())
        .arg("HEAD")
        .cwd(config.work_dir());
    if let Some(timeout) = timeout {
        spec = spec.timeout(timeout);
    }

    let output = runner.run(&spec).await?;
    if !output.success() {
        return Err(BundleError::Git(format!(
            "git diff exited with code {}: {}",
            output.exit_code,
            output.stderr.trim()
        )));
    }
    parse_numstat(&output.stdout)
}

/// Join a repository-relative path onto `work_dir`, refusing absolute paths
/// and `..` components.
fn tree_path(work_dir: &Path, rel: &str) -> Result<PathBuf, BundleError> {
    let escapes = Path::new(rel)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if rel.is_empty() || escapes {
        return Err(BundleError::OutsideWorkDir(rel.to_string()));
    }
    Ok(work_dir.join(rel))
}

/// Bytes a tree entry is hashed over, or `None` when it is gone.
///
/// Symlinks are not followed: a link hashes as its target string, which is
/// what git stores for it. Regular files must resolve inside `work_dir`.
async fn tree_entry_bytes(work_dir: &Path, rel: &str) -> Result<Option<Vec<u8>>, BundleError> {
    let path = tree_path(work_dir, rel)?;
    let meta = match tokio::fs::symlink_metadata(&path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if meta.file_type().is_symlink() {
        let target = tokio::fs::read_link(&path).await?;
        return Ok(Some(target.as_os_str().as_encoded_bytes().to_vec()));
    }

    let root = tokio::fs::canonicalize(work_dir).await?;
    let resolved = tokio::fs::canonicalize(&path).await?;
    if !resolved.starts_with(&root) {
        return Err(BundleError::OutsideWorkDir(rel.to_string()));
    }
    Ok(Some(tokio::fs::read(&resolved).await?))
}

async fn proof_file(work_dir: &Path, entry: &DiffEntry) -> Result<ProofFile, BundleError> {
    let (checksum, size) = match tree_entry_bytes(work_dir, &entry.path).await? {
        Some(bytes) => (sha256_hex(&bytes), bytes.len() as u64),
        None => (DELETED_MARKER.to_string(), 0),
    };
    Ok(ProofFile {
        path: entry.path.clone(),
        checksum,
        size,
        kind: ProofFileKind::classify(&entry.path),
        insertions: entry.insertions,
        deletions: entry.deletions,
    })
}

/// Assemble a bundle from the diff and the stages recorded before bundling.
pub async fn build_proof_bundle(
    vetting_id: &str,
    config: &VettingConfig,
    prior_stages: &[StageResult],
    mut diff: Vec<DiffEntry>,
) -> Result<ProofBundle, BundleError> {
    diff.sort_by(|a, b| a.path.cmp(&b.path));

    let mut files = Vec::with_capacity(diff.len());
    for entry in &diff {
        files.push(proof_file(config.work_dir(), entry).await?);
    }

    let summary = VettingSummary::from_stages(prior_stages).with_diff(diff_stats(&diff));
    let subject = BundleSubject::from(config);
    let checksum = compute_bundle_checksum(&files, &summary, &subject)?;

    let id = Uuid::new_v4().to_string();
    let created_at = Utc::now();
    let manifest = ProofManifest {
        bundle_id: id.clone(),
        version: MANIFEST_VERSION.to_string(),
        author: config.author.clone(),
        repo: subject.repo.clone(),
        pr_number: subject.pr_number,
        commit_sha: subject.commit_sha.clone(),
        vetting_passed: !prior_stages.iter().any(StageResult::failed),
        bundle_checksum: checksum.clone(),
        file_count: files.len() as u64,
        created_at,
    };

    debug!(bundle_id = %id, files = files.len(), checksum = %checksum, "Built proof bundle");

    Ok(ProofBundle {
        id,
        vetting_id: vetting_id.to_string(),
        created_at,
        subject,
        files,
        summary,
        checksum,
        manifest,
    })
}

async fn write_new(path: &Path, bytes: &[u8]) -> Result<(), BundleError> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => BundleError::AlreadyExists(path.to_path_buf()),
            _ => BundleError::Io(e),
        })?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

/// Directory a bundle is written to.
pub fn bundle_dir(work_dir: &Path, bundle_id: &str) -> PathBuf {
    work_dir.join(PROOF_DIR).join(bundle_id)
}

/// Write `manifest.json` and `bundle.json`. Existing files are never replaced.
pub async fn write_proof_bundle(
    bundle: &ProofBundle,
    work_dir: &Path,
) -> Result<PathBuf, BundleError> {
    let dir = bundle_dir(work_dir, &bundle.id);
    tokio::fs::create_dir_all(&dir).await?;

    write_new(
        &dir.join(MANIFEST_FILE),
        &serde_json::to_vec_pretty(&bundle.manifest)?,
    )
    .await?;
    write_new(&dir.join(BUNDLE_FILE), &serde_json::to_vec_pretty(bundle)?).await?;

    info!(bundle_id = %bundle.id, path = %dir.display(), "Wrote proof bundle");
    Ok(dir)
}

/// Read a previously written `bundle.json`.
pub async fn load_bundle(path: &Path) -> Result<ProofBundle, BundleError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Outcome of re-checking a bundle against its own fields and a work tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleVerification {
    pub checksum_matches: bool,
    /// Files whose content (or deletion) no longer matches the bundle.
    pub mismatched_files: Vec<String>,
    /// Files recorded as present that are absent from the tree.
    pub missing_files: Vec<String>,
}

impl BundleVerification {
    pub fn is_valid(&self) -> bool {
        self.checksum_matches && self.mismatched_files.is_empty() && self.missing_files.is_empty()
    }
}

/// Recompute the bundle checksum and every file checksum under `work_dir`.
pub async fn verify_bundle(
    bundle: &ProofBundle,
    work_dir: &Path,
) -> Result<BundleVerification, BundleError> {
    let mut verification = BundleVerification {
        checksum_matches: bundle.recompute_checksum()? == bundle.checksum
            && bundle.manifest.bundle_checksum == bundle.checksum,
        ..Default::default()
    };

    for file in &bundle.files {
        match tree_entry_bytes(work_dir, &file.path).await? {
            Some(_) if file.is_deleted() => verification.mismatched_files.push(file.path.clone()),
            Some(bytes) if sha256_hex(&bytes) != file.checksum => {
                verification.mismatched_files.push(file.path.clone())
            }
            Some(_) => {}
            None if !file.is_deleted() => verification.missing_files.push(file.path.clone()),
            None => {}
        }
    }

    Ok(verification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_vet_domain::StageName;

    fn config(work_dir: &Path) -> VettingConfig {
        VettingConfig::new("acme/widgets", 42, "abc1234", "main", work_dir).with_author("octo")
    }

    fn entry(path: &str, ins: u64, del: u64) -> DiffEntry {
        DiffEntry {
            path: path.to_string(),
            insertions: ins,
            deletions: del,
        }
    }

    #[test]
    fn test_parse_numstat() {
        let out = "10\t2\tsrc/lib.rs\0-\t-\tassets/logo.png\x000\t5\told.txt\0";
        let entries = parse_numstat(out).unwrap();
        assert_eq!(
            entries,
            vec![
                entry("src/lib.rs", 10, 2),
                entry("assets/logo.png", 0, 0),
                entry("old.txt", 0, 5)
            ]
        );
        let stats = diff_stats(&entries);
        assert_eq!(stats.lines_added, 10);
        assert_eq!(stats.lines_deleted, 7);
        assert_eq!(stats.files_changed, 3);
    }

    #[test]
    fn test_parse_numstat_keeps_raw_paths() {
        let out = "3\t0\tcafé.rs\x001\t1\tsay \"hi\".txt\x002\t0\tline\nbreak.md\0";
        let paths: Vec<_> = parse_numstat(out)
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["café.rs", "say \"hi\".txt", "line\nbreak.md"]);
    }

    #[test]
    fn test_parse_numstat_rejects_garbage() {
        assert!(matches!(
            parse_numstat("not a numstat line"),
            Err(BundleError::MalformedDiff(_))
        ));
        assert!(parse_numstat("x\t1\tfile").is_err());
        assert!(parse_numstat("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_bundle_hashes_files_and_marks_deletions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "fn main() {}\n").unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let cfg = config(dir.path());

        let diff = vec![
            entry("src/lib.rs", 1, 0),
            entry("gone.rs", 0, 3),
            entry("package.json", 1, 0),
        ];
        let bundle = build_proof_bundle("v-1", &cfg, &[], diff).await.unwrap();

        let paths: Vec<_> = bundle.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["gone.rs", "package.json", "src/lib.rs"]);

        let lib = &bundle.files[2];
        assert_eq!(lib.checksum, sha256_hex(b"fn main() {}\n"));
        assert_eq!(lib.size, 13);
        assert_eq!(lib.kind, ProofFileKind::Source);
        assert!(bundle.files[0].is_deleted());
        assert_eq!(bundle.files[0].size, 0);
        assert_eq!(bundle.files[1].kind, ProofFileKind::Config);

        assert_eq!(bundle.summary.lines_added, 2);
        assert_eq!(bundle.summary.lines_deleted, 3);
        assert_eq!(bundle.summary.files_changed, 3);
        assert_eq!(bundle.manifest.file_count, 3);
        assert_eq!(bundle.manifest.author.as_deref(), Some("octo"));
        assert_eq!(bundle.manifest.bundle_checksum, bundle.checksum);
        assert!(bundle.manifest.vetting_passed);
        assert_eq!(bundle.recompute_checksum().unwrap(), bundle.checksum);
    }

    #[tokio::test]
    async fn test_bundle_checksum_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta").unwrap();
        let cfg = config(dir.path());

        let first = build_proof_bundle("v-1", &cfg, &[], vec![entry("b.txt", 1, 0), entry("a.txt", 1, 0)])
            .await
            .unwrap();
        let second = build_proof_bundle("v-2", &cfg, &[], vec![entry("a.txt", 1, 0), entry("b.txt", 1, 0)])
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.checksum, second.checksum);
    }

    #[tokio::test]
    async fn test_failed_prior_stage_marks_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let prior = vec![StageResult::failed_now(StageName::Test, "exit 1")];
        let bundle = build_proof_bundle("v-1", &cfg, &prior, Vec::new()).await.unwrap();
        assert!(!bundle.manifest.vetting_passed);
        assert_eq!(bundle.summary.failed_stages, 1);
    }

    #[tokio::test]
    async fn test_write_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let bundle = build_proof_bundle("v-1", &cfg, &[], Vec::new()).await.unwrap();

        let written = write_proof_bundle(&bundle, dir.path()).await.unwrap();
        assert_eq!(written, dir.path().join(PROOF_DIR).join(&bundle.id));
        assert!(written.join(MANIFEST_FILE).is_file());

        let err = write_proof_bundle(&bundle, dir.path()).await.unwrap_err();
        assert!(matches!(err, BundleError::AlreadyExists(_)));

        let loaded = load_bundle(&written.join(BUNDLE_FILE)).await.unwrap();
        assert_eq!(loaded, bundle);
    }

    #[tokio::test]
    async fn test_verify_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta").unwrap();
        let cfg = config(dir.path());
        let mut bundle = build_proof_bundle(
            "v-1",
            &cfg,
            &[],
            vec![entry("a.txt", 1, 0), entry("b.txt", 1, 0), entry("c.txt", 0, 1)],
        )
        .await
        .unwrap();

        assert!(verify_bundle(&bundle, dir.path()).await.unwrap().is_valid());

        std::fs::write(dir.path().join("a.txt"), "tampered").unwrap();
        std::fs::remove_file(dir.path().join("b.txt")).unwrap();
        std::fs::write(dir.path().join("c.txt"), "resurrected").unwrap();
        let v = verify_bundle(&bundle, dir.path()).await.unwrap();
        assert!(v.checksum_matches);
        assert_eq!(v.mismatched_files, vec!["a.txt", "c.txt"]);
        assert_eq!(v.missing_files, vec!["b.txt"]);

        bundle.summary.tests_passed += 1;
        let v = verify_bundle(&bundle, dir.path()).await.unwrap();
        assert!(!v.checksum_matches);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_hashes_link_target_not_host_file() {
        let outside = tempfile::tempdir().unwrap();
        let host_file = outside.path().join("secret.txt");
        std::fs::write(&host_file, "host credentials").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(&host_file, dir.path().join("link")).unwrap();
        let cfg = config(dir.path());

        let bundle = build_proof_bundle("v-1", &cfg, &[], vec![entry("link", 1, 0)])
            .await
            .unwrap();
        let link = &bundle.files[0];
        let target = host_file.as_os_str().as_encoded_bytes();
        assert_eq!(link.checksum, sha256_hex(target));
        assert_eq!(link.size, target.len() as u64);
        assert_ne!(link.checksum, sha256_hex(b"host credentials"));

        assert!(verify_bundle(&bundle, dir.path()).await.unwrap().is_valid());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_paths_through_symlinked_dirs_are_rejected() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "host").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();
        let cfg = config(dir.path());

        let err = build_proof_bundle("v-1", &cfg, &[], vec![entry("escape/secret.txt", 1, 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, BundleError::OutsideWorkDir(_)));
    }

    #[tokio::test]
    async fn test_verify_rejects_parent_and_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        for path in ["../etc/passwd", "/etc/passwd"] {
            let mut bundle = build_proof_bundle("v-1", &cfg, &[], Vec::new()).await.unwrap();
            bundle.files.push(ProofFile {
                path: path.to_string(),
                checksum: "0".repeat(64),
                size: 0,
                kind: ProofFileKind::Source,
                insertions: 1,
                deletions: 0,
            });
            let err = verify_bundle(&bundle, dir.path()).await.unwrap_err();
            assert!(matches!(err, BundleError::OutsideWorkDir(p) if p == path));
        }
    }
}
