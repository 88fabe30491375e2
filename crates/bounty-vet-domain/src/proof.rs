//! Proof bundle: the durable, checksummed record of what was verified.
//!
//! Identity: SHA256(canonical JSON of {files, summary, config{repo, prNumber, commitSha}}).
//! `id` and `createdAt` are deliberately outside the checksum so rebuilding a
//! bundle over the same tree reproduces the same checksum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::VettingConfig;
use crate::digest::canonical_digest;
use crate::error::Result;
use crate::summary::VettingSummary;

/// Checksum recorded for files the diff lists but the tree no longer has.
pub const DELETED_MARKER: &str = "deleted";

/// Manifest schema version.
pub const MANIFEST_VERSION: &str = "1";

/// Coarse classification of a changed file, inferred from its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofFileKind {
    Source,
    Test,
    Config,
    Output,
    Recording,
}

impl ProofFileKind {
    /// Classify by lower-cased path substring; first rule that matches wins.
    pub fn classify(path: &str) -> Self {
        let p = path.to_ascii_lowercase();
        let file_name = p.rsplit('/').next().unwrap_or(&p);

        if p.contains("recording") || p.ends_with(".cast") {
            ProofFileKind::Recording
        } else if p.contains("output")
            || p.contains("dist/")
            || p.contains("build/")
            || p.ends_with(".log")
        {
            ProofFileKind::Output
        } else if p.contains("test") || p.contains("spec") {
            ProofFileKind::Test
        } else if p.contains("config")
            || [".json", ".toml", ".yaml", ".yml", ".lock", ".ini"]
                .iter()
                .any(|ext| p.ends_with(ext))
            || file_name.starts_with('.')
        {
            ProofFileKind::Config
        } else {
            ProofFileKind::Source
        }
    }
}

/// One changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofFile {
    /// Path relative to the repository root.
    pub path: String,

    /// SHA-256 hex of file bytes (the link target for symlinks), or
    /// [`DELETED_MARKER`].
    pub checksum: String,

    /// Size in bytes (0 when deleted).
    pub size: u64,

    #[serde(rename = "type")]
    pub kind: ProofFileKind,

    pub insertions: u64,

    pub deletions: u64,
}

impl ProofFile {
    pub fn is_deleted(&self) -> bool {
        self.checksum == DELETED_MARKER
    }
}

/// What the bundle checksum commits to about the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSubject {
    pub repo: String,
    pub pr_number: u64,
    pub commit_sha: String,
}

impl From<&VettingConfig> for BundleSubject {
    fn from(config: &VettingConfig) -> Self {
        Self {
            repo: config.repo.clone(),
            pr_number: config.pr_number,
            commit_sha: config.commit_sha.clone(),
        }
    }
}

#[derive(Serialize)]
struct ChecksumPayload<'a> {
    files: &'a [ProofFile],
    summary: &'a VettingSummary,
    config: &'a BundleSubject,
}

/// Bundle-level integrity anchor.
pub fn compute_bundle_checksum(
    files: &[ProofFile],
    summary: &VettingSummary,
    subject: &BundleSubject,
) -> Result<String> {
    canonical_digest(&ChecksumPayload {
        files,
        summary,
        config: subject,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofManifest {
    pub bundle_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub repo: String,
    pub pr_number: u64,
    pub commit_sha: String,
    /// Whether every stage before the bundle avoided `failed`.
    pub vetting_passed: bool,
    pub bundle_checksum: String,
    pub file_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Terminal artifact of a vetting run. Written once; re-runs produce new ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofBundle {
    pub id: String,
    pub vetting_id: String,
    pub created_at: DateTime<Utc>,
    pub subject: BundleSubject,
    pub files: Vec<ProofFile>,
    pub summary: VettingSummary,
    pub checksum: String,
    pub manifest: ProofManifest,
}

impl ProofBundle {
    /// Recompute the checksum from the bundle's own contents.
    pub fn recompute_checksum(&self) -> Result<String> {
        compute_bundle_checksum(&self.files, &self.summary, &self.subject)
    }

    pub fn short_checksum(&self) -> &str {
        &self.checksum[..12.min(self.checksum.len())]
    }
}
