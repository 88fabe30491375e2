//! Immutable parameters of a single vetting run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DomainError, Result};

/// Default overall run deadline (one hour).
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 3_600;

/// Run parameters supplied by the caller. Created once per run, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VettingConfig {
    /// Repository identifier, `owner/name`.
    pub repo: String,

    /// Pull request number.
    pub pr_number: u64,

    /// Expected head commit (full SHA or prefix).
    pub commit_sha: String,

    /// Branch the pull request targets.
    pub base_branch: String,

    /// Working directory exclusively owned by this run.
    pub work_dir: PathBuf,

    /// Overall run deadline in seconds.
    pub timeout_secs: u64,

    /// Submission author, recorded in the proof manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Clone URL override (defaults to `https://github.com/{repo}.git`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

impl VettingConfig {
    pub fn new(
        repo: impl Into<String>,
        pr_number: u64,
        commit_sha: impl Into<String>,
        base_branch: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repo: repo.into(),
            pr_number,
            commit_sha: commit_sha.into(),
            base_branch: base_branch.into(),
            work_dir: work_dir.into(),
            timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
            author: None,
            remote_url: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// URL the clone stage fetches from.
    pub fn clone_url(&self) -> String {
        match &self.remote_url {
            Some(url) => url.clone(),
            None => format!("https://github.com/{}.git", self.repo),
        }
    }

    /// Local ref name the pull request head is fetched into.
    pub fn pr_ref(&self) -> String {
        format!("pr-{}", self.pr_number)
    }

    /// Remote-tracking ref of the base branch, used for diffing.
    pub fn base_ref(&self) -> String {
        format!("origin/{}", self.base_branch)
    }

    /// Reject configs that cannot possibly produce a run.
    pub fn validate(&self) -> Result<()> {
        let mut parts = self.repo.split('/');
        let owner = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        if owner.is_empty() || name.is_empty() || parts.next().is_some() {
            return Err(DomainError::InvalidConfig(format!(
                "repo must be owner/name, got {:?}",
                self.repo
            )));
        }
        if self.commit_sha.trim().is_empty() {
            return Err(DomainError::InvalidConfig(
                "commit sha must not be empty".to_string(),
            ));
        }
        if !self.commit_sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidConfig(format!(
                "commit sha must be hexadecimal, got {:?}",
                self.commit_sha
            )));
        }
        if self.base_branch.trim().is_empty() {
            return Err(DomainError::InvalidConfig(
                "base branch must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(DomainError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
