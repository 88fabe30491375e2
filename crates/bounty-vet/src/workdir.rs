//! Working-directory arena.
//!
//! Each vetting run gets `root/<bounty id>` through a [`WorkDirLease`]. A path
//! can be leased by at most one holder at a time, and the lease is not
//! `Clone`, so only the run that owns it can wipe or write the directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::WorkDirError;

type Registry = Arc<Mutex<HashSet<PathBuf>>>;

/// Root directory under which runs lease private working directories.
#[derive(Debug, Clone)]
pub struct WorkspaceArena {
    root: PathBuf,
    leased: Registry,
}

impl WorkspaceArena {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            leased: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a bounty's run would use.
    pub fn path_for(&self, bounty_id: &str) -> Result<PathBuf, WorkDirError> {
        Ok(self.root.join(sanitize_bounty_id(bounty_id)?))
    }

    /// Claim the working directory for `bounty_id`.
    pub fn lease(&self, bounty_id: &str) -> Result<WorkDirLease, WorkDirError> {
        let path = self.path_for(bounty_id)?;
        let mut leased = self
            .leased
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !leased.insert(path.clone()) {
            return Err(WorkDirError::InUse(path));
        }
        debug!(path = %path.display(), "Leased work directory");
        Ok(WorkDirLease {
            path,
            registry: Arc::clone(&self.leased),
        })
    }

    pub fn is_leased(&self, bounty_id: &str) -> bool {
        match self.path_for(bounty_id) {
            Ok(path) => self
                .leased
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .contains(&path),
            Err(_) => false,
        }
    }
}

/// Exclusive handle on one run's working directory. Released on drop.
#[derive(Debug)]
pub struct WorkDirLease {
    path: PathBuf,
    registry: Registry,
}

impl WorkDirLease {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wipe the directory and recreate it empty.
    pub async fn reset(&self) -> Result<(), WorkDirError> {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.path).await?;
        Ok(())
    }
}

impl Drop for WorkDirLease {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.path);
    }
}

/// Map a bounty id onto a single safe path component.
fn sanitize_bounty_id(bounty_id: &str) -> Result<String, WorkDirError> {
    let cleaned: String = bounty_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return Err(WorkDirError::InvalidBountyId(bounty_id.to_string()));
    }
    Ok(cleaned)
}
