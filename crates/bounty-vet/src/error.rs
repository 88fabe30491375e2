//! Error taxonomy for the vetting engine.
//!
//! None of these escape a stage executor: every executor converts them into a
//! `failed` stage result. They surface directly only from the standalone
//! helpers (detector, bundle verification, arena leasing).

use std::path::PathBuf;
use std::time::Duration;

use bounty_vet_domain::DomainError;

/// Failures running an external command.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures leasing or preparing a working directory.
#[derive(Debug, thiserror::Error)]
pub enum WorkDirError {
    #[error("work directory already leased: {0}")]
    InUse(PathBuf),

    #[error("invalid bounty id for work directory: {0:?}")]
    InvalidBountyId(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures inspecting a working directory for its toolchain.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("work directory does not exist: {0}")]
    MissingDir(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures building, writing or verifying a proof bundle.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("git error: {0}")]
    Git(String),

    #[error("malformed diff line: {0:?}")]
    MalformedDiff(String),

    #[error("path escapes the work directory: {0}")]
    OutsideWorkDir(String),

    #[error("proof bundle already written: {0}")]
    AlreadyExists(PathBuf),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
