//! Bounty Vetting Domain Model
//!
//! Defines the records a vetting run produces:
//! - VettingConfig: immutable run parameters (repo, PR, commit, base branch, work dir)
//! - ProjectDetection: inferred toolchain of the cloned repository
//! - StageResult: append-only outcome of one stage
//! - VettingSummary: aggregate derived from the stage list
//! - ProofBundle / ProofManifest / ProofFile: checksummed terminal artifact
//! - VettingResult: the root aggregate, frozen once by `finalize`
//!
//! All records are serializable; the proof bundle is content-addressed (SHA256
//! over canonical JSON).

pub mod config;
pub mod detection;
pub mod digest;
pub mod error;
pub mod proof;
pub mod result;
pub mod stage;
pub mod summary;

pub use config::{VettingConfig, DEFAULT_RUN_TIMEOUT_SECS};
pub use detection::{ProjectDetection, ProjectType};
pub use digest::{canonical_digest, canonical_json, sha256_hex};
pub use error::{DomainError, Result};
pub use proof::{
    compute_bundle_checksum, BundleSubject, ProofBundle, ProofFile, ProofFileKind, ProofManifest,
    DELETED_MARKER, MANIFEST_VERSION,
};
pub use result::{finalize, overall_status, RunningVetting, VettingResult, VettingStatus};
pub use stage::{
    Metrics, StageName, StageResult, StageResultBuilder, StageStatus, SKIPPED_BY_CONFIGURATION,
};
pub use summary::{keys, DiffStats, SeverityCounts, VettingSummary};

/// Vetting domain version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
