//! Bounty Vet - submission vetting pipeline
//!
//! Given a claimed bounty's pull request, the pipeline:
//! - Clones the pull request head into a leased work directory
//! - Detects the project's toolchain (Node, Python, Rust, Go, Java, Ruby)
//! - Runs install, build, lint, test and security stages, continuing past failures
//! - Writes a checksummed proof bundle of the changed files
//! - Evaluates an acceptance gate over the finalized result

pub mod detector;
pub mod error;
pub mod fakes;
pub mod gate;
pub mod obs;
pub mod parse;
pub mod pipeline;
pub mod proof;
pub mod runner;
pub mod stage;
pub mod stages;
pub mod telemetry;
pub mod workdir;

// Re-export key types
pub use detector::{default_stages, detect_project, PackageManager};
pub use error::{BundleError, DetectError, RunnerError, WorkDirError};
pub use gate::{GateVerdict, VettingGate};
pub use pipeline::{VettingPipeline, DEADLINE_EXCEEDED};
pub use proof::{
    build_proof_bundle, load_bundle, verify_bundle, write_proof_bundle, BundleVerification,
};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use stage::{PipelineOptions, StageDecision, StageTimeouts};
pub use telemetry::init_tracing;
pub use workdir::{WorkDirLease, WorkspaceArena};
