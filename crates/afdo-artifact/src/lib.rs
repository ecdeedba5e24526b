//! Toolchain profile artifacts
//!
//! Typed names and versions for the profile families produced by the AFDO
//! pipeline, the ranking used to pick the newest candidate, and the JSON
//! ledger recording what has been published.

pub mod coordinate;
pub mod ledger;
pub mod location;
pub mod rank;
pub mod version;

pub use coordinate::{PackageCoordinate, HEAD_VERSION};
pub use ledger::VersionLedger;
pub use location::{basename, ArtifactLocation, CompressionSuffix};
pub use rank::{
    compare_ledger_names, find_latest, is_on_branch, rank_benchmark, rank_cwp, rank_merged,
    LatestError, BENCHMARK_COORDINATE,
};
pub use version::{
    combined_name, BenchmarkProfileVersion, CwpArch, CwpProfileVersion, MergedKind,
    MergedProfileName, NameError, ProfileFamily,
};

use std::path::PathBuf;

/// Artifact data errors
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error(transparent)]
    Name(#[from] NameError),

    #[error("Invalid package coordinate '{0}'")]
    InvalidCoordinate(String),

    #[error("Invalid ledger {path}: {reason}")]
    InvalidLedger { path: PathBuf, reason: String },

    #[error("Failed to parse ledger JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error at {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl ArtifactError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }
}

pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;
