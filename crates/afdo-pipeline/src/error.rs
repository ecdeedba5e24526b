//! Pipeline error types

use afdo_artifact::{ArtifactError, LatestError, NameError};
use afdo_config::ConfigError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Name(#[from] NameError),

    #[error("No artifacts found in {location} for branch {branch} or {previous}")]
    NotFound {
        location: String,
        branch: u32,
        previous: u32,
    },

    #[error("No valid artifact in {location} for branch {branch} (example invalid artifact: {example})")]
    NoValidArtifact {
        location: String,
        branch: u32,
        example: String,
    },

    #[error("Descriptor {path} does not have markers for {variables:?}")]
    MissingMarker { path: PathBuf, variables: Vec<String> },

    #[error("Artifact {candidate} for {coordinate} is not newer than recorded {recorded}")]
    StaleArtifact {
        coordinate: String,
        recorded: String,
        candidate: String,
    },

    #[error("Coordinate {coordinate} is not in ledger {path}")]
    MissingCoordinate { coordinate: String, path: PathBuf },

    #[error("Ledger {path} did not change")]
    LedgerUnchanged { path: PathBuf },

    #[error("Timed out after {}s waiting for {url}", waited.as_secs())]
    Timeout { url: String, waited: Duration },

    #[error("Command `{command}` failed with exit code {exit_code}: {stderr}")]
    ToolFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to spawn `{command}`: {error}")]
    ToolSpawn {
        command: String,
        error: std::io::Error,
    },

    #[error("No profiles to merge into {}", output.display())]
    NoMergeInputs { output: PathBuf },

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("I/O error at {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Attach the searched location to a latest-selection failure
    pub fn latest(location: impl Into<String>, error: LatestError) -> Self {
        let location = location.into();
        match error {
            LatestError::NotFound { branch, previous } => Self::NotFound {
                location,
                branch,
                previous,
            },
            LatestError::NoValidArtifact { branch, example, .. } => Self::NoValidArtifact {
                location,
                branch,
                example,
            },
        }
    }

    /// The expected upstream artifact has not appeared yet
    ///
    /// Drivers reschedule instead of failing the build.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// No eligible artifact exists, whether or not any candidates were listed
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NoValidArtifact { .. })
    }
}
