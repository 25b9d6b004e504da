//! Error types for Forge Core
//!
//! Source and compile problems end a job as `Failed` with a diagnostic and
//! are not errors of the pipeline itself. [`PipelineError`] is what callers
//! see when the pipeline could not do its job: unknown ids, illegal status
//! changes and infrastructure faults.

use crate::job::{JobId, JobStatus};
use forge_artifact::StoreError;
use forge_compiler::CompileError;
use std::path::PathBuf;

/// Text shown when a build failed for reasons outside the component
pub const TRY_AGAIN: &str = "the build service had a temporary problem; try again";

/// Pipeline failure
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No job with this id
    #[error("unknown job {0}")]
    UnknownJob(JobId),

    /// Status change not allowed by the job lifecycle
    #[error("illegal job transition {from} -> {to}")]
    IllegalTransition {
        /// Current status
        from: JobStatus,
        /// Requested status
        to: JobStatus,
    },

    /// Retry requested for a job that has not failed
    #[error("job {id} is {status}; only failed jobs can be retried")]
    NotRetryable {
        /// Job
        id: JobId,
        /// Its status
        status: JobStatus,
    },

    /// Artifact store fault
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Compile pool fault
    #[error("compile pool error: {0}")]
    Pool(CompileError),
}

impl PipelineError {
    /// Check if the same request could succeed later
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::Pool(_) => true,
            _ => false,
        }
    }

    /// Text suitable for the job status surface
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Storage(_) | Self::Pool(_) => TRY_AGAIN.to_string(),
            other => other.to_string(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for [`crate::ForgeConfig`]
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Environment override could not be parsed
    #[error("invalid value '{value}' for {key}")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Offending value
        value: String,
    },
}
