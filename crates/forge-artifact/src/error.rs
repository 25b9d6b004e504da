//! Store errors

use crate::hash::{ContentHash, HashError};
use std::path::PathBuf;

/// Errors from artifact storage
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No artifact with this hash
    #[error("artifact not found: {0}")]
    NotFound(ContentHash),

    /// Requested name is not `<64 hex>.js`
    #[error("invalid artifact name '{name}': {source}")]
    InvalidName {
        /// Requested name
        name: String,
        /// Parse failure
        #[source]
        source: HashError,
    },

    /// Stored bytes no longer hash to their name
    #[error("artifact {0} failed integrity check")]
    Corrupt(ContentHash),

    /// Filesystem failure
    #[error("io error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Build log line could not be encoded or decoded
    #[error("build log serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking storage task died
    #[error("storage task failed: {0}")]
    Task(String),

    /// HTTP listener could not bind
    #[error("failed to bind artifact server: {0}")]
    Bind(String),
}

impl StoreError {
    /// IO error at `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same operation could succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Task(_))
    }
}
