//! Storage seam shared by the in-memory and filesystem stores

use crate::artifact::{BuildMetadata, BuildRecord, CompiledArtifact};
use crate::error::StoreError;
use crate::hash::ContentHash;
use async_trait::async_trait;
use std::sync::Arc;

/// Immutable artifact bytes as handed out by a store
pub type ArtifactBytes = Arc<[u8]>;

/// Content-addressed, append-only storage for compiled modules.
///
/// `put` of identical bytes yields the same hash and URL, and stored bytes are
/// never rewritten.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` produced by `job_id`
    async fn put(
        &self,
        job_id: &str,
        bytes: Vec<u8>,
        metadata: BuildMetadata,
    ) -> Result<CompiledArtifact, StoreError>;

    /// Fetch stored bytes
    async fn get(&self, hash: &ContentHash) -> Result<ArtifactBytes, StoreError>;

    /// Whether `hash` is stored
    async fn contains(&self, hash: &ContentHash) -> Result<bool, StoreError>;

    /// Stable public URL for `hash`
    fn url_for(&self, hash: &ContentHash) -> String;

    /// Append a build record
    async fn record_build(&self, record: BuildRecord) -> Result<(), StoreError>;

    /// Build records of `job_id`, oldest first
    async fn builds(&self, job_id: &str) -> Result<Vec<BuildRecord>, StoreError>;
}

#[async_trait]
impl<S: ArtifactStore + ?Sized> ArtifactStore for Arc<S> {
    async fn put(
        &self,
        job_id: &str,
        bytes: Vec<u8>,
        metadata: BuildMetadata,
    ) -> Result<CompiledArtifact, StoreError> {
        (**self).put(job_id, bytes, metadata).await
    }

    async fn get(&self, hash: &ContentHash) -> Result<ArtifactBytes, StoreError> {
        (**self).get(hash).await
    }

    async fn contains(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        (**self).contains(hash).await
    }

    fn url_for(&self, hash: &ContentHash) -> String {
        (**self).url_for(hash)
    }

    async fn record_build(&self, record: BuildRecord) -> Result<(), StoreError> {
        (**self).record_build(record).await
    }

    async fn builds(&self, job_id: &str) -> Result<Vec<BuildRecord>, StoreError> {
        (**self).builds(job_id).await
    }
}
