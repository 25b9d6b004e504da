//! In-memory store

use crate::artifact::{artifact_url, BuildMetadata, BuildRecord, CompiledArtifact};
use crate::error::StoreError;
use crate::hash::ContentHash;
use crate::store::{ArtifactBytes, ArtifactStore};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;

/// Process-local store, used by tests and the single-process CLI
#[derive(Debug)]
pub struct MemoryArtifactStore {
    public_base_url: String,
    objects: DashMap<ContentHash, ArtifactBytes>,
    builds: Mutex<Vec<BuildRecord>>,
}

impl MemoryArtifactStore {
    /// Empty store serving under `public_base_url`
    #[must_use]
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            objects: DashMap::new(),
            builds: Mutex::new(Vec::new()),
        }
    }

    /// Number of distinct artifacts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing is stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new("http://localhost:8088")
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(
        &self,
        job_id: &str,
        bytes: Vec<u8>,
        metadata: BuildMetadata,
    ) -> Result<CompiledArtifact, StoreError> {
        let hash = ContentHash::of(&bytes);
        let byte_size = bytes.len() as u64;
        // first write wins; identical bytes are never replaced
        self.objects.entry(hash).or_insert_with(|| bytes.into());

        Ok(CompiledArtifact {
            content_hash: hash,
            job_id: job_id.to_string(),
            format: metadata.format,
            external_names: metadata.external_names,
            byte_size,
            created_at: Utc::now(),
            storage_url: self.url_for(&hash),
        })
    }

    async fn get(&self, hash: &ContentHash) -> Result<ArtifactBytes, StoreError> {
        self.objects
            .get(hash)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(*hash))
    }

    async fn contains(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        Ok(self.objects.contains_key(hash))
    }

    fn url_for(&self, hash: &ContentHash) -> String {
        artifact_url(&self.public_base_url, hash)
    }

    async fn record_build(&self, record: BuildRecord) -> Result<(), StoreError> {
        self.builds.lock().push(record);
        Ok(())
    }

    async fn builds(&self, job_id: &str) -> Result<Vec<BuildRecord>, StoreError> {
        Ok(self
            .builds
            .lock()
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect())
    }
}
