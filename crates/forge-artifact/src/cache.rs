//! Read-through byte cache for the filesystem store

use crate::hash::ContentHash;
use crate::store::ArtifactBytes;
use moka::future::Cache;

/// Bounded cache of artifact bytes keyed by content hash.
///
/// Capacity is measured in bytes, so a few large modules cannot crowd the
/// cache past its budget. Entries never go stale: a hash names one byte string
/// forever.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    inner: Cache<ContentHash, ArtifactBytes>,
}

impl ArtifactCache {
    /// Cache holding at most `max_bytes` of artifact data
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self {
            inner: Cache::builder()
                .weigher(|_hash: &ContentHash, bytes: &ArtifactBytes| {
                    u32::try_from(bytes.len()).unwrap_or(u32::MAX)
                })
                .max_capacity(max_bytes)
                .build(),
        }
    }

    /// Cached bytes for `hash`
    #[inline]
    pub async fn get(&self, hash: &ContentHash) -> Option<ArtifactBytes> {
        self.inner.get(hash).await
    }

    /// Cache `bytes` under `hash`
    #[inline]
    pub async fn insert(&self, hash: ContentHash, bytes: ArtifactBytes) {
        self.inner.insert(hash, bytes).await;
    }

    /// Drop one entry
    #[inline]
    pub async fn invalidate(&self, hash: &ContentHash) {
        self.inner.invalidate(hash).await;
    }

    /// Approximate number of entries
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for ArtifactCache {
    /// 64 MiB budget
    fn default() -> Self {
        Self::new(64 * 1024 * 1024)
    }
}
