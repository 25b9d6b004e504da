//! Filesystem-backed store
//!
//! Layout under the root:
//!
//! ```text
//! objects/<first 2 hex>/<remaining 62 hex>.js
//! builds.jsonl
//! ```

use crate::artifact::{artifact_url, BuildMetadata, BuildRecord, CompiledArtifact};
use crate::cache::ArtifactCache;
use crate::error::StoreError;
use crate::hash::ContentHash;
use crate::store::{ArtifactBytes, ArtifactStore};
use async_trait::async_trait;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

/// Sharded on-disk store with atomic writes and a byte cache in front
#[derive(Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
    objects_dir: PathBuf,
    builds_path: PathBuf,
    public_base_url: String,
    cache: ArtifactCache,
    log_lock: tokio::sync::Mutex<()>,
}

impl FsArtifactStore {
    /// Open (creating if needed) a store rooted at `root`
    ///
    /// # Errors
    /// Fails when the objects directory cannot be created.
    pub fn open(root: impl AsRef<Path>, public_base_url: impl Into<String>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let objects_dir = root.join("objects");
        std::fs::create_dir_all(&objects_dir).map_err(|e| StoreError::io(&objects_dir, e))?;
        Ok(Self {
            builds_path: root.join("builds.jsonl"),
            root,
            objects_dir,
            public_base_url: public_base_url.into(),
            cache: ArtifactCache::default(),
            log_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Replace the read cache
    #[must_use]
    pub fn with_cache(mut self, cache: ArtifactCache) -> Self {
        self.cache = cache;
        self
    }

    /// Store root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk path of `hash`
    #[must_use]
    pub fn object_path(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        self.objects_dir.join(&hex[..2]).join(format!("{}.js", &hex[2..]))
    }
}

fn write_object(path: &Path, bytes: &[u8]) -> Result<bool, StoreError> {
    if path.exists() {
        return Ok(false);
    }
    let shard = path
        .parent()
        .ok_or_else(|| StoreError::io(path, std::io::ErrorKind::InvalidInput.into()))?;
    std::fs::create_dir_all(shard).map_err(|e| StoreError::io(shard, e))?;

    let mut tmp = NamedTempFile::new_in(shard).map_err(|e| StoreError::io(shard, e))?;
    tmp.write_all(bytes).map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| StoreError::io(tmp.path(), e))?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        // a concurrent put of the same bytes got there first
        Err(e) if path.exists() => {
            drop(e);
            Ok(false)
        }
        Err(e) => Err(StoreError::io(path, e.error)),
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    #[tracing::instrument(skip(self, bytes, metadata), fields(len = bytes.len()))]
    async fn put(
        &self,
        job_id: &str,
        bytes: Vec<u8>,
        metadata: BuildMetadata,
    ) -> Result<CompiledArtifact, StoreError> {
        let hash = ContentHash::of(&bytes);
        let path = self.object_path(&hash);
        let shared: ArtifactBytes = bytes.into();

        let to_write = shared.clone();
        let written = tokio::task::spawn_blocking(move || write_object(&path, &to_write))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        if written {
            tracing::debug!(hash = %hash.short(), "artifact written");
        }
        let byte_size = shared.len() as u64;
        self.cache.insert(hash, shared).await;

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
        if let Some(bytes) = self.cache.get(hash).await {
            return Ok(bytes);
        }
        let path = self.object_path(hash);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*hash))
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        if !hash.matches(&bytes) {
            tracing::error!(hash = %hash.short(), path = %path.display(), "stored artifact does not match its hash");
            return Err(StoreError::Corrupt(*hash));
        }
        let bytes: ArtifactBytes = bytes.into();
        self.cache.insert(*hash, bytes.clone()).await;
        Ok(bytes)
    }

    async fn contains(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        if self.cache.get(hash).await.is_some() {
            return Ok(true);
        }
        let path = self.object_path(hash);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    fn url_for(&self, hash: &ContentHash) -> String {
        artifact_url(&self.public_base_url, hash)
    }

    async fn record_build(&self, record: BuildRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.log_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.builds_path)
            .await
            .map_err(|e| StoreError::io(&self.builds_path, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| StoreError::io(&self.builds_path, e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io(&self.builds_path, e))?;
        Ok(())
    }

    async fn builds(&self, job_id: &str) -> Result<Vec<BuildRecord>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.builds_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.builds_path, e)),
        };

        let mut records = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<BuildRecord>(line) {
                Ok(record) if record.job_id == job_id => records.push(record),
                Ok(_) => {}
                // a torn final line from a crash is skipped, not fatal
                Err(e) => tracing::warn!(error = %e, "skipping unreadable build log line"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ModuleFormat;

    fn make_store() -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path(), "http://cdn.test").unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_writes_sharded_object() {
        let (_dir, store) = make_store();
        let artifact = store
            .put("job", b"export default 1;".to_vec(), BuildMetadata::default())
            .await
            .unwrap();
        let path = store.object_path(&artifact.content_hash);
        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with(".js"));
        assert_eq!(std::fs::read(path).unwrap(), b"export default 1;");
    }

    #[tokio::test]
    async fn second_put_does_not_rewrite() {
        let (_dir, store) = make_store();
        let first = store
            .put("a", b"same".to_vec(), BuildMetadata::default())
            .await
            .unwrap();
        let path = store.object_path(&first.content_hash);
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();

        let second = store
            .put("b", b"same".to_vec(), BuildMetadata::default())
            .await
            .unwrap();
        let after = std::fs::metadata(&path).unwrap().modified().unwrap();

        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(first.storage_url, second.storage_url);
        assert_eq!(before, after);
        let shard: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(shard.len(), 1);
    }

    #[tokio::test]
    async fn get_reads_from_disk_after_reopen() {
        let (dir, store) = make_store();
        let artifact = store
            .put("job", b"persisted".to_vec(), BuildMetadata::default())
            .await
            .unwrap();
        drop(store);

        let reopened = FsArtifactStore::open(dir.path(), "http://cdn.test").unwrap();
        let bytes = reopened.get(&artifact.content_hash).await.unwrap();
        assert_eq!(&*bytes, b"persisted");
    }

    #[tokio::test]
    async fn tampered_object_is_reported_corrupt() {
        let (dir, store) = make_store();
        let artifact = store
            .put("job", b"original".to_vec(), BuildMetadata::default())
            .await
            .unwrap();
        let path = store.object_path(&artifact.content_hash);
        std::fs::write(&path, b"tampered").unwrap();

        let reopened = FsArtifactStore::open(dir.path(), "http://cdn.test").unwrap();
        assert!(matches!(
            reopened.get(&artifact.content_hash).await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn build_log_survives_reopen() {
        let (dir, store) = make_store();
        let artifact = store
            .put(
                "job-1",
                b"x".to_vec(),
                BuildMetadata::new(ModuleFormat::Module, ["react"]),
            )
            .await
            .unwrap();
        store.record_build(BuildRecord::failed("job-1", 1, "syntax error", 2)).await.unwrap();
        store.record_build(BuildRecord::succeeded(2, &artifact, 9)).await.unwrap();
        drop(store);

        let reopened = FsArtifactStore::open(dir.path(), "http://cdn.test").unwrap();
        let records = reopened.builds("job-1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].content_hash, Some(artifact.content_hash));
        assert!(reopened.builds("other").await.unwrap().is_empty());
    }
}
