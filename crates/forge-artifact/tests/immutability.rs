//! Content addressing properties shared by both stores

use forge_artifact::{ArtifactStore, BuildMetadata, ContentHash, FsArtifactStore, MemoryArtifactStore};
use proptest::prelude::*;

async fn check_store(store: &dyn ArtifactStore, bytes: Vec<u8>) {
    let first = store
        .put("job-1", bytes.clone(), BuildMetadata::default())
        .await
        .unwrap();
    let second = store
        .put("job-2", bytes.clone(), BuildMetadata::default())
        .await
        .unwrap();

    assert_eq!(first.content_hash, ContentHash::of(&bytes));
    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(first.storage_url, second.storage_url);
    assert_eq!(first.byte_size, bytes.len() as u64);
    assert_eq!(&*store.get(&first.content_hash).await.unwrap(), bytes.as_slice());
}

#[tokio::test]
async fn both_stores_deduplicate() {
    let memory = MemoryArtifactStore::default();
    check_store(&memory, b"module a".to_vec()).await;

    let dir = tempfile::tempdir().unwrap();
    let fs = FsArtifactStore::open(dir.path(), "http://localhost:8088").unwrap();
    check_store(&fs, b"module a".to_vec()).await;

    assert_eq!(
        memory.url_for(&ContentHash::of(b"module a")),
        fs.url_for(&ContentHash::of(b"module a"))
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn distinct_bytes_get_distinct_urls(a in ".{0,64}", b in ".{0,64}") {
        prop_assume!(a != b);
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = MemoryArtifactStore::default();
            let x = store.put("j", a.into_bytes(), BuildMetadata::default()).await.unwrap();
            let y = store.put("j", b.into_bytes(), BuildMetadata::default()).await.unwrap();
            assert_ne!(x.content_hash, y.content_hash);
            assert_ne!(x.storage_url, y.storage_url);
        });
    }
}
