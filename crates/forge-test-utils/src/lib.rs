//! Testing utilities for the Forge workspace
//!
//! Component sources, a populated shared registry and a store that fails on
//! demand.

#![allow(missing_docs)]

use async_trait::async_trait;
use forge_artifact::{
    ArtifactBytes, ArtifactStore, BuildMetadata, BuildRecord, CompiledArtifact, ContentHash,
    MemoryArtifactStore, StoreError,
};
use forge_registry::{SharedModuleEntry, SharedRegistry};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// String only the real React build contains
pub const REACT_MARKER: &str = "__SECRET_INTERNALS_DO_NOT_USE";

pub const PUBLIC_URL: &str = "http://forge.test";

/// Binds the frame twice
pub const DUPLICATE_FRAME: &str = r#"import { useCurrentFrame } from "remotion";

export default function Clip() {
  const frame = useCurrentFrame();
  const frame = useCurrentFrame();
  return <div style={{ opacity: frame / 30 }}>Hello</div>;
}
"#;

/// Quoted markup the parser takes for elements
pub const QUOTED_MARKUP: &str = r#"export default function Clip() {
  return <p>Example: "<svg></svg>"</p>;
}
"#;

/// Declares `Clip` but never exports it
pub const MISSING_EXPORT: &str = "const Clip = () => {\n  return <div>ok</div>;\n};\n";

/// Compiles as is
pub const COUNTER: &str = r#"import { useState } from "react";

export default function Counter() {
  const [n, setN] = useState<number>(0);
  return <button onClick={() => setN(n + 1)}>Clicked {n} times</button>;
}
"#;

/// Does not parse, and no pass can fix it
pub const BROKEN: &str = "export default function Clip( {\n  return <div>;\n";

/// Parses but imports a module nobody shares
pub const UNSHARED_IMPORT: &str =
    "import { motion } from \"framer-motion\";\nexport default () => <motion.div />;\n";

/// Registry with `react` (and its marker) and `remotion`
pub fn test_registry() -> Arc<SharedRegistry> {
    let registry = SharedRegistry::new();
    registry.register_entry(
        SharedModuleEntry::new("react", "18.3.1", Arc::new("react")).with_marker(REACT_MARKER),
    );
    registry.register_entry(SharedModuleEntry::new("remotion", "4.0.0", Arc::new("remotion")));
    Arc::new(registry)
}

/// In-memory store whose writes can be made to fail
#[derive(Debug)]
pub struct FlakyStore {
    inner: MemoryArtifactStore,
    failing_puts: AtomicUsize,
    failing_records: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryArtifactStore::new(PUBLIC_URL),
            failing_puts: AtomicUsize::new(0),
            failing_records: AtomicBool::new(false),
        }
    }

    /// Reject the next `count` puts
    pub fn fail_next_puts(&self, count: usize) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }

    /// Reject every build record from now on
    pub fn fail_records(&self, fail: bool) {
        self.failing_records.store(fail, Ordering::SeqCst);
    }

    pub fn stored(&self) -> usize {
        self.inner.len()
    }

    fn take_put_failure(&self) -> bool {
        self.failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for FlakyStore {
    async fn put(
        &self,
        job_id: &str,
        bytes: Vec<u8>,
        metadata: BuildMetadata,
    ) -> Result<CompiledArtifact, StoreError> {
        if self.take_put_failure() {
            return Err(StoreError::Task("object store unreachable".to_string()));
        }
        self.inner.put(job_id, bytes, metadata).await
    }

    async fn get(&self, hash: &ContentHash) -> Result<ArtifactBytes, StoreError> {
        self.inner.get(hash).await
    }

    async fn contains(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        self.inner.contains(hash).await
    }

    fn url_for(&self, hash: &ContentHash) -> String {
        self.inner.url_for(hash)
    }

    async fn record_build(&self, record: BuildRecord) -> Result<(), StoreError> {
        if self.failing_records.load(Ordering::SeqCst) {
            return Err(StoreError::Task("build log unreachable".to_string()));
        }
        self.inner.record_build(record).await
    }

    async fn builds(&self, job_id: &str) -> Result<Vec<BuildRecord>, StoreError> {
        self.inner.builds(job_id).await
    }
}
