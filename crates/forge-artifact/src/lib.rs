//! Forge Artifact
//!
//! Content-addressed storage for compiled component modules.
//!
//! # Core Concepts
//!
//! - [`ContentHash`]: blake3 of a module's final bytes; names the artifact forever
//! - [`ArtifactStore`]: append-only put/get/url seam with build records
//! - [`ModuleHeader`]: first-line comment describing format and externals
//! - [`http::routes`]: warp filters serving `/artifacts/<hex>.js`
//!
//! Two stores ship: [`MemoryArtifactStore`] for tests and single-process use,
//! and [`FsArtifactStore`] which shards objects on disk and keeps a
//! `builds.jsonl` log of every compile attempt.
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_artifact::{ArtifactStore, BuildMetadata, MemoryArtifactStore};
//!
//! let store = MemoryArtifactStore::new("https://cdn.example.com");
//! let artifact = store.put("job-1", bytes, BuildMetadata::default()).await?;
//! assert_eq!(store.get(&artifact.content_hash).await?.as_ref(), &bytes[..]);
//! ```

#![warn(unreachable_pub)]

mod artifact;
mod cache;
mod error;
mod fs;
mod hash;
mod memory;
mod store;

pub mod http;

pub use artifact::{
    artifact_url, BuildMetadata, BuildRecord, CompiledArtifact, ModuleFormat, ModuleHeader,
};
pub use cache::ArtifactCache;
pub use error::StoreError;
pub use fs::FsArtifactStore;
pub use hash::{ContentHash, HashError};
pub use memory::MemoryArtifactStore;
pub use store::{ArtifactBytes, ArtifactStore};
