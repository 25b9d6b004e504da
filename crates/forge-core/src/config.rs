//! Forge configuration
//!
//! Loaded from TOML, then overridden by `FORGE_*` environment variables:
//!
//! ```toml
//! [compile]
//! workers = 4
//! format = "module"
//!
//! [store]
//! root = "/var/lib/forge"
//! public_url = "https://cdn.example.com"
//!
//! [server]
//! bind = "0.0.0.0:8088"
//!
//! [[shared]]
//! name = "react"
//! version = "18.3.1"
//! markers = ["__SECRET_INTERNALS_DO_NOT_USE"]
//! ```

use crate::error::ConfigError;
use forge_artifact::{
    ArtifactCache, ArtifactStore, FsArtifactStore, MemoryArtifactStore, ModuleFormat, StoreError,
};
use forge_compiler::default_worker_count;
use forge_loader::RetryPolicy;
use forge_registry::{SharedModuleEntry, SharedRegistry};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Worker count override
pub const ENV_WORKERS: &str = "FORGE_WORKERS";
/// Store root override
pub const ENV_STORE_ROOT: &str = "FORGE_STORE_ROOT";
/// Public base URL override
pub const ENV_PUBLIC_URL: &str = "FORGE_PUBLIC_URL";
/// Server bind address override
pub const ENV_BIND: &str = "FORGE_BIND";

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Compiler settings
    pub compile: CompileSection,
    /// Artifact store settings
    pub store: StoreSection,
    /// Loader settings
    pub loader: LoaderSection,
    /// HTTP server settings
    pub server: ServerSection,
    /// Host libraries to externalize
    pub shared: Vec<SharedDeclaration>,
}

/// `[compile]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileSection {
    /// Pool size; all cores but one when unset
    pub workers: Option<usize>,
    /// Default output format
    pub format: ModuleFormat,
    /// Shared module providing the JSX runtime
    pub jsx_runtime: String,
}

impl Default for CompileSection {
    fn default() -> Self {
        Self {
            workers: None,
            format: ModuleFormat::Module,
            jsx_runtime: "react".to_string(),
        }
    }
}

/// `[store]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Directory for the filesystem store; in-memory when unset
    pub root: Option<PathBuf>,
    /// Base of artifact URLs
    pub public_url: String,
    /// Read cache budget in bytes
    pub cache_bytes: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            root: None,
            public_url: "http://localhost:8088".to_string(),
            cache_bytes: 64 * 1024 * 1024,
        }
    }
}

/// `[loader]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSection {
    /// Backoff for transient failures
    pub retry: RetryPolicy,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout_ms: 15_000,
        }
    }
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Listen address
    pub bind: SocketAddr,
    /// CORS origins; any origin when empty
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8088)),
            allowed_origins: Vec::new(),
        }
    }
}

/// `[[shared]]`: one host library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDeclaration {
    /// Import specifier
    pub name: String,
    /// Version the host ships
    pub version: String,
    /// Strings proving the library was bundled
    #[serde(default)]
    pub markers: Vec<String>,
}

impl ForgeConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `path`, then apply environment overrides
    ///
    /// # Errors
    /// [`ConfigError`] when the file cannot be read or parsed, or an
    /// override is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse TOML without touching the environment
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for invalid TOML or unknown values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FORGE_*` variables from the process environment
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] for unparsable values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let vars = [ENV_WORKERS, ENV_STORE_ROOT, ENV_PUBLIC_URL, ENV_BIND]
            .into_iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key, value)));
        self.apply_overrides(vars)
    }

    /// Apply `(variable, value)` overrides
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] for unparsable values.
    pub fn apply_overrides<'k>(
        &mut self,
        vars: impl IntoIterator<Item = (&'k str, String)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in vars {
            let invalid = || ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.clone(),
            };
            match key {
                ENV_WORKERS => self.compile.workers = Some(value.parse().map_err(|_| invalid())?),
                ENV_STORE_ROOT => self.store.root = Some(PathBuf::from(&value)),
                ENV_PUBLIC_URL => self.store.public_url = value.clone(),
                ENV_BIND => self.server.bind = value.parse().map_err(|_| invalid())?,
                _ => tracing::warn!(%key, "ignoring unknown override"),
            }
        }
        Ok(())
    }

    /// With a fixed pool size
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.compile.workers = Some(workers);
        self
    }

    /// With a filesystem store at `root`
    #[inline]
    #[must_use]
    pub fn with_store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.store.root = Some(root.into());
        self
    }

    /// With a public base URL
    #[inline]
    #[must_use]
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.store.public_url = url.into();
        self
    }

    /// With a listen address
    #[inline]
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.server.bind = bind;
        self
    }

    /// With one more shared library
    #[must_use]
    pub fn with_shared(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.shared.push(SharedDeclaration {
            name: name.into(),
            version: version.into(),
            markers: Vec::new(),
        });
        self
    }

    /// Effective pool size
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.compile.workers.unwrap_or_else(default_worker_count).max(1)
    }

    /// Open the store described by `[store]`
    ///
    /// # Errors
    /// [`StoreError`] when the filesystem root cannot be created.
    pub fn open_store(&self) -> Result<Arc<dyn ArtifactStore>, StoreError> {
        Ok(match &self.store.root {
            Some(root) => Arc::new(
                FsArtifactStore::open(root, self.store.public_url.clone())?
                    .with_cache(ArtifactCache::new(self.store.cache_bytes)),
            ),
            None => Arc::new(MemoryArtifactStore::new(self.store.public_url.clone())),
        })
    }

    /// Register every `[[shared]]` declaration in `registry`.
    ///
    /// The handle is the declaration itself; a host embedding real instances
    /// registers those instead.
    pub fn register_shared(&self, registry: &SharedRegistry) {
        for decl in &self.shared {
            registry.register_entry(
                SharedModuleEntry::new(&decl.name, &decl.version, Arc::new(decl.clone()))
                    .with_markers(decl.markers.iter().cloned()),
            );
        }
    }
}
