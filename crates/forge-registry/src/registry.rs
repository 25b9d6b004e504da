//! Shared module registry

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Opaque live instance of a host library
pub type SharedHandle = Arc<dyn Any + Send + Sync>;

/// Registry lookup failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Nothing registered under the name
    #[error("shared module '{0}' is not registered")]
    NotFound(String),

    /// Registered handle is not of the requested type
    #[error("shared module '{name}' is not a {expected}")]
    TypeMismatch {
        /// Registered name
        name: String,
        /// Requested type
        expected: &'static str,
    },
}

/// One registered host library
#[derive(Clone)]
pub struct SharedModuleEntry {
    /// Import specifier modules use, e.g. `react`
    pub name: String,
    /// Version string, informational
    pub version: String,
    /// The live instance handed to loaded modules
    pub handle: SharedHandle,
    /// Strings that only appear in the library's own source.
    ///
    /// Finding one in a compiled module means the library was bundled
    /// instead of externalized.
    pub markers: Vec<String>,
    /// Registration time
    pub registered_at: DateTime<Utc>,
}

impl SharedModuleEntry {
    /// Entry without markers
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>, handle: SharedHandle) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            handle,
            markers: Vec::new(),
            registered_at: Utc::now(),
        }
    }

    /// Add a leak marker
    #[inline]
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    /// Add several leak markers
    #[must_use]
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.markers.extend(markers.into_iter().map(Into::into));
        self
    }
}

impl fmt::Debug for SharedModuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedModuleEntry")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("markers", &self.markers)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}

/// Serializable name → version view of a registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedManifest {
    /// Registered modules by name
    pub modules: BTreeMap<String, String>,
}

static GLOBAL: Lazy<Arc<SharedRegistry>> = Lazy::new(|| Arc::new(SharedRegistry::new()));

/// Name → live instance map.
///
/// At most one entry per name; registering an existing name replaces it.
/// Hosts register everything before compiling or loading components.
#[derive(Debug, Default)]
pub struct SharedRegistry {
    entries: DashMap<String, SharedModuleEntry>,
}

impl SharedRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Process-wide registry
    #[inline]
    #[must_use]
    pub fn global() -> &'static Arc<Self> {
        &GLOBAL
    }

    /// Register `handle` under `name`, returning the entry it replaced
    pub fn register(
        &self,
        name: impl Into<String>,
        version: impl Into<String>,
        handle: SharedHandle,
    ) -> Option<SharedModuleEntry> {
        self.register_entry(SharedModuleEntry::new(name, version, handle))
    }

    /// Register a prepared entry, returning the entry it replaced
    pub fn register_entry(&self, entry: SharedModuleEntry) -> Option<SharedModuleEntry> {
        let name = entry.name.clone();
        let version = entry.version.clone();
        let previous = self.entries.insert(name.clone(), entry);
        match &previous {
            Some(old) => tracing::warn!(
                %name,
                old_version = %old.version,
                new_version = %version,
                "shared module re-registered, replacing previous instance"
            ),
            None => tracing::debug!(%name, %version, "shared module registered"),
        }
        previous
    }

    /// Remove `name`
    pub fn unregister(&self, name: &str) -> Option<SharedModuleEntry> {
        self.entries.remove(name).map(|(_, entry)| entry)
    }

    /// Live handle for `name`
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] when nothing is registered.
    pub fn resolve(&self, name: &str) -> Result<SharedHandle, RegistryError> {
        self.entries
            .get(name)
            .map(|e| Arc::clone(&e.handle))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Live handle for `name`, downcast to `T`
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] or [`RegistryError::TypeMismatch`].
    pub fn resolve_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.resolve(name)?
            .downcast::<T>()
            .map_err(|_| RegistryError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Full entry for `name`
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<SharedModuleEntry> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    /// Whether `name` is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn list_names(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Leak markers by name, skipping names without markers
    #[must_use]
    pub fn markers(&self) -> BTreeMap<String, Vec<String>> {
        self.entries
            .iter()
            .filter(|e| !e.markers.is_empty())
            .map(|e| (e.key().clone(), e.markers.clone()))
            .collect()
    }

    /// Name → version manifest
    #[must_use]
    pub fn snapshot(&self) -> SharedManifest {
        SharedManifest {
            modules: self
                .entries
                .iter()
                .map(|e| (e.key().clone(), e.version.clone()))
                .collect(),
        }
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
