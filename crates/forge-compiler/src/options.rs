//! Compile inputs and outputs

use forge_artifact::ModuleFormat;
use forge_registry::SharedRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// How to compile one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    /// Import specifiers resolved from the shared registry at load time
    pub external_names: BTreeSet<String>,
    /// Output format
    pub format: ModuleFormat,
    /// Required registration slot for global-slot output
    pub slot_key: Option<String>,
    /// Shared module providing `createElement` and `Fragment`
    pub jsx_runtime: String,
    /// Per shared module, strings whose presence in output means it was bundled
    pub leak_markers: BTreeMap<String, Vec<String>>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            external_names: BTreeSet::new(),
            format: ModuleFormat::Module,
            slot_key: None,
            jsx_runtime: "react".to_string(),
            leak_markers: BTreeMap::new(),
        }
    }
}

impl CompileOptions {
    /// Externals and leak markers taken from `registry`
    #[must_use]
    pub fn from_registry(registry: &SharedRegistry) -> Self {
        Self {
            external_names: registry.list_names(),
            leak_markers: registry.markers(),
            ..Self::default()
        }
    }

    /// Add one external
    #[inline]
    #[must_use]
    pub fn with_external(mut self, name: impl Into<String>) -> Self {
        self.external_names.insert(name.into());
        self
    }

    /// Set the output format
    #[inline]
    #[must_use]
    pub fn with_format(mut self, format: ModuleFormat) -> Self {
        self.format = format;
        self
    }

    /// Require a registration under `slot` (global-slot output)
    #[inline]
    #[must_use]
    pub fn with_slot_key(mut self, slot: impl Into<String>) -> Self {
        self.slot_key = Some(slot.into());
        self
    }

    /// Set the JSX runtime module
    #[inline]
    #[must_use]
    pub fn with_jsx_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.jsx_runtime = runtime.into();
        self
    }

    /// Add a leak marker for `name`
    #[must_use]
    pub fn with_leak_marker(mut self, name: impl Into<String>, marker: impl Into<String>) -> Self {
        self.leak_markers
            .entry(name.into())
            .or_default()
            .push(marker.into());
        self
    }
}

/// A compiled module ready for the artifact store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    /// Final bytes
    pub bytes: Vec<u8>,
    /// Shared modules the output resolves at load time
    pub external_names_used: BTreeSet<String>,
    /// Wall time spent compiling
    pub duration: Duration,
    /// Output format
    pub format: ModuleFormat,
}

impl CompiledModule {
    /// Output as text
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }

    /// Output length
    #[inline]
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }
}
