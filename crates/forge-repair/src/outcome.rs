//! Repair inputs and outputs

use serde::{Deserialize, Serialize};

/// Fix messages reported in [`RepairOutcome::applied_fixes`]
pub mod fixes {
    /// A `const`/`let` redeclaring a name in the same scope was disabled
    pub const DUPLICATE_BINDING: &str = "removed duplicate binding";
    /// Markup characters in JSX text or attribute strings were escaped
    pub const MARKUP_ESCAPE: &str = "escaped markup characters in text";
    /// A `window.X = C` style registration was turned into a module export
    pub const REGISTRATION_TO_EXPORT: &str = "replaced global registration with module export";
    /// A keyed global registration was appended for legacy loading
    pub const REGISTRATION_ADDED: &str = "added global registration";
    /// An export for an existing top-level declaration was appended
    pub const MISSING_EXPORT: &str = "added missing export";
}

/// How the repaired module will expose its component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RepairMode {
    /// Import-based: the component is an `export`
    #[default]
    Module,
    /// Legacy: the component attaches itself to the keyed global table
    GlobalSlot {
        /// Key in the global component table
        slot: String,
    },
}

/// What the caller expects of the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOptions {
    /// Expected export. `"default"` accepts any default export.
    pub export_name: String,
    /// Module or legacy global-slot output
    #[serde(default)]
    pub mode: RepairMode,
}

impl RepairOptions {
    /// Import-based module exporting `export_name`
    #[must_use]
    pub fn module(export_name: impl Into<String>) -> Self {
        Self {
            export_name: export_name.into(),
            mode: RepairMode::Module,
        }
    }

    /// Legacy global-slot script registering under `slot`
    #[must_use]
    pub fn global_slot(export_name: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            export_name: export_name.into(),
            mode: RepairMode::GlobalSlot { slot: slot.into() },
        }
    }

    /// Whether any default export satisfies the caller
    #[inline]
    #[must_use]
    pub fn wants_default(&self) -> bool {
        self.export_name == "default"
    }
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self::module("default")
    }
}

/// Result of [`crate::repair`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutcome {
    /// Source after all passes
    pub repaired_text: String,
    /// Fix messages in application order, without duplicates
    pub applied_fixes: Vec<String>,
    /// Non-blocking findings
    pub warnings: Vec<String>,
    /// Whether the repaired text still fails to parse
    pub still_invalid: bool,
    /// First parse problem, `line L, column C: ...`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl RepairOutcome {
    /// Whether any pass changed the text
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.applied_fixes.is_empty()
    }
}
