//! Compile errors

use forge_syntax::SyntaxIssue;

/// Why a compile produced no module
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Source does not parse
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// 1-based line
        line: usize,
        /// 1-based column
        column: usize,
        /// Parser message
        message: String,
    },

    /// Import of a module that is neither shared nor bundleable
    #[error("unresolved import '{specifier}': only shared modules can be imported")]
    UnresolvedImport {
        /// Import specifier
        specifier: String,
    },

    /// JSX used but the JSX runtime is not a shared module
    #[error("jsx requires '{runtime}' to be registered as a shared module")]
    MissingJsxRuntime {
        /// Configured runtime name
        runtime: String,
    },

    /// Construct the compiler does not lower
    #[error("unsupported {construct} at line {line}")]
    Unsupported {
        /// What was found
        construct: &'static str,
        /// 1-based line
        line: usize,
    },

    /// Legacy output requested but the source never registers itself
    #[error("global-slot output requires a registration in __FORGE_COMPONENTS__{}", slot_suffix(.slot))]
    MissingRegistration {
        /// Expected slot, when one was configured
        slot: Option<String>,
    },

    /// Code of a shared module ended up in the output
    #[error("shared module '{name}' was bundled: found marker '{marker}' in output")]
    ExternalLeak {
        /// Shared module name
        name: String,
        /// Marker found
        marker: String,
    },

    /// The worker running the compile died
    #[error("compile worker lost: {0}")]
    WorkerLost(String),

    /// Parser or pool could not be set up
    #[error("compiler unavailable: {0}")]
    Internal(String),
}

fn slot_suffix(slot: &Option<String>) -> String {
    slot.as_ref()
        .map(|s| format!(" for slot '{s}'"))
        .unwrap_or_default()
}

impl CompileError {
    /// Syntax error from a parse issue
    #[must_use]
    pub fn syntax(issue: SyntaxIssue) -> Self {
        Self::Syntax {
            line: issue.line,
            column: issue.column,
            message: issue.message,
        }
    }

    /// Whether the failure is the compiler's fault rather than the source's
    #[inline]
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::WorkerLost(_) | Self::Internal(_))
    }
}
