//! Load errors

use forge_artifact::ContentHash;
use forge_registry::RegistryError;

/// Why one load attempt failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// URL could not be parsed or is not http(s)
    #[error("invalid module url '{url}': {reason}")]
    InvalidUrl {
        /// URL as given
        url: String,
        /// Parser message
        reason: String,
    },

    /// Connection, timeout or body read failure
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("fetching {url} returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Response was not JavaScript
    #[error("expected a javascript module, got content type '{found}'")]
    ContentType {
        /// Content type received
        found: String,
    },

    /// Bytes do not hash to the address in the URL
    #[error("module does not match its content address {expected}")]
    Integrity {
        /// Hash named by the URL
        expected: ContentHash,
    },

    /// Module text does not parse
    #[error("module failed to parse: {0}")]
    Parse(String),

    /// Nothing usable as a component was exported
    #[error("no component export: {0}")]
    NoComponent(String),

    /// Legacy module never attached itself to its slot
    #[error("legacy module did not register a component{}", slot_suffix(.slot))]
    MissingRegistration {
        /// Expected slot
        slot: Option<String>,
    },

    /// Module needs a shared instance the host never registered
    #[error("shared module '{0}' is not registered")]
    SharedMissing(String),
}

fn slot_suffix(slot: &Option<String>) -> String {
    slot.as_ref()
        .map(|s| format!(" under '{s}'"))
        .unwrap_or_default()
}

impl LoadError {
    /// Whether another attempt could succeed without anything changing
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}

impl From<RegistryError> for LoadError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(name) | RegistryError::TypeMismatch { name, .. } => {
                Self::SharedMissing(name)
            }
        }
    }
}
