//! Tracing subscriber setup for Forge binaries.
//!
//! Call [`init_tracing`] once at startup. `RUST_LOG` wins over the default
//! level; later calls are ignored because the global subscriber can only be
//! set once per process.

use std::fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as layer_fmt, EnvFilter};

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// Newline-delimited JSON
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

/// Install the global subscriber.
///
/// Targets stay on so repair fixes can be filtered with
/// `RUST_LOG=forge_repair=info`.
pub fn init_tracing(format: LogFormat, default_level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.as_str()));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(layer_fmt::layer().json())
            .try_init()
            .ok(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(layer_fmt::layer())
            .try_init()
            .ok(),
    };
}
