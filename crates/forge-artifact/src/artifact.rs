//! Artifact records, module formats and build metadata

use crate::hash::ContentHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// How a compiled module exposes its component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleFormat {
    /// ES module with `export` statements
    #[default]
    Module,
    /// Legacy script that attaches the component to a keyed global table
    GlobalSlot,
}

impl ModuleFormat {
    /// Header/config spelling
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::GlobalSlot => "global-slot",
        }
    }
}

impl Display for ModuleFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "module" | "esm" => Ok(Self::Module),
            "global-slot" | "global" => Ok(Self::GlobalSlot),
            other => Err(format!("unknown module format '{other}'")),
        }
    }
}

/// First-line comment every compiled module carries.
///
/// `/* forge-module format=module externals=react,react-dom */`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleHeader {
    /// Output format
    pub format: ModuleFormat,
    /// Names the module resolves from the shared registry
    pub externals: BTreeSet<String>,
}

impl ModuleHeader {
    const OPEN: &'static str = "/* forge-module ";
    const CLOSE: &'static str = " */";

    /// Header line without trailing newline
    #[must_use]
    pub fn render(&self) -> String {
        let externals: Vec<&str> = self.externals.iter().map(String::as_str).collect();
        format!(
            "{}format={} externals={}{}",
            Self::OPEN,
            self.format,
            externals.join(","),
            Self::CLOSE
        )
    }

    /// Read the header from the start of `text`
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let line = text.trim_start_matches('\u{feff}').lines().next()?;
        let body = line.strip_prefix(Self::OPEN)?.strip_suffix(Self::CLOSE)?;

        let mut header = Self::default();
        let mut saw_format = false;
        for field in body.split_whitespace() {
            let (key, value) = field.split_once('=')?;
            match key {
                "format" => {
                    header.format = value.parse().ok()?;
                    saw_format = true;
                }
                "externals" => {
                    header.externals = value
                        .split(',')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                _ => {}
            }
        }
        saw_format.then_some(header)
    }
}

/// What the caller knows about bytes handed to the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMetadata {
    /// Output format of the module
    pub format: ModuleFormat,
    /// Shared names the module resolves at load time
    pub external_names: BTreeSet<String>,
}

impl BuildMetadata {
    /// Metadata for `format` with the given externals
    #[must_use]
    pub fn new<I, S>(format: ModuleFormat, external_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            format,
            external_names: external_names.into_iter().map(Into::into).collect(),
        }
    }
}

/// A stored, immutable compiled module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArtifact {
    /// Blake3 of the stored bytes
    pub content_hash: ContentHash,
    /// Job that produced this record
    pub job_id: String,
    /// Output format
    pub format: ModuleFormat,
    /// Shared names resolved at load time
    pub external_names: BTreeSet<String>,
    /// Length of the stored bytes
    pub byte_size: u64,
    /// When this record was produced
    pub created_at: DateTime<Utc>,
    /// Stable URL the loader fetches
    pub storage_url: String,
}

/// Outcome of one compile attempt, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    /// Job the attempt belongs to
    pub job_id: String,
    /// 1-based attempt number
    pub attempt: u32,
    /// Whether an artifact was produced
    pub success: bool,
    /// Failure text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    /// Hash of the produced artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<ContentHash>,
    /// Size of the produced artifact (0 on failure)
    pub byte_size: u64,
    /// Wall time of the attempt
    pub duration_ms: u64,
    /// Externals of the produced artifact
    #[serde(default)]
    pub external_names: BTreeSet<String>,
    /// When the record was written
    pub recorded_at: DateTime<Utc>,
}

impl BuildRecord {
    /// Record a successful attempt
    #[must_use]
    pub fn succeeded(attempt: u32, artifact: &CompiledArtifact, duration_ms: u64) -> Self {
        Self {
            job_id: artifact.job_id.clone(),
            attempt,
            success: true,
            error_text: None,
            content_hash: Some(artifact.content_hash),
            byte_size: artifact.byte_size,
            duration_ms,
            external_names: artifact.external_names.clone(),
            recorded_at: Utc::now(),
        }
    }

    /// Record a failed attempt
    #[must_use]
    pub fn failed(
        job_id: impl Into<String>,
        attempt: u32,
        error_text: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            attempt,
            success: false,
            error_text: Some(error_text.into()),
            content_hash: None,
            byte_size: 0,
            duration_ms,
            external_names: BTreeSet::new(),
            recorded_at: Utc::now(),
        }
    }
}

/// `{base}/artifacts/{hex}.js`
#[must_use]
pub fn artifact_url(public_base_url: &str, hash: &ContentHash) -> String {
    format!("{}/artifacts/{}.js", public_base_url.trim_end_matches('/'), hash)
}
