//! Component jobs and their lifecycle

use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use forge_artifact::{CompiledArtifact, ModuleFormat};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use ulid::Ulid;

/// Job identifier (ULID, sortable by creation time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Ulid);

impl JobId {
    /// Fresh id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Where a job is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Submitted, not started
    Pending,
    /// Source being checked
    Validating,
    /// Defects found that the repairer can fix
    Fixable,
    /// Repairs being applied
    Fixing,
    /// On the compile pool
    Compiling,
    /// Artifact stored
    Ready,
    /// Gave up; see the error text
    Failed,
}

impl JobStatus {
    /// Statuses reachable from `self`
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [JobStatus] {
        use JobStatus::*;
        match self {
            Pending => &[Validating],
            Validating => &[Fixable, Compiling, Failed],
            Fixable => &[Fixing],
            Fixing => &[Compiling, Failed],
            Compiling => &[Ready, Failed],
            Ready => &[],
            Failed => &[Pending],
        }
    }

    /// Whether the job is done with its current attempt
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Wire spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Fixable => "fixable",
            Self::Fixing => "fixing",
            Self::Compiling => "compiling",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a status change.
///
/// # Errors
/// [`PipelineError::IllegalTransition`] when `to` is not reachable from `from`.
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), PipelineError> {
    if from.allowed_transitions().contains(&to) {
        Ok(())
    } else {
        Err(PipelineError::IllegalTransition { from, to })
    }
}

/// What a caller submits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    /// Owning project
    pub project_id: String,
    /// Generated TSX
    pub source_text: String,
    /// Export that should hold the component
    pub export_name: String,
    /// Output format
    pub format: ModuleFormat,
}

impl JobRequest {
    /// Request for a default-exported ES module
    #[must_use]
    pub fn new(project_id: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            source_text: source_text.into(),
            export_name: "default".to_string(),
            format: ModuleFormat::Module,
        }
    }

    /// With the expected export
    #[inline]
    #[must_use]
    pub fn with_export_name(mut self, name: impl Into<String>) -> Self {
        self.export_name = name.into();
        self
    }

    /// With the output format
    #[inline]
    #[must_use]
    pub fn with_format(mut self, format: ModuleFormat) -> Self {
        self.format = format;
        self
    }
}

/// One component build, across all of its attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentJob {
    /// Identifier
    pub id: JobId,
    /// Owning project
    pub project_id: String,
    /// Source as first submitted; never changed
    pub source_text: String,
    /// Regenerated source supplied with a retry
    pub revised_source: Option<String>,
    /// Output of the repairer for the latest attempt
    pub repaired_text: Option<String>,
    /// Export that should hold the component
    pub export_name: String,
    /// Output format
    pub format: ModuleFormat,
    /// Current status
    pub status: JobStatus,
    /// Statuses of the current attempt, in order
    pub status_history: Vec<JobStatus>,
    /// Failure text
    pub error_text: Option<String>,
    /// Fix messages of the current attempt, in order
    pub applied_fixes: Vec<String>,
    /// Repair warnings of the current attempt
    pub warnings: Vec<String>,
    /// Attempt counter, starting at 1
    pub attempt: u32,
    /// Start of the latest attempt
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Stored artifact once ready
    pub artifact: Option<CompiledArtifact>,
}

impl ComponentJob {
    /// New pending job
    #[must_use]
    pub fn new(request: JobRequest) -> Self {
        Self {
            id: JobId::new(),
            project_id: request.project_id,
            source_text: request.source_text,
            revised_source: None,
            repaired_text: None,
            export_name: request.export_name,
            format: request.format,
            status: JobStatus::Pending,
            status_history: vec![JobStatus::Pending],
            error_text: None,
            applied_fixes: Vec::new(),
            warnings: Vec::new(),
            attempt: 1,
            last_attempt_at: None,
            created_at: Utc::now(),
            artifact: None,
        }
    }

    /// Source the next attempt builds from
    #[inline]
    #[must_use]
    pub fn effective_source(&self) -> &str {
        self.revised_source.as_deref().unwrap_or(&self.source_text)
    }

    /// Move to `to`, recording it in the history
    ///
    /// # Errors
    /// [`PipelineError::IllegalTransition`] when the lifecycle forbids it.
    pub fn transition(&mut self, to: JobStatus) -> Result<(), PipelineError> {
        validate_transition(self.status, to)?;
        self.status = to;
        self.status_history.push(to);
        Ok(())
    }

    /// Move to `Failed` with `text`
    ///
    /// # Errors
    /// See [`ComponentJob::transition`].
    pub fn fail(&mut self, text: impl Into<String>) -> Result<(), PipelineError> {
        self.transition(JobStatus::Failed)?;
        self.error_text = Some(text.into());
        Ok(())
    }

    /// Start a new attempt of a failed job
    ///
    /// # Errors
    /// [`PipelineError::NotRetryable`] unless the job is `Failed`.
    pub fn begin_retry(&mut self, revised_source: Option<String>) -> Result<(), PipelineError> {
        if self.status != JobStatus::Failed {
            return Err(PipelineError::NotRetryable {
                id: self.id,
                status: self.status,
            });
        }
        self.status = JobStatus::Pending;
        self.status_history = vec![JobStatus::Pending];
        self.attempt += 1;
        self.error_text = None;
        self.applied_fixes.clear();
        self.warnings.clear();
        self.repaired_text = None;
        self.artifact = None;
        if revised_source.is_some() {
            self.revised_source = revised_source;
        }
        Ok(())
    }

    /// Status surface for this job
    #[must_use]
    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            status: self.status,
            error_text: self.error_text.clone(),
            applied_fixes: self.applied_fixes.clone(),
            warnings: self.warnings.clone(),
            artifact_url: self.artifact.as_ref().map(|a| a.storage_url.clone()),
            attempt: self.attempt,
        }
    }
}

/// What the outer layers (chat, preview) read about a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    /// Job
    pub job_id: JobId,
    /// Current status
    pub status: JobStatus,
    /// Failure text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    /// Fix messages, in order
    pub applied_fixes: Vec<String>,
    /// Repair warnings
    pub warnings: Vec<String>,
    /// Artifact URL once ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    /// Attempt counter
    pub attempt: u32,
}
