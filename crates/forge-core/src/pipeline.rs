//! Build pipeline
//!
//! Drives one job through repair, compile and storage:
//!
//! ```text
//! Pending → Validating ─┬─────────────────→ Compiling → Ready
//!                       ├→ Fixable → Fixing ┘    │
//!                       └→ Failed ←──────────────┘
//! ```

use crate::config::ForgeConfig;
use crate::error::{PipelineError, TRY_AGAIN};
use crate::job::{ComponentJob, JobId, JobRequest, JobStatus, JobStatusView};
use chrono::Utc;
use dashmap::DashMap;
use forge_artifact::{ArtifactStore, BuildMetadata, BuildRecord, CompiledArtifact, ModuleFormat};
use forge_compiler::{CompileError, CompileOptions, CompilePool, PoolStats};
use forge_registry::SharedRegistry;
use forge_repair::{repair, RepairOptions, RepairOutcome};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Owns the jobs and the resources they are built with
pub struct BuildPipeline {
    jobs: DashMap<JobId, ComponentJob>,
    store: Arc<dyn ArtifactStore>,
    pool: CompilePool,
    registry: Arc<SharedRegistry>,
    jsx_runtime: String,
}

impl std::fmt::Debug for BuildPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildPipeline")
            .field("jobs", &self.jobs.len())
            .field("pool", &self.pool)
            .field("shared", &self.registry.list_names())
            .finish_non_exhaustive()
    }
}

impl BuildPipeline {
    /// Pipeline over existing resources
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>, pool: CompilePool, registry: Arc<SharedRegistry>) -> Self {
        Self {
            jobs: DashMap::new(),
            store,
            pool,
            registry,
            jsx_runtime: "react".to_string(),
        }
    }

    /// Pipeline with the store and pool described by `config`.
    ///
    /// Shared declarations are not registered here; see
    /// [`ForgeConfig::register_shared`].
    ///
    /// # Errors
    /// [`PipelineError::Storage`] when the store root cannot be opened,
    /// [`PipelineError::Pool`] when the workers cannot be started.
    pub fn from_config(config: &ForgeConfig, registry: Arc<SharedRegistry>) -> Result<Self, PipelineError> {
        let store = config.open_store()?;
        let pool = CompilePool::new(config.worker_count()).map_err(PipelineError::Pool)?;
        Ok(Self::new(store, pool, registry).with_jsx_runtime(config.compile.jsx_runtime.clone()))
    }

    /// With a different JSX runtime module
    #[inline]
    #[must_use]
    pub fn with_jsx_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.jsx_runtime = runtime.into();
        self
    }

    /// Artifact store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Shared registry consulted by the compiler
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<SharedRegistry> {
        &self.registry
    }

    /// Compile pool counters
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Number of jobs known
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no job was submitted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Register a pending job
    pub fn submit(&self, request: JobRequest) -> JobId {
        let job = ComponentJob::new(request);
        let id = job.id;
        info!(job = %id, project = %job.project_id, format = %job.format, "job submitted");
        self.jobs.insert(id, job);
        id
    }

    /// Submit and run to a terminal status
    ///
    /// # Errors
    /// See [`BuildPipeline::run`].
    pub async fn submit_and_run(&self, request: JobRequest) -> Result<JobStatusView, PipelineError> {
        let id = self.submit(request);
        self.run(id).await
    }

    /// Snapshot of a job
    #[must_use]
    pub fn job(&self, id: JobId) -> Option<ComponentJob> {
        self.jobs.get(&id).map(|job| job.clone())
    }

    /// Status surface of a job
    ///
    /// # Errors
    /// [`PipelineError::UnknownJob`].
    pub fn status(&self, id: JobId) -> Result<JobStatusView, PipelineError> {
        self.jobs
            .get(&id)
            .map(|job| job.view())
            .ok_or(PipelineError::UnknownJob(id))
    }

    /// Status of every job of `project_id`, oldest first
    #[must_use]
    pub fn project_jobs(&self, project_id: &str) -> Vec<JobStatusView> {
        let mut jobs: Vec<_> = self
            .jobs
            .iter()
            .filter(|job| job.project_id == project_id)
            .map(|job| job.view())
            .collect();
        jobs.sort_by_key(|view| view.job_id);
        jobs
    }

    /// Build records of a job, oldest first
    ///
    /// # Errors
    /// [`PipelineError::Storage`] when the build log cannot be read.
    pub async fn builds(&self, id: JobId) -> Result<Vec<BuildRecord>, PipelineError> {
        Ok(self.store.builds(&id.to_string()).await?)
    }

    /// Run the current attempt of a pending job to `Ready` or `Failed`.
    ///
    /// Source and compile problems end the job as `Failed` with a diagnostic
    /// and still return `Ok`. Infrastructure faults also fail the job, with
    /// [`TRY_AGAIN`] as its text, and are returned as errors.
    ///
    /// # Errors
    /// [`PipelineError::UnknownJob`], [`PipelineError::IllegalTransition`]
    /// when the job is not pending, [`PipelineError::Storage`] and
    /// [`PipelineError::Pool`].
    #[tracing::instrument(skip(self), fields(job = %id))]
    pub async fn run(&self, id: JobId) -> Result<JobStatusView, PipelineError> {
        let (source, repair_options, format, attempt) = self.update(id, |job| {
            job.transition(JobStatus::Validating)?;
            job.last_attempt_at = Some(Utc::now());
            let options = match job.format {
                ModuleFormat::Module => RepairOptions::module(job.export_name.clone()),
                ModuleFormat::GlobalSlot => {
                    RepairOptions::global_slot(job.export_name.clone(), job.id.to_string())
                }
            };
            Ok((job.effective_source().to_string(), options, job.format, job.attempt))
        })?;

        let outcome = repair(&source, &repair_options);
        self.update(id, |job| apply_repair(job, &outcome))?;
        if outcome.still_invalid {
            info!(attempt, "source could not be repaired");
            return self.status(id);
        }

        let mut options = CompileOptions::from_registry(&self.registry)
            .with_format(format)
            .with_jsx_runtime(self.jsx_runtime.clone());
        if format == ModuleFormat::GlobalSlot {
            options = options.with_slot_key(id.to_string());
        }

        let started = Instant::now();
        let module = match self.pool.compile(outcome.repaired_text, options).await {
            Ok(module) => module,
            Err(err) => return self.compile_failed(id, attempt, started, err).await,
        };

        let metadata = BuildMetadata::new(module.format, module.external_names_used.iter().cloned());
        match self.store.put(&id.to_string(), module.bytes, metadata).await {
            Ok(artifact) => {
                self.record(BuildRecord::succeeded(attempt, &artifact, elapsed_ms(started)))
                    .await;
                info!(attempt, hash = %artifact.content_hash, url = %artifact.storage_url, "job ready");
                self.update(id, |job| finish(job, artifact))?;
                self.status(id)
            }
            Err(err) => {
                warn!(attempt, error = %err, "artifact store rejected build");
                self.record(BuildRecord::failed(id.to_string(), attempt, err.to_string(), elapsed_ms(started)))
                    .await;
                self.update(id, |job| job.fail(TRY_AGAIN))?;
                Err(PipelineError::Storage(err))
            }
        }
    }

    /// Start a new attempt of a failed job and run it.
    ///
    /// `revised_source` replaces the source the attempt builds from; the
    /// originally submitted text is kept.
    ///
    /// # Errors
    /// [`PipelineError::NotRetryable`] unless the job is `Failed`, then as
    /// [`BuildPipeline::run`].
    pub async fn retry(
        &self,
        id: JobId,
        revised_source: Option<String>,
    ) -> Result<JobStatusView, PipelineError> {
        let attempt = self.update(id, |job| {
            job.begin_retry(revised_source)?;
            Ok(job.attempt)
        })?;
        info!(job = %id, attempt, "retrying job");
        self.run(id).await
    }

    async fn compile_failed(
        &self,
        id: JobId,
        attempt: u32,
        started: Instant,
        err: CompileError,
    ) -> Result<JobStatusView, PipelineError> {
        self.record(BuildRecord::failed(id.to_string(), attempt, err.to_string(), elapsed_ms(started)))
            .await;
        if err.is_infrastructure() {
            warn!(attempt, error = %err, "compile pool fault");
            self.update(id, |job| job.fail(TRY_AGAIN))?;
            return Err(PipelineError::Pool(err));
        }
        info!(attempt, error = %err, "compile failed");
        self.update(id, |job| job.fail(err.to_string()))?;
        self.status(id)
    }

    async fn record(&self, record: BuildRecord) {
        if let Err(err) = self.store.record_build(record).await {
            warn!(error = %err, "failed to append build record");
        }
    }

    /// Mutate a job under its map guard; the guard never lives across an await
    fn update<R>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut ComponentJob) -> Result<R, PipelineError>,
    ) -> Result<R, PipelineError> {
        let mut job = self.jobs.get_mut(&id).ok_or(PipelineError::UnknownJob(id))?;
        f(&mut job)
    }
}

fn apply_repair(job: &mut ComponentJob, outcome: &RepairOutcome) -> Result<(), PipelineError> {
    job.warnings.clone_from(&outcome.warnings);
    job.repaired_text = outcome.changed().then(|| outcome.repaired_text.clone());
    if !outcome.applied_fixes.is_empty() {
        job.transition(JobStatus::Fixable)?;
        job.transition(JobStatus::Fixing)?;
        job.applied_fixes.clone_from(&outcome.applied_fixes);
    }
    if outcome.still_invalid {
        let text = outcome
            .parse_error
            .clone()
            .unwrap_or_else(|| "source does not parse".to_string());
        job.fail(format!("syntax error at {text}"))
    } else {
        job.transition(JobStatus::Compiling)
    }
}

fn finish(job: &mut ComponentJob, artifact: CompiledArtifact) -> Result<(), PipelineError> {
    job.transition(JobStatus::Ready)?;
    job.artifact = Some(artifact);
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
