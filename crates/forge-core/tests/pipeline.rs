//! Jobs through repair, compile and storage

use forge_artifact::{ArtifactStore, ModuleFormat};
use forge_compiler::CompilePool;
use forge_core::{BuildPipeline, JobId, JobRequest, JobStatus, PipelineError, TRY_AGAIN};
use forge_test_utils::{
    test_registry, FlakyStore, BROKEN, COUNTER, DUPLICATE_FRAME, MISSING_EXPORT, PUBLIC_URL,
    QUOTED_MARKUP, REACT_MARKER, UNSHARED_IMPORT,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn pipeline() -> (BuildPipeline, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::new());
    let pipeline = BuildPipeline::new(store.clone(), CompilePool::new(2).unwrap(), test_registry());
    (pipeline, store)
}

#[tokio::test]
async fn clean_source_goes_straight_to_ready() {
    let (pipeline, store) = pipeline();
    let view = pipeline
        .submit_and_run(JobRequest::new("p1", COUNTER))
        .await
        .unwrap();

    assert_eq!(view.status, JobStatus::Ready);
    assert!(view.applied_fixes.is_empty());
    assert!(view
        .artifact_url
        .unwrap()
        .starts_with(&format!("{PUBLIC_URL}/artifacts/")));

    let job = pipeline.job(view.job_id).unwrap();
    assert_eq!(
        job.status_history,
        vec![
            JobStatus::Pending,
            JobStatus::Validating,
            JobStatus::Compiling,
            JobStatus::Ready
        ]
    );
    assert_eq!(job.repaired_text, None);
    assert!(job.last_attempt_at.is_some());

    let artifact = job.artifact.unwrap();
    let bytes = store.get(&artifact.content_hash).await.unwrap();
    let text = std::str::from_utf8(&bytes).unwrap();
    assert!(!text.contains(REACT_MARKER));
    assert!(artifact.external_names.contains("react"));

    let builds = pipeline.builds(view.job_id).await.unwrap();
    assert_eq!(builds.len(), 1);
    assert!(builds[0].success);
    assert_eq!(builds[0].content_hash, Some(artifact.content_hash));
}

#[tokio::test]
async fn duplicate_binding_fix_is_recorded_and_original_kept() {
    let (pipeline, _) = pipeline();
    let view = pipeline
        .submit_and_run(JobRequest::new("p1", DUPLICATE_FRAME))
        .await
        .unwrap();

    assert_eq!(view.status, JobStatus::Ready);
    assert_eq!(view.applied_fixes, vec!["removed duplicate binding".to_string()]);

    let job = pipeline.job(view.job_id).unwrap();
    assert_eq!(
        job.status_history,
        vec![
            JobStatus::Pending,
            JobStatus::Validating,
            JobStatus::Fixable,
            JobStatus::Fixing,
            JobStatus::Compiling,
            JobStatus::Ready
        ]
    );
    assert_eq!(job.source_text, DUPLICATE_FRAME);
    assert_ne!(job.repaired_text.as_deref(), Some(DUPLICATE_FRAME));
    assert!(job.artifact.unwrap().external_names.contains("remotion"));
}

#[tokio::test]
async fn escaped_markup_and_missing_export_sources_build() {
    let (pipeline, _) = pipeline();

    let markup = pipeline
        .submit_and_run(JobRequest::new("p1", QUOTED_MARKUP))
        .await
        .unwrap();
    assert_eq!(markup.status, JobStatus::Ready);
    assert_eq!(
        markup.applied_fixes,
        vec!["escaped markup characters in text".to_string()]
    );

    let export = pipeline
        .submit_and_run(JobRequest::new("p1", MISSING_EXPORT).with_export_name("Clip"))
        .await
        .unwrap();
    assert_eq!(export.status, JobStatus::Ready);
    assert_eq!(export.applied_fixes, vec!["added missing export".to_string()]);
}

#[tokio::test]
async fn unrepairable_source_fails_without_compiling() {
    let (pipeline, store) = pipeline();
    let view = pipeline
        .submit_and_run(JobRequest::new("p1", BROKEN))
        .await
        .unwrap();

    assert_eq!(view.status, JobStatus::Failed);
    assert!(view
        .error_text
        .as_deref()
        .unwrap()
        .starts_with("syntax error at line"));
    assert_eq!(view.artifact_url, None);
    assert_eq!(pipeline.job(view.job_id).unwrap().source_text, BROKEN);
    assert!(pipeline.builds(view.job_id).await.unwrap().is_empty());
    assert_eq!(store.stored(), 0);
}

#[tokio::test]
async fn compile_error_fails_with_diagnostic() {
    let (pipeline, _) = pipeline();
    let view = pipeline
        .submit_and_run(JobRequest::new("p1", UNSHARED_IMPORT))
        .await
        .unwrap();

    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(
        view.error_text.as_deref(),
        Some("unresolved import 'framer-motion': only shared modules can be imported")
    );

    let builds = pipeline.builds(view.job_id).await.unwrap();
    assert_eq!(builds.len(), 1);
    assert!(!builds[0].success);
}

#[tokio::test]
async fn storage_fault_is_retryable_and_retry_succeeds() {
    let (pipeline, store) = pipeline();
    store.fail_next_puts(1);

    let id = pipeline.submit(JobRequest::new("p1", COUNTER));
    let err = pipeline.run(id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));
    assert!(err.is_retryable());

    let failed = pipeline.status(id).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error_text.as_deref(), Some(TRY_AGAIN));

    let view = pipeline.retry(id, None).await.unwrap();
    assert_eq!(view.job_id, id);
    assert_eq!(view.status, JobStatus::Ready);
    assert_eq!(view.attempt, 2);
    assert_eq!(view.error_text, None);

    let builds = pipeline.builds(id).await.unwrap();
    let outcomes: Vec<_> = builds.iter().map(|b| (b.attempt, b.success)).collect();
    assert_eq!(outcomes, vec![(1, false), (2, true)]);
}

#[tokio::test]
async fn retry_with_revised_source_keeps_the_original() {
    let (pipeline, _) = pipeline();
    let id = pipeline.submit(JobRequest::new("p1", BROKEN));
    assert_eq!(pipeline.run(id).await.unwrap().status, JobStatus::Failed);

    let view = pipeline.retry(id, Some(COUNTER.to_string())).await.unwrap();
    assert_eq!(view.status, JobStatus::Ready);
    assert_eq!(view.attempt, 2);

    let job = pipeline.job(id).unwrap();
    assert_eq!(job.source_text, BROKEN);
    assert_eq!(job.revised_source.as_deref(), Some(COUNTER));
}

#[tokio::test]
async fn only_failed_jobs_are_retried() {
    let (pipeline, _) = pipeline();
    let view = pipeline
        .submit_and_run(JobRequest::new("p1", COUNTER))
        .await
        .unwrap();

    let err = pipeline.retry(view.job_id, None).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::NotRetryable {
            status: JobStatus::Ready,
            ..
        }
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn jobs_run_once_per_attempt() {
    let (pipeline, _) = pipeline();
    let id = pipeline.submit(JobRequest::new("p1", COUNTER));
    pipeline.run(id).await.unwrap();

    assert!(matches!(
        pipeline.run(id).await,
        Err(PipelineError::IllegalTransition {
            from: JobStatus::Ready,
            to: JobStatus::Validating
        })
    ));
    assert!(matches!(
        pipeline.run(JobId::new()).await,
        Err(PipelineError::UnknownJob(_))
    ));
}

#[tokio::test]
async fn legacy_job_registers_under_its_id() {
    let (pipeline, store) = pipeline();
    let source = "export default function Clip() { return <i>legacy</i>; }\n";
    let view = pipeline
        .submit_and_run(JobRequest::new("p1", source).with_format(ModuleFormat::GlobalSlot))
        .await
        .unwrap();

    assert_eq!(view.status, JobStatus::Ready);
    assert_eq!(view.applied_fixes, vec!["added global registration".to_string()]);

    let artifact = pipeline.job(view.job_id).unwrap().artifact.unwrap();
    assert_eq!(artifact.format, ModuleFormat::GlobalSlot);
    let bytes = store.get(&artifact.content_hash).await.unwrap();
    let text = std::str::from_utf8(&bytes).unwrap();
    assert!(text.contains(&format!("[\"{}\"] = Clip;", view.job_id)));
}

#[tokio::test]
async fn lost_build_record_does_not_fail_the_job() {
    let (pipeline, store) = pipeline();
    store.fail_records(true);

    let view = pipeline
        .submit_and_run(JobRequest::new("p1", COUNTER))
        .await
        .unwrap();
    assert_eq!(view.status, JobStatus::Ready);
    assert_eq!(store.stored(), 1);
}

#[tokio::test]
async fn concurrent_jobs_are_independent() {
    let (pipeline, _) = pipeline();
    let pipeline = Arc::new(pipeline);

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            let source = if i % 2 == 0 { COUNTER } else { BROKEN };
            tokio::spawn(async move {
                pipeline
                    .submit_and_run(JobRequest::new(format!("p{}", i % 2), source))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let ready = pipeline.project_jobs("p0");
    let failed = pipeline.project_jobs("p1");
    assert_eq!(ready.len(), 3);
    assert_eq!(failed.len(), 3);
    assert!(ready.iter().all(|v| v.status == JobStatus::Ready));
    assert!(failed.iter().all(|v| v.status == JobStatus::Failed));
    assert_eq!(pipeline.pool_stats().completed, 3);
}
