//! Asynchronous export jobs.
//!
//! [`ExportOrchestrator::enqueue`] registers a job and returns immediately;
//! workers run the [`ExportPipeline`] on the blocking thread pool, at most
//! `max_concurrent` at a time. While a job for an input key is queued or
//! active, enqueueing the same key returns that job's id instead of
//! starting another export.

mod job;
mod store;
mod sweep;

pub use job::{ExportJob, JobStatus, START_PROGRESS};
pub use store::{Insertion, JobStore, MemoryJobStore};
pub use sweep::{spawn_sweeper, sweep_exports, sweep_once, SweepReport};

use crate::error::{ExportError, Result};
use crate::pipeline::{ExportPipeline, ExportRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Job front end over a shared [`ExportPipeline`].
#[derive(Clone)]
pub struct ExportOrchestrator {
    pipeline: Arc<ExportPipeline>,
    store: Arc<dyn JobStore>,
    permits: Arc<Semaphore>,
}

impl ExportOrchestrator {
    /// Orchestrator with an in-memory job store.
    pub fn new(pipeline: ExportPipeline) -> Self {
        Self::with_store(pipeline, Arc::new(MemoryJobStore::new()))
    }

    pub fn with_store(pipeline: ExportPipeline, store: Arc<dyn JobStore>) -> Self {
        let workers = pipeline.config().max_concurrent.max(1);
        Self {
            pipeline: Arc::new(pipeline),
            store,
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    /// Queue an export and return its job id, or the id of the job already
    /// pending for the same input key.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn enqueue(&self, request: ExportRequest) -> Result<String> {
        if request.input_key.trim().is_empty() {
            return Err(ExportError::Job("input key is empty".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        match self.store.insert_if_absent(ExportJob::new(&id, &request)) {
            Insertion::Existing(existing) => {
                tracing::debug!(job_id = %existing, input_key = %request.input_key, "export already pending");
                return Ok(existing);
            }
            Insertion::Inserted => {}
        }

        tracing::info!(job_id = %id, input_key = %request.input_key, "export queued");
        tokio::spawn(run_job(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.store),
            Arc::clone(&self.permits),
            id.clone(),
            request.with_job_id(id.clone()),
        ));
        Ok(id)
    }

    /// Current state of a job.
    pub async fn status(&self, id: &str) -> Result<ExportJob> {
        self.store
            .get(id)
            .ok_or_else(|| ExportError::Job(format!("unknown job {}", id)))
    }

    /// Poll a job every `poll` until it has finished.
    pub async fn wait(&self, id: &str, poll: Duration) -> Result<ExportJob> {
        loop {
            let job = self.status(id).await?;
            if job.status.is_finished() {
                return Ok(job);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Start the periodic cleanup of expired jobs and exports.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        spawn_sweeper(self.pipeline.config().clone(), Arc::clone(&self.store))
    }
}

async fn run_job(
    pipeline: Arc<ExportPipeline>,
    store: Arc<dyn JobStore>,
    permits: Arc<Semaphore>,
    id: String,
    request: ExportRequest,
) {
    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            store.update(&id, &mut |job| {
                job.fail("worker pool is shut down");
            });
            return;
        }
    };

    store.update(&id, &mut |job| {
        job.start();
    });
    tracing::info!(job_id = %id, "export started");

    let worker_store = Arc::clone(&store);
    let worker_id = id.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        pipeline.run(&request, &mut |percent, message| {
            worker_store.update(&worker_id, &mut |job| job.report_progress(percent, message));
            tracing::debug!(job_id = %worker_id, percent, step = message, "export progress");
        })
    })
    .await;

    match outcome {
        Ok(Ok(result)) => {
            tracing::info!(job_id = %id, export_id = %result.export_id, warnings = result.warnings.len(), "export completed");
            let mut result = Some(result);
            store.update(&id, &mut |job| {
                if let Some(result) = result.take() {
                    job.complete(result);
                }
            });
        }
        Ok(Err(e)) => {
            tracing::error!(job_id = %id, stage = ?e.stage(), error = %e, "export failed");
            store.update(&id, &mut |job| {
                job.fail(e.to_string());
            });
        }
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "export worker panicked");
            store.update(&id, &mut |job| {
                job.fail(format!("export worker failed: {}", e));
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::pipeline::tests::{room_snapshot, MemoryScenes, NoTextures};
    use crate::source::FsModelSource;
    use std::collections::HashMap;
    use std::path::Path;

    fn orchestrator(root: &Path) -> ExportOrchestrator {
        let models_dir = root.join("models");
        std::fs::create_dir_all(&models_dir).unwrap();
        let mut scenes = HashMap::new();
        scenes.insert("room".to_string(), room_snapshot(&models_dir));

        let config = ExportConfig::default().with_export_root(root.join("exports"));
        let pipeline = ExportPipeline::new(config, MemoryScenes(scenes), FsModelSource::new(models_dir), NoTextures)
            .unwrap()
            .with_converter(None);
        ExportOrchestrator::new(pipeline)
    }

    #[tokio::test]
    async fn test_enqueue_runs_export_with_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let id = orchestrator.enqueue(ExportRequest::new("room")).await.unwrap();
        let job = orchestrator.wait(&id, Duration::from_millis(10)).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.finished_at.is_some());
        let result = job.result.unwrap();
        assert!(result.primary.path.is_file());
        assert!(result.warnings.iter().any(|w| w.contains("item ghost")));
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_returns_same_job() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let first = orchestrator.enqueue(ExportRequest::new("room")).await.unwrap();
        let second = orchestrator.enqueue(ExportRequest::new("room")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(orchestrator.store().len(), 1);

        orchestrator.wait(&first, Duration::from_millis(10)).await.unwrap();
        let third = orchestrator.enqueue(ExportRequest::new("room")).await.unwrap();
        assert_ne!(first, third);
        orchestrator.wait(&third, Duration::from_millis(10)).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_export_reports_stage() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let id = orchestrator.enqueue(ExportRequest::new("unknown")).await.unwrap();
        let job = orchestrator.wait(&id, Duration::from_millis(10)).await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().starts_with("snapshot stage failed"));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_unknown_job_status() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        assert!(matches!(orchestrator.status("nope").await, Err(ExportError::Job(_))));
        assert!(orchestrator.enqueue(ExportRequest::new("  ")).await.is_err());
    }
}
