use crate::actors::coordinator::{CancelOutcome, JobCoordinatorHandle};
use crate::config::OrchestratorConfig;
use crate::errors::{JobError, Result};
use crate::events::{JobSnapshot, JobStatus};
use crate::gc;
use crate::invoker::ProcessInvoker;
use crate::record::JobRecord;
use crate::store::{InMemoryJobStore, JobStore};
use crate::types::{JobId, JobParameters};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};
use tokio_util::sync::CancellationToken;

/// A job's snapshots from the moment of subscription until it reaches a terminal state.
pub type ProgressStream = UnboundedReceiverStream<JobSnapshot>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobCreated {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CancelAccepted {
    pub accepted: bool,
}

/// The operations a transport layer exposes to clients.
///
/// Reads go straight to the store; everything that changes scheduling goes through the coordinator.
#[derive(Clone)]
pub struct JobApi {
    coordinator: JobCoordinatorHandle,
    store: Arc<dyn JobStore>,
}

impl JobApi {
    pub fn new(coordinator: JobCoordinatorHandle, store: Arc<dyn JobStore>) -> Self {
        Self { coordinator, store }
    }

    /// Wire up an in-memory store, the process invoker, the coordinator and the periodic
    /// garbage collector. The collector stops when `shutdown` is cancelled.
    pub fn launch(config: &OrchestratorConfig, shutdown: CancellationToken) -> Self {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let invoker = Arc::new(ProcessInvoker::new(config.worker.clone()));
        let coordinator =
            JobCoordinatorHandle::spawn(config.scheduler.clone(), store.clone(), invoker);
        gc::spawn_collector(coordinator.clone(), &config.collector, shutdown);
        tracing::info!(
            max_concurrent_jobs = config.scheduler.max_concurrent_jobs,
            worker = %config.worker.program,
            "job orchestrator started"
        );
        Self::new(coordinator, store)
    }

    pub fn coordinator(&self) -> &JobCoordinatorHandle {
        &self.coordinator
    }

    /// Validate and submit a job. The returned status is `pending` or `running`; a worker that
    /// fails to start only shows up in a later [`JobApi::status`].
    pub async fn create(&self, parameters: JobParameters) -> Result<JobCreated> {
        parameters.validate()?;
        let (job_id, status) = self.coordinator.submit(parameters).await?;
        Ok(JobCreated { job_id, status })
    }

    pub fn status(&self, job_id: JobId) -> Result<JobSnapshot> {
        Ok(self.store.get(&job_id)?.snapshot())
    }

    /// The full record, including the worker's log lines.
    pub fn record(&self, job_id: JobId) -> Result<JobRecord> {
        self.store.get(&job_id)
    }

    pub fn list(&self, limit: usize) -> Vec<JobRecord> {
        self.store.list(limit)
    }

    pub async fn stream(&self, job_id: JobId) -> Result<ProgressStream> {
        let receiver = self.coordinator.subscribe(job_id).await?;
        Ok(UnboundedReceiverStream::new(receiver))
    }

    pub fn artifact(&self, job_id: JobId) -> Result<PathBuf> {
        let record = self.store.get(&job_id)?;
        match (record.status, record.output_artifact_path) {
            (JobStatus::Completed, Some(path)) => Ok(path),
            (status, _) if !status.is_terminal() => Err(JobError::NotReady),
            _ => Err(JobError::NotFound),
        }
    }

    pub async fn cancel(&self, job_id: JobId) -> Result<CancelAccepted> {
        let outcome = self.coordinator.cancel(job_id).await?;
        Ok(CancelAccepted {
            accepted: outcome != CancelOutcome::AlreadyFinished,
        })
    }

    /// Wait for the job to finish. With a `timeout`, the job is cancelled once it expires.
    pub async fn await_terminal(
        &self,
        job_id: JobId,
        timeout: Option<Duration>,
    ) -> Result<JobSnapshot> {
        let mut stream = self.stream(job_id).await?;
        let finished = async {
            let mut last = None;
            while let Some(snapshot) = stream.next().await {
                last = Some(snapshot);
            }
            last
        };
        let last = match timeout {
            Some(limit) => match tokio::time::timeout(limit, finished).await {
                Ok(last) => last,
                Err(_) => {
                    tracing::warn!(job_id = %job_id, timeout = ?limit, "job timed out, cancelling");
                    self.cancel(job_id).await?;
                    return Err(JobError::TimedOut(limit));
                }
            },
            None => finished.await,
        };
        match last {
            Some(snapshot) if snapshot.is_terminal() => Ok(snapshot),
            // the stream ended early because the job was reclaimed
            _ => self.status(job_id),
        }
    }
}
