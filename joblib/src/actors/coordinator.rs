mod actor;
pub(crate) mod messages;

use self::{
    actor::JobCoordinator,
    messages::CoordinatorMessage::{self, Cancel, Stats, Submit, Subscribe, Sweep},
};
use crate::config::SchedulerConfig;
use crate::errors::{self, JobError};
use crate::events::{JobSnapshot, JobStatus};
use crate::gc::{RetentionPolicy, SweepReport};
use crate::invoker::Invoker;
use crate::store::JobStore;
use crate::types::{JobId, JobParameters};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// What a cancel request did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still queued and is now cancelled. No worker was ever started.
    Dequeued,
    /// The job is running; its worker is being stopped. Poll the status to see it land.
    Signalled,
    /// The job had already reached a terminal state. Nothing changed.
    AlreadyFinished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub running: usize,
    pub queued: usize,
    pub max_concurrent_jobs: usize,
}

/// A `JobCoordinator` which admits jobs within the concurrency budget and tracks their lifecycle.
///
/// This struct is actually an actor handle, the real work is done in the actor spawned by `JobCoordinator::spawn`,
/// but from the user perspective all that matters is that this struct provides methods for managing jobs.
/// The actor-handle abstraction allows this struct to be cloned freely in a multi-thread async context,
/// without requiring an `Arc<Mutex>` or any other means of synchronization.
///
/// Once every handle is dropped the coordinator shuts down and kills whatever is still running.
#[derive(Clone)]
pub struct JobCoordinatorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
}

impl JobCoordinatorHandle {
    /// Spawn a new coordinator.
    ///
    /// `config.message_capacity` limits the build-up of inbound messages.
    pub fn spawn(
        config: SchedulerConfig,
        store: Arc<dyn JobStore>,
        invoker: Arc<dyn Invoker>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.message_capacity.max(1));
        JobCoordinator::spawn(receiver, sender.downgrade(), config, store, invoker);
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> CoordinatorMessage,
    ) -> errors::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| JobError::CoordinatorExited)?;
        rx.await.map_err(|_| JobError::CoordinatorExited)
    }

    /// Queue a job. Returns as soon as the job is recorded, together with whether it is still
    /// `Pending` or was admitted (`Running`).
    pub async fn submit(&self, parameters: JobParameters) -> errors::Result<(JobId, JobStatus)> {
        self.request(|response| Submit {
            parameters,
            response,
        })
        .await?
    }

    /// Cancel a job. Cancelling a running job is asynchronous.
    pub async fn cancel(&self, job_id: JobId) -> errors::Result<CancelOutcome> {
        self.request(|response| Cancel { job_id, response })
            .await?
    }

    /// Receive the job's current snapshot followed by every change, until it reaches a terminal state.
    pub async fn subscribe(
        &self,
        job_id: JobId,
    ) -> errors::Result<mpsc::UnboundedReceiver<JobSnapshot>> {
        self.request(|response| Subscribe { job_id, response })
            .await?
    }

    pub async fn stats(&self) -> errors::Result<SchedulerStats> {
        self.request(|response| Stats { response }).await
    }

    /// Run one garbage collection sweep now.
    pub async fn sweep(&self, policy: RetentionPolicy) -> errors::Result<SweepReport> {
        self.sweep_at(Utc::now(), policy).await
    }

    /// Run one garbage collection sweep as if the current time were `now`.
    pub async fn sweep_at(
        &self,
        now: DateTime<Utc>,
        policy: RetentionPolicy,
    ) -> errors::Result<SweepReport> {
        self.request(|response| Sweep {
            now,
            policy,
            response,
        })
        .await
    }
}
