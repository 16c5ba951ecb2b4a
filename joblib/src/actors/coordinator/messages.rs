use super::{CancelOutcome, SchedulerStats};
use crate::errors;
use crate::events::{JobSnapshot, JobStatus};
use crate::gc::{RetentionPolicy, SweepReport};
use crate::types::{JobId, JobParameters};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum CoordinatorMessage {
    Submit {
        parameters: JobParameters,
        response: oneshot::Sender<errors::Result<(JobId, JobStatus)>>,
    },
    Cancel {
        job_id: JobId,
        response: oneshot::Sender<errors::Result<CancelOutcome>>,
    },
    Subscribe {
        job_id: JobId,
        response: oneshot::Sender<errors::Result<mpsc::UnboundedReceiver<JobSnapshot>>>,
    },
    Stats {
        response: oneshot::Sender<SchedulerStats>,
    },
    Sweep {
        now: DateTime<Utc>,
        policy: RetentionPolicy,
        response: oneshot::Sender<SweepReport>,
    },
    /// Sent by a job's supervisor once the job reached a terminal state.
    JobFinished { job_id: JobId },
}
