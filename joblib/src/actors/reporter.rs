use crate::errors::Result;
use crate::events::JobSnapshot;
use crate::record::JobRecord;
use crate::store::JobStore;
use crate::types::JobId;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Writes one job's record and publishes the resulting snapshot.
///
/// Exactly one `Reporter` exists per job and it is moved, never cloned: the coordinator holds it
/// while the job is queued and hands it to the job's supervisor on admission. This keeps the
/// snapshots of a job in the order its record changed.
pub struct Reporter {
    job_id: JobId,
    store: Arc<dyn JobStore>,
    feed: mpsc::UnboundedSender<JobSnapshot>,
}

impl Reporter {
    pub fn new(
        job_id: JobId,
        store: Arc<dyn JobStore>,
        feed: mpsc::UnboundedSender<JobSnapshot>,
    ) -> Self {
        Self {
            job_id,
            store,
            feed,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Atomically apply `update` to the record. Nothing is published if the update is rejected.
    pub fn apply<F>(&self, update: F) -> Result<JobRecord>
    where
        F: FnOnce(&mut JobRecord) -> Result<()>,
    {
        let mut update = Some(update);
        let mut outcome = Ok(());
        let record = self.store.mutate(&self.job_id, &mut |job| {
            if let Some(update) = update.take() {
                outcome = update(job);
            }
        })?;
        outcome?;
        // the broadcaster is gone once the job is reclaimed
        let _ = self.feed.send(record.snapshot());
        Ok(record)
    }
}
