use super::messages::CoordinatorMessage;
use super::{CancelOutcome, SchedulerStats};
use crate::actors::{broadcaster::BroadcasterHandle, reporter::Reporter, worker::WorkerHandle};
use crate::config::SchedulerConfig;
use crate::errors::{self, JobError};
use crate::events::{JobSnapshot, JobStatus};
use crate::gc::{RetentionPolicy, SweepAction, SweepReport};
use crate::invoker::Invoker;
use crate::store::JobStore;
use crate::types::{JobId, JobParameters};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The scheduler. It owns every piece of cross-job mutable state: the FIFO queue, the running
/// workers and the per-job broadcasters. Messages are handled one at a time, so admission,
/// termination, cancellation and garbage collection never interleave.
pub struct JobCoordinator {
    inbox: mpsc::Receiver<CoordinatorMessage>,
    myself: mpsc::WeakSender<CoordinatorMessage>,
    config: SchedulerConfig,
    store: Arc<dyn JobStore>,
    invoker: Arc<dyn Invoker>,
    queue: VecDeque<Reporter>,
    // a job holds a slot exactly while it is in here
    running: HashMap<JobId, WorkerHandle>,
    broadcasters: HashMap<JobId, BroadcasterHandle>,
}

impl JobCoordinator {
    pub fn spawn(
        inbox: mpsc::Receiver<CoordinatorMessage>,
        myself: mpsc::WeakSender<CoordinatorMessage>,
        config: SchedulerConfig,
        store: Arc<dyn JobStore>,
        invoker: Arc<dyn Invoker>,
    ) {
        let actor = Self {
            inbox,
            myself,
            config,
            store,
            invoker,
            queue: VecDeque::new(),
            running: HashMap::new(),
            broadcasters: HashMap::new(),
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use self::CoordinatorMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Submit {
                    parameters,
                    response,
                } => {
                    let _ = response.send(self.submit(parameters));
                }
                Cancel { job_id, response } => {
                    let _ = response.send(self.cancel(job_id));
                }
                Subscribe { job_id, response } => {
                    let _ = response.send(self.subscribe(job_id));
                }
                Stats { response } => {
                    let _ = response.send(self.stats());
                }
                Sweep {
                    now,
                    policy,
                    response,
                } => {
                    let _ = response.send(self.sweep(now, policy));
                }
                JobFinished { job_id } => self.on_job_terminal(job_id),
            }
        }
        tracing::debug!(
            running = self.running.len(),
            queued = self.queue.len(),
            "coordinator exiting"
        );
    }

    /// Returns `Pending` if the job is waiting for a slot, `Running` if it was admitted. An admitted
    /// job whose worker failed to start is already `Error` in the store.
    fn submit(&mut self, parameters: JobParameters) -> errors::Result<(JobId, JobStatus)> {
        let slots_full = self.running.len() >= self.config.max_concurrent_jobs;
        if let Some(max_depth) = self.config.max_queue_depth {
            if slots_full && self.queue.len() >= max_depth {
                tracing::warn!(depth = self.queue.len(), "queue full, rejecting job");
                return Err(JobError::Capacity {
                    depth: self.queue.len(),
                });
            }
        }

        let job_id = self.store.create(parameters);
        let initial = self.store.get(&job_id)?.snapshot();
        let (feed, feed_rx) = mpsc::unbounded_channel();
        self.broadcasters
            .insert(job_id, BroadcasterHandle::spawn(feed_rx, initial));
        self.queue
            .push_back(Reporter::new(job_id, self.store.clone(), feed));
        tracing::info!(job_id = %job_id, queued = self.queue.len(), "job submitted");

        self.try_admit_next();
        let status = if self.queue.iter().any(|queued| queued.job_id() == job_id) {
            JobStatus::Pending
        } else {
            JobStatus::Running
        };
        Ok((job_id, status))
    }

    /// Admit queued jobs, oldest first, while there are free slots.
    fn try_admit_next(&mut self) {
        while self.running.len() < self.config.max_concurrent_jobs {
            match self.queue.pop_front() {
                Some(reporter) => self.admit(reporter),
                None => break,
            }
        }
    }

    fn admit(&mut self, reporter: Reporter) {
        let job_id = reporter.job_id();
        debug_assert!(
            !self.running.contains_key(&job_id),
            "job {} admitted twice",
            job_id
        );

        let record = match reporter.apply(|job| job.start()) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "skipping job that can no longer be admitted");
                return;
            }
        };

        match self.invoker.start(job_id, &record.parameters) {
            Ok(spawn) => {
                let worker = WorkerHandle::spawn(spawn, reporter, self.myself.clone());
                self.running.insert(job_id, worker);
                tracing::info!(job_id = %job_id, running = self.running.len(), "job admitted");
            }
            Err(err) => {
                // the job never held a slot, keep draining the queue
                tracing::error!(job_id = %job_id, error = %err, "failed to start worker");
                let message = format!("failed to start worker: {}", err);
                if let Err(err) = reporter.apply(move |job| job.fail(message)) {
                    tracing::warn!(job_id = %job_id, error = %err, "failed to record spawn failure");
                }
            }
        }
    }

    fn on_job_terminal(&mut self, job_id: JobId) {
        // reaped jobs already gave up their slot
        if self.running.remove(&job_id).is_some() {
            tracing::debug!(job_id = %job_id, running = self.running.len(), "slot released");
            self.try_admit_next();
        }
    }

    fn cancel(&mut self, job_id: JobId) -> errors::Result<CancelOutcome> {
        if let Some(position) = self.queue.iter().position(|r| r.job_id() == job_id) {
            if let Some(reporter) = self.queue.remove(position) {
                reporter.apply(|job| {
                    job.request_cancel();
                    job.cancel()
                })?;
                tracing::info!(job_id = %job_id, "queued job cancelled");
                return Ok(CancelOutcome::Dequeued);
            }
        }

        let record = self.store.mutate(&job_id, &mut |job| {
            job.request_cancel();
        })?;
        if record.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyFinished);
        }
        if let Some(worker) = self.running.get(&job_id) {
            worker.cancel();
        }
        tracing::info!(job_id = %job_id, "cancellation requested");
        Ok(CancelOutcome::Signalled)
    }

    fn subscribe(
        &mut self,
        job_id: JobId,
    ) -> errors::Result<mpsc::UnboundedReceiver<JobSnapshot>> {
        if let Some(broadcaster) = self.broadcasters.get(&job_id) {
            return Ok(broadcaster.subscribe());
        }
        // a record this coordinator never tracked, e.g. from a shared store: report it as it is
        let snapshot = self.store.get(&job_id)?.snapshot();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(snapshot);
        Ok(rx)
    }

    fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            running: self.running.len(),
            queued: self.queue.len(),
            max_concurrent_jobs: self.config.max_concurrent_jobs,
        }
    }

    fn sweep(&mut self, now: DateTime<Utc>, policy: RetentionPolicy) -> SweepReport {
        let mut report = SweepReport::default();
        for candidate in self.store.list(usize::MAX) {
            let action = policy.classify(&candidate, now);
            if action == SweepAction::Keep {
                continue;
            }
            // a supervisor may have written to the record since it was listed
            let removed = self
                .store
                .delete_if(&candidate.id, &mut |job| policy.classify(job, now) == action);
            let record = match removed {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::debug!(job_id = %candidate.id, "job changed during sweep, keeping it");
                    continue;
                }
                Err(_) => continue,
            };
            self.broadcasters.remove(&record.id);
            if action == SweepAction::Expire {
                tracing::info!(job_id = %record.id, status = %record.status, "expired finished job");
                report.expired.push(record.id);
            } else {
                if let Some(worker) = self.running.remove(&record.id) {
                    worker.reap();
                }
                tracing::warn!(
                    job_id = %record.id,
                    last_update = %record.updated_at,
                    "stalled job reaped: worker killed and record removed"
                );
                report.reaped.push(record.id);
            }
        }
        if !report.reaped.is_empty() {
            self.try_admit_next();
        }
        report
    }
}
