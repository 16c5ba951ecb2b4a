//! Reclaiming old and stuck jobs.
//!
//! Finished jobs are dropped once they have been idle for the retention window. Running jobs that
//! have not produced any output for twice that long are presumed hung: their worker is killed and
//! the record dropped. The sweep itself runs inside the coordinator so it never races admission.

use crate::actors::coordinator::JobCoordinatorHandle;
use crate::config::CollectorConfig;
use crate::events::JobStatus;
use crate::record::JobRecord;
use crate::types::JobId;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub retention: Duration,
    pub stall_window: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepAction {
    Keep,
    /// Finished and past retention.
    Expire,
    /// Running but silent past the stall window.
    Reap,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: Vec<JobId>,
    pub reaped: Vec<JobId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.reaped.is_empty()
    }
}

impl RetentionPolicy {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            stall_window: retention * 2,
        }
    }

    pub fn classify(&self, record: &JobRecord, now: DateTime<Utc>) -> SweepAction {
        // a timestamp from the future means the record is fresh
        let idle = match (now - record.updated_at).to_std() {
            Ok(idle) => idle,
            Err(_) => return SweepAction::Keep,
        };
        match record.status {
            status if status.is_terminal() && idle > self.retention => SweepAction::Expire,
            JobStatus::Running if idle > self.stall_window => SweepAction::Reap,
            _ => SweepAction::Keep,
        }
    }
}

impl From<&CollectorConfig> for RetentionPolicy {
    fn from(config: &CollectorConfig) -> Self {
        RetentionPolicy::new(config.retention())
    }
}

/// Sweep on a fixed period until `shutdown` is cancelled or the coordinator goes away.
pub fn spawn_collector(
    coordinator: JobCoordinatorHandle,
    config: &CollectorConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let policy = RetentionPolicy::from(config);
    let period = config.sweep_interval().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // the first tick completes immediately, there is nothing to collect yet
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("garbage collector stopping");
                    break;
                }
                _ = interval.tick() => {
                    match coordinator.sweep(policy).await {
                        Ok(report) if !report.is_empty() => tracing::info!(
                            expired = report.expired.len(),
                            reaped = report.reaped.len(),
                            "garbage collection sweep finished"
                        ),
                        Ok(_) => tracing::debug!("garbage collection sweep found nothing"),
                        Err(err) => {
                            tracing::debug!(error = %err, "garbage collector stopping");
                            break;
                        }
                    }
                }
            }
        }
    })
}
