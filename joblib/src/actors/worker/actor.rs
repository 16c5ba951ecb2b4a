use super::messages::WorkerMessage;
use crate::actors::coordinator::messages::CoordinatorMessage;
use crate::actors::reporter::Reporter;
use crate::errors::JobError;
use crate::events::{Output, WorkerExit};
use crate::invoker::WorkerSpawn;
use crate::record::LogLevel;

use futures::future::FutureExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::{
    select,
    sync::{mpsc, oneshot},
    time::{self, Instant},
};

/// How long to keep reading output after the worker exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KillReason {
    Cancelled,
    Reaped,
    /// The coordinator or the job record went away.
    Orphaned,
}

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<WorkerMessage>,
    reporter: Reporter,
    coordinator: mpsc::WeakSender<CoordinatorMessage>,
    kill_tx: Option<oneshot::Sender<()>>,
    kill_reason: Option<KillReason>,
    artifact: PathBuf,
    last_stderr: Option<String>,
    exit: Option<WorkerExit>,
}

impl Actor {
    pub fn spawn(
        inbox: mpsc::UnboundedReceiver<WorkerMessage>,
        spawn: WorkerSpawn,
        reporter: Reporter,
        coordinator: mpsc::WeakSender<CoordinatorMessage>,
    ) {
        let WorkerSpawn {
            output,
            exit,
            kill,
            artifact,
        } = spawn;
        let actor = Self {
            inbox,
            reporter,
            coordinator,
            kill_tx: Some(kill),
            kill_reason: None,
            artifact,
            last_stderr: None,
            exit: None,
        };
        tokio::spawn(async move { actor.run(output, exit).await });
    }

    async fn run(
        mut self,
        mut output: mpsc::UnboundedReceiver<Output>,
        exit_rx: oneshot::Receiver<WorkerExit>,
    ) {
        let mut exit_rx = exit_rx.fuse();
        let mut output_open = true;
        let mut inbox_open = true;
        let mut drain_deadline: Option<Instant> = None;

        while output_open || self.exit.is_none() {
            select! {
                maybe_msg = self.inbox.recv(), if inbox_open => {
                    match maybe_msg {
                        Some(WorkerMessage::Cancel) => self.kill(KillReason::Cancelled),
                        Some(WorkerMessage::Reap) => self.kill(KillReason::Reaped),
                        None => {
                            // handle dropped, make sure we kill the worker before we exit
                            inbox_open = false;
                            self.kill(KillReason::Orphaned);
                        }
                    }
                }
                maybe_line = output.recv(), if output_open => {
                    match maybe_line {
                        Some(line) => self.handle_output(line),
                        None => output_open = false,
                    }
                }
                exit = &mut exit_rx, if self.exit.is_none() => {
                    let exit = exit.unwrap_or_else(|_| {
                        WorkerExit::Lost("worker exit status was dropped".to_string())
                    });
                    self.exit = Some(exit);
                    drain_deadline = Some(Instant::now() + OUTPUT_DRAIN_GRACE);
                }
                _ = time::sleep_until(drain_deadline.unwrap_or_else(Instant::now)), if drain_deadline.is_some() && output_open => {
                    tracing::warn!(job_id = %self.reporter.job_id(), "worker output still open after exit, giving up on it");
                    break;
                }
            }
        }
        self.finish().await;
    }

    fn handle_output(&mut self, line: Output) {
        let job_id = self.reporter.job_id();
        let (level, text) = match line {
            Output::Stdout(text) => (LogLevel::Info, text),
            Output::Stderr(text) => {
                tracing::debug!(job_id = %job_id, line = %text, "worker stderr");
                if !text.trim().is_empty() {
                    self.last_stderr = Some(text.trim().to_string());
                }
                (LogLevel::Error, text)
            }
        };
        match self.reporter.apply(|job| {
            job.record_output(level, &text);
            Ok(())
        }) {
            Ok(record) => {
                if record.cancel_requested {
                    self.kill(KillReason::Cancelled);
                }
            }
            Err(JobError::NotFound) => self.kill(KillReason::Orphaned),
            Err(err) => tracing::warn!(job_id = %job_id, error = %err, "failed to record worker output"),
        }
    }

    fn kill(&mut self, reason: KillReason) {
        // a worker that already exited cannot be killed, its exit status stands
        if self.exit.is_some() {
            return;
        }
        if let Some(kill_tx) = self.kill_tx.take() {
            tracing::info!(job_id = %self.reporter.job_id(), reason = ?reason, "killing worker");
            let _ = kill_tx.send(());
            self.kill_reason = Some(reason);
        }
    }

    fn failure_message(&self, exit: &WorkerExit) -> String {
        match (exit, &self.last_stderr) {
            (WorkerExit::Exited { code }, Some(stderr)) => {
                format!("worker exited with code {}: {}", code, stderr)
            }
            (WorkerExit::Exited { code }, None) => format!("worker exited with code {}", code),
            (WorkerExit::Killed { signal }, _) => format!("worker terminated by signal {}", signal),
            (WorkerExit::Lost(reason), _) => format!("worker exit status unavailable: {}", reason),
        }
    }

    async fn finish(mut self) {
        let job_id = self.reporter.job_id();
        let exit = self
            .exit
            .take()
            .unwrap_or_else(|| WorkerExit::Lost("worker never reported an exit".to_string()));

        let result = match (self.kill_reason, &exit) {
            (Some(KillReason::Cancelled), _) => {
                tracing::info!(job_id = %job_id, exit = ?exit, "job cancelled");
                self.reporter.apply(|job| job.cancel())
            }
            (_, WorkerExit::Exited { code: 0 }) => {
                tracing::info!(job_id = %job_id, artifact = %self.artifact.display(), "job completed");
                let artifact = self.artifact.clone();
                self.reporter.apply(move |job| job.complete(artifact))
            }
            (_, exit) => {
                let message = self.failure_message(exit);
                tracing::warn!(job_id = %job_id, reason = %message, "job failed");
                self.reporter.apply(move |job| job.fail(message))
            }
        };
        match result {
            Ok(_) => {}
            Err(JobError::NotFound) => {
                tracing::debug!(job_id = %job_id, "job record already reclaimed")
            }
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "failed to record job outcome")
            }
        }

        if let Some(coordinator) = self.coordinator.upgrade() {
            let _ = coordinator
                .send(CoordinatorMessage::JobFinished { job_id })
                .await;
        }
    }
}
