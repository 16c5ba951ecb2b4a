mod actor;
mod messages;

use super::coordinator::messages::CoordinatorMessage;
use super::reporter::Reporter;
use crate::invoker::WorkerSpawn;
use actor::Actor;
use messages::WorkerMessage;
use tokio::sync::mpsc;

/// Handle to the task supervising one running job.
///
/// The supervisor exclusively owns the worker process; other components can only ask it to stop
/// through this handle. Dropping every handle kills the worker.
pub struct WorkerHandle {
    sender: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerHandle {
    pub fn spawn(
        spawn: WorkerSpawn,
        reporter: Reporter,
        coordinator: mpsc::WeakSender<CoordinatorMessage>,
    ) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        Actor::spawn(inbox, spawn, reporter, coordinator);
        Self { sender }
    }

    pub fn cancel(&self) {
        let _ = self.sender.send(WorkerMessage::Cancel);
    }

    pub fn reap(&self) {
        let _ = self.sender.send(WorkerMessage::Reap);
    }
}
