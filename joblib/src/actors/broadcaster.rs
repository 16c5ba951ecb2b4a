mod actor;
mod messages;
use crate::events::JobSnapshot;
use actor::Actor;
use messages::Message;

use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Fans the snapshots of one job out to any number of subscribers.
///
/// This struct is actually an actor handle. The real work is done in the actor spawned by `BroadcasterHandle::spawn`.
/// Every subscriber first receives the latest snapshot, then one snapshot per change, and its channel closes right
/// after the terminal snapshot. Dropping the last handle ends all subscriptions.
#[derive(Clone)]
pub struct BroadcasterHandle {
    sender: mpsc::UnboundedSender<Message>,
}

impl BroadcasterHandle {
    pub fn spawn(feed: UnboundedReceiver<JobSnapshot>, initial: JobSnapshot) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        Actor::spawn(inbox, feed, initial);
        Self { sender }
    }

    pub fn subscribe(&self) -> UnboundedReceiver<JobSnapshot> {
        let (subscriber, receiver) = mpsc::unbounded_channel();
        // if the actor is gone the subscriber is dropped and the stream ends at once
        let _ = self.sender.send(Message::Subscribe { subscriber });
        receiver
    }
}
