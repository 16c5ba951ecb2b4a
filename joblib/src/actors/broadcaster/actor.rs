use super::messages::Message;
use crate::events::JobSnapshot;

use tokio::select;
use tokio::sync::mpsc;

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<Message>,
    feed: mpsc::UnboundedReceiver<JobSnapshot>,
    latest: JobSnapshot,
    subscribers: Vec<mpsc::UnboundedSender<JobSnapshot>>,
    feed_open: bool,
}

impl Actor {
    pub fn spawn(
        inbox: mpsc::UnboundedReceiver<Message>,
        feed: mpsc::UnboundedReceiver<JobSnapshot>,
        initial: JobSnapshot,
    ) {
        let actor = Actor {
            inbox,
            feed,
            latest: initial,
            subscribers: Vec::new(),
            feed_open: true,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        loop {
            select! {
                // subscriptions first, so a subscriber registered before a change also sees it
                biased;
                maybe_msg = self.inbox.recv() => {
                    match maybe_msg {
                        Some(Message::Subscribe { subscriber }) => self.subscribe(subscriber),
                        // handle dropped: the job was reclaimed
                        None => break,
                    }
                }
                maybe_snapshot = self.feed.recv(), if self.feed_open => {
                    match maybe_snapshot {
                        Some(snapshot) => self.publish(snapshot),
                        None => {
                            // nobody can report on this job any more, end every stream
                            self.subscribers.clear();
                            self.feed_open = false;
                        }
                    }
                }
            }
        }
    }

    fn publish(&mut self, snapshot: JobSnapshot) {
        if snapshot == self.latest {
            return;
        }
        self.latest = snapshot;
        let latest = &self.latest;
        // only retain subscribers who have not dropped
        self.subscribers.retain(|sub| sub.send(latest.clone()).is_ok());
        if self.latest.is_terminal() {
            self.subscribers.clear();
        }
    }

    fn subscribe(&mut self, subscriber: mpsc::UnboundedSender<JobSnapshot>) {
        if subscriber.send(self.latest.clone()).is_err() {
            return;
        }
        if self.feed_open && !self.latest.is_terminal() {
            self.subscribers.push(subscriber);
        }
    }
}
