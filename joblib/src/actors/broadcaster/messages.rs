use crate::events::JobSnapshot;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum Message {
    Subscribe {
        subscriber: mpsc::UnboundedSender<JobSnapshot>,
    },
}
