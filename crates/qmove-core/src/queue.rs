use crate::message::{Message, ReceiveRequest, SendRequest};
use std::fmt;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug)]
pub enum QueueError {
    Receive(BoxError),
    Send(BoxError),
    Delete(BoxError),
    /// A received message lacked a field needed to move it
    InvalidMessage(String),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Receive(e) => write!(f, "failed to receive messages: {}", e),
            QueueError::Send(e) => write!(f, "failed to send message: {}", e),
            QueueError::Delete(e) => write!(f, "failed to delete message: {}", e),
            QueueError::InvalidMessage(msg) => write!(f, "invalid message: {}", msg),
        }
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueueError::Receive(e) | QueueError::Send(e) | QueueError::Delete(e) => {
                Some(e.as_ref())
            }
            QueueError::InvalidMessage(_) => None,
        }
    }
}

/// The operations a drainer needs from a queue service.
///
/// Every call may block on the network and may fail. Nothing about ordering,
/// atomicity or exactly-once delivery is assumed.
#[async_trait::async_trait]
pub trait QueueService: Send + Sync {
    /// Receives at most `request.max_messages` messages. An empty batch only
    /// means nothing is visible right now.
    async fn receive_batch(&self, request: &ReceiveRequest) -> Result<Vec<Message>, QueueError>;

    /// Enqueues one message and returns the id the queue assigned to it.
    async fn send(&self, request: SendRequest<'_>) -> Result<String, QueueError>;

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError>;
}
