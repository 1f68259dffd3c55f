//! Moving single messages, and fanning a batch out into concurrent moves.

use crate::message::{Message, ReceiveRequest, SendRequest};
use crate::queue::{QueueError, QueueService};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Where messages come from and where they go, for one drainer.
///
/// The queue handles belong to that drainer alone; the request and the
/// destination URL are shared read-only by every drainer.
pub struct Route<Q> {
    pub source: Arc<Q>,
    pub destination: Arc<Q>,
    pub request: Arc<ReceiveRequest>,
    pub destination_url: Arc<str>,
}

impl<Q> Clone for Route<Q> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            destination: Arc::clone(&self.destination),
            request: Arc::clone(&self.request),
            destination_url: Arc::clone(&self.destination_url),
        }
    }
}

#[derive(Debug)]
pub enum TransferOutcome {
    Delivered { message_id: String },
    /// Nothing was deleted; the source redelivers after its visibility timeout
    SendFailed(QueueError),
    /// Already delivered; the source copy will come back and be sent again
    DeleteFailed(QueueError),
}

impl TransferOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, TransferOutcome::Delivered { .. })
    }
}

/// Sends `message` to the destination and, only if that worked, deletes it
/// from the source. One attempt at each, no retries.
pub async fn transfer<Q: QueueService>(route: &Route<Q>, message: &Message) -> TransferOutcome {
    let send = SendRequest::forward(&route.destination_url, message);

    let message_id = match route.destination.send(send).await {
        Ok(id) => id,
        Err(e) => {
            log::error!(
                "ERROR sending message to destination (receipt handle {}, dedup id {:?}): {}",
                message.receipt_handle,
                message.deduplication_id(),
                e
            );
            return TransferOutcome::SendFailed(e);
        }
    };

    if let Err(e) = route
        .source
        .delete(&route.request.queue_url, &message.receipt_handle)
        .await
    {
        log::error!(
            "ERROR dequeueing message (receipt handle {}, dedup id {:?}): {}",
            message.receipt_handle,
            message.deduplication_id(),
            e
        );
        return TransferOutcome::DeleteFailed(e);
    }

    log::trace!("moved {} as {}", message.receipt_handle, message_id);
    TransferOutcome::Delivered { message_id }
}

/// Runs one [`transfer`] per message concurrently and waits for all of them.
///
/// A failed or panicked transfer never aborts the rest of the batch.
pub async fn dispatch_batch<Q>(route: &Route<Q>, batch: Vec<Message>) -> Vec<TransferOutcome>
where
    Q: QueueService + 'static,
{
    let mut units = JoinSet::new();
    for message in batch {
        let route = route.clone();
        units.spawn(async move { transfer(&route, &message).await });
    }

    let mut outcomes = Vec::with_capacity(units.len());
    while let Some(joined) = units.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                log::error!("transfer task did not complete: {}", e);
                outcomes.push(TransferOutcome::SendFailed(QueueError::Send(Box::new(e))));
            }
        }
    }
    outcomes
}

/// Per-outcome counts for one or more batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchSummary {
    pub delivered: usize,
    pub send_failed: usize,
    pub delete_failed: usize,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Delivered { .. } => self.delivered += 1,
            TransferOutcome::SendFailed(_) => self.send_failed += 1,
            TransferOutcome::DeleteFailed(_) => self.delete_failed += 1,
        }
    }

    pub fn merge(&mut self, other: BatchSummary) {
        self.delivered += other.delivered;
        self.send_failed += other.send_failed;
        self.delete_failed += other.delete_failed;
    }
}

impl<'a> FromIterator<&'a TransferOutcome> for BatchSummary {
    fn from_iter<I: IntoIterator<Item = &'a TransferOutcome>>(iter: I) -> Self {
        let mut summary = BatchSummary::default();
        for outcome in iter {
            summary.record(outcome);
        }
        summary
    }
}
