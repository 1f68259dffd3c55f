//! An in-process [`QueueService`].
//!
//! [`MemoryBroker`] keeps named queues in memory and behaves like a very small
//! SQS: received messages stay hidden until they are deleted or
//! [`MemoryBroker::release_in_flight`] simulates their visibility timeout
//! expiring. Faults can be injected per queue or per message body, which makes
//! it the test double for drainers and worker pools.

use crate::message::{
    AttributeValue, Message, ReceiveRequest, SendRequest, DEDUPLICATION_ID, GROUP_ID,
};
use crate::queue::{QueueError, QueueService};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A record of one successful send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: String,
    pub body: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Passed as a dedicated send parameter, not as an attribute
    pub deduplication_id: Option<String>,
    /// Passed as a dedicated send parameter, not as an attribute
    pub group_id: Option<String>,
}

#[derive(Clone, Debug)]
struct Stored {
    body: String,
    attributes: BTreeMap<String, AttributeValue>,
    system_attributes: BTreeMap<String, String>,
}

#[derive(Default)]
struct Queue {
    visible: VecDeque<Stored>,
    in_flight: HashMap<String, Stored>,
    sent: Vec<SentMessage>,
    receive_calls: usize,
    fail_receive: bool,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, Queue>,
    fail_send: HashSet<String>,
    fail_delete: HashSet<String>,
    next_id: u64,
}

/// Cloning a broker yields another handle onto the same queues.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_queue(&self, url: &str) {
        self.lock().queues.entry(url.to_string()).or_default();
    }

    /// Enqueues a message as a producer would, creating the queue if needed.
    pub fn push(
        &self,
        url: &str,
        body: &str,
        attributes: BTreeMap<String, AttributeValue>,
        deduplication_id: Option<&str>,
        group_id: Option<&str>,
    ) {
        let mut system_attributes = BTreeMap::new();
        if let Some(id) = deduplication_id {
            system_attributes.insert(DEDUPLICATION_ID.to_string(), id.to_string());
        }
        if let Some(id) = group_id {
            system_attributes.insert(GROUP_ID.to_string(), id.to_string());
        }

        self.lock()
            .queues
            .entry(url.to_string())
            .or_default()
            .visible
            .push_back(Stored {
                body: body.to_string(),
                attributes,
                system_attributes,
            });
    }

    /// Messages still held by the queue, visible or in flight.
    pub fn depth(&self, url: &str) -> usize {
        self.lock()
            .queues
            .get(url)
            .map_or(0, |q| q.visible.len() + q.in_flight.len())
    }

    /// Bodies of every message still held by the queue.
    pub fn bodies(&self, url: &str) -> Vec<String> {
        let state = self.lock();
        let Some(queue) = state.queues.get(url) else {
            return Vec::new();
        };
        queue
            .visible
            .iter()
            .chain(queue.in_flight.values())
            .map(|m| m.body.clone())
            .collect()
    }

    /// Every successful send made to the queue, in arrival order.
    pub fn sent(&self, url: &str) -> Vec<SentMessage> {
        self.lock()
            .queues
            .get(url)
            .map(|q| q.sent.clone())
            .unwrap_or_default()
    }

    pub fn receive_calls(&self, url: &str) -> usize {
        self.lock().queues.get(url).map_or(0, |q| q.receive_calls)
    }

    /// Makes every received-but-undeleted message visible again, as if its
    /// visibility timeout had expired.
    pub fn release_in_flight(&self, url: &str) {
        if let Some(queue) = self.lock().queues.get_mut(url) {
            let released: Vec<Stored> = queue.in_flight.drain().map(|(_, m)| m).collect();
            queue.visible.extend(released);
        }
    }

    pub fn fail_receive(&self, url: &str) {
        self.lock()
            .queues
            .entry(url.to_string())
            .or_default()
            .fail_receive = true;
    }

    /// Sends of a message with this body fail.
    pub fn fail_send_of(&self, body: &str) {
        self.lock().fail_send.insert(body.to_string());
    }

    /// Deletes of a message with this body fail.
    pub fn fail_delete_of(&self, body: &str) {
        self.lock().fail_delete.insert(body.to_string());
    }
}

fn wants(names: &[String], name: &str) -> bool {
    names.iter().any(|n| n == "All" || n == name)
}

#[async_trait::async_trait]
impl QueueService for MemoryBroker {
    async fn receive_batch(&self, request: &ReceiveRequest) -> Result<Vec<Message>, QueueError> {
        let mut state = self.lock();
        let State {
            queues, next_id, ..
        } = &mut *state;

        let queue = queues.get_mut(&request.queue_url).ok_or_else(|| {
            QueueError::Receive(format!("queue {} does not exist", request.queue_url).into())
        })?;
        queue.receive_calls += 1;
        if queue.fail_receive {
            return Err(QueueError::Receive("access denied".into()));
        }

        let take = usize::try_from(request.max_messages)
            .unwrap_or(0)
            .min(queue.visible.len());

        let mut batch = Vec::with_capacity(take);
        for stored in queue.visible.drain(..take).collect::<Vec<_>>() {
            *next_id += 1;
            let receipt_handle = format!("{}#{}", request.queue_url, next_id);

            batch.push(Message {
                body: stored.body.clone(),
                attributes: stored
                    .attributes
                    .iter()
                    .filter(|(name, _)| wants(&request.message_attribute_names, name))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                system_attributes: stored
                    .system_attributes
                    .iter()
                    .filter(|(name, _)| wants(&request.system_attribute_names, name))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                receipt_handle: receipt_handle.clone(),
            });
            queue.in_flight.insert(receipt_handle, stored);
        }

        Ok(batch)
    }

    async fn send(&self, request: SendRequest<'_>) -> Result<String, QueueError> {
        let mut state = self.lock();
        if state.fail_send.contains(request.body) {
            return Err(QueueError::Send("service unavailable".into()));
        }

        state.next_id += 1;
        let message_id = format!("m-{}", state.next_id);

        let queue = state.queues.get_mut(request.queue_url).ok_or_else(|| {
            QueueError::Send(format!("queue {} does not exist", request.queue_url).into())
        })?;

        let mut system_attributes = BTreeMap::new();
        if let Some(id) = request.deduplication_id {
            system_attributes.insert(DEDUPLICATION_ID.to_string(), id.to_string());
        }
        if let Some(id) = request.group_id {
            system_attributes.insert(GROUP_ID.to_string(), id.to_string());
        }

        queue.visible.push_back(Stored {
            body: request.body.to_string(),
            attributes: request.attributes.clone(),
            system_attributes,
        });
        queue.sent.push(SentMessage {
            message_id: message_id.clone(),
            body: request.body.to_string(),
            attributes: request.attributes.clone(),
            deduplication_id: request.deduplication_id.map(str::to_string),
            group_id: request.group_id.map(str::to_string),
        });

        Ok(message_id)
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        let mut state = self.lock();
        let State {
            queues,
            fail_delete,
            ..
        } = &mut *state;

        let queue = queues.get_mut(queue_url).ok_or_else(|| {
            QueueError::Delete(format!("queue {} does not exist", queue_url).into())
        })?;

        let Some(stored) = queue.in_flight.get(receipt_handle) else {
            return Err(QueueError::Delete(
                format!("receipt handle {} is invalid", receipt_handle).into(),
            ));
        };
        if fail_delete.contains(&stored.body) {
            return Err(QueueError::Delete("throttled".into()));
        }

        queue.in_flight.remove(receipt_handle);
        Ok(())
    }
}
