use qmove::memory::MemoryBroker;
use qmove::{AttributeValue, ReceiveRequest, WorkerPool};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;

pub const SOURCE: &str = "memory://source";
pub const DESTINATION: &str = "memory://destination";

/// A message as a producer would publish it.
#[derive(Clone, Debug)]
pub struct Published {
    pub body: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub deduplication_id: Option<String>,
    pub group_id: Option<String>,
}

pub fn broker_with(messages: &[Published]) -> MemoryBroker {
    let broker = MemoryBroker::new();
    broker.create_queue(SOURCE);
    broker.create_queue(DESTINATION);
    for m in messages {
        broker.push(
            SOURCE,
            &m.body,
            m.attributes.clone(),
            m.deduplication_id.as_deref(),
            m.group_id.as_deref(),
        );
    }
    broker
}

pub fn pool(workers: usize, batch_size: i32) -> WorkerPool {
    WorkerPool::new(
        NonZeroUsize::new(workers).unwrap(),
        ReceiveRequest::new(SOURCE).with_max_messages(batch_size),
        DESTINATION,
    )
}
