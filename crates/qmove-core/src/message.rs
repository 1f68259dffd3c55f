//! Message and request types shared by every queue service implementation.

use std::collections::BTreeMap;
use std::fmt;

/// System attribute carrying the FIFO deduplication id.
pub const DEDUPLICATION_ID: &str = "MessageDeduplicationId";
/// System attribute carrying the FIFO message group id.
pub const GROUP_ID: &str = "MessageGroupId";

/// SQS never returns more than this many messages from one receive call.
pub const MAX_BATCH_SIZE: i32 = 10;
/// Longest long-poll wait SQS accepts.
pub const MAX_WAIT_TIME_SECONDS: i32 = 20;

/// A user message attribute, copied verbatim from source to destination.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct AttributeValue {
    /// `String`, `Number`, `Binary`, optionally with a custom `.suffix`
    pub data_type: String,
    pub string_value: Option<String>,
    pub binary_value: Option<Vec<u8>>,
}

impl AttributeValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_string(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }

    pub fn number(value: impl fmt::Display) -> Self {
        Self {
            data_type: "Number".to_string(),
            string_value: Some(value.to_string()),
            binary_value: None,
        }
    }

    pub fn binary(value: impl Into<Vec<u8>>) -> Self {
        Self {
            data_type: "Binary".to_string(),
            string_value: None,
            binary_value: Some(value.into()),
        }
    }
}

/// A message as received from a queue.
///
/// The receipt handle proves this particular receive and is only ever used to
/// delete the message from the queue it came from. It is never forwarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub body: String,
    /// User message attributes
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Queue-maintained attributes, e.g. [`DEDUPLICATION_ID`] and [`GROUP_ID`]
    pub system_attributes: BTreeMap<String, String>,
    pub receipt_handle: String,
}

impl Message {
    pub fn deduplication_id(&self) -> Option<&str> {
        self.system_attributes
            .get(DEDUPLICATION_ID)
            .map(String::as_str)
    }

    pub fn group_id(&self) -> Option<&str> {
        self.system_attributes.get(GROUP_ID).map(String::as_str)
    }
}

/// Parameters of a single receive call.
///
/// Built once at startup and shared read-only by every drainer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub queue_url: String,
    pub max_messages: i32,
    pub wait_time_seconds: i32,
    /// User attribute names to return, `All` for every attribute
    pub message_attribute_names: Vec<String>,
    /// System attribute names to return; must include the promoted ids
    pub system_attribute_names: Vec<String>,
}

impl ReceiveRequest {
    /// Short polling for up to ten messages with every user attribute and the
    /// deduplication and group ids.
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            max_messages: MAX_BATCH_SIZE,
            wait_time_seconds: 0,
            message_attribute_names: vec!["All".to_string()],
            system_attribute_names: vec![DEDUPLICATION_ID.to_string(), GROUP_ID.to_string()],
        }
    }

    pub fn with_max_messages(mut self, max_messages: i32) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_wait_time_seconds(mut self, wait_time_seconds: i32) -> Self {
        self.wait_time_seconds = wait_time_seconds;
        self
    }

    /// Checks the request against the limits SQS enforces on receive.
    pub fn validate(&self) -> Result<(), InvalidRequest> {
        if self.queue_url.is_empty() {
            return Err(InvalidRequest::MissingQueueUrl);
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.max_messages) {
            return Err(InvalidRequest::BatchSize(self.max_messages));
        }
        if !(0..=MAX_WAIT_TIME_SECONDS).contains(&self.wait_time_seconds) {
            return Err(InvalidRequest::WaitTime(self.wait_time_seconds));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidRequest {
    MissingQueueUrl,
    BatchSize(i32),
    WaitTime(i32),
}

impl fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidRequest::MissingQueueUrl => write!(f, "queue URL was not specified"),
            InvalidRequest::BatchSize(n) => write!(
                f,
                "batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, n
            ),
            InvalidRequest::WaitTime(n) => write!(
                f,
                "wait time must be between 0 and {} seconds, got {}",
                MAX_WAIT_TIME_SECONDS, n
            ),
        }
    }
}

impl std::error::Error for InvalidRequest {}

/// Everything a destination needs to enqueue a copy of a message.
#[derive(Clone, Copy, Debug)]
pub struct SendRequest<'a> {
    pub queue_url: &'a str,
    pub body: &'a str,
    pub attributes: &'a BTreeMap<String, AttributeValue>,
    pub deduplication_id: Option<&'a str>,
    pub group_id: Option<&'a str>,
}

impl<'a> SendRequest<'a> {
    /// Forwards `message` unchanged, promoting its deduplication and group ids
    /// to dedicated send parameters.
    pub fn forward(queue_url: &'a str, message: &'a Message) -> Self {
        Self {
            queue_url,
            body: &message.body,
            attributes: &message.attributes,
            deduplication_id: message.deduplication_id(),
            group_id: message.group_id(),
        }
    }
}
