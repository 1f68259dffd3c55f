//! [`QueueService`] backed by AWS SQS.

use crate::message::{AttributeValue, Message, ReceiveRequest, SendRequest};
use crate::queue::{BoxError, QueueError, QueueService};
use anyhow::Context;
use aws_config::SdkConfig;
use aws_sdk_sqs as sqs;
use sqs::error::DisplayErrorContext;
use sqs::primitives::Blob;
use sqs::types::{MessageAttributeValue, MessageSystemAttributeName, QueueAttributeName};
use std::collections::{BTreeMap, HashMap};

/// One SQS connection.
///
/// Each drainer builds its own pair of these (source and destination) so that
/// no client is shared between workers.
///
/// # Example
///
/// ```no_run
/// use qmove::SqsQueue;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = aws_config::from_env().load().await;
/// let queue = SqsQueue::from_config(&config);
///
/// let url = queue.resolve_queue_url("orders-dlq").await?;
/// println!("{}", url);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SqsQueue {
    pub client: sqs::Client,
}

impl SqsQueue {
    pub fn from_config(config: &SdkConfig) -> Self {
        Self {
            client: sqs::Client::new(config),
        }
    }

    /// Accepts either a queue URL, returned unchanged, or a queue name, which
    /// is looked up with `GetQueueUrl`.
    pub async fn resolve_queue_url(&self, reference: &str) -> anyhow::Result<String> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Ok(reference.to_string());
        }

        let output = self
            .client
            .get_queue_url()
            .queue_name(reference)
            .send()
            .await
            .with_context(|| format!("queue {} not found", reference))?;

        output
            .queue_url
            .with_context(|| format!("no URL returned for queue {}", reference))
    }

    /// Visible plus in-flight messages, as estimated by SQS.
    pub async fn approximate_depth(&self, queue_url: &str) -> anyhow::Result<u64> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
            .send()
            .await
            .with_context(|| format!("failed to read attributes of {}", queue_url))?;

        let attributes = output.attributes.unwrap_or_default();
        let count = |name: &QueueAttributeName| -> u64 {
            attributes
                .get(name)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
        };

        Ok(count(&QueueAttributeName::ApproximateNumberOfMessages)
            + count(&QueueAttributeName::ApproximateNumberOfMessagesNotVisible))
    }
}

#[async_trait::async_trait]
impl QueueService for SqsQueue {
    async fn receive_batch(&self, request: &ReceiveRequest) -> Result<Vec<Message>, QueueError> {
        let system_attribute_names = request
            .system_attribute_names
            .iter()
            .map(|name| MessageSystemAttributeName::from(name.as_str()))
            .collect();

        let output = self
            .client
            .receive_message()
            .queue_url(&request.queue_url)
            .max_number_of_messages(request.max_messages)
            .wait_time_seconds(request.wait_time_seconds)
            .set_message_attribute_names(Some(request.message_attribute_names.clone()))
            .set_message_system_attribute_names(Some(system_attribute_names))
            .send()
            .await
            .map_err(|e| QueueError::Receive(sdk_error(e)))?;

        Ok(messages_from_sdk(output.messages.unwrap_or_default()))
    }

    async fn send(&self, request: SendRequest<'_>) -> Result<String, QueueError> {
        let attributes = request
            .attributes
            .iter()
            .map(|(name, value)| Ok((name.clone(), attribute_to_sdk(value)?)))
            .collect::<Result<HashMap<_, _>, QueueError>>()?;

        let output = self
            .client
            .send_message()
            .queue_url(request.queue_url)
            .message_body(request.body)
            .set_message_attributes((!attributes.is_empty()).then_some(attributes))
            .set_message_deduplication_id(request.deduplication_id.map(str::to_string))
            .set_message_group_id(request.group_id.map(str::to_string))
            .send()
            .await
            .map_err(|e| QueueError::Send(sdk_error(e)))?;

        Ok(output.message_id.unwrap_or_default())
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(sdk_error(e)))?;

        Ok(())
    }
}

// SdkError's own Display only names the error kind; keep the service message.
fn sdk_error<E: std::error::Error>(e: E) -> BoxError {
    DisplayErrorContext(e).to_string().into()
}

/// Converts a received batch, skipping messages that cannot be moved.
///
/// A skipped message stays in the source and comes back once its visibility
/// timeout expires.
pub fn messages_from_sdk(messages: Vec<sqs::types::Message>) -> Vec<Message> {
    messages
        .into_iter()
        .filter_map(|m| {
            let message_id = m.message_id.clone().unwrap_or_default();
            message_from_sdk(m)
                .map_err(|e| log::warn!("skipping message {}: {}", message_id, e))
                .ok()
        })
        .collect()
}

/// Converts an SDK message, keeping every attribute it carries.
///
/// A message without a receipt handle cannot be deleted, so it is rejected.
pub fn message_from_sdk(message: sqs::types::Message) -> Result<Message, QueueError> {
    let receipt_handle = message
        .receipt_handle
        .ok_or_else(|| QueueError::InvalidMessage("missing receipt handle".to_string()))?;

    let attributes = message
        .message_attributes
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| (name, attribute_from_sdk(value)))
        .collect();

    let system_attributes = message
        .attributes
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| (name.as_str().to_string(), value))
        .collect::<BTreeMap<_, _>>();

    Ok(Message {
        body: message.body.unwrap_or_default(),
        attributes,
        system_attributes,
        receipt_handle,
    })
}

fn attribute_from_sdk(value: MessageAttributeValue) -> AttributeValue {
    AttributeValue {
        data_type: value.data_type().to_string(),
        string_value: value.string_value().map(str::to_string),
        binary_value: value.binary_value().map(|b| b.as_ref().to_vec()),
    }
}

fn attribute_to_sdk(value: &AttributeValue) -> Result<MessageAttributeValue, QueueError> {
    MessageAttributeValue::builder()
        .data_type(&value.data_type)
        .set_string_value(value.string_value.clone())
        .set_binary_value(value.binary_value.clone().map(Blob::new))
        .build()
        .map_err(|e| QueueError::Send(Box::new(e)))
}
