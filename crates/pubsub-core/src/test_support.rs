//! Shared test doubles for the core's unit tests.

use async_trait::async_trait;
use pubsub_runtime::{
    attribute_names, InMemoryProvider, MessageId, OutgoingMessage, ProviderType, QueueAttributes,
    QueueError, QueueName, QueueProvider, QueueUrl, ReceiptHandle, ReceiveOptions,
    ReceivedMessage, SendReceipt, Timestamp,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Provider operations, used to script failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetQueueUrl,
    CreateQueue,
    GetQueueAttributes,
    SendMessage,
    ReceiveMessages,
    DeleteMessage,
}

/// One recorded provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetQueueUrl(String),
    CreateQueue(String, QueueAttributes),
    GetQueueAttributes(String),
    SendMessage(String, OutgoingMessage),
    ReceiveMessages(String),
    DeleteMessage(String, String),
}

/// Provider that records every call and delegates to an in-memory provider
/// unless a failure was scripted for the operation
#[derive(Clone, Default)]
pub struct RecordingProvider {
    pub inner: InMemoryProvider,
    calls: Arc<Mutex<Vec<Call>>>,
    failures: Arc<Mutex<HashMap<Operation, VecDeque<QueueError>>>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: Operation, error: QueueError) {
        self.failures
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn created_queues(&self) -> Vec<(String, QueueAttributes)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateQueue(name, attributes) => Some((name, attributes)),
                _ => None,
            })
            .collect()
    }

    pub fn sent_messages(&self) -> Vec<(String, OutgoingMessage)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SendMessage(url, message) => Some((url, message)),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_receipts(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::DeleteMessage(url, receipt) => Some((url, receipt)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn scripted(&self, operation: Operation) -> Result<(), QueueError> {
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl QueueProvider for RecordingProvider {
    async fn get_queue_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError> {
        self.record(Call::GetQueueUrl(queue.to_string()));
        self.scripted(Operation::GetQueueUrl)?;
        self.inner.get_queue_url(queue).await
    }

    async fn create_queue(
        &self,
        queue: &QueueName,
        attributes: &QueueAttributes,
    ) -> Result<QueueUrl, QueueError> {
        self.record(Call::CreateQueue(queue.to_string(), attributes.clone()));
        self.scripted(Operation::CreateQueue)?;
        self.inner.create_queue(queue, attributes).await
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &QueueUrl,
        attribute_names: &[&str],
    ) -> Result<HashMap<String, String>, QueueError> {
        self.record(Call::GetQueueAttributes(queue_url.to_string()));
        self.scripted(Operation::GetQueueAttributes)?;
        self.inner
            .get_queue_attributes(queue_url, attribute_names)
            .await
    }

    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: &OutgoingMessage,
    ) -> Result<SendReceipt, QueueError> {
        self.record(Call::SendMessage(queue_url.to_string(), message.clone()));
        self.scripted(Operation::SendMessage)?;
        self.inner.send_message(queue_url, message).await
    }

    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.record(Call::ReceiveMessages(queue_url.to_string()));
        self.scripted(Operation::ReceiveMessages)?;
        self.inner.receive_messages(queue_url, options).await
    }

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        self.record(Call::DeleteMessage(
            queue_url.to_string(),
            receipt.as_str().to_string(),
        ));
        self.scripted(Operation::DeleteMessage)?;
        self.inner.delete_message(queue_url, receipt).await
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}

/// Build a delivered envelope without going through a provider
pub fn envelope(body: &str, receive_count: u32, receipt: Option<&str>) -> ReceivedMessage {
    let mut attributes = HashMap::new();
    attributes.insert(
        attribute_names::APPROXIMATE_RECEIVE_COUNT.to_string(),
        receive_count.to_string(),
    );

    ReceivedMessage {
        message_id: MessageId::new(),
        body: body.to_string(),
        receipt_handle: receipt.map(ReceiptHandle::new),
        attributes,
        message_attributes: HashMap::new(),
        received_at: Timestamp::now(),
    }
}

pub fn not_found(name: &str) -> QueueError {
    QueueError::QueueNotFound {
        queue_name: name.to_string(),
    }
}

pub fn already_exists(name: &str) -> QueueError {
    QueueError::QueueAlreadyExists {
        queue_name: name.to_string(),
    }
}

pub fn connection_failed() -> QueueError {
    QueueError::ConnectionFailed {
        message: "connection reset".to_string(),
    }
}
