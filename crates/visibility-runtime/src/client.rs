//! The queue client capability trait.

use crate::error::QueueError;
use crate::message::{
    BatchExtensionOutcome, MessageId, QueueUrl, ReceiptHandle, ReceiveRequest, ReceivedMessage,
    VisibilityExtension,
};
use async_trait::async_trait;

/// Interface the visibility keeper needs from the queue service.
///
/// Implemented by [`crate::sqs::SqsClient`] for production and
/// [`crate::memory::InMemoryQueueClient`] for tests. All calls are stateless;
/// a client can be shared across cycles behind an `Arc`.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Pull up to `request.max_messages()` messages from the queue.
    ///
    /// Returns an empty vec when the queue has nothing visible; an `Err` only
    /// on transport or service failure.
    async fn receive_messages(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Extend the invisibility window for a batch of received messages.
    ///
    /// An `Ok` outcome may still report individual entries as failed; an
    /// `Err` means the call itself did not produce any per-entry result.
    async fn change_visibility_batch(
        &self,
        queue_url: &QueueUrl,
        entries: Vec<VisibilityExtension>,
    ) -> Result<BatchExtensionOutcome, QueueError>;

    /// Extend the invisibility window for a single received message.
    async fn change_visibility(
        &self,
        queue_url: &QueueUrl,
        receipt_handle: &ReceiptHandle,
        timeout_seconds: u32,
    ) -> Result<(), QueueError>;

    /// Publish a single text message to the queue.
    async fn send_message(&self, queue_url: &QueueUrl, body: &str)
        -> Result<MessageId, QueueError>;
}
