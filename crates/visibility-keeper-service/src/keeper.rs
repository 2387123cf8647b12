//! # Visibility Keeper
//!
//! The poll-and-extend cycle: drain a bounded batch from the queue, extend
//! every drained message's invisibility window, and repair partial batch
//! failures with one single-entry retry each.
//!
//! No error in this module ever escapes a cycle. A failed receive is treated
//! as an empty batch; a failed batch call abandons the cycle; a twice-failed
//! entry is left to expire and redeliver naturally. The scheduler keeps
//! ticking regardless.

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use visibility_runtime::{
    QueueClient, QueueUrl, ReceiveRequest, ReceivedMessage, VisibilityExtension,
};

#[cfg(test)]
#[path = "keeper_tests.rs"]
mod tests;

/// Drives one poll cycle per scheduler tick.
///
/// All fields are immutable after construction; the receive descriptor is
/// built exactly once and reused for every cycle.
pub struct VisibilityKeeper {
    client: Arc<dyn QueueClient>,
    queue_url: QueueUrl,
    request: ReceiveRequest,
    visibility_timeout_secs: u32,
}

impl VisibilityKeeper {
    /// Create the keeper and its fixed receive descriptor.
    ///
    /// Fails only on an out-of-range batch size; this is a startup error.
    pub fn new(
        client: Arc<dyn QueueClient>,
        queue_url: QueueUrl,
        poll_batch_size: u32,
        visibility_timeout_secs: u32,
    ) -> Result<Self, visibility_runtime::ValidationError> {
        let request = ReceiveRequest::new(queue_url.clone(), poll_batch_size)?;

        Ok(Self {
            client,
            queue_url,
            request,
            visibility_timeout_secs,
        })
    }

    /// Run one poll cycle: receive a batch and extend its visibility.
    ///
    /// Never returns an error: every failure is logged and absorbed so the
    /// scheduler's next tick proceeds normally.
    pub async fn run_cycle(&self) {
        let messages = match self.client.receive_messages(&self.request).await {
            Ok(messages) => messages,
            Err(error) => {
                // Skip and retry next tick; a transient receive failure
                // self-heals on the next period.
                error!(
                    queue_url = %self.queue_url,
                    error = %error,
                    "Error occurred while receiving messages; treating batch as empty"
                );
                Vec::new()
            }
        };

        if messages.is_empty() {
            debug!(queue_url = %self.queue_url, "No messages received this cycle");
            return;
        }

        self.extend_batch(&messages).await;
    }

    /// Extend the invisibility window for every message of a non-empty batch.
    ///
    /// Entries are assigned sequential correlation ids `0..n-1` in batch
    /// order; the extension service reports failures keyed by that id, not by
    /// handle. Reported failures get exactly one single-entry repair attempt;
    /// an entry that fails twice is abandoned to natural redelivery.
    async fn extend_batch(&self, messages: &[ReceivedMessage]) {
        let entries: Vec<VisibilityExtension> = messages
            .iter()
            .enumerate()
            .map(|(id, message)| {
                VisibilityExtension::new(
                    id,
                    message.receipt_handle.clone(),
                    self.visibility_timeout_secs,
                )
            })
            .collect();

        let outcome = match self
            .client
            .change_visibility_batch(&self.queue_url, entries.clone())
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                // The call itself failed: no per-entry result exists to react
                // to, so the cycle is abandoned.
                error!(
                    queue_url = %self.queue_url,
                    error = %error,
                    "Error occurred during the message visibility change process"
                );
                return;
            }
        };

        for failed in &outcome.failed {
            let Some(entry) = entries.get(failed.id) else {
                warn!(
                    queue_url = %self.queue_url,
                    correlation_id = failed.id,
                    "Service reported a failure for an unknown correlation id"
                );
                continue;
            };

            match self
                .client
                .change_visibility(&self.queue_url, &entry.receipt_handle, entry.timeout_seconds)
                .await
            {
                Ok(()) => {
                    info!(
                        queue_url = %self.queue_url,
                        correlation_id = failed.id,
                        code = %failed.code,
                        "Second attempt to change visibility succeeded for entry"
                    );
                }
                Err(error) => {
                    // No further retries; the message becomes visible again
                    // on expiry and is re-extended on a later cycle.
                    warn!(
                        queue_url = %self.queue_url,
                        correlation_id = failed.id,
                        receipt_handle = %entry.receipt_handle,
                        code = %failed.code,
                        error = %error,
                        "Second attempt to change visibility failed; leaving entry to redeliver"
                    );
                }
            }
        }

        info!(
            queue_url = %self.queue_url,
            visibility_timeout_secs = self.visibility_timeout_secs,
            message_count = messages.len(),
            failed_entries = outcome.failed.len(),
            "Batch visibility change completed"
        );
    }

    /// The queue this keeper polls
    pub fn queue_url(&self) -> &QueueUrl {
        &self.queue_url
    }
}
