//! In-memory queue client implementation for testing and development.
//!
//! Implements real visibility-window semantics:
//! - Received messages become invisible for a configurable default window
//! - An expired window makes the message receivable again with a fresh
//!   receipt handle and an incremented delivery count
//! - Visibility-change calls move the in-flight deadline
//!
//! Fault injection hooks let tests force transport errors on any of the
//! three call paths and force individual batch entries to fail.

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::message::{
    BatchExtensionOutcome, FailedExtension, MessageId, QueueUrl, ReceiptHandle, ReceiveRequest,
    ReceivedMessage, VisibilityExtension,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the in-memory client
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Visibility window applied when a message is received
    pub default_visibility: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            default_visibility: Duration::seconds(30),
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in a queue
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    attributes: HashMap<String, String>,
    delivery_count: u32,
}

/// A message currently within its invisibility window
struct InFlightEntry {
    message: StoredMessage,
    invisible_until: DateTime<Utc>,
}

/// State for a single queue
#[derive(Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<String, InFlightEntry>,
}

impl QueueState {
    /// Return expired in-flight messages to the receivable pool
    fn release_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.invisible_until <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in expired {
            if let Some(entry) = self.in_flight.remove(&handle) {
                self.ready.push_back(entry.message);
            }
        }
    }
}

/// Injected failures, consumed by the next matching call(s)
#[derive(Default)]
struct FaultPlan {
    receive_failures: u32,
    batch_call_failures: u32,
    single_call_failures: u32,
    send_failures: u32,
    /// Correlation ids forced to fail in batch calls, with the reported code
    failing_entry_ids: HashSet<usize>,
    failing_entry_code: String,
}

#[derive(Default)]
struct Inner {
    queues: HashMap<QueueUrl, QueueState>,
    faults: FaultPlan,
}

// ============================================================================
// InMemoryQueueClient
// ============================================================================

/// In-memory [`QueueClient`] implementation
pub struct InMemoryQueueClient {
    inner: Arc<Mutex<Inner>>,
    config: InMemoryConfig,
}

impl InMemoryQueueClient {
    /// Create new in-memory client with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            config,
        }
    }

    // ------------------------------------------------------------------------
    // Fault injection (test support)
    // ------------------------------------------------------------------------

    /// Fail the next `count` receive calls with a connection error
    pub fn inject_receive_failures(&self, count: u32) {
        self.lock().faults.receive_failures = count;
    }

    /// Fail the next `count` batch visibility calls outright
    pub fn inject_batch_call_failures(&self, count: u32) {
        self.lock().faults.batch_call_failures = count;
    }

    /// Fail the next `count` single visibility calls
    pub fn inject_single_call_failures(&self, count: u32) {
        self.lock().faults.single_call_failures = count;
    }

    /// Fail the next `count` send calls
    pub fn inject_send_failures(&self, count: u32) {
        self.lock().faults.send_failures = count;
    }

    /// Report the given correlation ids as failed in every batch call until
    /// cleared; the entries are left unextended
    pub fn fail_batch_entries(&self, ids: impl IntoIterator<Item = usize>, code: &str) {
        let mut inner = self.lock();
        inner.faults.failing_entry_ids = ids.into_iter().collect();
        inner.faults.failing_entry_code = code.to_string();
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        self.lock().faults = FaultPlan::default();
    }

    // ------------------------------------------------------------------------
    // Inspection (test support)
    // ------------------------------------------------------------------------

    /// Number of currently receivable messages
    pub fn visible_len(&self, queue_url: &QueueUrl) -> usize {
        let now = Utc::now();
        let mut inner = self.lock();
        let state = inner.queues.entry(queue_url.clone()).or_default();
        state.release_expired(now);
        state.ready.len()
    }

    /// Number of messages inside their invisibility window
    pub fn in_flight_len(&self, queue_url: &QueueUrl) -> usize {
        let now = Utc::now();
        let mut inner = self.lock();
        let state = inner.queues.entry(queue_url.clone()).or_default();
        state.release_expired(now);
        state.in_flight.len()
    }

    /// Visibility deadlines of every in-flight message, in no particular order
    pub fn in_flight_deadlines(&self, queue_url: &QueueUrl) -> Vec<DateTime<Utc>> {
        let inner = self.lock();
        inner
            .queues
            .get(queue_url)
            .map(|state| {
                state
                    .in_flight
                    .values()
                    .map(|entry| entry.invisible_until)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The moment the given delivery becomes visible again, if it is in flight
    pub fn visibility_deadline(
        &self,
        queue_url: &QueueUrl,
        receipt_handle: &ReceiptHandle,
    ) -> Option<DateTime<Utc>> {
        let inner = self.lock();
        inner
            .queues
            .get(queue_url)?
            .in_flight
            .get(receipt_handle.as_str())
            .map(|entry| entry.invisible_until)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("queue state lock poisoned")
    }
}

impl Default for InMemoryQueueClient {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn receive_messages(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let now = Utc::now();
        let mut inner = self.lock();

        if inner.faults.receive_failures > 0 {
            inner.faults.receive_failures -= 1;
            return Err(QueueError::ConnectionFailed {
                message: "injected receive failure".to_string(),
            });
        }

        let visibility = self.config.default_visibility;
        let state = inner.queues.entry(request.queue_url().clone()).or_default();
        state.release_expired(now);

        let mut received = Vec::new();
        for _ in 0..request.max_messages() {
            let Some(mut message) = state.ready.pop_front() else {
                break;
            };

            message.delivery_count += 1;

            // A fresh handle per delivery; the previous handle is dead
            let handle = uuid::Uuid::new_v4().to_string();
            let receipt_handle =
                ReceiptHandle::new(handle.clone()).expect("generated handle is non-empty");

            let mut system_attributes = HashMap::new();
            system_attributes.insert(
                "ApproximateReceiveCount".to_string(),
                message.delivery_count.to_string(),
            );

            received.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                body: message.body.clone(),
                attributes: message.attributes.clone(),
                system_attributes,
                receipt_handle,
                delivery_count: message.delivery_count,
            });

            state.in_flight.insert(
                handle,
                InFlightEntry {
                    message,
                    invisible_until: now + visibility,
                },
            );
        }

        Ok(received)
    }

    async fn change_visibility_batch(
        &self,
        queue_url: &QueueUrl,
        entries: Vec<VisibilityExtension>,
    ) -> Result<BatchExtensionOutcome, QueueError> {
        let now = Utc::now();
        let mut inner = self.lock();

        if inner.faults.batch_call_failures > 0 {
            inner.faults.batch_call_failures -= 1;
            return Err(QueueError::ConnectionFailed {
                message: "injected batch call failure".to_string(),
            });
        }

        let failing_ids = inner.faults.failing_entry_ids.clone();
        let failing_code = inner.faults.failing_entry_code.clone();
        let state = inner.queues.entry(queue_url.clone()).or_default();

        let mut outcome = BatchExtensionOutcome::default();
        for entry in entries {
            if failing_ids.contains(&entry.id) {
                outcome.failed.push(FailedExtension {
                    id: entry.id,
                    code: failing_code.clone(),
                    message: "injected entry failure".to_string(),
                    sender_fault: false,
                });
                continue;
            }

            match state.in_flight.get_mut(entry.receipt_handle.as_str()) {
                Some(in_flight) => {
                    in_flight.invisible_until =
                        now + Duration::seconds(i64::from(entry.timeout_seconds));
                    outcome.succeeded.push(entry.id);
                }
                None => {
                    outcome.failed.push(FailedExtension {
                        id: entry.id,
                        code: "ReceiptHandleIsInvalid".to_string(),
                        message: format!("unknown receipt handle: {}", entry.receipt_handle),
                        sender_fault: true,
                    });
                }
            }
        }

        Ok(outcome)
    }

    async fn change_visibility(
        &self,
        queue_url: &QueueUrl,
        receipt_handle: &ReceiptHandle,
        timeout_seconds: u32,
    ) -> Result<(), QueueError> {
        let now = Utc::now();
        let mut inner = self.lock();

        if inner.faults.single_call_failures > 0 {
            inner.faults.single_call_failures -= 1;
            return Err(QueueError::ConnectionFailed {
                message: "injected single call failure".to_string(),
            });
        }

        let state = inner.queues.entry(queue_url.clone()).or_default();
        match state.in_flight.get_mut(receipt_handle.as_str()) {
            Some(in_flight) => {
                in_flight.invisible_until = now + Duration::seconds(i64::from(timeout_seconds));
                Ok(())
            }
            None => Err(QueueError::InvalidReceipt {
                receipt: receipt_handle.as_str().to_string(),
            }),
        }
    }

    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        body: &str,
    ) -> Result<MessageId, QueueError> {
        let mut inner = self.lock();

        if inner.faults.send_failures > 0 {
            inner.faults.send_failures -= 1;
            return Err(QueueError::ConnectionFailed {
                message: "injected send failure".to_string(),
            });
        }

        let state = inner.queues.entry(queue_url.clone()).or_default();

        let message_id = MessageId::new();
        state.ready.push_back(StoredMessage {
            message_id: message_id.clone(),
            body: Bytes::from(body.to_string()),
            attributes: HashMap::new(),
            delivery_count: 0,
        });

        Ok(message_id)
    }
}
