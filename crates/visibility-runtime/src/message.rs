//! Message types for queue operations including receipt handles and
//! visibility extension requests.

use crate::error::ValidationError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

/// Attribute selector requesting every message and system attribute.
pub const ALL_ATTRIBUTES: &str = "All";

/// Largest batch SQS will hand out in a single receive call.
pub const MAX_RECEIVE_BATCH: u32 = 10;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue endpoint identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueUrl(String);

impl QueueUrl {
    /// Create new queue URL with validation
    pub fn new(url: String) -> Result<Self, ValidationError> {
        if url.is_empty() {
            return Err(ValidationError::Required {
                field: "queue_url".to_string(),
            });
        }

        let parsed = url::Url::parse(&url).map_err(|e| ValidationError::InvalidFormat {
            field: "queue_url".to_string(),
            message: e.to_string(),
        })?;

        if parsed.scheme() != "https" && parsed.scheme() != "http" {
            return Err(ValidationError::InvalidFormat {
                field: "queue_url".to_string(),
                message: "must be an http(s) URL".to_string(),
            });
        }

        Ok(Self(url))
    }

    /// Get queue URL as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueUrl {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Unique identifier assigned to a message by the queue service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque token identifying one specific delivery of a message.
///
/// A redelivery of the same logical message carries a different handle, so a
/// handle must never be cached across receive calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: String) -> Result<Self, ValidationError> {
        if handle.is_empty() {
            return Err(ValidationError::Required {
                field: "receipt_handle".to_string(),
            });
        }

        Ok(Self(handle))
    }

    /// Get handle string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    /// Truncated for log output; the full token is only meaningful to the
    /// queue service.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.len() > 24 && self.0.is_char_boundary(24) {
            write!(f, "{}...", &self.0[..24])
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message received from the queue with its per-delivery metadata
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    /// Caller-supplied message attributes
    pub attributes: HashMap<String, String>,
    /// Queue-service system attributes (receive count, timestamps, ...)
    pub system_attributes: HashMap<String, String>,
    pub receipt_handle: ReceiptHandle,
    pub delivery_count: u32,
}

impl ReceivedMessage {
    /// Message body interpreted as UTF-8, replacing invalid sequences
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The fixed receive-request descriptor.
///
/// Built exactly once at startup and reused for every poll cycle; all fields
/// are immutable after construction.
#[derive(Debug, Clone)]
pub struct ReceiveRequest {
    queue_url: QueueUrl,
    max_messages: u32,
    attribute_selector: &'static str,
}

impl ReceiveRequest {
    /// Create the receive descriptor, requesting all message and system
    /// attributes so downstream logging has full context.
    pub fn new(queue_url: QueueUrl, max_messages: u32) -> Result<Self, ValidationError> {
        if max_messages == 0 || max_messages > MAX_RECEIVE_BATCH {
            return Err(ValidationError::OutOfRange {
                field: "max_messages".to_string(),
                message: format!("must be 1-{}", MAX_RECEIVE_BATCH),
            });
        }

        Ok(Self {
            queue_url,
            max_messages,
            attribute_selector: ALL_ATTRIBUTES,
        })
    }

    pub fn queue_url(&self) -> &QueueUrl {
        &self.queue_url
    }

    pub fn max_messages(&self) -> u32 {
        self.max_messages
    }

    pub fn attribute_selector(&self) -> &'static str {
        self.attribute_selector
    }
}

// ============================================================================
// Visibility Extension Types
// ============================================================================

/// One entry of a batch visibility-extension request.
///
/// `id` is the entry's position in the originating batch. The queue service
/// reports per-entry failures keyed by this id, not by handle, so the id is
/// the only way to map a failure back to its entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityExtension {
    pub id: usize,
    pub receipt_handle: ReceiptHandle,
    pub timeout_seconds: u32,
}

impl VisibilityExtension {
    pub fn new(id: usize, receipt_handle: ReceiptHandle, timeout_seconds: u32) -> Self {
        Self {
            id,
            receipt_handle,
            timeout_seconds,
        }
    }
}

/// Result of a batch visibility-extension call: disjoint succeeded ids and
/// failed entries.
#[derive(Debug, Clone, Default)]
pub struct BatchExtensionOutcome {
    pub succeeded: Vec<usize>,
    pub failed: Vec<FailedExtension>,
}

impl BatchExtensionOutcome {
    /// Check if every entry was extended
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total number of entries the service reported on
    pub fn entry_count(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// A single failed entry from a batch visibility-extension call
#[derive(Debug, Clone)]
pub struct FailedExtension {
    /// Correlation id of the failed entry (position in the request batch)
    pub id: usize,
    /// Service error code, e.g. `ReceiptHandleIsInvalid`
    pub code: String,
    /// Human-readable reason
    pub message: String,
    /// Whether the service attributes the failure to the sender
    pub sender_fault: bool,
}
