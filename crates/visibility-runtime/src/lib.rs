//! # Visibility Runtime
//!
//! Queue client runtime for the visibility keep-alive poller, backed by the
//! AWS SQS query API with an in-memory implementation for testing.
//!
//! This library provides:
//! - Provider-agnostic queue operations behind [`QueueClient`]
//! - Batch visibility extension with per-entry failure reporting
//! - Receipt-handle based message addressing
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures, receipt handles, and extension requests
//! - [`client`] - The queue client capability trait
//! - [`sqs`] - AWS SQS implementation over the query API
//! - [`memory`] - In-memory implementation for tests and development

// Module declarations
pub mod client;
pub mod error;
pub mod memory;
pub mod message;
pub mod sqs;

// Re-export commonly used types at crate root for convenience
pub use client::QueueClient;
pub use error::{QueueError, ValidationError};
pub use memory::{InMemoryConfig, InMemoryQueueClient};
pub use message::{
    BatchExtensionOutcome, FailedExtension, MessageId, QueueUrl, ReceiptHandle, ReceiveRequest,
    ReceivedMessage, VisibilityExtension, ALL_ATTRIBUTES, MAX_RECEIVE_BATCH,
};
pub use sqs::{SqsClient, SqsConfig};
