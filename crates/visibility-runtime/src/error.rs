//! Error types for queue operations.

use thiserror::Error;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

/// Error type for all queue client operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Queue not found: {queue_url}")]
    QueueNotFound { queue_url: String },

    #[error("Message not found or receipt expired: {receipt}")]
    InvalidReceipt { receipt: String },

    #[error("Batch size {size} exceeds maximum {max_size}")]
    BatchTooLarge { size: usize, max_size: usize },

    #[error("Queue service error: {code} - {message}")]
    ServiceError { code: String, message: String },

    #[error("Response parsing failed: {message}")]
    SerializationError { message: String },

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl QueueError {
    /// Check if error is transient and the operation self-heals on a later
    /// attempt (for this system: a later poll cycle)
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::QueueNotFound { .. } => false,
            Self::InvalidReceipt { .. } => false,
            Self::BatchTooLarge { .. } => false,
            // Service-side errors (throttling, internal errors) usually clear up
            Self::ServiceError { .. } => true,
            Self::SerializationError { .. } => false,
            Self::ValidationError(_) => false,
        }
    }
}

/// Validation errors raised by domain type constructors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}
