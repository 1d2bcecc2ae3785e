//! Error taxonomy for the request/reply bridge.
//!
//! Only [`RelayError`] is surfaced to callers of the handler. Transport
//! failures inside the reply consumer and every [`ValidationError`] stay
//! inside the consumer loop, where they are logged and counted.

use crate::correlation::CorrelationId;
use thiserror::Error;

/// Errors raised by a [`QueueTransport`](crate::transport::QueueTransport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The queue could not be created or verified
    #[error("Failed to create queue '{queue}': {reason}")]
    QueueCreation {
        /// Queue name
        queue: String,
        /// Underlying reason
        reason: String,
    },

    /// A message could not be enqueued
    #[error("Enqueue failed for queue '{queue}': {reason}")]
    Enqueue {
        /// Queue name
        queue: String,
        /// Underlying reason
        reason: String,
    },

    /// A message could not be leased
    #[error("Dequeue failed for queue '{queue}': {reason}")]
    Dequeue {
        /// Queue name
        queue: String,
        /// Underlying reason
        reason: String,
    },

    /// A message could not be deleted
    #[error("Delete failed for message '{message_id}' on queue '{queue}': {reason}")]
    Delete {
        /// Queue name
        queue: String,
        /// Message that could not be deleted
        message_id: String,
        /// Underlying reason
        reason: String,
    },

    /// The pop receipt no longer matches: the lease expired and the message
    /// was leased again (or already deleted)
    #[error("Lease lost for message '{message_id}' on queue '{queue}'")]
    LeaseLost {
        /// Queue name
        queue: String,
        /// Message whose lease was lost
        message_id: String,
    },

    /// The transport backend is unreachable
    #[error("Queue transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Whether retrying the same operation can succeed.
    ///
    /// A lost lease is final: the pop receipt will never become valid again.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::LeaseLost { .. })
    }
}

/// Reasons a reply body is rejected by the consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The body is not a JSON reply envelope
    #[error("Malformed reply: {0}")]
    Malformed(String),

    /// The correlation id is missing, empty or whitespace
    #[error("Reply has no correlation id")]
    MissingCorrelationId,

    /// The text is missing, empty or whitespace
    #[error("Reply for '{request_id}' has no text")]
    MissingText {
        /// Correlation id of the rejected reply
        request_id: CorrelationId,
    },
}

/// Errors surfaced to handler callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Publishing the request (or another queue operation) failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No reply arrived within the await budget
    #[error("Timeout waiting for reply to request '{correlation_id}'")]
    Timeout {
        /// The request that timed out
        correlation_id: CorrelationId,
    },

    /// The request envelope could not be serialized
    #[error("Failed to serialize request: {0}")]
    Serialization(String),
}

impl RelayError {
    /// Whether this error is a reply timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
