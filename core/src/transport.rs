//! Queue transport abstraction.
//!
//! This module provides the [`QueueTransport`] trait: a durable queue with
//! at-least-once delivery and lease-based consumption. The bridge only relies
//! on four operations:
//!
//! - `ensure_queue`: create a queue if it does not exist (idempotent)
//! - `enqueue`: append a message body
//! - `dequeue`: lease one visible message for a bounded visibility timeout
//! - `delete`: remove a leased message, proving ownership with its pop receipt
//!
//! # Lease Model
//!
//! ```text
//!            enqueue
//!               │
//!               ▼
//!  ┌────────► visible ──dequeue(lease)──► leased (dequeue_count += 1)
//!  │                                         │
//!  │   lease expires                         │ delete(id, pop_receipt)
//!  └─────────────────────────────────────────┤
//!                                            ▼
//!                                         removed
//! ```
//!
//! Every lease issues a fresh pop receipt and invalidates the previous one, so
//! a consumer whose lease expired cannot delete a message now owned by
//! somebody else.
//!
//! # Implementations
//!
//! - `InMemoryQueue` (`queue-relay-testing`): fast, with fault injection
//! - `PostgresQueue` (`queue-relay-postgres`): durable, `SKIP LOCKED` leasing

use crate::error::TransportError;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A leased message as returned by [`QueueTransport::dequeue`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueMessage {
    /// Transport-assigned message id
    pub id: String,
    /// Raw message body, exactly as enqueued
    pub body: Vec<u8>,
    /// Lease token required to delete the message
    pub pop_receipt: String,
    /// Number of times the message has been leased, including this lease
    pub dequeue_count: u32,
    /// When the message was first enqueued
    pub inserted_at: DateTime<Utc>,
}

impl QueueMessage {
    /// Body decoded as UTF-8, replacing invalid sequences (for logging).
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Boxed future returned by [`QueueTransport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Durable at-least-once message queue.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the trait can
/// be shared as `Arc<dyn QueueTransport>` between the handler, the consumer
/// and decorators such as the retrying transport.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by the
/// background consumer and every request handler.
pub trait QueueTransport: Send + Sync {
    /// Create the queue if it does not already exist.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::QueueCreation`] if the queue cannot be created.
    fn ensure_queue<'a>(&'a self, queue: &'a str) -> TransportFuture<'a, ()>;

    /// Append a message to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Enqueue`] if the message is not accepted.
    fn enqueue<'a>(&'a self, queue: &'a str, body: &'a [u8]) -> TransportFuture<'a, ()>;

    /// Lease the next visible message, hiding it from other consumers for
    /// `lease`. Returns `None` when no message is visible.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Dequeue`] if the queue cannot be read.
    fn dequeue<'a>(
        &'a self,
        queue: &'a str,
        lease: Duration,
    ) -> TransportFuture<'a, Option<QueueMessage>>;

    /// Delete a leased message.
    ///
    /// # Errors
    ///
    /// - [`TransportError::LeaseLost`] if `pop_receipt` is no longer current
    /// - [`TransportError::Delete`] on any other failure
    fn delete<'a>(
        &'a self,
        queue: &'a str,
        message_id: &'a str,
        pop_receipt: &'a str,
    ) -> TransportFuture<'a, ()>;
}
