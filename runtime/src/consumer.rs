//! Background reply consumer.
//!
//! [`ReplyConsumer`] leases replies from the reply queue one at a time and
//! decides what happens to each:
//!
//! ```text
//! dequeue ─► empty? ─────────────────────────► Idle (purge cache, back off)
//!    │
//!    ├─► dequeue_count > ceiling ─► dead-letter queue ─► delete ─► DeadLettered
//!    │
//!    ├─► invalid body ─► log, leave leased ──────────────────────► Invalid
//!    │
//!    ├─► id already cached ─► delete ────────────────────────────► Duplicate
//!    │
//!    └─► cache.put ─► delete ────────────────────────────────────► Cached
//! ```
//!
//! Invalid replies are never deleted. Their lease runs out, they are
//! redelivered with a higher dequeue count, and the ceiling check eventually
//! moves them to the dead-letter queue untouched.
//!
//! The loop is a fault boundary: transport errors end the current iteration,
//! are logged and counted, and the consumer carries on after one idle backoff.
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = ReplyConsumer::new(transport, Arc::clone(&cache), config);
//! let handle = consumer.spawn();
//!
//! // ... serve requests ...
//!
//! handle.shutdown().await;
//! ```

use crate::cache::CorrelationCache;
use crate::config::RelayConfig;
use crate::metrics::ConsumerMetrics;
use queue_relay_core::{
    CorrelationId, QueueMessage, QueueTransport, ReplyEnvelope, TransportError, ValidationError,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What a single [`ReplyConsumer::process_one`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerOutcome {
    /// The reply queue was empty.
    Idle,
    /// A valid reply was cached and removed from the queue.
    Cached(CorrelationId),
    /// A reply for an already cached id was removed from the queue.
    Duplicate(CorrelationId),
    /// The reply failed validation and was left on the queue.
    Invalid(ValidationError),
    /// The reply exceeded the dequeue-count ceiling and was moved to the
    /// dead-letter queue.
    DeadLettered {
        /// Queue message id
        message_id: String,
        /// Dequeue count observed when it was moved
        dequeue_count: u32,
    },
}

/// Consumes the reply queue and fills the correlation cache.
///
/// Exactly one consumer should run per reply queue; the cache it writes is
/// the one every [`RequestReplyHandler`](crate::handler::RequestReplyHandler)
/// in the process reads.
pub struct ReplyConsumer {
    transport: Arc<dyn QueueTransport>,
    cache: Arc<CorrelationCache>,
    config: RelayConfig,
}

impl ReplyConsumer {
    /// Create a consumer writing into `cache`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        cache: Arc<CorrelationCache>,
        config: RelayConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            config,
        }
    }

    /// Lease and handle at most one reply.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] of a failed dequeue, or of a failed
    /// dead-letter enqueue or delete. A failed delete after caching a reply
    /// is logged and not returned.
    pub async fn process_one(&self) -> Result<ConsumerOutcome, TransportError> {
        let Some(message) = self
            .transport
            .dequeue(&self.config.reply_queue, self.config.lease_duration)
            .await?
        else {
            return Ok(ConsumerOutcome::Idle);
        };

        if message.dequeue_count > self.config.max_dequeue_count {
            return self.dead_letter(message).await;
        }

        let reply = match ReplyEnvelope::parse(&message.body) {
            Ok(reply) => reply,
            Err(e) => {
                ConsumerMetrics::record_invalid();
                warn!(
                    message_id = %message.id,
                    dequeue_count = message.dequeue_count,
                    error = %e,
                    body = %message.body_text(),
                    "Invalid reply left on queue"
                );
                return Ok(ConsumerOutcome::Invalid(e));
            }
        };

        // The consumer is the only writer, so a rejected put means the id
        // was already answered.
        if self.cache.put(reply.request_id.clone(), reply.text) {
            ConsumerMetrics::record_cached();
            debug!(
                correlation_id = %reply.request_id,
                message_id = %message.id,
                "Reply cached"
            );
            self.ack(&message).await;
            Ok(ConsumerOutcome::Cached(reply.request_id))
        } else {
            ConsumerMetrics::record_duplicate();
            info!(
                correlation_id = %reply.request_id,
                message_id = %message.id,
                "Duplicate reply discarded"
            );
            self.ack(&message).await;
            Ok(ConsumerOutcome::Duplicate(reply.request_id))
        }
    }

    async fn dead_letter(&self, message: QueueMessage) -> Result<ConsumerOutcome, TransportError> {
        self.transport
            .enqueue(&self.config.reply_dead_letter_queue, &message.body)
            .await?;
        self.transport
            .delete(&self.config.reply_queue, &message.id, &message.pop_receipt)
            .await?;

        ConsumerMetrics::record_dead_lettered();
        warn!(
            message_id = %message.id,
            dequeue_count = message.dequeue_count,
            dead_letter_queue = %self.config.reply_dead_letter_queue,
            "Reply moved to dead-letter queue"
        );

        Ok(ConsumerOutcome::DeadLettered {
            message_id: message.id,
            dequeue_count: message.dequeue_count,
        })
    }

    async fn ack(&self, message: &QueueMessage) {
        if let Err(e) = self
            .transport
            .delete(&self.config.reply_queue, &message.id, &message.pop_receipt)
            .await
        {
            ConsumerMetrics::record_error();
            warn!(
                message_id = %message.id,
                error = %e,
                "Failed to delete reply, it will be redelivered"
            );
        }
    }

    /// Run until `shutdown` carries `true` or its sender is dropped.
    ///
    /// Shutdown interrupts an in-flight iteration as well as the idle
    /// backoff, including a dequeue stuck in transport retries. A reply
    /// leased at that moment is left to its lease and delivered again later.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            reply_queue = %self.config.reply_queue,
            dead_letter_queue = %self.config.reply_dead_letter_queue,
            max_dequeue_count = self.config.max_dequeue_count,
            "Reply consumer started"
        );

        while !stop_requested(&shutdown) {
            let result = tokio::select! {
                result = self.process_one() => result,
                // An abandoned lease expires and the reply is redelivered.
                _ = shutdown.changed() => continue,
            };

            let back_off = match result {
                Ok(ConsumerOutcome::Idle) => {
                    let purged = self.cache.purge_expired();
                    if purged > 0 {
                        debug!(purged, "Purged expired replies");
                    }
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    ConsumerMetrics::record_error();
                    error!(
                        reply_queue = %self.config.reply_queue,
                        error = %e,
                        "Reply consumer iteration failed"
                    );
                    true
                }
            };

            if back_off {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(self.config.idle_backoff) => {}
                }
            }
        }

        info!(reply_queue = %self.config.reply_queue, "Reply consumer stopped");
    }

    /// Spawn the consumer loop as a background task.
    #[must_use]
    pub fn spawn(self) -> ConsumerHandle {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(self.run(receiver));
        ConsumerHandle { shutdown, task }
    }
}

fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Handle to a spawned [`ReplyConsumer`].
///
/// Dropping the handle also stops the consumer, without waiting for it.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Signal shutdown and wait for the loop to exit.
    pub async fn shutdown(self) {
        // Err only if the task already exited and dropped its receiver.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Reply consumer task failed");
        }
    }

    /// Whether the consumer task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
