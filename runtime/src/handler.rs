//! Public-facing request/reply operations.
//!
//! [`RequestReplyHandler::send_request`] publishes a request and returns its
//! correlation id immediately; [`RequestReplyHandler::await_reply`] then waits
//! for the reply consumer to place the matching reply in the cache.
//!
//! # Waiting
//!
//! The wait is bounded by a fixed budget of `poll_interval × max_attempts`
//! measured from the call. Between checks the caller parks on the cache's
//! insert notification *or* the next poll tick, whichever comes first, so a
//! reply is usually observed as soon as it is cached. The budget is the only
//! thing that decides the timeout: the call fails no earlier than the budget
//! and no later than one poll interval after it.

use crate::cache::{CorrelationCache, saturating_deadline};
use crate::config::RelayConfig;
use crate::metrics::{HandlerMetrics, TransportMetrics};
use queue_relay_core::{CorrelationId, QueueTransport, RelayError, RequestEnvelope};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Sends requests and waits for correlated replies.
///
/// Cheap to clone: all state is behind `Arc`s shared with the reply consumer.
///
/// # Example
///
/// ```rust,ignore
/// let handler = RequestReplyHandler::new(transport, cache, config);
///
/// let id = handler.send_request().await?;
/// let text = handler.await_reply(&id, Duration::from_millis(100), 100).await?;
/// ```
#[derive(Clone)]
pub struct RequestReplyHandler {
    transport: Arc<dyn QueueTransport>,
    cache: Arc<CorrelationCache>,
    config: Arc<RelayConfig>,
}

impl RequestReplyHandler {
    /// Create a handler publishing through `transport` and reading `cache`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        cache: Arc<CorrelationCache>,
        config: RelayConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            config: Arc::new(config),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Publish a request with a fresh correlation id.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Serialization`] if the envelope cannot be encoded
    /// - [`RelayError::Transport`] if the enqueue fails (not retried here)
    pub async fn send_request(&self) -> Result<CorrelationId, RelayError> {
        let request_id = CorrelationId::generate();
        let body = RequestEnvelope::new(request_id.clone())
            .to_bytes()
            .map_err(|e| RelayError::Serialization(e.to_string()))?;

        if let Err(e) = self
            .transport
            .enqueue(&self.config.request_queue, &body)
            .await
        {
            TransportMetrics::record_error("enqueue");
            tracing::error!(
                correlation_id = %request_id,
                queue = %self.config.request_queue,
                error = %e,
                "Failed to send request"
            );
            return Err(e.into());
        }

        HandlerMetrics::record_sent();
        tracing::info!(
            correlation_id = %request_id,
            queue = %self.config.request_queue,
            "Sent request to queue"
        );
        Ok(request_id)
    }

    /// Wait until a reply for `request_id` is cached.
    ///
    /// The cache is checked immediately, then after every poll tick or insert
    /// notification, until `poll_interval × max_attempts` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Timeout`] carrying `request_id` if no reply was
    /// observed within the budget.
    pub async fn await_reply(
        &self,
        request_id: &CorrelationId,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Result<String, RelayError> {
        let started = Instant::now();
        let deadline = saturating_deadline(started, poll_interval.saturating_mul(max_attempts));

        loop {
            let notified = self.cache.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(text) = self.cache.get(request_id) {
                let waited = started.elapsed();
                HandlerMetrics::record_received(waited);
                tracing::debug!(
                    correlation_id = %request_id,
                    waited_ms = waited.as_millis(),
                    "Reply received"
                );
                return Ok(text);
            }

            let now = Instant::now();
            if now >= deadline {
                let waited = started.elapsed();
                HandlerMetrics::record_timeout(waited);
                tracing::warn!(
                    correlation_id = %request_id,
                    waited_ms = waited.as_millis(),
                    max_attempts,
                    "Timeout waiting for reply"
                );
                return Err(RelayError::Timeout {
                    correlation_id: request_id.clone(),
                });
            }

            let next_poll = saturating_deadline(now, poll_interval).min(deadline);
            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep_until(next_poll) => {}
            }
        }
    }

    /// [`await_reply`](Self::await_reply) with the configured poll interval
    /// and attempt ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Timeout`] if no reply arrives in time.
    pub async fn await_reply_default(&self, request_id: &CorrelationId) -> Result<String, RelayError> {
        self.await_reply(
            request_id,
            self.config.poll_interval,
            self.config.max_poll_attempts,
        )
        .await
    }

    /// Send a request and wait for its reply with the configured budget.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if the send fails or
    /// [`RelayError::Timeout`] if no reply arrives in time.
    pub async fn request(&self) -> Result<String, RelayError> {
        let request_id = self.send_request().await?;
        self.await_reply_default(&request_id).await
    }
}
