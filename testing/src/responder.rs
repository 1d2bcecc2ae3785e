//! Stand-in for the remote service on the other side of the request queue.
//!
//! [`MockResponder`] answers every request with `"Faketext"` under the
//! request's own correlation id. Overrides, keyed by request queue name, make
//! it return a fixed id and/or text instead, which is how tests provoke
//! blank-id, blank-text and mismatched replies.

use queue_relay_core::{QueueTransport, ReplyEnvelope, RequestEnvelope, TransportError};
use queue_relay_runtime::RelayConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Text returned when no override is set.
pub const DEFAULT_REPLY_TEXT: &str = "Faketext";

const REQUEST_LEASE: Duration = Duration::from_secs(2);
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Replacement values for replies sent in answer to one request queue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplyOverride {
    /// Correlation id to send instead of the request's own
    pub request_id: Option<String>,
    /// Text to send instead of [`DEFAULT_REPLY_TEXT`]
    pub text: Option<String>,
}

impl ReplyOverride {
    /// Override only the correlation id.
    #[must_use]
    pub fn request_id(id: impl Into<String>) -> Self {
        Self {
            request_id: Some(id.into()),
            text: None,
        }
    }

    /// Override only the text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            request_id: None,
            text: Some(text.into()),
        }
    }

    const fn is_empty(&self) -> bool {
        self.request_id.is_none() && self.text.is_none()
    }
}

/// Answers requests on a request queue with replies on a reply queue.
///
/// # Example
///
/// ```rust,ignore
/// let responder = MockResponder::for_config(transport.clone(), &config);
/// responder.set_override(&config.request_queue, ReplyOverride::request_id(""));
///
/// let running = responder.spawn();
/// // ... the next reply carries a blank id ...
/// running.stop();
/// ```
#[derive(Clone)]
pub struct MockResponder {
    transport: Arc<dyn QueueTransport>,
    request_queue: String,
    reply_queue: String,
    overrides: Arc<Mutex<HashMap<String, ReplyOverride>>>,
}

impl MockResponder {
    /// Create a responder reading `request_queue` and writing `reply_queue`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        request_queue: impl Into<String>,
        reply_queue: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            request_queue: request_queue.into(),
            reply_queue: reply_queue.into(),
            overrides: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a responder for the queues named in `config`.
    #[must_use]
    pub fn for_config(transport: Arc<dyn QueueTransport>, config: &RelayConfig) -> Self {
        Self::new(transport, &config.request_queue, &config.reply_queue)
    }

    fn overrides(&self) -> MutexGuard<'_, HashMap<String, ReplyOverride>> {
        self.overrides.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the override for requests arriving on `queue`.
    ///
    /// Fields left `None` keep an earlier override's value. Returns `false`
    /// (and changes nothing) when both fields are `None`.
    pub fn set_override(&self, queue: &str, value: ReplyOverride) -> bool {
        if value.is_empty() {
            return false;
        }

        let mut overrides = self.overrides();
        let entry = overrides.entry(queue.to_string()).or_default();
        if value.request_id.is_some() {
            entry.request_id = value.request_id;
        }
        if value.text.is_some() {
            entry.text = value.text;
        }
        true
    }

    /// Remove every override.
    pub fn clear_overrides(&self) {
        self.overrides().clear();
    }

    /// Answer at most one request. Returns `false` if none was waiting.
    ///
    /// Unparseable requests are logged and deleted without a reply.
    ///
    /// # Errors
    ///
    /// Returns the first [`TransportError`] from the dequeue, the reply
    /// enqueue or the request delete.
    pub async fn respond_once(&self) -> Result<bool, TransportError> {
        let Some(message) = self
            .transport
            .dequeue(&self.request_queue, REQUEST_LEASE)
            .await?
        else {
            return Ok(false);
        };

        match RequestEnvelope::from_bytes(&message.body) {
            Ok(request) => {
                let value = self
                    .overrides()
                    .get(&self.request_queue)
                    .cloned()
                    .unwrap_or_default();
                let reply = ReplyEnvelope::new(
                    value
                        .request_id
                        .unwrap_or_else(|| request.request_id.into_inner()),
                    value.text.unwrap_or_else(|| DEFAULT_REPLY_TEXT.to_string()),
                );
                let body = reply.to_bytes().map_err(|e| TransportError::Enqueue {
                    queue: self.reply_queue.clone(),
                    reason: e.to_string(),
                })?;
                self.transport.enqueue(&self.reply_queue, &body).await?;
            }
            Err(e) => {
                tracing::warn!(
                    message_id = %message.id,
                    error = %e,
                    "Mock responder dropped unparseable request"
                );
            }
        }

        self.transport
            .delete(&self.request_queue, &message.id, &message.pop_receipt)
            .await?;
        Ok(true)
    }

    /// Answer requests in a background task until the handle is stopped.
    #[must_use]
    pub fn spawn(self) -> MockResponderHandle {
        let task = tokio::spawn(async move {
            loop {
                match self.respond_once().await {
                    Ok(true) => {}
                    Ok(false) => tokio::time::sleep(IDLE_BACKOFF).await,
                    Err(e) => {
                        tracing::error!(error = %e, "Mock responder failed to handle a request");
                        tokio::time::sleep(IDLE_BACKOFF).await;
                    }
                }
            }
        });
        MockResponderHandle { task }
    }
}

/// Running [`MockResponder`]. Dropping the handle stops it.
pub struct MockResponderHandle {
    task: JoinHandle<()>,
}

impl MockResponderHandle {
    /// Stop answering requests.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for MockResponderHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::InMemoryQueue;
    use queue_relay_core::{CorrelationId, ValidationError};

    async fn setup() -> (InMemoryQueue, MockResponder) {
        let queue = InMemoryQueue::new();
        queue.ensure_queue("req").await.unwrap();
        queue.ensure_queue("rep").await.unwrap();
        let responder = MockResponder::new(Arc::new(queue.clone()), "req", "rep");
        (queue, responder)
    }

    async fn send_request(queue: &InMemoryQueue, id: &str) {
        let body = RequestEnvelope::new(CorrelationId::new(id)).to_bytes().unwrap();
        queue.enqueue("req", &body).await.unwrap();
    }

    #[tokio::test]
    async fn replies_with_faketext_under_request_id() {
        let (queue, responder) = setup().await;
        send_request(&queue, "abc").await;

        assert!(responder.respond_once().await.unwrap());

        let bodies = queue.bodies("rep");
        assert_eq!(bodies.len(), 1);
        let reply = ReplyEnvelope::parse(&bodies[0]).unwrap();
        assert_eq!(reply.request_id.as_str(), "abc");
        assert_eq!(reply.text, "Faketext");
        assert!(queue.is_empty("req"));
    }

    #[tokio::test]
    async fn idle_when_no_request() {
        let (_, responder) = setup().await;
        assert!(!responder.respond_once().await.unwrap());
    }

    #[tokio::test]
    async fn overrides_apply_per_queue() {
        let (queue, responder) = setup().await;
        assert!(responder.set_override("req", ReplyOverride::request_id("")));
        assert!(responder.set_override("other", ReplyOverride::text("ignored")));
        send_request(&queue, "abc").await;

        responder.respond_once().await.unwrap();

        let err = ReplyEnvelope::parse(&queue.bodies("rep")[0]).unwrap_err();
        assert_eq!(err, ValidationError::MissingCorrelationId);
    }

    #[tokio::test]
    async fn partial_overrides_merge() {
        let (queue, responder) = setup().await;
        responder.set_override("req", ReplyOverride::request_id("fixed"));
        responder.set_override("req", ReplyOverride::text("custom"));
        assert!(!responder.set_override("req", ReplyOverride::default()));
        send_request(&queue, "abc").await;

        responder.respond_once().await.unwrap();

        let reply = ReplyEnvelope::parse(&queue.bodies("rep")[0]).unwrap();
        assert_eq!(reply.request_id.as_str(), "fixed");
        assert_eq!(reply.text, "custom");
    }

    #[tokio::test]
    async fn unparseable_request_is_dropped() {
        let (queue, responder) = setup().await;
        queue.enqueue("req", b"not json").await.unwrap();

        assert!(responder.respond_once().await.unwrap());
        assert!(queue.is_empty("req"));
        assert!(queue.is_empty("rep"));
    }
}
