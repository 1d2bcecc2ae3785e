//! # Queue Relay Runtime
//!
//! Runtime half of the request/reply bridge.
//!
//! ## Core Components
//!
//! - **[`RequestReplyHandler`]**: publishes requests and waits for replies
//! - **[`ReplyConsumer`]**: long-lived task that drains the reply queue
//! - **[`CorrelationCache`]**: TTL map shared between the two
//! - **[`RetryingTransport`]**: exponential backoff around any transport
//!
//! ## Example
//!
//! ```ignore
//! use queue_relay_runtime::{CorrelationCache, RelayConfig, ReplyConsumer, RequestReplyHandler};
//! use std::sync::Arc;
//!
//! let config = RelayConfig::default();
//! let cache = Arc::new(CorrelationCache::new(config.cache_ttl));
//!
//! let consumer = ReplyConsumer::new(Arc::clone(&transport), Arc::clone(&cache), config.clone())
//!     .spawn();
//! let handler = RequestReplyHandler::new(transport, cache, config);
//!
//! let text = handler.request().await?;
//!
//! consumer.shutdown().await;
//! ```

/// Time-bounded correlation cache
pub mod cache;

/// Bridge configuration
pub mod config;

/// Reply queue consumer
pub mod consumer;

/// Request sending and reply awaiting
pub mod handler;

/// Prometheus metrics
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

pub use cache::CorrelationCache;
pub use config::{RelayConfig, RelayConfigBuilder};
pub use consumer::{ConsumerHandle, ConsumerOutcome, ReplyConsumer};
pub use handler::RequestReplyHandler;
pub use metrics::{MetricsError, MetricsServer};
pub use retry::{RetryPolicy, RetryingTransport};

/// Create every queue the bridge uses.
///
/// # Errors
///
/// Returns the first [`queue_relay_core::TransportError`] encountered.
pub async fn ensure_queues(
    transport: &dyn queue_relay_core::QueueTransport,
    config: &RelayConfig,
) -> Result<(), queue_relay_core::TransportError> {
    for queue in [
        &config.request_queue,
        &config.reply_queue,
        &config.reply_dead_letter_queue,
    ] {
        transport.ensure_queue(queue).await?;
        tracing::debug!(queue = %queue, "Queue ready");
    }
    Ok(())
}
