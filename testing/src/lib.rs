//! # Queue Relay Testing
//!
//! Testing utilities for the request/reply bridge.
//!
//! This crate provides:
//! - [`InMemoryQueue`]: a [`QueueTransport`](queue_relay_core::QueueTransport)
//!   with real lease semantics, fault injection and inspection helpers
//! - [`MockResponder`]: answers requests the way the remote service would
//! - [`test_config`]: short timings for tests that run on the wall clock
//!
//! ## Example
//!
//! ```ignore
//! use queue_relay_testing::{InMemoryQueue, MockResponder, test_config};
//!
//! #[tokio::test]
//! async fn roundtrip() {
//!     let config = test_config();
//!     let queue = Arc::new(InMemoryQueue::new());
//!     queue_relay_runtime::ensure_queues(queue.as_ref(), &config).await.unwrap();
//!
//!     let _responder = MockResponder::for_config(queue.clone(), &config).spawn();
//!     // ... spawn a consumer, build a handler, call `request()` ...
//! }
//! ```

pub mod queue;
pub mod responder;

use queue_relay_runtime::RelayConfig;
use std::time::Duration;

pub use queue::InMemoryQueue;
pub use responder::{DEFAULT_REPLY_TEXT, MockResponder, MockResponderHandle, ReplyOverride};

/// Configuration with short timings for tests.
///
/// Queue names keep their defaults; the await budget is one second.
#[must_use]
pub fn test_config() -> RelayConfig {
    RelayConfig::builder()
        .lease_duration(Duration::from_millis(200))
        .idle_backoff(Duration::from_millis(5))
        .poll_interval(Duration::from_millis(10))
        .max_poll_attempts(100)
        .build()
}

/// Install a `tracing` subscriber writing to the test harness output.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("queue_relay=debug")),
        )
        .with_test_writer()
        .try_init();
}
