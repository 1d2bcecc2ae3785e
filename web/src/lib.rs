//! Axum HTTP surface for Queue Relay.
//!
//! The bridge is exposed as a single blocking-looking endpoint: `GET /text`
//! sends a request, waits for the correlated reply, and returns its text.
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at the `/text` handler
//! 2. **Send** a request envelope with a fresh correlation id
//! 3. **Await** the reply in the correlation cache
//! 4. **Map result** to `200`, `502` or `504`
//!
//! # Example
//!
//! ```ignore
//! use queue_relay_web::{AppState, router};
//!
//! let app = router(AppState::new(handler).with_metrics(prometheus_handle));
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use router::{metrics_router, router};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
