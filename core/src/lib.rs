//! # Queue Relay Core
//!
//! Core contracts and types for a request/reply bridge over a durable,
//! at-least-once message queue.
//!
//! A caller publishes a request carrying a fresh [`CorrelationId`], and a
//! background consumer later matches replies arriving on a separate queue back
//! to the waiting caller. This crate holds the pieces every other crate in the
//! workspace agrees on:
//!
//! - [`transport::QueueTransport`]: the queue contract (enqueue, lease, delete)
//! - [`envelope`]: the JSON wire format for requests and replies
//! - [`error`]: the error taxonomy surfaced to callers
//!
//! ## Architecture
//!
//! ```text
//! caller ──send_request──► request queue ──► remote responder
//!                                                  │
//! caller ◄──await_reply── correlation cache ◄── reply consumer ◄── reply queue
//!                                                  │
//!                                                  └──► dead-letter queue
//! ```
//!
//! ## Delivery Semantics
//!
//! - **At-least-once**: replies may be delivered more than once
//! - **Unordered**: replies may arrive in any order
//! - **Idempotent consumer**: duplicates are recognised by correlation id

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod correlation;
pub mod envelope;
pub mod error;
pub mod transport;

pub use correlation::CorrelationId;
pub use envelope::{ReplyEnvelope, RequestEnvelope, ValidatedReply};
pub use error::{RelayError, TransportError, ValidationError};
pub use transport::{QueueMessage, QueueTransport};
