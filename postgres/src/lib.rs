//! `PostgreSQL` queue transport for Queue Relay.
//!
//! This crate provides [`PostgresQueue`], a durable implementation of the
//! `QueueTransport` trait from `queue-relay-core`. It supports:
//!
//! - Named queues created on demand
//! - Leases with visibility timeouts and pop receipts
//! - Dequeue counts for dead-letter decisions
//! - Concurrent consumers via `FOR UPDATE SKIP LOCKED`
//!
//! # Example
//!
//! ```ignore
//! use queue_relay_postgres::PostgresQueue;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = PostgresQueue::connect("postgres://localhost/relay", 10).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod queue;

pub use queue::PostgresQueue;
