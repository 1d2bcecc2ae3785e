//! Queue Relay server: the request/reply bridge behind an HTTP endpoint,
//! using `PostgreSQL` as the durable queue.

pub mod app;
pub mod config;

pub use app::run;
pub use config::Config;
