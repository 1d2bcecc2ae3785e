//! Prometheus metrics for the request/reply bridge.
//!
//! Metrics are recorded through the `metrics` facade everywhere in the
//! runtime; [`MetricsServer`] installs the Prometheus recorder and renders the
//! scrape output (the web crate serves it on `/metrics`).
//!
//! # Example
//!
//! ```rust,no_run
//! use queue_relay_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! let scrape = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder handle.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for the given scrape address.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint is advertised on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Handler
    describe_counter!(
        "relay_requests_sent_total",
        "Total number of requests published to the request queue"
    );
    describe_counter!(
        "relay_replies_received_total",
        "Total number of replies handed back to callers"
    );
    describe_counter!(
        "relay_await_timeouts_total",
        "Total number of awaits that ran out of budget"
    );
    describe_histogram!(
        "relay_await_duration_seconds",
        "Time callers spent waiting for a reply"
    );

    // Consumer
    describe_counter!(
        "relay_replies_cached_total",
        "Total number of valid replies written to the correlation cache"
    );
    describe_counter!(
        "relay_replies_duplicate_total",
        "Total number of replies discarded as duplicates"
    );
    describe_counter!(
        "relay_replies_invalid_total",
        "Total number of replies rejected by validation"
    );
    describe_counter!(
        "relay_replies_dead_lettered_total",
        "Total number of replies moved to the dead-letter queue"
    );
    describe_counter!(
        "relay_consumer_errors_total",
        "Total number of errors caught by the consumer loop"
    );

    // Transport
    describe_counter!(
        "relay_transport_errors_total",
        "Total number of failed transport operations"
    );
    describe_counter!(
        "relay_transport_retries_total",
        "Total number of transport retry attempts"
    );
}

/// Handler metrics recorder.
pub struct HandlerMetrics;

impl HandlerMetrics {
    /// Record a published request.
    pub fn record_sent() {
        counter!("relay_requests_sent_total").increment(1);
    }

    /// Record a reply returned to a caller.
    pub fn record_received(waited: Duration) {
        counter!("relay_replies_received_total").increment(1);
        histogram!("relay_await_duration_seconds").record(waited.as_secs_f64());
    }

    /// Record an await that timed out.
    pub fn record_timeout(waited: Duration) {
        counter!("relay_await_timeouts_total").increment(1);
        histogram!("relay_await_duration_seconds").record(waited.as_secs_f64());
    }
}

/// Consumer metrics recorder.
pub struct ConsumerMetrics;

impl ConsumerMetrics {
    /// Record a reply written to the cache.
    pub fn record_cached() {
        counter!("relay_replies_cached_total").increment(1);
    }

    /// Record a duplicate reply.
    pub fn record_duplicate() {
        counter!("relay_replies_duplicate_total").increment(1);
    }

    /// Record a reply rejected by validation.
    pub fn record_invalid() {
        counter!("relay_replies_invalid_total").increment(1);
    }

    /// Record a reply moved to the dead-letter queue.
    pub fn record_dead_lettered() {
        counter!("relay_replies_dead_lettered_total").increment(1);
    }

    /// Record an error caught at the loop boundary.
    pub fn record_error() {
        counter!("relay_consumer_errors_total").increment(1);
    }
}

/// Transport metrics recorder.
pub struct TransportMetrics;

impl TransportMetrics {
    /// Record a failed transport operation.
    pub fn record_error(operation: &'static str) {
        counter!("relay_transport_errors_total", "operation" => operation).increment(1);
    }

    /// Record a retry attempt.
    pub fn record_retry(operation: &'static str) {
        counter!("relay_transport_retries_total", "operation" => operation).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn metrics_server_starts_without_handle() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn recorded_metrics_render() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        HandlerMetrics::record_sent();
        ConsumerMetrics::record_cached();
        ConsumerMetrics::record_dead_lettered();
        TransportMetrics::record_error("enqueue");

        // Another test may have installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("relay_requests_sent_total"));
            assert!(rendered.contains("relay_replies_cached_total"));
            assert!(rendered.contains("relay_replies_dead_lettered_total"));
            assert!(rendered.contains("relay_transport_errors_total"));
        }
    }
}
