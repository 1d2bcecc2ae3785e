//! Application state for Axum handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use queue_relay_runtime::RequestReplyHandler;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Sends requests and awaits replies
    pub handler: RequestReplyHandler,
    /// Prometheus recorder handle, if this process installed one
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create state without a metrics handle.
    #[must_use]
    pub const fn new(handler: RequestReplyHandler) -> Self {
        Self {
            handler,
            metrics: None,
        }
    }

    /// Attach the Prometheus handle rendered on `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
