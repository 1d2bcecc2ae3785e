//! Wiring of transport, consumer, handler and HTTP listeners.

use crate::config::Config;
use anyhow::Context;
use queue_relay_core::QueueTransport;
use queue_relay_postgres::PostgresQueue;
use queue_relay_runtime::{
    CorrelationCache, MetricsServer, ReplyConsumer, RequestReplyHandler, RetryingTransport,
};
use queue_relay_web::{AppState, metrics_router, router};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Run the relay until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the database, the queues, the metrics recorder or a
/// listener cannot be set up, or if a listener fails while serving.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let postgres = PostgresQueue::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let transport: Arc<dyn QueueTransport> =
        Arc::new(RetryingTransport::new(postgres, config.retry.clone()));

    queue_relay_runtime::ensure_queues(transport.as_ref(), &config.relay)
        .await
        .context("Failed to create queues")?;
    tracing::info!(
        request_queue = %config.relay.request_queue,
        reply_queue = %config.relay.reply_queue,
        dead_letter_queue = %config.relay.reply_dead_letter_queue,
        "Queues ready"
    );

    let metrics_addr = config
        .server
        .metrics_addr()
        .parse()
        .context("Invalid metrics address")?;
    let mut metrics = MetricsServer::new(metrics_addr);
    metrics.start()?;

    let cache = Arc::new(CorrelationCache::new(config.relay.cache_ttl));
    let consumer =
        ReplyConsumer::new(Arc::clone(&transport), Arc::clone(&cache), config.relay.clone())
            .spawn();
    let handler = RequestReplyHandler::new(transport, cache, config.relay.clone());

    let mut state = AppState::new(handler);
    if let Some(handle) = metrics.handle() {
        state = state.with_metrics(handle.clone());
    }

    let listener = TcpListener::bind(config.server.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr()))?;
    let metrics_listener = TcpListener::bind(metrics.addr())
        .await
        .with_context(|| format!("Failed to bind {}", metrics.addr()))?;
    tracing::info!(
        addr = %config.server.bind_addr(),
        metrics_addr = %metrics.addr(),
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        tracing::info!("Shutting down gracefully...");
        let _ = shutdown_tx.send(true);
    });

    let api = axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_requested(shutdown_rx.clone()))
        .into_future();
    let scrape = axum::serve(metrics_listener, metrics_router(state))
        .with_graceful_shutdown(shutdown_requested(shutdown_rx))
        .into_future();
    let (api_result, scrape_result) = tokio::join!(api, scrape);

    let timeout = Duration::from_secs(config.server.shutdown_timeout);
    if tokio::time::timeout(timeout, consumer.shutdown()).await.is_err() {
        tracing::warn!(
            timeout_secs = config.server.shutdown_timeout,
            "Reply consumer did not stop in time"
        );
    }

    api_result.context("HTTP server failed")?;
    scrape_result.context("Metrics server failed")?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
