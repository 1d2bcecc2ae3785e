//! Retry with exponential backoff for transient transport failures.
//!
//! The handler and the consumer never retry on their own. Retrying is the
//! transport's job, which [`RetryingTransport`] adds to any [`QueueTransport`]
//! as a decorator. Behind it a failed enqueue reaches the caller only after
//! the policy's retries are spent, and a consumer dequeue can spend the whole
//! backoff before its iteration ends; consumer shutdown cancels that wait.
//!
//! # Example
//!
//! ```rust
//! use queue_relay_runtime::retry::{RetryPolicy, RetryingTransport};
//! use std::time::Duration;
//!
//! # fn wrap<T: queue_relay_core::QueueTransport>(transport: T) {
//! let policy = RetryPolicy::builder()
//!     .max_retries(3)
//!     .initial_delay(Duration::from_secs(1))
//!     .max_delay(Duration::from_secs(4))
//!     .build();
//!
//! let transport = RetryingTransport::new(transport, policy);
//! # }
//! ```

use crate::metrics::TransportMetrics;
use queue_relay_core::transport::TransportFuture;
use queue_relay_core::{QueueMessage, QueueTransport, TransportError};
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 1 second
/// - `max_delay`: 4 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for the exponential delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::builder().max_retries(0).build()
    }

    /// Delay before retry number `attempt` (zero-based):
    /// `initial_delay * multiplier ^ attempt`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(3),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_secs(1)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(4)),
            multiplier: self.multiplier.unwrap_or(2.0),
        }
    }
}

/// Retry an async operation while `is_retryable` accepts its error.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once `policy.max_retries` retries are spent.
///
/// # Errors
///
/// Returns the operation's error as described above.
///
/// # Example
///
/// ```rust
/// use queue_relay_runtime::retry::{RetryPolicy, retry_with_predicate};
///
/// # async fn example() -> Result<(), String> {
/// let result = retry_with_predicate(
///     RetryPolicy::default(),
///     || async { Ok::<_, String>(42) },
///     |err: &String| err.contains("transient"),
/// ).await?;
/// assert_eq!(result, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::debug!(error = %err, "Error is not retryable, failing immediately");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    tracing::error!(attempt, error = %err, "Operation failed after max retries");
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying..."
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// [`QueueTransport`] decorator that retries transient failures.
///
/// [`TransportError::LeaseLost`] is never retried: the pop receipt cannot
/// become valid again.
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: QueueTransport> RetryingTransport<T> {
    /// Wrap `inner` with the given retry policy.
    #[must_use]
    pub const fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped transport.
    #[must_use]
    pub const fn inner(&self) -> &T {
        &self.inner
    }

    /// The retry policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn run<'a, R, F>(&'a self, operation: &'static str, mut call: F) -> TransportFuture<'a, R>
    where
        R: Send + 'a,
        F: FnMut() -> TransportFuture<'a, R> + Send + 'a,
    {
        let policy = self.policy.clone();
        Box::pin(async move {
            let mut attempts = 0_usize;
            let result = retry_with_predicate(
                policy,
                || {
                    if attempts > 0 {
                        TransportMetrics::record_retry(operation);
                    }
                    attempts += 1;
                    call()
                },
                TransportError::is_transient,
            )
            .await;

            if result.is_err() {
                TransportMetrics::record_error(operation);
            }
            result
        })
    }
}

impl<T: QueueTransport> QueueTransport for RetryingTransport<T> {
    fn ensure_queue<'a>(&'a self, queue: &'a str) -> TransportFuture<'a, ()> {
        self.run("ensure_queue", move || self.inner.ensure_queue(queue))
    }

    fn enqueue<'a>(&'a self, queue: &'a str, body: &'a [u8]) -> TransportFuture<'a, ()> {
        self.run("enqueue", move || self.inner.enqueue(queue, body))
    }

    fn dequeue<'a>(
        &'a self,
        queue: &'a str,
        lease: Duration,
    ) -> TransportFuture<'a, Option<QueueMessage>> {
        self.run("dequeue", move || self.inner.dequeue(queue, lease))
    }

    fn delete<'a>(
        &'a self,
        queue: &'a str,
        message_id: &'a str,
        pop_receipt: &'a str,
    ) -> TransportFuture<'a, ()> {
        self.run("delete", move || {
            self.inner.delete(queue, message_id, pop_receipt)
        })
    }
}
