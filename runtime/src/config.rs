//! Tunables for the request/reply bridge.
//!
//! # Default Values
//!
//! | Setting                   | Default                    |
//! |---------------------------|----------------------------|
//! | `request_queue`           | `gettextrequest`           |
//! | `reply_queue`             | `gettextreply`             |
//! | `reply_dead_letter_queue` | `gettextreply-deadletter`  |
//! | `lease_duration`          | 2s                         |
//! | `max_dequeue_count`       | 3                          |
//! | `idle_backoff`            | 100ms                      |
//! | `poll_interval`           | 100ms                      |
//! | `max_poll_attempts`       | 100                        |
//! | `cache_ttl`               | 12s                        |

use std::time::Duration;

/// Queue names and timing for the handler, consumer and cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Queue requests are published to
    pub request_queue: String,
    /// Queue replies are consumed from
    pub reply_queue: String,
    /// Sink for replies the consumer gives up on
    pub reply_dead_letter_queue: String,
    /// Visibility timeout applied when leasing a reply
    pub lease_duration: Duration,
    /// Replies leased more often than this are dead-lettered
    pub max_dequeue_count: u32,
    /// Consumer sleep when the reply queue is empty
    pub idle_backoff: Duration,
    /// Delay between cache checks in `await_reply`
    pub poll_interval: Duration,
    /// Number of poll intervals `await_reply` waits before timing out
    pub max_poll_attempts: u32,
    /// Lifetime of a cached reply
    pub cache_ttl: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RelayConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub const fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder {
            request_queue: None,
            reply_queue: None,
            reply_dead_letter_queue: None,
            lease_duration: None,
            max_dequeue_count: None,
            idle_backoff: None,
            poll_interval: None,
            max_poll_attempts: None,
            cache_ttl: None,
        }
    }

    /// Total time `await_reply` waits with the default polling settings.
    #[must_use]
    pub fn await_budget(&self) -> Duration {
        self.poll_interval.saturating_mul(self.max_poll_attempts)
    }
}

/// Builder for [`RelayConfig`].
#[derive(Debug, Clone)]
pub struct RelayConfigBuilder {
    request_queue: Option<String>,
    reply_queue: Option<String>,
    reply_dead_letter_queue: Option<String>,
    lease_duration: Option<Duration>,
    max_dequeue_count: Option<u32>,
    idle_backoff: Option<Duration>,
    poll_interval: Option<Duration>,
    max_poll_attempts: Option<u32>,
    cache_ttl: Option<Duration>,
}

impl RelayConfigBuilder {
    /// Set the request queue name.
    #[must_use]
    pub fn request_queue(mut self, name: impl Into<String>) -> Self {
        self.request_queue = Some(name.into());
        self
    }

    /// Set the reply queue name.
    #[must_use]
    pub fn reply_queue(mut self, name: impl Into<String>) -> Self {
        self.reply_queue = Some(name.into());
        self
    }

    /// Set the reply dead-letter queue name.
    #[must_use]
    pub fn reply_dead_letter_queue(mut self, name: impl Into<String>) -> Self {
        self.reply_dead_letter_queue = Some(name.into());
        self
    }

    /// Set the lease (visibility timeout) used when dequeuing replies.
    #[must_use]
    pub const fn lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = Some(lease);
        self
    }

    /// Set the dequeue-count ceiling before a reply is dead-lettered.
    #[must_use]
    pub const fn max_dequeue_count(mut self, count: u32) -> Self {
        self.max_dequeue_count = Some(count);
        self
    }

    /// Set the consumer backoff when the reply queue is empty.
    #[must_use]
    pub const fn idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = Some(backoff);
        self
    }

    /// Set the delay between cache checks while awaiting a reply.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the number of poll intervals before an await times out.
    #[must_use]
    pub const fn max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = Some(attempts);
        self
    }

    /// Set the lifetime of cached replies.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Build the [`RelayConfig`].
    #[must_use]
    pub fn build(self) -> RelayConfig {
        RelayConfig {
            request_queue: self
                .request_queue
                .unwrap_or_else(|| "gettextrequest".to_string()),
            reply_queue: self
                .reply_queue
                .unwrap_or_else(|| "gettextreply".to_string()),
            reply_dead_letter_queue: self
                .reply_dead_letter_queue
                .unwrap_or_else(|| "gettextreply-deadletter".to_string()),
            lease_duration: self.lease_duration.unwrap_or(Duration::from_secs(2)),
            max_dequeue_count: self.max_dequeue_count.unwrap_or(3),
            idle_backoff: self.idle_backoff.unwrap_or(Duration::from_millis(100)),
            poll_interval: self.poll_interval.unwrap_or(Duration::from_millis(100)),
            max_poll_attempts: self.max_poll_attempts.unwrap_or(100),
            cache_ttl: self.cache_ttl.unwrap_or(Duration::from_secs(12)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behaviour() {
        let config = RelayConfig::default();
        assert_eq!(config.lease_duration, Duration::from_secs(2));
        assert_eq!(config.max_dequeue_count, 3);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.max_poll_attempts, 100);
        assert_eq!(config.cache_ttl, Duration::from_secs(12));
        assert_eq!(config.await_budget(), Duration::from_secs(10));
    }

    #[test]
    fn builder_overrides() {
        let config = RelayConfig::builder()
            .reply_queue("replies")
            .max_dequeue_count(5)
            .poll_interval(Duration::from_millis(10))
            .max_poll_attempts(7)
            .build();

        assert_eq!(config.reply_queue, "replies");
        assert_eq!(config.request_queue, "gettextrequest");
        assert_eq!(config.max_dequeue_count, 5);
        assert_eq!(config.await_budget(), Duration::from_millis(70));
    }
}
