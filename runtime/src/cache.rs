//! Time-bounded correlation cache shared by the consumer and waiters.
//!
//! The reply consumer is the only writer; any number of `await_reply` callers
//! read concurrently. Entries carry an absolute expiry fixed at insertion and
//! are never updated in place: a second reply for a live id is rejected.
//!
//! Expiry is lazy (checked on every read) with an explicit
//! [`CorrelationCache::purge_expired`] sweep that the consumer runs while the
//! reply queue is idle.
//!
//! Every successful insert wakes all tasks parked on
//! [`CorrelationCache::notified`], so waiters observe a reply without waiting
//! out their poll interval. Waiters must still re-check the map after waking.

use queue_relay_core::CorrelationId;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tokio::time::Instant;

/// Stand-in delay when `now + delay` would overflow.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + delay`, clamped to a far-off instant instead of panicking.
pub(crate) fn saturating_deadline(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

#[derive(Debug)]
struct CacheEntry {
    text: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Correlation id → reply text map with a fixed TTL.
///
/// # Example
///
/// ```
/// use queue_relay_core::CorrelationId;
/// use queue_relay_runtime::cache::CorrelationCache;
/// use std::time::Duration;
///
/// let cache = CorrelationCache::new(Duration::from_secs(12));
/// let id = CorrelationId::new("abc");
///
/// assert!(cache.put(id.clone(), "Faketext".to_string()));
/// assert!(!cache.put(id.clone(), "second".to_string()));
/// assert_eq!(cache.get(&id).as_deref(), Some("Faketext"));
/// ```
#[derive(Debug)]
pub struct CorrelationCache {
    entries: Mutex<HashMap<CorrelationId, CacheEntry>>,
    ttl: Duration,
    inserted: Notify,
}

impl CorrelationCache {
    /// Create an empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            inserted: Notify::new(),
        }
    }

    /// Lifetime applied to new entries.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert a reply unless a live entry already exists for `id`.
    ///
    /// Returns `true` if the entry was inserted, `false` if the id was already
    /// present (the existing entry is left untouched).
    pub fn put(&self, id: CorrelationId, text: String) -> bool {
        let now = Instant::now();
        let inserted = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            match entries.get(&id) {
                Some(existing) if existing.is_live(now) => false,
                _ => {
                    entries.insert(
                        id,
                        CacheEntry {
                            text,
                            expires_at: saturating_deadline(now, self.ttl),
                        },
                    );
                    true
                }
            }
        };

        if inserted {
            self.inserted.notify_waiters();
        }
        inserted
    }

    /// Look up a live reply. Expired entries are removed on the way.
    #[must_use]
    pub fn get(&self, id: &CorrelationId) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(id) {
            Some(entry) if entry.is_live(now) => Some(entry.text.clone()),
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    /// Whether a live reply exists for `id`.
    #[must_use]
    pub fn contains(&self, id: &CorrelationId) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// Drop every expired entry. Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Future that completes on the next successful insert.
    ///
    /// Call [`Notified::enable`] (or poll once) before checking the cache,
    /// otherwise an insert between the check and the wait is missed.
    pub fn notified(&self) -> Notified<'_> {
        self.inserted.notified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(s: &str) -> CorrelationId {
        CorrelationId::new(s)
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_readable_until_ttl() {
        let cache = CorrelationCache::new(Duration::from_secs(12));
        cache.put(id("a"), "text".to_string());

        tokio::time::advance(Duration::from_millis(11_999)).await;
        assert_eq!(cache.get(&id("a")).as_deref(), Some("text"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&id("a")), None);
        assert!(cache.is_empty(), "expired entry removed on read");
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_put_keeps_first_value() {
        let cache = CorrelationCache::new(Duration::from_secs(12));
        assert!(cache.put(id("a"), "first".to_string()));
        assert!(!cache.put(id("a"), "second".to_string()));

        assert_eq!(cache.get(&id("a")).as_deref(), Some("first"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_can_be_replaced() {
        let cache = CorrelationCache::new(Duration::from_secs(1));
        cache.put(id("a"), "first".to_string());
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(!cache.contains(&id("a")));
        assert!(cache.put(id("a"), "second".to_string()));
        assert_eq!(cache.get(&id("a")).as_deref(), Some("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired_entries() {
        let cache = CorrelationCache::new(Duration::from_secs(10));
        cache.put(id("old"), "x".to_string());
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.put(id("new"), "y".to_string());
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&id("new")));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_ttl_does_not_overflow() {
        let cache = CorrelationCache::new(Duration::MAX);
        assert!(cache.put(id("a"), "kept".to_string()));

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert_eq!(cache.get(&id("a")).as_deref(), Some("kept"));
        assert_eq!(cache.purge_expired(), 0);
    }

    #[tokio::test]
    async fn insert_wakes_waiter() {
        let cache = Arc::new(CorrelationCache::new(Duration::from_secs(12)));

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let notified = cache.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if cache.get(&id("a")).is_none() {
                    notified.await;
                }
                cache.get(&id("a"))
            })
        };

        tokio::task::yield_now().await;
        cache.put(id("a"), "woken".to_string());

        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(result, Ok(Ok(Some(ref text))) if text == "woken"));
    }
}
