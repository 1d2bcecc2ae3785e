//! In-memory queue transport for fast, deterministic tests.
//!
//! [`InMemoryQueue`] implements the full lease model of
//! [`QueueTransport`]: dequeue hides a message for the lease duration and
//! hands out a fresh pop receipt, dequeue counts grow on every lease, and a
//! delete with a stale receipt fails with [`TransportError::LeaseLost`].
//!
//! Visibility uses `tokio::time::Instant`, so `#[tokio::test(start_paused = true)]`
//! tests can expire leases with `tokio::time::advance`.

use chrono::{DateTime, Utc};
use queue_relay_core::transport::TransportFuture;
use queue_relay_core::{QueueMessage, QueueTransport, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct StoredMessage {
    id: String,
    body: Vec<u8>,
    dequeue_count: u32,
    inserted_at: DateTime<Utc>,
    visible_at: Instant,
    pop_receipt: Option<String>,
}

impl StoredMessage {
    fn snapshot(&self) -> QueueMessage {
        QueueMessage {
            id: self.id.clone(),
            body: self.body.clone(),
            pop_receipt: self.pop_receipt.clone().unwrap_or_default(),
            dequeue_count: self.dequeue_count,
            inserted_at: self.inserted_at,
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    enqueue: usize,
    dequeue: usize,
    delete: usize,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, VecDeque<StoredMessage>>,
    next_id: u64,
    next_receipt: u64,
    faults: Faults,
}

/// Take one injected failure from `counter`, if any are pending.
fn take_fault(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

/// In-memory [`QueueTransport`] with fault injection and inspection.
///
/// Clones share the same queues.
///
/// # Example
///
/// ```
/// use queue_relay_core::QueueTransport;
/// use queue_relay_testing::InMemoryQueue;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = InMemoryQueue::new();
/// queue.ensure_queue("replies").await?;
/// queue.enqueue("replies", b"hello").await?;
///
/// let message = queue.dequeue("replies", Duration::from_secs(2)).await?;
/// let message = message.ok_or("queue was empty")?;
/// assert_eq!(message.dequeue_count, 1);
///
/// queue.delete("replies", &message.id, &message.pop_receipt).await?;
/// assert!(queue.is_empty("replies"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<State>>,
}

impl InMemoryQueue {
    /// Create a transport with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `times` enqueue calls fail with a transient error.
    pub fn fail_next_enqueue(&self, times: usize) {
        self.state().faults.enqueue = times;
    }

    /// Make the next `times` dequeue calls fail with a transient error.
    pub fn fail_next_dequeue(&self, times: usize) {
        self.state().faults.dequeue = times;
    }

    /// Make the next `times` delete calls fail with a transient error.
    pub fn fail_next_delete(&self, times: usize) {
        self.state().faults.delete = times;
    }

    /// Insert a message whose next dequeue reports `dequeue_count`.
    ///
    /// Simulates a message that was already leased and abandoned
    /// `dequeue_count - 1` times. Creates the queue if needed.
    pub fn push_with_dequeue_count(&self, queue: &str, body: impl Into<Vec<u8>>, dequeue_count: u32) {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("msg-{}", state.next_id);
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(StoredMessage {
                id,
                body: body.into(),
                dequeue_count: dequeue_count.saturating_sub(1),
                inserted_at: Utc::now(),
                visible_at: Instant::now(),
                pop_receipt: None,
            });
    }

    /// Every message on `queue`, leased or not, in insertion order.
    ///
    /// `pop_receipt` is empty for messages that were never leased.
    #[must_use]
    pub fn messages(&self, queue: &str) -> Vec<QueueMessage> {
        self.state()
            .queues
            .get(queue)
            .map(|messages| messages.iter().map(StoredMessage::snapshot).collect())
            .unwrap_or_default()
    }

    /// Bodies of every message on `queue`, in insertion order.
    #[must_use]
    pub fn bodies(&self, queue: &str) -> Vec<Vec<u8>> {
        self.messages(queue).into_iter().map(|m| m.body).collect()
    }

    /// Number of messages on `queue`, leased or not.
    #[must_use]
    pub fn len(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Whether `queue` holds no messages.
    #[must_use]
    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Whether `queue` has been created.
    #[must_use]
    pub fn has_queue(&self, queue: &str) -> bool {
        self.state().queues.contains_key(queue)
    }
}

impl QueueTransport for InMemoryQueue {
    fn ensure_queue<'a>(&'a self, queue: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.state().queues.entry(queue.to_string()).or_default();
            Ok(())
        })
    }

    fn enqueue<'a>(&'a self, queue: &'a str, body: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state();
            if take_fault(&mut state.faults.enqueue) {
                return Err(TransportError::Enqueue {
                    queue: queue.to_string(),
                    reason: "injected fault".to_string(),
                });
            }

            state.next_id += 1;
            let id = format!("msg-{}", state.next_id);
            let Some(messages) = state.queues.get_mut(queue) else {
                return Err(TransportError::Enqueue {
                    queue: queue.to_string(),
                    reason: "queue does not exist".to_string(),
                });
            };
            messages.push_back(StoredMessage {
                id,
                body: body.to_vec(),
                dequeue_count: 0,
                inserted_at: Utc::now(),
                visible_at: Instant::now(),
                pop_receipt: None,
            });
            Ok(())
        })
    }

    fn dequeue<'a>(
        &'a self,
        queue: &'a str,
        lease: Duration,
    ) -> TransportFuture<'a, Option<QueueMessage>> {
        Box::pin(async move {
            let mut state = self.state();
            if take_fault(&mut state.faults.dequeue) {
                return Err(TransportError::Dequeue {
                    queue: queue.to_string(),
                    reason: "injected fault".to_string(),
                });
            }

            state.next_receipt += 1;
            let receipt = format!("receipt-{}", state.next_receipt);
            let now = Instant::now();
            let Some(messages) = state.queues.get_mut(queue) else {
                return Err(TransportError::Dequeue {
                    queue: queue.to_string(),
                    reason: "queue does not exist".to_string(),
                });
            };

            Ok(messages
                .iter_mut()
                .find(|m| m.visible_at <= now)
                .map(|message| {
                    message.dequeue_count += 1;
                    message.visible_at = now + lease;
                    message.pop_receipt = Some(receipt);
                    message.snapshot()
                }))
        })
    }

    fn delete<'a>(
        &'a self,
        queue: &'a str,
        message_id: &'a str,
        pop_receipt: &'a str,
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state();
            if take_fault(&mut state.faults.delete) {
                return Err(TransportError::Delete {
                    queue: queue.to_string(),
                    message_id: message_id.to_string(),
                    reason: "injected fault".to_string(),
                });
            }

            let lease_lost = || TransportError::LeaseLost {
                queue: queue.to_string(),
                message_id: message_id.to_string(),
            };
            let messages = state.queues.get_mut(queue).ok_or_else(lease_lost)?;
            let position = messages
                .iter()
                .position(|m| m.id == message_id && m.pop_receipt.as_deref() == Some(pop_receipt))
                .ok_or_else(lease_lost)?;
            messages.remove(position);
            Ok(())
        })
    }
}
