//! Reply consumer behaviour against the in-memory queue.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use queue_relay_core::{CorrelationId, QueueTransport, ReplyEnvelope, ValidationError};
use queue_relay_runtime::{
    ConsumerOutcome, CorrelationCache, RelayConfig, ReplyConsumer, RetryPolicy, RetryingTransport,
};
use queue_relay_testing::{InMemoryQueue, test_config};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Fixture {
    queue: InMemoryQueue,
    cache: Arc<CorrelationCache>,
    consumer: ReplyConsumer,
    config: RelayConfig,
}

async fn fixture() -> Fixture {
    let config = test_config();
    let queue = InMemoryQueue::new();
    queue_relay_runtime::ensure_queues(&queue, &config).await.unwrap();
    let cache = Arc::new(CorrelationCache::new(config.cache_ttl));
    let consumer = ReplyConsumer::new(Arc::new(queue.clone()), Arc::clone(&cache), config.clone());
    Fixture {
        queue,
        cache,
        consumer,
        config,
    }
}

fn reply(id: &str, text: &str) -> Vec<u8> {
    ReplyEnvelope::new(id, text).to_bytes().unwrap()
}

#[tokio::test]
async fn empty_queue_is_idle() {
    let f = fixture().await;
    assert_eq!(f.consumer.process_one().await.unwrap(), ConsumerOutcome::Idle);
}

#[tokio::test]
async fn valid_reply_is_cached_and_deleted() {
    let f = fixture().await;
    f.queue.enqueue(&f.config.reply_queue, &reply("abc", "Faketext")).await.unwrap();

    let outcome = f.consumer.process_one().await.unwrap();

    assert_eq!(outcome, ConsumerOutcome::Cached(CorrelationId::new("abc")));
    assert_eq!(f.cache.get(&CorrelationId::new("abc")).as_deref(), Some("Faketext"));
    assert!(f.queue.is_empty(&f.config.reply_queue));
}

#[tokio::test]
async fn reply_text_is_kept_verbatim() {
    let f = fixture().await;
    f.queue
        .enqueue(&f.config.reply_queue, &reply("abc", "  padded\ntext  "))
        .await
        .unwrap();

    f.consumer.process_one().await.unwrap();

    assert_eq!(
        f.cache.get(&CorrelationId::new("abc")).as_deref(),
        Some("  padded\ntext  ")
    );
}

#[tokio::test]
async fn duplicate_is_deleted_and_first_reply_wins() {
    let f = fixture().await;
    f.queue.enqueue(&f.config.reply_queue, &reply("abc", "first")).await.unwrap();
    f.queue.enqueue(&f.config.reply_queue, &reply("abc", "second")).await.unwrap();

    assert!(matches!(f.consumer.process_one().await.unwrap(), ConsumerOutcome::Cached(_)));
    assert_eq!(
        f.consumer.process_one().await.unwrap(),
        ConsumerOutcome::Duplicate(CorrelationId::new("abc"))
    );

    assert_eq!(f.cache.len(), 1);
    assert_eq!(f.cache.get(&CorrelationId::new("abc")).as_deref(), Some("first"));
    assert!(f.queue.is_empty(&f.config.reply_queue));
}

#[tokio::test]
async fn invalid_replies_stay_on_queue_uncached() {
    let f = fixture().await;
    let bodies: [&[u8]; 4] = [
        br#"{"RequestId":"","Text":"x"}"#,
        br#"{"RequestId":"abc","Text":"  "}"#,
        br#"{"Text":"x"}"#,
        b"not json at all",
    ];
    for body in bodies {
        f.queue.enqueue(&f.config.reply_queue, body).await.unwrap();
    }

    for _ in 0..bodies.len() {
        let outcome = f.consumer.process_one().await.unwrap();
        assert!(matches!(outcome, ConsumerOutcome::Invalid(_)), "got {outcome:?}");
    }

    assert!(f.cache.is_empty());
    assert_eq!(f.queue.len(&f.config.reply_queue), bodies.len());
    assert!(f.queue.is_empty(&f.config.reply_dead_letter_queue));
}

#[tokio::test]
async fn blank_text_reports_the_request_id() {
    let f = fixture().await;
    f.queue.enqueue(&f.config.reply_queue, &reply("abc", "")).await.unwrap();

    assert_eq!(
        f.consumer.process_one().await.unwrap(),
        ConsumerOutcome::Invalid(ValidationError::MissingText {
            request_id: CorrelationId::new("abc")
        })
    );
}

#[tokio::test]
async fn over_ceiling_is_dead_lettered_verbatim() {
    let f = fixture().await;
    let body = reply("abc", "perfectly valid");
    f.queue.push_with_dequeue_count(&f.config.reply_queue, body.clone(), 4);

    let outcome = f.consumer.process_one().await.unwrap();

    assert!(matches!(
        outcome,
        ConsumerOutcome::DeadLettered { dequeue_count: 4, .. }
    ));
    assert_eq!(f.queue.bodies(&f.config.reply_dead_letter_queue), vec![body]);
    assert!(f.queue.is_empty(&f.config.reply_queue));
    assert!(f.cache.is_empty());
}

#[tokio::test]
async fn at_ceiling_is_still_processed() {
    let f = fixture().await;
    f.queue
        .push_with_dequeue_count(&f.config.reply_queue, reply("abc", "ok"), 3);

    assert!(matches!(
        f.consumer.process_one().await.unwrap(),
        ConsumerOutcome::Cached(_)
    ));
    assert!(f.queue.is_empty(&f.config.reply_dead_letter_queue));
}

#[tokio::test(start_paused = true)]
async fn invalid_reply_is_dead_lettered_once_leases_run_out() {
    let f = fixture().await;
    let body = br#"{"RequestId":"   ","Text":"x"}"#.to_vec();
    f.queue.enqueue(&f.config.reply_queue, &body).await.unwrap();

    for _ in 0..f.config.max_dequeue_count {
        assert!(matches!(
            f.consumer.process_one().await.unwrap(),
            ConsumerOutcome::Invalid(ValidationError::MissingCorrelationId)
        ));
        // Still leased: nothing to do until the lease runs out.
        assert_eq!(f.consumer.process_one().await.unwrap(), ConsumerOutcome::Idle);
        tokio::time::advance(f.config.lease_duration).await;
    }

    assert!(matches!(
        f.consumer.process_one().await.unwrap(),
        ConsumerOutcome::DeadLettered { dequeue_count: 4, .. }
    ));
    assert_eq!(f.queue.bodies(&f.config.reply_dead_letter_queue), vec![body]);
    assert!(f.queue.is_empty(&f.config.reply_queue));
}

#[tokio::test(start_paused = true)]
async fn failed_ack_is_redelivered_as_duplicate() {
    let f = fixture().await;
    f.queue.enqueue(&f.config.reply_queue, &reply("abc", "text")).await.unwrap();
    f.queue.fail_next_delete(1);

    assert!(matches!(
        f.consumer.process_one().await.unwrap(),
        ConsumerOutcome::Cached(_)
    ));
    assert_eq!(f.queue.len(&f.config.reply_queue), 1);

    tokio::time::advance(f.config.lease_duration).await;

    assert!(matches!(
        f.consumer.process_one().await.unwrap(),
        ConsumerOutcome::Duplicate(_)
    ));
    assert!(f.queue.is_empty(&f.config.reply_queue));
}

#[tokio::test]
async fn failed_dead_letter_enqueue_keeps_message() {
    let f = fixture().await;
    f.queue
        .push_with_dequeue_count(&f.config.reply_queue, reply("abc", "x"), 9);
    f.queue.fail_next_enqueue(1);

    assert!(f.consumer.process_one().await.is_err());
    assert_eq!(f.queue.len(&f.config.reply_queue), 1);
    assert!(f.queue.is_empty(&f.config.reply_dead_letter_queue));
}

#[tokio::test]
async fn dequeue_failure_is_returned() {
    let f = fixture().await;
    f.queue.fail_next_dequeue(1);

    assert!(f.consumer.process_one().await.unwrap_err().is_transient());
    assert_eq!(f.consumer.process_one().await.unwrap(), ConsumerOutcome::Idle);
}

#[tokio::test]
async fn spawned_consumer_survives_errors_and_shuts_down() {
    let f = fixture().await;
    f.queue.fail_next_dequeue(3);
    f.queue.enqueue(&f.config.reply_queue, &reply("abc", "late")).await.unwrap();

    let handle = f.consumer.spawn();

    let id = CorrelationId::new("abc");
    tokio::time::timeout(Duration::from_secs(2), async {
        while !f.cache.contains(&id) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("consumer never cached the reply");

    tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .expect("consumer did not stop promptly");
}

#[tokio::test(start_paused = true)]
async fn idle_consumer_purges_expired_entries() {
    let f = fixture().await;
    f.cache.put(CorrelationId::new("old"), "x".to_string());
    tokio::time::advance(f.config.cache_ttl).await;

    let handle = f.consumer.spawn();
    tokio::time::sleep(f.config.idle_backoff * 2).await;

    assert!(f.cache.is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn dropping_the_handle_stops_the_consumer() {
    let f = fixture().await;
    let cache = Arc::clone(&f.cache);
    drop(f.consumer.spawn());

    tokio::time::sleep(Duration::from_millis(50)).await;
    f.queue.enqueue(&f.config.reply_queue, &reply("abc", "x")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(cache.is_empty());
    assert_eq!(f.queue.len(&f.config.reply_queue), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_dequeue_retry_backoff() {
    let f = fixture().await;
    f.queue.fail_next_dequeue(3);
    let transport = RetryingTransport::new(f.queue.clone(), RetryPolicy::default());
    let handle =
        ReplyConsumer::new(Arc::new(transport), Arc::clone(&f.cache), f.config.clone()).spawn();

    tokio::time::sleep(Duration::from_millis(10)).await;
    let started = Instant::now();
    handle.shutdown().await;
    let took = started.elapsed();

    assert!(took <= f.config.lease_duration, "shutdown took {took:?}");
}

#[tokio::test(start_paused = true)]
async fn abandoned_lease_is_redelivered_after_shutdown() {
    let f = fixture().await;
    f.queue.enqueue(&f.config.reply_queue, &reply("abc", "x")).await.unwrap();
    f.queue.fail_next_delete(1);
    let policy = RetryPolicy::builder().initial_delay(Duration::from_secs(1)).build();
    let transport = RetryingTransport::new(f.queue.clone(), policy);
    let handle =
        ReplyConsumer::new(Arc::new(transport), Arc::clone(&f.cache), f.config.clone()).spawn();

    // The ack is stuck in retry backoff when shutdown arrives.
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.shutdown().await;

    assert!(f.cache.contains(&CorrelationId::new("abc")));
    assert_eq!(f.queue.len(&f.config.reply_queue), 1);

    tokio::time::advance(f.config.lease_duration).await;
    let next = ReplyConsumer::new(Arc::new(f.queue.clone()), Arc::clone(&f.cache), f.config.clone());
    assert_eq!(
        next.process_one().await.unwrap(),
        ConsumerOutcome::Duplicate(CorrelationId::new("abc"))
    );
}
