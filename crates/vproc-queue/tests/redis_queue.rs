//! Redis Streams integration tests.

use std::sync::Arc;
use std::time::Duration;

use vproc_models::{DeliveryAttempt, JobDescriptor};
use vproc_queue::{JobQueue, QueueConfig};

fn test_queue(max_retries: u32, ack_wait: Duration) -> Arc<JobQueue> {
    dotenvy::dotenv().ok();

    let suffix = uuid::Uuid::new_v4();
    let config = QueueConfig {
        redis_url: std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        stream_name: format!("test.uploads.{suffix}"),
        consumer_group: format!("test-group-{suffix}"),
        consumer_name: "test-consumer".to_string(),
        dlq_stream_name: format!("test.dlq.{suffix}"),
        max_retries,
        ack_wait,
        nack_delay: Duration::ZERO,
    };
    Arc::new(JobQueue::new(config).expect("Failed to create queue"))
}

async fn stream_len(queue: &JobQueue, stream: &str) -> u64 {
    let client = redis::Client::open(queue.config().redis_url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    redis::cmd("XLEN").arg(stream).query_async(&mut conn).await.unwrap()
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_consume_ack() {
    let queue = test_queue(2, Duration::from_secs(600));
    queue.init().await.expect("Failed to initialize queue");
    // Second init hits BUSYGROUP and must still succeed.
    queue.init().await.expect("Re-initialization failed");

    let job = JobDescriptor::new("it-v1", "clip.mp4").with_title("Integration");
    queue.enqueue(&job).await.expect("Failed to enqueue");

    let deliveries = queue.consume(1000, 10).await.expect("Failed to consume");
    assert_eq!(deliveries.len(), 1);

    let delivery = deliveries.into_iter().next().unwrap();
    assert_eq!(delivery.attempt(), DeliveryAttempt::FIRST);
    assert_eq!(delivery.decode().unwrap(), job);

    delivery.into_handle().ack().await.expect("Failed to ack");
    assert_eq!(stream_len(&queue, &queue.config().stream_name).await, 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_nack_redelivers_with_incremented_counter() {
    let queue = test_queue(2, Duration::from_millis(200));
    queue.init().await.unwrap();

    queue
        .enqueue(&JobDescriptor::new("it-v2", "clip.mp4"))
        .await
        .unwrap();

    let first = queue.consume(1000, 1).await.unwrap().pop().unwrap();
    first.into_handle().nack().await.unwrap();

    let redelivered = queue.claim_expired(10).await.unwrap();
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].attempt(), DeliveryAttempt(2));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_term_moves_payload_to_dlq() {
    let queue = test_queue(2, Duration::from_secs(600));
    queue.init().await.unwrap();

    queue.enqueue_payload(b"not json").await.unwrap();
    let delivery = queue.consume(1000, 1).await.unwrap().pop().unwrap();
    assert!(delivery.decode().is_err());

    delivery.into_handle().term("malformed payload").await.unwrap();
    assert_eq!(stream_len(&queue, &queue.config().dlq_stream_name).await, 1);
    assert_eq!(stream_len(&queue, &queue.config().stream_name).await, 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_expired_entry_past_ceiling_is_terminated() {
    let queue = test_queue(0, Duration::from_millis(100));
    queue.init().await.unwrap();

    queue
        .enqueue(&JobDescriptor::new("it-v3", "clip.mp4"))
        .await
        .unwrap();
    let _abandoned = queue.consume(1000, 1).await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    let claimed = queue.claim_expired(10).await.unwrap();
    assert!(claimed.is_empty());
    assert_eq!(stream_len(&queue, &queue.config().dlq_stream_name).await, 1);

    // The one real delivery is recorded, not a phantom next attempt.
    let client = redis::Client::open(queue.config().redis_url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let dead: redis::streams::StreamRangeReply = redis::cmd("XRANGE")
        .arg(&queue.config().dlq_stream_name)
        .arg("-")
        .arg("+")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(dead.ids[0].get::<u32>("deliveries"), Some(1));
}
