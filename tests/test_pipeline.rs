//! Integration tests for the event pipeline: at-least-once redelivery,
//! payload round-trips through the flat broker record model, and
//! cooperative shutdown.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use memoracle::cache::MemoryBroker;
use memoracle::{Event, Pipeline, Processor};

/// Fails the first `failures` deliveries, then succeeds; records every
/// event it sees.
struct FlakyProcessor {
    stream: String,
    failures: usize,
    calls: AtomicUsize,
    seen: Mutex<Vec<Event>>,
}

impl FlakyProcessor {
    fn new(stream: &str, failures: usize) -> Self {
        Self {
            stream: stream.to_string(),
            failures,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Processor for FlakyProcessor {
    fn name(&self) -> &str {
        "flaky_processor"
    }

    fn stream(&self) -> &str {
        &self.stream
    }

    async fn process(&self, event: Event) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().await.push(event);
        if call < self.failures {
            anyhow::bail!("transient processing failure");
        }
        Ok(())
    }
}

const POLL_ROUNDS: usize = 300;
const POLL_STEP: Duration = Duration::from_millis(10);

#[tokio::test]
async fn test_failed_event_is_redelivered_then_acked() {
    let broker = Arc::new(MemoryBroker::new());
    let pipeline = Pipeline::new(broker.clone());

    let processor = Arc::new(FlakyProcessor::new("token_events", 1));
    pipeline.register_processor(processor.clone()).await;
    pipeline.start().await.unwrap();

    let event = Event::new("state_change").with("token_address", json!("T1"));
    pipeline
        .publish_message("token_events", event)
        .await
        .unwrap();

    // First delivery fails, second succeeds.
    let mut redelivered = false;
    for _ in 0..POLL_ROUNDS {
        if processor.calls.load(Ordering::SeqCst) >= 2 {
            redelivered = true;
            break;
        }
        tokio::time::sleep(POLL_STEP).await;
    }
    assert!(redelivered, "event was not redelivered in time");

    let mut acked = false;
    for _ in 0..POLL_ROUNDS {
        if broker.pending_count("token_events", "flaky_processor").await == 0 {
            acked = true;
            break;
        }
        tokio::time::sleep(POLL_STEP).await;
    }
    assert!(acked, "event was never acknowledged");

    let seen = processor.seen.lock().await;
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].id, seen[1].id, "redelivery must keep the event id");
    assert!(seen[0].id.starts_with("msg_"));

    drop(seen);
    pipeline.shutdown().await;

    // No further deliveries after a successful ack.
    assert_eq!(processor.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_event_round_trip_preserves_payload() {
    let broker = Arc::new(MemoryBroker::new());
    let pipeline = Pipeline::new(broker.clone());

    let processor = Arc::new(FlakyProcessor::new("wallet_events", 0));
    pipeline.register_processor(processor.clone()).await;
    pipeline.start().await.unwrap();

    let sent = Event::new("wallet_flagged")
        .with("wallet_address", json!("W1"))
        .with("reason", json!("rugpull_exit"))
        .with("details", json!({"score": 12.5, "tokens": ["a", "b"]}))
        .with("counts", json!([1, 2, 3]));
    let sent_ts = sent.timestamp.unwrap();
    pipeline
        .publish_message("wallet_events", sent)
        .await
        .unwrap();

    let mut delivered = false;
    for _ in 0..POLL_ROUNDS {
        if !processor.seen.lock().await.is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(POLL_STEP).await;
    }
    assert!(delivered, "event was not delivered in time");
    pipeline.shutdown().await;

    let seen = processor.seen.lock().await;
    let received = &seen[0];
    assert_eq!(received.event_type, "wallet_flagged");
    // Second precision survives the wire format.
    assert_eq!(
        received.timestamp.unwrap().timestamp(),
        sent_ts.timestamp()
    );
    assert_eq!(received.payload_str("wallet_address"), Some("W1"));
    assert_eq!(received.payload_str("reason"), Some("rugpull_exit"));
    // Nested containers round-trip through JSON text.
    assert_eq!(received.payload["details"]["score"], json!(12.5));
    assert_eq!(received.payload["details"]["tokens"], json!(["a", "b"]));
    assert_eq!(received.payload["counts"], json!([1, 2, 3]));
}

#[tokio::test]
async fn test_publish_assigns_id_and_timestamp() {
    let broker = Arc::new(MemoryBroker::new());
    let pipeline = Pipeline::new(broker.clone());

    let mut event = Event::new("bare");
    event.timestamp = None;
    pipeline.publish_message("alert_events", event).await.unwrap();
    assert_eq!(broker.stream_len("alert_events").await, 1);
}

#[tokio::test]
async fn test_group_create_on_existing_group_succeeds() {
    let broker = Arc::new(MemoryBroker::new());
    let pipeline = Pipeline::new(broker.clone());

    // Two pipelines sharing a broker: the second start recreates the
    // same consumer groups without error.
    let processor = Arc::new(FlakyProcessor::new("token_events", 0));
    pipeline.register_processor(processor.clone()).await;
    pipeline.start().await.unwrap();
    pipeline.shutdown().await;

    let pipeline2 = Pipeline::new(broker.clone());
    pipeline2.register_processor(processor).await;
    pipeline2.start().await.unwrap();
    pipeline2.shutdown().await;
}

#[tokio::test]
async fn test_late_registration_does_not_autostart() {
    let broker = Arc::new(MemoryBroker::new());
    let pipeline = Pipeline::new(broker.clone());
    pipeline.start().await.unwrap();

    let processor = Arc::new(FlakyProcessor::new("token_events", 0));
    pipeline.register_processor(processor.clone()).await;

    pipeline
        .publish_message("token_events", Event::new("noop"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Registered after start: no consumer was spawned for it.
    assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    pipeline.shutdown().await;
}
