//! Event pipeline over broker-backed log streams.
//!
//! Register-then-start: processors registered before [`Pipeline::start`]
//! get a consumer task each, reading their stream through a consumer
//! group named after the processor. Delivery is at-least-once - an entry
//! is acknowledged only after `process` succeeds, otherwise the broker
//! re-presents it on the next read cycle. Processors must therefore be
//! idempotent on the event id.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{Broker, StreamEntry};
use crate::types::LifecycleState;

/// Entries pulled per read.
const READ_BATCH: usize = 10;
/// Blocking window per read.
const READ_BLOCK: Duration = Duration::from_secs(1);
/// Pause after a broker read error.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);
/// Grace window for consumers to finish their in-flight batch.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const CONSUMER_NAME: &str = "consumer-1";

/// A pipeline message. Payload values are JSON; nested containers survive
/// the broker's flat record model by travelling as embedded JSON text.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub event_type: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub payload: Map<String, Value>,
}

impl Event {
    pub fn new(event_type: &str) -> Self {
        Self {
            id: String::new(),
            event_type: event_type.to_string(),
            timestamp: Some(Utc::now()),
            payload: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        match self.payload.get(key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }
}

/// A named stream consumer.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Consumer-group identity; duplicate registration overwrites.
    fn name(&self) -> &str;
    /// Stream this processor consumes.
    fn stream(&self) -> &str;
    async fn process(&self, event: Event) -> Result<()>;
}

/// Durable at-least-once event transport.
pub struct Pipeline {
    broker: Arc<dyn Broker>,
    processors: RwLock<HashMap<String, Arc<dyn Processor>>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            processors: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register a processor. Must happen before `start`; processors
    /// registered afterwards do not auto-start.
    pub async fn register_processor(&self, processor: Arc<dyn Processor>) {
        let name = processor.name().to_string();
        info!(processor = %name, stream = processor.stream(), "processor registered");
        self.processors.write().await.insert(name, processor);
    }

    /// Spawn one consumer per registered processor.
    pub async fn start(&self) -> Result<()> {
        info!("starting pipeline");
        let processors: Vec<Arc<dyn Processor>> =
            self.processors.read().await.values().cloned().collect();

        let mut tasks = self.tasks.lock().await;
        for processor in processors {
            let broker = Arc::clone(&self.broker);
            let shutdown = self.shutdown.clone();
            tasks.push(tokio::spawn(async move {
                run_consumer(broker, processor, shutdown).await;
            }));
        }
        Ok(())
    }

    /// Cooperative stop: consumers finish their in-flight batch, then
    /// exit within the grace window.
    pub async fn shutdown(&self) {
        info!("shutting down pipeline");
        self.shutdown.cancel();
        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("pipeline consumer did not stop within grace window");
            }
        }
    }

    /// Append an event to the named stream. Missing id and timestamp are
    /// assigned; nested payload containers are JSON-encoded.
    pub async fn publish_message(&self, stream: &str, mut event: Event) -> Result<String> {
        if event.id.is_empty() {
            event.id = format!("msg_{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
        }
        let timestamp = event.timestamp.unwrap_or_else(Utc::now);

        let mut fields: Vec<(String, String)> = Vec::with_capacity(event.payload.len() + 3);
        fields.push(("id".to_string(), event.id.clone()));
        fields.push(("type".to_string(), event.event_type.clone()));
        fields.push((
            "timestamp".to_string(),
            timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
        for (key, value) in &event.payload {
            fields.push((key.clone(), flatten_value(value)));
        }

        let entry_id = self
            .broker
            .xadd(stream, &fields)
            .await
            .context("failed to publish message")?;
        debug!(stream, msg_id = %event.id, event_type = %event.event_type, "message published");
        Ok(entry_id)
    }

    /// Publish where delivery is telemetry: failures are logged, never
    /// surfaced to the caller.
    pub async fn publish_best_effort(&self, stream: &str, event: Event) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.publish_message(stream, event).await {
            warn!(stream, event_type = %event_type, error = %e, "event publication failed");
        }
    }
}

fn flatten_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => value.to_string(),
        other => other.to_string(),
    }
}

/// Rebuild an [`Event`] from a flat stream entry: `id`, `type` and
/// `timestamp` are lifted; values that look like JSON containers are
/// decoded; everything else passes through as a scalar.
pub fn decode_entry(entry: &StreamEntry) -> Event {
    let mut event = Event {
        id: entry.id.clone(),
        event_type: String::new(),
        timestamp: None,
        payload: Map::new(),
    };

    for (key, value) in &entry.fields {
        match key.as_str() {
            "id" => event.id = value.clone(),
            "type" => event.event_type = value.clone(),
            "timestamp" => {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
                    event.timestamp = Some(parsed.with_timezone(&Utc));
                } else if let Ok(unix) = value.parse::<i64>() {
                    event.timestamp = DateTime::from_timestamp(unix, 0);
                }
            }
            _ => {
                let decoded = if value.starts_with('{') || value.starts_with('[') {
                    match serde_json::from_str::<Value>(value) {
                        Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
                        _ => Value::String(value.clone()),
                    }
                } else {
                    Value::String(value.clone())
                };
                event.payload.insert(key.clone(), decoded);
            }
        }
    }

    event
}

async fn run_consumer(
    broker: Arc<dyn Broker>,
    processor: Arc<dyn Processor>,
    shutdown: CancellationToken,
) {
    let stream = processor.stream().to_string();
    let group = processor.name().to_string();

    if let Err(e) = broker.xgroup_create(&stream, &group).await {
        error!(stream = %stream, group = %group, error = %e, "failed to create consumer group");
        return;
    }
    info!(stream = %stream, group = %group, "consumer started");

    loop {
        let entries = tokio::select! {
            _ = shutdown.cancelled() => {
                info!(group = %group, "consumer stopping");
                return;
            }
            read = broker.xread_group(&stream, &group, CONSUMER_NAME, READ_BATCH, READ_BLOCK) => {
                match read {
                    Ok(entries) => entries,
                    Err(e) => {
                        error!(stream = %stream, group = %group, error = %e, "stream read failed");
                        tokio::time::sleep(READ_ERROR_BACKOFF).await;
                        continue;
                    }
                }
            }
        };

        // The in-flight batch always completes, even under cancellation.
        for entry in entries {
            let entry_id = entry.id.clone();
            let event = decode_entry(&entry);
            match processor.process(event).await {
                Ok(()) => {
                    if let Err(e) = broker.xack(&stream, &group, &entry_id).await {
                        error!(group = %group, id = %entry_id, error = %e, "ack failed");
                    }
                }
                Err(e) => {
                    // No ack: the broker re-presents the entry next cycle.
                    error!(group = %group, id = %entry_id, error = %e, "processing failed, will retry");
                }
            }
        }
    }
}

/// Event types emitted by the token engine.
pub mod events {
    pub const STATE_CHANGE: &str = "state_change";
    pub const PRICE_CHANGE: &str = "price_change";
    pub const VOLUME_SPIKE: &str = "volume_spike";
    pub const REACTIVATION: &str = "reactivation";
}

/// Applies token events back onto the token engine: reactivations and
/// state changes move lifecycle state; market events are observational.
pub struct TokenEventProcessor<E> {
    engine: Arc<E>,
    stream: String,
}

/// The subset of the token engine the processor drives.
#[async_trait]
pub trait TokenStateSink: Send + Sync {
    async fn apply_state(&self, token: &str, state: LifecycleState) -> Result<()>;
}

impl<E: TokenStateSink> TokenEventProcessor<E> {
    pub fn new(engine: Arc<E>, stream: &str) -> Self {
        Self {
            engine,
            stream: stream.to_string(),
        }
    }
}

#[async_trait]
impl<E: TokenStateSink + 'static> Processor for TokenEventProcessor<E> {
    fn name(&self) -> &str {
        "token_processor"
    }

    fn stream(&self) -> &str {
        &self.stream
    }

    async fn process(&self, event: Event) -> Result<()> {
        let Some(token) = event.payload_str("token_address").map(str::to_string) else {
            anyhow::bail!("missing token_address in payload");
        };

        match event.event_type.as_str() {
            events::PRICE_CHANGE => {
                let change = event
                    .payload_f64("price_change")
                    .context("missing price_change in payload")?;
                info!(token = %token, change, "price change observed");
                Ok(())
            }
            events::VOLUME_SPIKE => {
                let volume = event
                    .payload_f64("volume")
                    .context("missing volume in payload")?;
                info!(token = %token, volume, "volume spike observed");
                Ok(())
            }
            events::REACTIVATION => {
                self.engine
                    .apply_state(&token, LifecycleState::Reactivated)
                    .await
            }
            events::STATE_CHANGE => {
                let new_state = event
                    .payload_str("new_state")
                    .and_then(LifecycleState::parse)
                    .context("missing or invalid new_state in payload")?;
                self.engine.apply_state(&token, new_state).await
            }
            other => {
                debug!(event_type = %other, "unknown event type, ignoring");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_scalars_and_containers() {
        assert_eq!(flatten_value(&json!("text")), "text");
        assert_eq!(flatten_value(&json!(1.5)), "1.5");
        assert_eq!(flatten_value(&json!(true)), "true");
        assert_eq!(flatten_value(&json!({"a": 1})), "{\"a\":1}");
        assert_eq!(flatten_value(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn test_decode_lifts_type_and_timestamp() {
        let entry = StreamEntry {
            id: "1-0".to_string(),
            fields: vec![
                ("id".to_string(), "msg_42".to_string()),
                ("type".to_string(), "price_change".to_string()),
                ("timestamp".to_string(), "2025-06-01T12:00:00Z".to_string()),
                ("token_address".to_string(), "T1".to_string()),
                ("details".to_string(), "{\"price\":0.5}".to_string()),
                ("note".to_string(), "{not json".to_string()),
            ],
        };
        let event = decode_entry(&entry);
        assert_eq!(event.id, "msg_42");
        assert_eq!(event.event_type, "price_change");
        assert!(event.timestamp.is_some());
        assert_eq!(event.payload_str("token_address"), Some("T1"));
        assert_eq!(event.payload["details"]["price"], json!(0.5));
        // Unparseable JSON-looking text stays a scalar.
        assert_eq!(event.payload_str("note"), Some("{not json"));
    }

    #[test]
    fn test_payload_f64_accepts_strings() {
        let mut event = Event::new("test");
        event
            .payload
            .insert("x".to_string(), Value::String("1.25".to_string()));
        assert_eq!(event.payload_f64("x"), Some(1.25));
    }
}
