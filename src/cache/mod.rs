//! Cache and log-stream broker abstraction.
//!
//! The hot state layer exposes two narrow traits: [`Cache`] for TTL'd
//! key/value access and [`Broker`] for append-only streams with consumer
//! groups. [`RedisCache`] implements both against one server; the
//! in-memory variants back tests and local runs with the same semantics,
//! including pending-entry redelivery on the broker side.

pub mod memory;
pub mod redis;

pub use self::redis::RedisCache;
pub use memory::{MemoryBroker, MemoryCache};

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// TTL'd key/value surface.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
    /// Delete every key matching the glob pattern; returns the count.
    async fn purge_pattern(&self, pattern: &str) -> Result<u64>;
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;
    async fn incr(&self, key: &str) -> Result<i64>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;
    async fn lpush(&self, key: &str, value: &str) -> Result<()>;
    async fn rpush(&self, key: &str, value: &str) -> Result<()>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()>;
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;
    async fn publish(&self, channel: &str, message: &str) -> Result<()>;
}

/// One record read from a stream.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    /// Broker-generated entry id, stable across redeliveries.
    pub id: String,
    pub fields: Vec<(String, String)>,
}

/// Append-only log streams with consumer-group delivery.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append a record; the broker generates and returns the entry id.
    async fn xadd(&self, stream: &str, fields: &[(String, String)]) -> Result<String>;
    /// Create a consumer group; an existing group is success.
    async fn xgroup_create(&self, stream: &str, group: &str) -> Result<()>;
    /// Read up to `count` entries for the group, blocking up to `block`.
    /// Unacknowledged entries are re-presented before new ones.
    async fn xread_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>>;
    /// Acknowledge one entry for the group.
    async fn xack(&self, stream: &str, group: &str, id: &str) -> Result<()>;
}

/// Cloneable cache handle adding the typed accessors the components use.
#[derive(Clone)]
pub struct CacheHandle {
    inner: Arc<dyn Cache>,
}

impl CacheHandle {
    pub fn new(inner: Arc<dyn Cache>) -> Self {
        Self { inner }
    }

    pub fn raw(&self) -> &Arc<dyn Cache> {
        &self.inner
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    pub async fn purge_pattern(&self, pattern: &str) -> Result<u64> {
        self.inner.purge_pattern(pattern).await
    }

    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.inner.keys(pattern).await
    }

    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.inner.ttl(key).await
    }

    /// JSON-decode a cached struct; a missing key or a decode failure both
    /// read as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.inner.get(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            _ => None,
        }
    }

    /// JSON-encode and store a struct.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.inner.set(key, &raw, ttl).await
    }

    pub async fn get_f64(&self, key: &str) -> Option<f64> {
        match self.inner.get(key).await {
            Ok(Some(raw)) => raw.parse().ok(),
            _ => None,
        }
    }

    pub async fn set_f64(&self, key: &str, value: f64, ttl: Option<Duration>) -> Result<()> {
        self.inner.set(key, &value.to_string(), ttl).await
    }

    pub async fn get_i64(&self, key: &str) -> Option<i64> {
        match self.inner.get(key).await {
            Ok(Some(raw)) => raw.parse().ok(),
            _ => None,
        }
    }

    pub async fn set_i64(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()> {
        self.inner.set(key, &value.to_string(), ttl).await
    }
}
