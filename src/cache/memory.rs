//! In-memory cache and broker.
//!
//! Same surface as the Redis-backed implementations so tests and local
//! runs exercise real component wiring. The broker keeps per-group
//! cursors and pending sets: entries read but not acknowledged are
//! re-presented on the next read, which is exactly the at-least-once
//! behaviour the pipeline relies on.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{Broker, Cache, StreamEntry};

struct ValueEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl ValueEntry {
    fn live(&self) -> bool {
        self.expires_at.map_or(true, |at| at > Instant::now())
    }
}

/// In-memory [`Cache`].
#[derive(Default)]
pub struct MemoryCache {
    values: RwLock<HashMap<String, ValueEntry>>,
    lists: RwLock<HashMap<String, Vec<String>>>,
    zsets: RwLock<HashMap<String, Vec<(f64, String)>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Glob match supporting `*` wildcards, the subset key patterns use.
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }
    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().await;
        Ok(values
            .get(key)
            .filter(|entry| entry.live())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut values = self.values.write().await;
        values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let values = self.values.read().await;
        Ok(values
            .iter()
            .filter(|(k, v)| v.live() && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn purge_pattern(&self, pattern: &str) -> Result<u64> {
        let mut values = self.values.write().await;
        let before = values.len();
        values.retain(|k, _| !glob_match(pattern, k));
        Ok((before - values.len()) as u64)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let values = self.values.read().await;
        Ok(values.get(key).filter(|e| e.live()).and_then(|entry| {
            entry
                .expires_at
                .map(|at| at.saturating_duration_since(Instant::now()))
        }))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut values = self.values.write().await;
        let next = values
            .get(key)
            .filter(|e| e.live())
            .and_then(|e| e.value.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        values.insert(
            key.to_string(),
            ValueEntry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut values = self.values.write().await;
        if let Some(entry) = values.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        self.lists
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .insert(0, value.to_string());
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        self.lists
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let lists = self.lists.read().await;
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        let len = list.len() as i64;
        let norm = |i: i64| -> i64 {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len - 1)
            }
        };
        if len == 0 {
            return Ok(Vec::new());
        }
        let (start, stop) = (norm(start), norm(stop));
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(list[start as usize..=(stop as usize)].to_vec())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let mut zsets = self.zsets.write().await;
        let set = zsets.entry(key.to_string()).or_default();
        set.retain(|(_, m)| m != member);
        set.push((score, member.to_string()));
        set.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(())
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let zsets = self.zsets.read().await;
        let Some(set) = zsets.get(key) else {
            return Ok(Vec::new());
        };
        let len = set.len() as i64;
        if len == 0 {
            return Ok(Vec::new());
        }
        let norm = |i: i64| -> i64 {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len - 1)
            }
        };
        let (start, stop) = (norm(start), norm(stop));
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(set[start as usize..=(stop as usize)]
            .iter()
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn publish(&self, _channel: &str, _message: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Group {
    /// Index of the next not-yet-delivered entry in the stream.
    cursor: usize,
    /// Delivered but unacknowledged entries, ordered by id.
    pending: BTreeMap<String, StreamEntry>,
}

#[derive(Default)]
struct StreamState {
    entries: Vec<StreamEntry>,
    groups: HashMap<String, Group>,
}

/// In-memory [`Broker`] with consumer-group pending/redelivery semantics.
#[derive(Default)]
pub struct MemoryBroker {
    streams: RwLock<HashMap<String, StreamState>>,
    sequence: AtomicU64,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entries appended to a stream, for test assertions.
    pub async fn stream_len(&self, stream: &str) -> usize {
        self.streams
            .read()
            .await
            .get(stream)
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    /// Unacknowledged entries for a group, for test assertions.
    pub async fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.streams
            .read()
            .await
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn xadd(&self, stream: &str, fields: &[(String, String)]) -> Result<String> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let id = format!("{}-0", seq);
        let mut streams = self.streams.write().await;
        streams
            .entry(stream.to_string())
            .or_default()
            .entries
            .push(StreamEntry {
                id: id.clone(),
                fields: fields.to_vec(),
            });
        Ok(id)
    }

    async fn xgroup_create(&self, stream: &str, group: &str) -> Result<()> {
        let mut streams = self.streams.write().await;
        let state = streams.entry(stream.to_string()).or_default();
        // Existing group is success, matching BUSYGROUP handling.
        state.groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn xread_group(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>> {
        let deadline = Instant::now() + block;
        loop {
            {
                let mut streams = self.streams.write().await;
                let state = streams.entry(stream.to_string()).or_default();
                let total = state.entries.len();
                let Some(group_state) = state.groups.get_mut(group) else {
                    bail!("NOGROUP no such consumer group '{}' for stream '{}'", group, stream);
                };

                let mut batch: Vec<StreamEntry> = group_state
                    .pending
                    .values()
                    .take(count)
                    .cloned()
                    .collect();
                while batch.len() < count && group_state.cursor < total {
                    let entry = state.entries[group_state.cursor].clone();
                    group_state.cursor += 1;
                    group_state.pending.insert(entry.id.clone(), entry.clone());
                    batch.push(entry);
                }
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn xack(&self, stream: &str, group: &str, id: &str) -> Result<()> {
        let mut streams = self.streams.write().await;
        if let Some(state) = streams.get_mut(stream) {
            if let Some(group_state) = state.groups.get_mut(group) {
                group_state.pending.remove(id);
            }
        }
        Ok(())
    }
}
