//! Redis-backed cache and stream broker.
//!
//! KV traffic shares one multiplexed connection; blocking stream reads
//! open their own connection so a 1 s block never stalls the shared one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

use super::{Broker, Cache, StreamEntry};
use crate::config::RedisConfig;

/// Shared Redis client implementing both [`Cache`] and [`Broker`].
pub struct RedisCache {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
}

impl RedisCache {
    /// Connect and verify the server responds.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url()).context("invalid redis url")?;
        let mut conn = client
            .get_multiplexed_tokio_connection()
            .await
            .context("failed to connect to redis")?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .context("redis ping failed")?;
        info!(host = %config.host, port = config.port, "connected to redis");
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.keys(pattern).await?)
    }

    async fn purge_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = conn.del(&keys).await?;
        Ok(removed)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn.clone();
        let secs: i64 = conn.ttl(key).await?;
        Ok(if secs >= 0 {
            Some(Duration::from_secs(secs as u64))
        } else {
            None
        })
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.incr(key, 1i64).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, ttl.as_secs() as i64).await?;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.lrange(key, start as isize, stop as isize).await?)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(key, member, score).await?;
        Ok(())
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.zrange(key, start as isize, stop as isize).await?)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, message).await?;
        Ok(())
    }
}

fn entries_from_reply(reply: StreamReadReply) -> Vec<StreamEntry> {
    let mut entries = Vec::new();
    for key in reply.keys {
        for id in key.ids {
            let mut fields = Vec::with_capacity(id.map.len());
            for (name, value) in id.map {
                if let Ok(text) = redis::from_redis_value::<String>(&value) {
                    fields.push((name, text));
                }
            }
            entries.push(StreamEntry { id: id.id, fields });
        }
    }
    entries
}

#[async_trait]
impl Broker for RedisCache {
    async fn xadd(&self, stream: &str, fields: &[(String, String)]) -> Result<String> {
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(stream, "*", fields).await?;
        Ok(id)
    }

    async fn xgroup_create(&self, stream: &str, group: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<String> =
            conn.xgroup_create_mkstream(stream, group, "$").await;
        match result {
            Ok(_) => Ok(()),
            // Existing group is success.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn xread_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>> {
        // Dedicated connection: XREADGROUP BLOCK must not stall shared KV traffic.
        let mut conn = self.client.get_multiplexed_tokio_connection().await?;

        // Unacknowledged entries first, so failed processing is retried.
        let pending_opts = StreamReadOptions::default().group(group, consumer).count(count);
        let pending: StreamReadReply = conn
            .xread_options(&[stream], &["0"], &pending_opts)
            .await?;
        let entries = entries_from_reply(pending);
        if !entries.is_empty() {
            return Ok(entries);
        }

        let new_opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block.as_millis() as usize);
        let reply: StreamReadReply = conn.xread_options(&[stream], &[">"], &new_opts).await?;
        Ok(entries_from_reply(reply))
    }

    async fn xack(&self, stream: &str, group: &str, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.xack::<_, _, _, i64>(stream, group, &[id]).await?;
        Ok(())
    }
}
