//! Cache store backends
//!
//! One trait, two implementations: Redis for deployments, an in-process
//! map for dev and tests. Writes are last-write-wins; synchronisation is
//! the store's problem, not the caller's.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::time::{Duration, Instant};

/// What an admin cache inspection found. Retrieval order is string,
/// then list, then sorted set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InspectValue {
    NotFound,
    String(String),
    List(Vec<String>),
    SortedSet(Vec<(String, f64)>),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Returns true when a value was actually removed.
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn inspect(&self, key: &str) -> Result<InspectValue>;
}

// ── Redis ────────────────────────────────────────────────────────────────────

pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<RedisStore> {
        let client = redis::Client::open(url).context("Failed to create Redis client")?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(RedisStore { conn })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .context("Redis GET failed")?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await
            .context("Redis SET failed")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .context("Redis DEL failed")?;
        Ok(removed > 0)
    }

    async fn inspect(&self, key: &str) -> Result<InspectValue> {
        let mut conn = self.conn.clone();
        // string -> list -> sorted set, in that order. A WRONGTYPE reply
        // just moves on to the next shape.
        if let Ok(Some(value)) = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
        {
            return Ok(InspectValue::String(value));
        }
        if let Ok(items) = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async::<_, Vec<String>>(&mut conn)
            .await
        {
            if !items.is_empty() {
                return Ok(InspectValue::List(items));
            }
        }
        if let Ok(items) = redis::cmd("ZRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async::<_, Vec<(String, f64)>>(&mut conn)
            .await
        {
            if !items.is_empty() {
                return Ok(InspectValue::SortedSet(items));
            }
        }
        Ok(InspectValue::NotFound)
    }
}

// ── In-memory ────────────────────────────────────────────────────────────────

/// Process-local store for dev and tests. Expiry is lazy: entries die on
/// the first read past their deadline.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value().clone();
            if Instant::now() < expires_at {
                return Ok(Some(value));
            }
        }
        self.entries.remove_if(key, |_, (_, expires_at)| Instant::now() >= *expires_at);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn inspect(&self, key: &str) -> Result<InspectValue> {
        Ok(match self.get(key).await? {
            Some(value) => InspectValue::String(value),
            None => InspectValue::NotFound,
        })
    }
}
