use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use thiserror::Error;

use crate::redis_conn::RedisConnector;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache timed out")]
    Timeout,
}

impl From<tokio::time::error::Elapsed> for CacheError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CacheError::Timeout
    }
}

/// Cache key for a short id: `"url:" + short_id`.
pub fn cache_key(short_id: &str) -> String {
    format!("url:{short_id}")
}

/// Ephemeral `short_id -> original_url` lookups.
///
/// Entries are disposable projections of the store. Callers treat every
/// error as a miss, so implementations only need to report them.
#[async_trait]
pub trait LinkCache: Send + Sync {
    async fn get(&self, short_id: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, short_id: &str, original_url: &str, ttl: Duration)
        -> Result<(), CacheError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

// ── Null ───────────────────────────────────────────────────────────────────

/// Stands in when no cache is configured or reachable. Always misses.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCache;

#[async_trait]
impl LinkCache for NullCache {
    async fn get(&self, _short_id: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

// ── In-process ─────────────────────────────────────────────────────────────

/// Thread-safe in-memory cache mapping short id -> original URL.
///
/// Backed by a DashMap so reads are concurrent and lock-free for most cases.
/// Expired entries are dropped lazily when they are next read, and in bulk by
/// [`MemoryCache::evict_expired`].
#[derive(Clone, Debug, Default)]
pub struct MemoryCache {
    inner: Arc<DashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let before = self.inner.len();
        let now = Instant::now();
        self.inner.retain(|_, (_, expires_at)| *expires_at > now);
        before.saturating_sub(self.inner.len())
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl LinkCache for MemoryCache {
    async fn get(&self, short_id: &str) -> Result<Option<String>, CacheError> {
        let key = cache_key(short_id);
        let hit = match self.inner.get(&key) {
            Some(entry) if entry.1 > Instant::now() => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };

        if hit {
            // Only remove if still expired; a concurrent set may have refreshed it.
            self.inner
                .remove_if(&key, |_, (_, expires_at)| *expires_at <= Instant::now());
        }
        Ok(None)
    }

    async fn set(
        &self,
        short_id: &str,
        original_url: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        self.inner
            .insert(cache_key(short_id), (original_url.to_owned(), expires_at));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ── Redis ──────────────────────────────────────────────────────────────────

/// Plain string values under `url:<short_id>` with `SET … EX`.
#[derive(Debug)]
pub struct RedisCache {
    redis: Arc<RedisConnector>,
}

impl RedisCache {
    pub fn new(redis: Arc<RedisConnector>) -> Self {
        Self { redis }
    }

    /// Check the server answers before committing to this backend.
    pub async fn probe(&self) -> Result<(), CacheError> {
        self.redis.ping().await.map_err(CacheError::from)
    }
}

#[async_trait]
impl LinkCache for RedisCache {
    async fn get(&self, short_id: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.redis.connection().await?;
        let result: redis::RedisResult<Option<String>> = conn.get(cache_key(short_id)).await;
        if result.is_err() {
            self.redis.reset().await;
        }
        Ok(result?)
    }

    async fn set(
        &self,
        short_id: &str,
        original_url: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.redis.connection().await?;
        // EX 0 is rejected by Redis.
        let seconds = ttl.as_secs().max(1);
        let result: redis::RedisResult<()> =
            conn.set_ex(cache_key(short_id), original_url, seconds).await;
        if result.is_err() {
            self.redis.reset().await;
        }
        Ok(result?)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
