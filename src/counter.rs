use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::redis_conn::RedisConnector;

/// Well-known key holding the monotonic link counter.
pub const COUNTER_KEY: &str = "url:counter";

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter unavailable: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("counter unavailable: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("counter timed out")]
    Timeout,

    #[error("counter holds a negative value ({0})")]
    Corrupt(i64),
}

impl From<tokio::time::error::Elapsed> for CounterError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CounterError::Timeout
    }
}

/// Source of raw link ids.
///
/// `next` must be atomic across every caller of every process sharing the
/// backend: no value is handed out twice and none is skipped.
#[async_trait]
pub trait Counter: Send + Sync {
    async fn next(&self) -> Result<u64, CounterError>;

    /// Raise the counter to at least `floor`. Never lowers it.
    async fn ensure_floor(&self, floor: u64) -> Result<(), CounterError>;
}

fn to_u64(v: i64) -> Result<u64, CounterError> {
    u64::try_from(v).map_err(|_| CounterError::Corrupt(v))
}

// ── Redis ──────────────────────────────────────────────────────────────────

/// `INCR` on a single Redis key.
#[derive(Debug)]
pub struct RedisCounter {
    redis: Arc<RedisConnector>,
    key: String,
}

// GET + conditional SET must be one atomic step, hence a script.
const RAISE_TO_FLOOR: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local floor = tonumber(ARGV[1])
if current < floor then
    redis.call('SET', KEYS[1], ARGV[1])
    return floor
end
return current
"#;

impl RedisCounter {
    pub fn new(redis: Arc<RedisConnector>) -> Self {
        Self {
            redis,
            key: COUNTER_KEY.to_owned(),
        }
    }
}

#[async_trait]
impl Counter for RedisCounter {
    async fn next(&self) -> Result<u64, CounterError> {
        let mut conn = self.redis.connection().await?;
        let result: redis::RedisResult<i64> = conn.incr(&self.key, 1).await;
        match result {
            Ok(v) => to_u64(v),
            Err(e) => {
                self.redis.reset().await;
                Err(e.into())
            }
        }
    }

    async fn ensure_floor(&self, floor: u64) -> Result<(), CounterError> {
        let mut conn = self.redis.connection().await?;
        let result: redis::RedisResult<i64> = redis::Script::new(RAISE_TO_FLOOR)
            .key(&self.key)
            .arg(floor)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(current) => {
                tracing::debug!("Redis counter '{}' is at {}", self.key, current);
                Ok(())
            }
            Err(e) => {
                self.redis.reset().await;
                Err(e.into())
            }
        }
    }
}

// ── SQLite ─────────────────────────────────────────────────────────────────

/// A single row in the `counters` table, bumped with `UPDATE … RETURNING`.
///
/// SQLite serialises writers, so the update is atomic across every
/// connection to the same database file.
#[derive(Clone, Debug)]
pub struct SqliteCounter {
    pool: SqlitePool,
    name: String,
}

impl SqliteCounter {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            name: COUNTER_KEY.to_owned(),
        }
    }
}

#[async_trait]
impl Counter for SqliteCounter {
    async fn next(&self) -> Result<u64, CounterError> {
        let value: i64 = sqlx::query_scalar(
            "UPDATE counters SET value = value + 1 WHERE name = ?1 RETURNING value",
        )
        .bind(&self.name)
        .fetch_one(&self.pool)
        .await?;

        to_u64(value)
    }

    async fn ensure_floor(&self, floor: u64) -> Result<(), CounterError> {
        let floor = i64::try_from(floor).unwrap_or(i64::MAX);
        sqlx::query(
            "INSERT INTO counters (name, value) VALUES (?1, ?2)
             ON CONFLICT (name) DO UPDATE SET value = MAX(value, excluded.value)",
        )
        .bind(&self.name)
        .bind(floor)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::memory_pool;
    use std::collections::HashSet;

    #[tokio::test]
    async fn sqlite_counter_starts_at_one() {
        let counter = SqliteCounter::new(memory_pool().await);
        assert_eq!(counter.next().await.unwrap(), 1);
        assert_eq!(counter.next().await.unwrap(), 2);
        assert_eq!(counter.next().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn floor_only_raises() {
        let counter = SqliteCounter::new(memory_pool().await);
        counter.ensure_floor(100).await.unwrap();
        assert_eq!(counter.next().await.unwrap(), 101);

        counter.ensure_floor(5).await.unwrap();
        assert_eq!(counter.next().await.unwrap(), 102);
    }

    #[tokio::test]
    async fn concurrent_callers_never_share_a_value() {
        let counter = Arc::new(SqliteCounter::new(memory_pool().await));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let counter = counter.clone();
                tokio::spawn(async move { counter.next().await.unwrap() })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()));
        }
        // Dense: nothing skipped.
        assert_eq!(seen, (1..=50).collect());
    }
}
