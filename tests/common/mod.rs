#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use nanourl::{
    cache::{CacheError, LinkCache},
    counter::{Counter, CounterError, SqliteCounter},
    observe::{LinkObserver, Operation, Outcome, Step},
    service::{LinkService, ServiceSettings},
    store::SqliteStore,
};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

/// A fresh, migrated in-memory database on a single connection.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn settings() -> ServiceSettings {
    ServiceSettings {
        backend_timeout: Duration::from_secs(2),
        ..ServiceSettings::default()
    }
}

/// Service over SQLite store + SQLite counter with the given cache.
pub async fn service_with(cache: Arc<dyn LinkCache>) -> (LinkService, SqlitePool) {
    let pool = memory_pool().await;
    let service = LinkService::new(
        Arc::new(SqliteStore::new(pool.clone())),
        Arc::new(SqliteCounter::new(pool.clone())),
        cache,
        settings(),
    );
    (service, pool)
}

/// Wraps a counter and remembers how often it was advanced.
pub struct CountingCounter {
    pub inner: SqliteCounter,
    pub calls: AtomicUsize,
}

impl CountingCounter {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            inner: SqliteCounter::new(pool),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Counter for CountingCounter {
    async fn next(&self) -> Result<u64, CounterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.next().await
    }

    async fn ensure_floor(&self, floor: u64) -> Result<(), CounterError> {
        self.inner.ensure_floor(floor).await
    }
}

/// A counter whose backend is gone.
pub struct DownCounter;

#[async_trait]
impl Counter for DownCounter {
    async fn next(&self) -> Result<u64, CounterError> {
        Err(CounterError::Timeout)
    }

    async fn ensure_floor(&self, _: u64) -> Result<(), CounterError> {
        Err(CounterError::Timeout)
    }
}

/// A counter whose first `ensure_floor` fails, as if its backend were still
/// coming up.
pub struct FlakyFloorCounter {
    pub inner: SqliteCounter,
    pub floor_attempts: AtomicUsize,
}

impl FlakyFloorCounter {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            inner: SqliteCounter::new(pool),
            floor_attempts: AtomicUsize::new(0),
        }
    }

    pub fn floor_attempts(&self) -> usize {
        self.floor_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Counter for FlakyFloorCounter {
    async fn next(&self) -> Result<u64, CounterError> {
        self.inner.next().await
    }

    async fn ensure_floor(&self, floor: u64) -> Result<(), CounterError> {
        if self.floor_attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(CounterError::Timeout);
        }
        self.inner.ensure_floor(floor).await
    }
}

/// A cache that fails every call.
pub struct BrokenCache;

#[async_trait]
impl LinkCache for BrokenCache {
    async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Timeout)
    }

    async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
        Err(CacheError::Timeout)
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

/// A cache that never answers in time.
pub struct StalledCache;

#[async_trait]
impl LinkCache for StalledCache {
    async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(None)
    }

    async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stalled"
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub steps: Mutex<Vec<(Operation, Step, Outcome)>>,
    pub finished: Mutex<Vec<(Operation, Outcome)>>,
}

impl LinkObserver for RecordingObserver {
    fn step(&self, op: Operation, step: Step, _: Duration, outcome: Outcome) {
        self.steps.lock().unwrap().push((op, step, outcome));
    }

    fn finished(&self, op: Operation, _: Duration, outcome: Outcome) {
        self.finished.lock().unwrap().push((op, outcome));
    }
}
