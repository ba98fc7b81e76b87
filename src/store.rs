use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::models::LinkRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("short id '{0}' already exists")]
    DuplicateShortId(String),

    #[error("url already has a short link")]
    DuplicateUrl,

    #[error("store timed out")]
    Timeout,

    #[error("store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

impl From<tokio::time::error::Elapsed> for StoreError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        StoreError::Timeout
    }
}

/// Authoritative persistence for link records.
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn find_by_url(&self, original_url: &str) -> Result<Option<LinkRecord>, StoreError>;

    async fn find_by_id(&self, short_id: &str) -> Result<Option<LinkRecord>, StoreError>;

    /// Insert a new record. Fails with `DuplicateShortId` or `DuplicateUrl`
    /// when a uniqueness constraint rejects it.
    async fn insert(&self, record: &LinkRecord) -> Result<(), StoreError>;

    /// Atomically bump `clicks` and return the updated record, or `None`
    /// when no record has that id.
    async fn increment_clicks(&self, short_id: &str) -> Result<Option<LinkRecord>, StoreError>;

    /// Delete every record created before `cutoff`, returning how many went.
    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

// ── SQLite ─────────────────────────────────────────────────────────────────

const COLUMNS: &str = "short_id, original_url, clicks, created_by, created_at";

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkStore for SqliteStore {
    async fn find_by_url(&self, original_url: &str) -> Result<Option<LinkRecord>, StoreError> {
        let record: Option<LinkRecord> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM links WHERE original_url = ?1"
        ))
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_by_id(&self, short_id: &str) -> Result<Option<LinkRecord>, StoreError> {
        let record: Option<LinkRecord> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM links WHERE short_id = ?1"))
                .bind(short_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    async fn insert(&self, record: &LinkRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO links (short_id, original_url, clicks, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&record.short_id)
        .bind(&record.original_url)
        .bind(record.clicks)
        .bind(&record.created_by)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                // SQLite names the offending column: "UNIQUE constraint failed: links.original_url"
                if db.message().contains("original_url") {
                    Err(StoreError::DuplicateUrl)
                } else {
                    Err(StoreError::DuplicateShortId(record.short_id.clone()))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn increment_clicks(&self, short_id: &str) -> Result<Option<LinkRecord>, StoreError> {
        let record: Option<LinkRecord> = sqlx::query_as(&format!(
            "UPDATE links SET clicks = clicks + 1 WHERE short_id = ?1 RETURNING {COLUMNS}"
        ))
        .bind(short_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let affected = sqlx::query("DELETE FROM links WHERE created_at < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(affected)
    }
}

// ── Retention ──────────────────────────────────────────────────────────────

/// Periodically delete records older than `retention`.
///
/// Runs until the runtime shuts down. A failed sweep is logged and retried on
/// the next tick.
pub fn spawn_retention_sweeper(
    store: Arc<dyn LinkStore>,
    retention: Duration,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match sweep_once(store.as_ref(), retention).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Retention sweep removed {} expired link(s)", n),
                Err(e) => tracing::error!("Retention sweep failed: {}", e),
            }
        }
    })
}

/// Delete everything created more than `retention` ago.
pub async fn sweep_once(store: &dyn LinkStore, retention: Duration) -> Result<u64, StoreError> {
    // A window too large to represent can never have anything expire.
    let Some(cutoff) = chrono::Duration::from_std(retention)
        .ok()
        .and_then(|r| Utc::now().checked_sub_signed(r))
    else {
        return Ok(0);
    };
    store.purge_created_before(cutoff).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// A fresh, migrated in-memory database. One connection, since every
    /// `:memory:` connection is its own database.
    pub(crate) async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn store() -> SqliteStore {
        SqliteStore::new(memory_pool().await)
    }

    #[tokio::test]
    async fn insert_then_find_both_ways() {
        let store = store().await;
        let record = LinkRecord::new("1", "https://a.com", Some("tester"));
        store.insert(&record).await.unwrap();

        assert_eq!(store.find_by_id("1").await.unwrap(), Some(record.clone()));
        assert_eq!(
            store.find_by_url("https://a.com").await.unwrap(),
            Some(record)
        );
        assert_eq!(store.find_by_id("2").await.unwrap(), None);
        assert_eq!(store.find_by_url("https://b.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn urls_are_matched_exactly() {
        let store = store().await;
        store
            .insert(&LinkRecord::new("1", "https://a.com/x", None))
            .await
            .unwrap();

        assert!(store.find_by_url("https://a.com/x/").await.unwrap().is_none());
        assert!(store.find_by_url("HTTPS://a.com/x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_short_id_is_rejected() {
        let store = store().await;
        store
            .insert(&LinkRecord::new("1", "https://a.com", None))
            .await
            .unwrap();

        let err = store
            .insert(&LinkRecord::new("1", "https://b.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateShortId(id) if id == "1"));
    }

    #[tokio::test]
    async fn duplicate_url_is_rejected() {
        let store = store().await;
        store
            .insert(&LinkRecord::new("1", "https://a.com", None))
            .await
            .unwrap();

        let err = store
            .insert(&LinkRecord::new("2", "https://a.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUrl));
    }

    #[tokio::test]
    async fn increment_returns_updated_record() {
        let store = store().await;
        store
            .insert(&LinkRecord::new("1", "https://a.com", None))
            .await
            .unwrap();

        let first = store.increment_clicks("1").await.unwrap().unwrap();
        let second = store.increment_clicks("1").await.unwrap().unwrap();
        assert_eq!(first.clicks, 1);
        assert_eq!(second.clicks, 2);
        assert_eq!(store.find_by_id("1").await.unwrap().unwrap().clicks, 2);
    }

    #[tokio::test]
    async fn increment_on_missing_is_none() {
        let store = store().await;
        assert_eq!(store.increment_clicks("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn purge_removes_only_old_records() {
        let store = store().await;

        let mut old = LinkRecord::new("1", "https://old.com", None);
        old.created_at = Utc::now() - chrono::Duration::days(31);
        store.insert(&old).await.unwrap();
        store
            .insert(&LinkRecord::new("2", "https://new.com", None))
            .await
            .unwrap();

        let removed = sweep_once(&store, Duration::from_secs(30 * 24 * 3600))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.find_by_id("1").await.unwrap().is_none());
        assert!(store.find_by_id("2").await.unwrap().is_some());
    }
}
