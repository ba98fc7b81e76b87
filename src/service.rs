//! Link creation, resolution and stats on top of the store, counter and cache.
//!
//! The store is the only source of truth. The cache is consulted first on
//! resolve and primed after every successful create or store read, but any
//! cache failure degrades to a miss. Click counts on cache hits are bumped in
//! the background and may be lost.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio::{
    sync::{OnceCell, Semaphore},
    time::error::Elapsed,
};

use crate::{
    base62,
    cache::LinkCache,
    counter::{Counter, CounterError},
    models::LinkRecord,
    observe::{LinkObserver, Operation, Outcome, Step, TracingObserver},
    store::{LinkStore, StoreError},
};

#[derive(Debug, Error)]
pub enum CreationError {
    #[error(transparent)]
    Counter(#[from] CounterError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum LinkError {
    /// No record has this short id. An expected outcome, not a failure.
    #[error("short link not found")]
    NotFound,

    #[error("link creation failed: {0}")]
    CreationFailed(#[from] CreationError),

    #[error("{0}")]
    StoreUnavailable(#[source] StoreError),
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Lifetime of cache entries written by the service.
    pub cache_ttl: Duration,
    /// Upper bound on any single store, counter or cache call.
    pub backend_timeout: Duration,
    /// Background click increments allowed in flight; more are dropped.
    pub max_pending_clicks: usize,
    /// Minted ids are at least this many symbols long.
    pub min_id_length: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(24 * 3600),
            backend_timeout: Duration::from_millis(500),
            max_pending_clicks: 1024,
            min_id_length: 1,
        }
    }
}

#[derive(Clone)]
pub struct LinkService {
    store: Arc<dyn LinkStore>,
    counter: Arc<dyn Counter>,
    cache: Arc<dyn LinkCache>,
    observer: Arc<dyn LinkObserver>,
    pending_clicks: Arc<Semaphore>,
    floor_seeded: Arc<OnceCell<()>>,
    settings: ServiceSettings,
}

impl LinkService {
    pub fn new(
        store: Arc<dyn LinkStore>,
        counter: Arc<dyn Counter>,
        cache: Arc<dyn LinkCache>,
        settings: ServiceSettings,
    ) -> Self {
        let permits = settings.max_pending_clicks.min(Semaphore::MAX_PERMITS);
        Self {
            store,
            counter,
            cache,
            observer: Arc::new(TracingObserver),
            pending_clicks: Arc::new(Semaphore::new(permits)),
            floor_seeded: Arc::new(OnceCell::new()),
            settings,
        }
    }

    /// Replace the default tracing observer.
    pub fn with_observer(mut self, observer: Arc<dyn LinkObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn cache_backend(&self) -> &'static str {
        self.cache.name()
    }

    /// Seed the counter so every id minted from now on is at least
    /// `min_id_length` symbols long.
    ///
    /// Succeeds at most once per service. Until it has, every create retries
    /// it before taking an id and fails if the counter still refuses.
    pub async fn ensure_min_id_length(&self) -> Result<(), CounterError> {
        let floor = base62::first_value_of_width(self.settings.min_id_length).saturating_sub(1);
        if floor == 0 {
            return Ok(());
        }

        self.floor_seeded
            .get_or_try_init(|| {
                self.timed(
                    Operation::Create,
                    Step::SeedCounter,
                    self.counter.ensure_floor(floor),
                )
            })
            .await?;
        Ok(())
    }

    // ── Create ─────────────────────────────────────────────────────────────

    /// Return the record for `original_url`, minting one if none exists.
    ///
    /// Repeated calls with the identical string return the same record and
    /// advance the counter only once.
    pub async fn create_or_get(
        &self,
        original_url: &str,
        created_by: Option<&str>,
    ) -> Result<LinkRecord, LinkError> {
        let started = Instant::now();
        let result = self.create(original_url, created_by).await;
        self.observer
            .finished(Operation::Create, started.elapsed(), Outcome::of(&result));

        if let Err(e) = &result {
            tracing::error!("Failed to create short link for '{}': {}", original_url, e);
        }
        result
    }

    async fn create(
        &self,
        original_url: &str,
        created_by: Option<&str>,
    ) -> Result<LinkRecord, LinkError> {
        let op = Operation::Create;

        let existing = self
            .timed(op, Step::DedupLookup, self.store.find_by_url(original_url))
            .await
            .map_err(CreationError::from)?;
        if let Some(record) = existing {
            tracing::debug!("Reusing short link '{}'", record.short_id);
            return Ok(record);
        }

        self.ensure_min_id_length()
            .await
            .map_err(CreationError::from)?;

        let raw = self
            .timed(op, Step::NextId, self.counter.next())
            .await
            .map_err(CreationError::from)?;
        let record = LinkRecord::new(base62::encode(raw), original_url, created_by);

        match self.timed(op, Step::Insert, self.store.insert(&record)).await {
            Ok(()) => {}
            Err(StoreError::DuplicateUrl) => return self.adopt_winner(original_url).await,
            Err(e @ StoreError::DuplicateShortId(_)) => {
                tracing::error!(
                    "Counter handed out {} twice; refusing to overwrite '{}'",
                    raw,
                    record.short_id
                );
                return Err(CreationError::from(e).into());
            }
            Err(e) => return Err(CreationError::from(e).into()),
        }

        self.prime_cache(op, &record.short_id, &record.original_url)
            .await;
        tracing::info!(
            "Created short link '{}' for {}",
            record.short_id,
            record.original_url
        );
        Ok(record)
    }

    /// Another caller inserted the same URL between our dedup lookup and our
    /// insert. Their record wins; our counter value is simply unused.
    async fn adopt_winner(&self, original_url: &str) -> Result<LinkRecord, LinkError> {
        let winner = self
            .timed(
                Operation::Create,
                Step::DedupLookup,
                self.store.find_by_url(original_url),
            )
            .await
            .map_err(CreationError::from)?;

        match winner {
            Some(record) => {
                tracing::debug!(
                    "Lost create race for {}; using '{}'",
                    original_url,
                    record.short_id
                );
                Ok(record)
            }
            // The winner vanished again (retention purge); give up rather than loop.
            None => Err(CreationError::Store(StoreError::DuplicateUrl).into()),
        }
    }

    // ── Resolve ────────────────────────────────────────────────────────────

    /// Resolve a short id to its original URL, counting the click.
    pub async fn resolve(&self, short_id: &str) -> Result<String, LinkError> {
        let started = Instant::now();
        let result = self.lookup_and_count(short_id).await;
        self.observer
            .finished(Operation::Resolve, started.elapsed(), Outcome::of(&result));

        match &result {
            Err(LinkError::NotFound) => tracing::debug!("Short link '{}' not found", short_id),
            Err(e) => tracing::error!("Failed to resolve '{}': {}", short_id, e),
            Ok(_) => {}
        }
        result
    }

    async fn lookup_and_count(&self, short_id: &str) -> Result<String, LinkError> {
        let op = Operation::Resolve;

        // Nothing outside the alphabet was ever minted.
        if !base62::is_valid(short_id) {
            return Err(LinkError::NotFound);
        }

        match self.timed(op, Step::CacheGet, self.cache.get(short_id)).await {
            Ok(Some(url)) => {
                self.count_click_in_background(short_id);
                return Ok(url);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(
                "Cache '{}' read failed for '{}', falling back to store: {}",
                self.cache.name(),
                short_id,
                e
            ),
        }

        let record = self
            .timed(
                op,
                Step::IncrementClicks,
                self.store.increment_clicks(short_id),
            )
            .await
            .map_err(LinkError::StoreUnavailable)?
            .ok_or(LinkError::NotFound)?;

        self.prime_cache(op, &record.short_id, &record.original_url)
            .await;
        Ok(record.original_url)
    }

    fn count_click_in_background(&self, short_id: &str) {
        let Ok(permit) = self.pending_clicks.clone().try_acquire_owned() else {
            tracing::debug!("Too many pending click updates; dropping click for '{}'", short_id);
            return;
        };

        let this = self.clone();
        let short_id = short_id.to_owned();
        tokio::spawn(async move {
            let _permit = permit;
            let result = this
                .timed(
                    Operation::Resolve,
                    Step::IncrementClicks,
                    this.store.increment_clicks(&short_id),
                )
                .await;

            match result {
                Ok(Some(_)) => {}
                Ok(None) => tracing::debug!(
                    "Click for '{}' dropped: link no longer exists",
                    short_id
                ),
                Err(e) => tracing::warn!("Click for '{}' lost: {}", short_id, e),
            }
        });
    }

    /// Wait until every background click update started so far has finished.
    pub async fn flush_pending_clicks(&self) {
        let all = u32::try_from(self.settings.max_pending_clicks.min(Semaphore::MAX_PERMITS))
            .unwrap_or(u32::MAX);
        // The semaphore is never closed, so acquiring can only succeed.
        if let Ok(permits) = self.pending_clicks.acquire_many(all).await {
            drop(permits);
        }
    }

    // ── Stats ──────────────────────────────────────────────────────────────

    /// The durable record for `short_id`, read straight from the store.
    pub async fn stats(&self, short_id: &str) -> Result<LinkRecord, LinkError> {
        let started = Instant::now();
        let result = self
            .timed(
                Operation::Stats,
                Step::FindById,
                self.store.find_by_id(short_id),
            )
            .await
            .map_err(LinkError::StoreUnavailable)
            .and_then(|found| found.ok_or(LinkError::NotFound));
        self.observer
            .finished(Operation::Stats, started.elapsed(), Outcome::of(&result));

        if let Err(e @ LinkError::StoreUnavailable(_)) = &result {
            tracing::error!("Failed to load stats for '{}': {}", short_id, e);
        }
        result
    }

    // ── Helpers ────────────────────────────────────────────────────────────

    async fn prime_cache(&self, op: Operation, short_id: &str, original_url: &str) {
        let write = self.cache.set(short_id, original_url, self.settings.cache_ttl);
        if let Err(e) = self.timed(op, Step::CacheSet, write).await {
            tracing::warn!(
                "Cache '{}' write failed for '{}': {}",
                self.cache.name(),
                short_id,
                e
            );
        }
    }

    /// Run one backend call under the configured timeout and report it.
    async fn timed<T, E, F>(&self, op: Operation, step: Step, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<Elapsed>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.settings.backend_timeout, call).await {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        };
        self.observer
            .step(op, step, started.elapsed(), Outcome::of(&result));
        result
    }
}

impl std::fmt::Debug for LinkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkService")
            .field("cache", &self.cache.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
