use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nanourl::{
    cache::{LinkCache, MemoryCache, NullCache, RedisCache},
    config::{AppConfig, CacheBackend, CounterBackend},
    counter::{Counter, RedisCounter, SqliteCounter},
    redis_conn::RedisConnector,
    service::LinkService,
    store::{self, LinkStore, SqliteStore},
    AppState,
};

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env; a missing file is fine when vars are already set
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nanourl=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env()?;
    tracing::info!("Starting nanourl on {}:{}", config.host, config.port);
    tracing::info!("Base URL: {}", config.base_url);

    // Open SQLite connection pool
    // CREATE the file if it doesn't exist yet
    let db = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(config.backend_timeout.max(Duration::from_secs(1)))
        .connect_with(
            config
                .database_url
                .parse::<sqlx::sqlite::SqliteConnectOptions>()?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(config.backend_timeout),
        )
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    // Run embedded migrations (files in migrations/)
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations applied");

    let redis = match &config.redis_url {
        Some(url) => Some(Arc::new(
            RedisConnector::open(url).context("REDIS_URL is not a valid Redis URL")?,
        )),
        None => None,
    };

    let counter: Arc<dyn Counter> = match (config.counter_backend, &redis) {
        (CounterBackend::Redis, Some(redis)) => Arc::new(RedisCounter::new(redis.clone())),
        _ => Arc::new(SqliteCounter::new(db.clone())),
    };

    let cache = build_cache(&config, redis.as_ref()).await;
    let link_store: Arc<dyn LinkStore> = Arc::new(SqliteStore::new(db.clone()));

    let links = LinkService::new(link_store.clone(), counter, cache, config.service_settings());
    tracing::info!("Cache backend: {}", links.cache_backend());

    // Retried by every create until it succeeds.
    if let Err(e) = links.ensure_min_id_length().await {
        tracing::warn!("Minimum short id length not applied yet: {}", e);
    }

    store::spawn_retention_sweeper(link_store, config.link_retention, config.purge_interval);

    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState {
        links: links.clone(),
        config,
    });
    let app = nanourl::router(state);

    // ── Serve ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Give in-flight background click updates a moment to land.
    if tokio::time::timeout(Duration::from_secs(5), links.flush_pending_clicks())
        .await
        .is_err()
    {
        tracing::warn!("Shut down with click updates still pending");
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Pick the cache backend, degrading to store-only mode when Redis does not answer.
async fn build_cache(config: &AppConfig, redis: Option<&Arc<RedisConnector>>) -> Arc<dyn LinkCache> {
    match (config.cache_backend, redis) {
        (CacheBackend::Redis, Some(redis)) => {
            let cache = RedisCache::new(redis.clone());
            match tokio::time::timeout(config.backend_timeout, cache.probe()).await {
                Ok(Ok(())) => Arc::new(cache),
                Ok(Err(e)) => {
                    tracing::warn!("Redis cache unavailable ({}), continuing without cache", e);
                    Arc::new(NullCache)
                }
                Err(_) => {
                    tracing::warn!("Redis cache did not answer in time, continuing without cache");
                    Arc::new(NullCache)
                }
            }
        }
        (CacheBackend::Memory, _) => {
            let cache = MemoryCache::new();
            spawn_cache_eviction(cache.clone(), config.purge_interval);
            Arc::new(cache)
        }
        _ => Arc::new(NullCache),
    }
}

fn spawn_cache_eviction(cache: MemoryCache, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let evicted = cache.evict_expired();
            if evicted > 0 {
                tracing::debug!("Evicted {} expired cache entr(ies)", evicted);
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
