use std::time::Duration;

use anyhow::{Context, Result};

use crate::service::ServiceSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterBackend {
    Redis,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string, e.g. "sqlite:./nanourl.db"
    pub database_url: String,

    /// Redis URL shared by the counter and cache when they use Redis
    pub redis_url: Option<String>,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL used when generating short links, e.g. "https://go.example.com"
    /// Must NOT have a trailing slash.
    pub base_url: String,

    /// Generated ids are at least this many characters long
    pub short_id_min_length: u32,

    pub cache_backend: CacheBackend,

    pub counter_backend: CounterBackend,

    pub cache_ttl: Duration,

    /// Records older than this are deleted by the retention sweeper
    pub link_retention: Duration,

    pub purge_interval: Duration,

    /// Per-call bound on store, counter and cache operations
    pub backend_timeout: Duration,

    pub max_pending_clicks: usize,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = parse_or(&get, "PORT", 3001u16)
            .context("PORT must be a valid port number (1–65535)")?;

        let base_url = get("BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let redis_url = get("REDIS_URL").filter(|s| !s.trim().is_empty());

        let cache_backend = match get("CACHE_BACKEND").as_deref().map(str::trim) {
            None | Some("") if redis_url.is_some() => CacheBackend::Redis,
            None | Some("") => CacheBackend::Memory,
            Some("redis") => CacheBackend::Redis,
            Some("memory") => CacheBackend::Memory,
            Some("none") => CacheBackend::None,
            Some(other) => anyhow::bail!("CACHE_BACKEND must be redis, memory or none (got '{other}')"),
        };

        let counter_backend = match get("COUNTER_BACKEND").as_deref().map(str::trim) {
            None | Some("") if redis_url.is_some() => CounterBackend::Redis,
            None | Some("") => CounterBackend::Sqlite,
            Some("redis") => CounterBackend::Redis,
            Some("sqlite") => CounterBackend::Sqlite,
            Some(other) => anyhow::bail!("COUNTER_BACKEND must be redis or sqlite (got '{other}')"),
        };

        if redis_url.is_none()
            && (cache_backend == CacheBackend::Redis || counter_backend == CounterBackend::Redis)
        {
            anyhow::bail!("REDIS_URL must be set when a Redis backend is selected");
        }

        let short_id_min_length = parse_or(&get, "SHORT_ID_MIN_LENGTH", 7u32)
            .context("SHORT_ID_MIN_LENGTH must be a non-negative integer")?;
        if short_id_min_length > 11 {
            anyhow::bail!("SHORT_ID_MIN_LENGTH must be at most 11");
        }

        let cache_ttl = parse_or(&get, "CACHE_TTL_SECS", 24 * 3600u64)
            .context("CACHE_TTL_SECS must be a number of seconds")?;
        let retention_days = parse_or(&get, "LINK_RETENTION_DAYS", 30u64)
            .context("LINK_RETENTION_DAYS must be a number of days")?;
        let purge_interval = parse_or(&get, "PURGE_INTERVAL_SECS", 3600u64)
            .context("PURGE_INTERVAL_SECS must be a number of seconds")?;
        let backend_timeout = parse_or(&get, "BACKEND_TIMEOUT_MS", 500u64)
            .context("BACKEND_TIMEOUT_MS must be a number of milliseconds")?;
        let max_pending_clicks = parse_or(&get, "MAX_PENDING_CLICKS", 1024usize)
            .context("MAX_PENDING_CLICKS must be a non-negative integer")?;

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite:./nanourl.db".into()),
            redis_url,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            base_url,
            short_id_min_length,
            cache_backend,
            counter_backend,
            cache_ttl: Duration::from_secs(cache_ttl),
            link_retention: Duration::from_secs(retention_days * 24 * 3600),
            purge_interval: Duration::from_secs(purge_interval.max(1)),
            backend_timeout: Duration::from_millis(backend_timeout.max(1)),
            max_pending_clicks,
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            cache_ttl: self.cache_ttl,
            backend_timeout: self.backend_timeout,
            max_pending_clicks: self.max_pending_clicks,
            min_id_length: self.short_id_min_length,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) if !raw.trim().is_empty() => Ok(raw.trim().parse()?),
        _ => Ok(default),
    }
}
