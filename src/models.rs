use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

/// Marker stored in `created_by` when the creator is unknown.
pub const ANONYMOUS: &str = "anonymous";

/// A shortened link record from the `links` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub short_id: String,
    pub original_url: String,
    pub clicks: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl LinkRecord {
    /// A freshly minted record: zero clicks, stamped now to millisecond precision.
    pub fn new(
        short_id: impl Into<String>,
        original_url: impl Into<String>,
        created_by: Option<&str>,
    ) -> Self {
        let created_by = created_by
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(ANONYMOUS);

        Self {
            short_id: short_id.into(),
            original_url: original_url.into(),
            clicks: 0,
            created_by: created_by.to_owned(),
            created_at: Utc::now().trunc_subsecs(3),
        }
    }
}

// ── API payloads ───────────────────────────────────────────────────────────

/// `{ success, data }` envelope shared by every JSON response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedLink {
    pub original_url: String,
    pub short_id: String,
    pub short_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStats {
    pub original_url: String,
    pub short_id: String,
    pub short_url: String,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl CreatedLink {
    pub fn from_record(record: LinkRecord, base_url: &str) -> Self {
        Self {
            short_url: short_url(base_url, &record.short_id),
            original_url: record.original_url,
            short_id: record.short_id,
            created_at: record.created_at,
        }
    }
}

impl LinkStats {
    pub fn from_record(record: LinkRecord, base_url: &str) -> Self {
        Self {
            short_url: short_url(base_url, &record.short_id),
            original_url: record.original_url,
            short_id: record.short_id,
            clicks: record.clicks,
            created_at: record.created_at,
            created_by: record.created_by,
        }
    }
}

/// Absolute short link for `short_id` under `base_url` (which has no trailing slash).
pub fn short_url(base_url: &str, short_id: &str) -> String {
    format!("{base_url}/{short_id}")
}
