//! Short links over a durable SQLite store, an atomic counter and an optional
//! cache.
//!
//! [`service::LinkService`] is the core: it mints base62 ids from a
//! [`counter::Counter`], persists them in a [`store::LinkStore`], and keeps a
//! [`cache::LinkCache`] warm for redirects. The HTTP layer in [`handlers`] is
//! a thin shell around it.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod base62;
pub mod cache;
pub mod config;
pub mod counter;
pub mod error;
pub mod handlers;
pub mod models;
pub mod observe;
pub mod redis_conn;
pub mod service;
pub mod store;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub links: service::LinkService,
    pub config: config::AppConfig,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .route("/api/url", post(handlers::api::create_link))
        .route("/api/url/:short_id/stats", get(handlers::api::link_stats))
        // Short-link redirect goes LAST so the fixed routes take priority
        .route("/:short_id", get(handlers::redirect::redirect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
