use crate::{error::ApiError, AppState};
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// GET /:short_id
///
/// Resolve through the link service (cache first, store on a miss) and
/// answer with a 302 to the original URL, or 404.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(short_id): Path<String>,
) -> Result<Response, ApiError> {
    let original_url = state.links.resolve(&short_id).await?;

    let Some(location) = location_header(&original_url) else {
        tracing::error!("Stored URL for '{}' is not a valid Location", short_id);
        return Err(ApiError::Internal);
    };

    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// URLs are stored exactly as submitted. Non-ASCII ones go out in their
/// percent-encoded form so the header stays plain ASCII.
fn location_header(target: &str) -> Option<HeaderValue> {
    if target.is_ascii() {
        return HeaderValue::try_from(target).ok();
    }
    let parsed = url::Url::parse(target).ok()?;
    HeaderValue::try_from(parsed.as_str()).ok()
}
