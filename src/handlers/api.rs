use crate::{
    error::ApiError,
    handlers::client_ip,
    models::{CreatedLink, Envelope, LinkStats},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    original_url: Option<String>,
}

/// POST /api/url
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<CreateLinkRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<CreatedLink>>), ApiError> {
    let original_url = match body {
        Ok(Json(CreateLinkRequest {
            original_url: Some(url),
        })) if !url.trim().is_empty() => url.trim().to_owned(),
        Ok(_) => return Err(ApiError::Validation("Original URL is required".into())),
        Err(rejection) => {
            tracing::debug!("Rejected create body: {}", rejection);
            return Err(ApiError::Validation("Original URL is required".into()));
        }
    };
    validate_url(&original_url)?;

    let creator = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let record = state
        .links
        .create_or_get(&original_url, creator.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(CreatedLink::from_record(
            record,
            &state.config.base_url,
        ))),
    ))
}

/// GET /api/url/:short_id/stats
pub async fn link_stats(
    State(state): State<Arc<AppState>>,
    Path(short_id): Path<String>,
) -> Result<Json<Envelope<LinkStats>>, ApiError> {
    let record = state.links.stats(&short_id).await?;
    Ok(Json(Envelope::ok(LinkStats::from_record(
        record,
        &state.config.base_url,
    ))))
}

/// Only absolute http(s) URLs are accepted. Apart from trimming surrounding
/// whitespace the string is stored as given, never normalized.
fn validate_url(raw: &str) -> Result<(), ApiError> {
    let parsed =
        url::Url::parse(raw).map_err(|_| ApiError::Validation("Invalid URL format".into()))?;

    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(()),
        _ => Err(ApiError::Validation("Invalid URL format".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_url("https://a.example/x").is_ok());
        assert!(validate_url("http://localhost:3000/").is_ok());
    }

    #[test]
    fn rejects_relative_and_other_schemes() {
        assert!(validate_url("a.example/x").is_err());
        assert!(validate_url("javascript:alert(1)").is_err());
        assert!(validate_url("ftp://files.example").is_err());
        assert!(validate_url("").is_err());
    }
}
