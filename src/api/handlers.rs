//! API Handlers
//!
//! HTTP request handlers for each resource cache endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::cache::{compute_key, CacheKey};
use crate::config::Config;
use crate::coordinator::RequestCoordinator;
use crate::error::{CacheError, ErrorReporter, Result};
use crate::fetch::HttpFetcher;
use crate::models::{ClearResponse, HealthResponse, RemoveResponse, ResolveQuery, StatsResponse};

/// Header reporting whether the payload came from disk or the network
pub const SOURCE_HEADER: &str = "x-cache-source";

/// Header carrying the hex cache key of the resolved descriptor
pub const KEY_HEADER: &str = "x-cache-key";

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub coordinator: RequestCoordinator,
}

impl AppState {
    pub fn new(coordinator: RequestCoordinator) -> Self {
        Self { coordinator }
    }

    /// Opens the store described by `config` behind an HTTP fetcher.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.fetch_timeout())?;
        let coordinator = RequestCoordinator::open(
            &config.cache_options(),
            Arc::new(fetcher),
            ErrorReporter::default(),
        )?;
        Ok(Self::new(coordinator))
    }
}

/// Handler for GET /resolve
///
/// Returns the payload for `locator` plus variant params, with the source
/// in the `x-cache-source` header.
pub async fn resolve_handler(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response> {
    let descriptor = ResolveQuery::from_pairs(pairs)?.into_descriptor();
    let key = compute_key(&descriptor)?;

    let resolved = state.coordinator.resolve(&descriptor).await?;

    let key_value = HeaderValue::from_str(&key.to_hex())
        .map_err(|e| CacheError::Internal(e.to_string()))?;
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (
            HeaderName::from_static(SOURCE_HEADER),
            HeaderValue::from_static(resolved.source.as_str()),
        ),
        (HeaderName::from_static(KEY_HEADER), key_value),
    ];

    Ok((StatusCode::OK, headers, resolved.payload).into_response())
}

/// Handler for GET /fetch
///
/// Same query as `/resolve`, but always goes to the network and never
/// touches the store.
pub async fn fetch_handler(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response> {
    let descriptor = ResolveQuery::from_pairs(pairs)?.into_descriptor();
    let fetched = state.coordinator.fetch_direct(&descriptor).await?;

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (
            HeaderName::from_static(SOURCE_HEADER),
            HeaderValue::from_static(fetched.source.as_str()),
        ),
    ];

    Ok((StatusCode::OK, headers, fetched.payload).into_response())
}

/// Handler for DELETE /entries/:key
pub async fn remove_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<RemoveResponse>> {
    let parsed: CacheKey = key.parse()?;
    state.coordinator.remove(parsed).await?;

    Ok(Json(RemoveResponse::new(key)))
}

/// Handler for DELETE /entries
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let removed = state.coordinator.clear().await?;
    Ok(Json(ClearResponse::new(removed)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.coordinator.stats().await))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
