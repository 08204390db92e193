// Limiter endpoints for callers outside this process

use crate::{
    api::routes::AppState,
    errors::{AppError, Result},
    observability::{health::LimiterStatus, HealthChecker},
    rate_limit::{admit, middleware::apply_rate_limit_headers, RateLimitDecision},
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub identifier: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    pub limiter: String,
    pub identifier: String,
    pub active: bool,
    pub count: u32,
    pub remaining: u32,
    pub reset_time: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub removed: bool,
}

/// GET /v1/limiters
pub async fn list_limiters(
    State(health_checker): State<Arc<HealthChecker>>,
) -> Json<Vec<LimiterStatus>> {
    Json(health_checker.limiter_statuses())
}

/// POST /v1/limiters/:name/check
///
/// Count one request for `identifier` against the named limiter. The
/// `X-RateLimit-*` headers describe this decision, not the `api` guard.
#[tracing::instrument(skip(state, req))]
pub async fn check(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<CheckRequest>,
) -> Result<(HeaderMap, Json<RateLimitDecision>)> {
    let identifier = req.identifier.trim();
    if identifier.is_empty() {
        return Err(AppError::ValidationError(
            "identifier is required".to_string(),
        ));
    }

    let limiter = state.registry.get(&name)?;
    let decision = admit(&limiter, identifier)?;

    let mut headers = HeaderMap::new();
    apply_rate_limit_headers(&mut headers, decision.remaining, decision.reset_time);

    Ok((headers, Json(decision)))
}

/// GET /v1/limiters/:name/entries/:identifier
pub async fn get_entry(
    State(state): State<AppState>,
    Path((name, identifier)): Path<(String, String)>,
) -> Result<Json<EntryResponse>> {
    let limiter = state.registry.get(&name)?;
    let max_requests = limiter.config().max_requests;

    let response = match limiter.peek(&identifier) {
        Some(entry) => EntryResponse {
            limiter: name,
            identifier,
            active: true,
            count: entry.count,
            remaining: max_requests.saturating_sub(entry.count),
            reset_time: Some(entry.reset_time),
        },
        None => EntryResponse {
            limiter: name,
            identifier,
            active: false,
            count: 0,
            remaining: max_requests,
            reset_time: None,
        },
    };

    Ok(Json(response))
}

/// DELETE /v1/limiters/:name/entries/:identifier
pub async fn reset_entry(
    State(state): State<AppState>,
    Path((name, identifier)): Path<(String, String)>,
) -> Result<Json<ResetResponse>> {
    let limiter = state.registry.get(&name)?;
    let removed = limiter.reset(&identifier);

    Ok(Json(ResetResponse { removed }))
}
