use crate::{
    api::{health, limiters},
    errors::Result,
    observability::{HealthChecker, MetricsRecorder},
    rate_limit::{with_rate_limit, RateLimitGuard, RateLimiterRegistry},
};
use axum::{
    extract::{FromRef, MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Limiter guarding the `/v1` API
pub const API_LIMITER: &str = "api";

#[derive(Clone, FromRef)]
pub struct AppState {
    pub registry: Arc<RateLimiterRegistry>,
    pub health_checker: Arc<HealthChecker>,
}

pub fn create_router(registry: Arc<RateLimiterRegistry>) -> Result<Router> {
    let health_checker = Arc::new(HealthChecker::new(registry.clone()));
    let api_guard = RateLimitGuard::new(&registry, API_LIMITER, None)?;

    let state = AppState {
        registry,
        health_checker,
    };

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        // Health endpoints
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(health::metrics))
        .nest("/v1", with_rate_limit(v1_routes(), api_guard))
        // Add middleware
        .layer(middleware::from_fn(track_http_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    Ok(router)
}

fn v1_routes() -> Router<AppState> {
    Router::new()
        .route("/limiters", get(limiters::list_limiters))
        .route("/limiters/:name/check", post(limiters::check))
        .route(
            "/limiters/:name/entries/:identifier",
            get(limiters::get_entry).delete(limiters::reset_entry),
        )
}

async fn track_http_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    MetricsRecorder::record_http_request(&method, &path, response.status().as_u16());

    response
}
