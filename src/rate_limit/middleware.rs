use crate::errors::{AppError, Result};
use crate::rate_limit::limiter::{FixedWindowRateLimiter, RateLimitDecision};
use crate::rate_limit::registry::RateLimiterRegistry;
use axum::{
    extract::{Request, State},
    http::{header::HeaderName, HeaderMap, HeaderValue},
    middleware::{self, Next},
    response::Response,
    Router,
};
use chrono::{DateTime, SecondsFormat};
use std::future::Future;
use std::sync::Arc;

/// Headers consulted for the client address, in priority order
const CLIENT_IP_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Maps request headers to the key requests are counted under
pub type IdentifierFn = Arc<dyn Fn(&HeaderMap) -> String + Send + Sync>;

/// Everything a transport needs to reject a throttled request
#[derive(Debug, Clone)]
pub struct RateLimitRejection {
    pub limiter: String,
    pub message: String,
    pub retry_after_secs: u64,
    pub remaining: u32,
    /// Unix timestamp (ms) when the window resets
    pub reset_time: i64,
}

impl RateLimitRejection {
    fn new(limiter: &FixedWindowRateLimiter, decision: &RateLimitDecision) -> Self {
        Self {
            limiter: limiter.name().to_string(),
            message: decision
                .message
                .clone()
                .unwrap_or_else(|| limiter.config().message().to_string()),
            retry_after_secs: decision.retry_after_secs(limiter.now_millis()),
            remaining: decision.remaining,
            reset_time: decision.reset_time,
        }
    }
}

/// A named limiter bound to an identifier function, ready to guard routes
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: Arc<FixedWindowRateLimiter>,
    identifier_fn: IdentifierFn,
}

impl RateLimitGuard {
    /// Guard with the limiter called `limiter_name`. Without an identifier
    /// function the client address from proxy headers is used.
    pub fn new(
        registry: &RateLimiterRegistry,
        limiter_name: &str,
        identifier_fn: Option<IdentifierFn>,
    ) -> Result<Self> {
        let limiter = registry.get(limiter_name)?;
        let dev_mode = registry.dev_mode();
        let from_headers: IdentifierFn =
            Arc::new(move |headers: &HeaderMap| client_identifier(headers, dev_mode));
        let identifier_fn = identifier_fn.unwrap_or(from_headers);

        Ok(Self {
            limiter,
            identifier_fn,
        })
    }
}

/// Count one request for `identifier`; a rejection becomes
/// `AppError::RateLimitExceeded`
pub fn admit(limiter: &FixedWindowRateLimiter, identifier: &str) -> Result<RateLimitDecision> {
    let decision = limiter.check(identifier);
    if decision.allowed {
        return Ok(decision);
    }

    tracing::warn!(
        limiter = %limiter.name(),
        identifier = %identifier,
        limit = %decision.limit,
        reset_time = %decision.reset_time,
        "Rate limit exceeded"
    );

    Err(AppError::RateLimitExceeded(RateLimitRejection::new(
        limiter, &decision,
    )))
}

/// Wrap every route of `router` with `guard`
pub fn with_rate_limit<S>(router: Router<S>, guard: RateLimitGuard) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(guard, rate_limit_middleware))
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let identifier = (guard.identifier_fn)(request.headers());
    let decision = admit(&guard.limiter, &identifier)?;

    let mut response = next.run(request).await;
    // A handler that ran its own limiter reports that decision instead.
    if !response.headers().contains_key(X_RATELIMIT_REMAINING) {
        apply_rate_limit_headers(response.headers_mut(), decision.remaining, decision.reset_time);
    }

    Ok(response)
}

/// Run `action` only if the named limiter admits `identifier`
pub async fn rate_limit_action<F, Fut, T>(
    registry: &RateLimiterRegistry,
    limiter_name: &str,
    identifier: &str,
    action: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let limiter = registry.get(limiter_name)?;
    admit(&limiter, identifier)?;
    action().await
}

/// Client identifier from proxy headers, `"unknown"` when none is usable
pub fn client_identifier(headers: &HeaderMap, dev_mode: bool) -> String {
    let ip = CLIENT_IP_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|ip| !ip.is_empty())
        .unwrap_or("unknown");

    if dev_mode {
        format!("dev-{}", ip)
    } else {
        ip.to_string()
    }
}

/// Add `X-RateLimit-Remaining` and `X-RateLimit-Reset` to a response
pub(crate) fn apply_rate_limit_headers(headers: &mut HeaderMap, remaining: u32, reset_time: i64) {
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_REMAINING),
        HeaderValue::from(remaining),
    );

    if let Some(reset) = DateTime::from_timestamp_millis(reset_time) {
        let formatted = reset.to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Ok(value) = HeaderValue::from_str(&formatted) {
            headers.insert(HeaderName::from_static(X_RATELIMIT_RESET), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimiterConfig, RateLimitConfig};
    use crate::rate_limit::clock::ManualClock;
    use axum::{body::Body, http::StatusCode, routing::get};
    use axum::http::Request as HttpRequest;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tower::ServiceExt;

    const START: i64 = 1_700_000_000_000;

    fn registry(max_requests: u32) -> (RateLimiterRegistry, Arc<ManualClock>) {
        let mut limiters = BTreeMap::new();
        limiters.insert(
            "api".to_string(),
            LimiterConfig {
                window_ms: 60_000,
                max_requests,
                message: Some("Too many API requests".to_string()),
                skip_successful_requests: false,
                skip_failed_requests: false,
            },
        );
        let config = RateLimitConfig {
            cleanup_interval_seconds: 300,
            dev_mode: false,
            limiters,
        };
        let clock = Arc::new(ManualClock::new(START));
        (RateLimiterRegistry::with_clock(&config, clock.clone()), clock)
    }

    fn app(guard: RateLimitGuard) -> Router {
        with_rate_limit(Router::new().route("/", get(|| async { "ok" })), guard)
    }

    fn request_from(ip: &str) -> Request {
        HttpRequest::builder()
            .uri("/")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_admitted_response_carries_headers() {
        let (registry, _clock) = registry(2);
        let app = app(RateLimitGuard::new(&registry, "api", None).unwrap());

        let response = app.oneshot(request_from("198.51.100.7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "1");
        assert_eq!(
            response.headers()["x-ratelimit-reset"],
            "2023-11-14T22:14:20.000Z"
        );
    }

    #[tokio::test]
    async fn test_rejection_is_429_with_json_body() {
        let (registry, clock) = registry(1);
        let app = app(RateLimitGuard::new(&registry, "api", None).unwrap());

        let first = app.clone().oneshot(request_from("198.51.100.7")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        clock.advance(Duration::from_millis(15_500));
        let second = app.oneshot(request_from("198.51.100.7")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["retry-after"], "45");
        assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

        let body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Rate limit exceeded");
        assert_eq!(json["message"], "Too many API requests");
        assert_eq!(json["retryAfter"], 45);
    }

    #[tokio::test]
    async fn test_rejected_request_does_not_reach_handler() {
        let (registry, _clock) = registry(1);
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    "ok"
                }
            }),
        );
        let app = with_rate_limit(router, RateLimitGuard::new(&registry, "api", None).unwrap());

        for _ in 0..3 {
            let _ = app.clone().oneshot(request_from("203.0.113.1")).await.unwrap();
        }
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inner_rate_limit_headers_are_kept() {
        let (registry, _clock) = registry(5);
        let router = Router::new().route(
            "/",
            get(|| async {
                let mut headers = HeaderMap::new();
                apply_rate_limit_headers(&mut headers, 0, START + 900_000);
                (headers, "inner")
            }),
        );
        let app = with_rate_limit(router, RateLimitGuard::new(&registry, "api", None).unwrap());

        let response = app.oneshot(request_from("203.0.113.9")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(
            response.headers()["x-ratelimit-reset"],
            "2023-11-14T22:28:20.000Z"
        );
    }

    #[tokio::test]
    async fn test_custom_identifier_fn() {
        let (registry, _clock) = registry(1);
        let by_api_key: IdentifierFn = Arc::new(|headers: &HeaderMap| {
            headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("anonymous")
                .to_string()
        });
        let app = app(RateLimitGuard::new(&registry, "api", Some(by_api_key)).unwrap());

        let request = |key: &str| {
            HttpRequest::builder()
                .uri("/")
                .header("x-api-key", key)
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(app.clone().oneshot(request("k1")).await.unwrap().status(), StatusCode::OK);
        assert_eq!(app.clone().oneshot(request("k2")).await.unwrap().status(), StatusCode::OK);
        assert_eq!(
            app.oneshot(request("k1")).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_guard_for_unknown_limiter() {
        let (registry, _clock) = registry(1);
        assert!(matches!(
            RateLimitGuard::new(&registry, "uploads", None),
            Err(AppError::UnknownLimiter(_))
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_action() {
        let (registry, _clock) = registry(1);

        let first = rate_limit_action(&registry, "api", "server-action", || async { Ok(7) }).await;
        assert_eq!(first.unwrap(), 7);

        let mut ran = false;
        let second = rate_limit_action(&registry, "api", "server-action", || {
            ran = true;
            async { Ok(8) }
        })
        .await;
        assert!(matches!(second, Err(AppError::RateLimitExceeded(_))));
        assert!(!ran);
    }

    #[test]
    fn test_client_identifier_from_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 192.168.1.1 , 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.42"));

        assert_eq!(client_identifier(&headers, false), "192.168.1.1");
    }

    #[test]
    fn test_client_identifier_skips_empty_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.42"));

        assert_eq!(client_identifier(&headers, false), "203.0.113.42");
    }

    #[test]
    fn test_client_identifier_from_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.42"));
        headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.1"));

        assert_eq!(client_identifier(&headers, false), "203.0.113.42");
    }

    #[test]
    fn test_client_identifier_from_cloudflare() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.1"));

        assert_eq!(client_identifier(&headers, false), "198.51.100.1");
    }

    #[test]
    fn test_client_identifier_default_and_dev_prefix() {
        let headers = HeaderMap::new();
        assert_eq!(client_identifier(&headers, false), "unknown");
        assert_eq!(client_identifier(&headers, true), "dev-unknown");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("127.0.0.1"));
        assert_eq!(client_identifier(&headers, true), "dev-127.0.0.1");
    }
}
