use crate::rate_limit::RateLimiterRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub limiters: Vec<LimiterStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterStatus {
    pub name: String,
    pub window_ms: u64,
    pub max_requests: u32,
    pub tracked_entries: usize,
}

pub struct HealthChecker {
    registry: Arc<RateLimiterRegistry>,
}

impl HealthChecker {
    pub fn new(registry: Arc<RateLimiterRegistry>) -> Self {
        Self { registry }
    }

    /// Liveness check - is the service running?
    pub fn liveness(&self) -> HealthStatus {
        HealthStatus {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            limiters: Vec::new(),
        }
    }

    /// Readiness check - are the limiters in place?
    pub fn readiness(&self) -> HealthStatus {
        let limiters = self.limiter_statuses();
        let status = if limiters.is_empty() { "degraded" } else { "ok" };

        HealthStatus {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            limiters,
        }
    }

    pub fn limiter_statuses(&self) -> Vec<LimiterStatus> {
        self.registry
            .iter()
            .map(|limiter| LimiterStatus {
                name: limiter.name().to_string(),
                window_ms: limiter.config().window_ms,
                max_requests: limiter.config().max_requests,
                tracked_entries: limiter.len(),
            })
            .collect()
    }
}
