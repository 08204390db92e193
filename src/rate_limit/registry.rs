use crate::config::RateLimitConfig;
use crate::errors::{AppError, Result};
use crate::rate_limit::clock::{Clock, SystemClock};
use crate::rate_limit::limiter::FixedWindowRateLimiter;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named limiter instances, built once at startup
pub struct RateLimiterRegistry {
    limiters: BTreeMap<String, Arc<FixedWindowRateLimiter>>,
    dev_mode: bool,
}

impl RateLimiterRegistry {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build every configured limiter against a shared clock
    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let limiters = config
            .limiters
            .iter()
            .map(|(name, limiter_config)| {
                if limiter_config.skip_successful_requests || limiter_config.skip_failed_requests {
                    tracing::warn!(
                        limiter = %name,
                        "skip_successful_requests/skip_failed_requests are not applied; \
                         every checked request is counted"
                    );
                }

                tracing::info!(
                    limiter = %name,
                    window_ms = limiter_config.window_ms,
                    max_requests = limiter_config.max_requests,
                    "Rate limiter configured"
                );

                let limiter = FixedWindowRateLimiter::with_clock(
                    name.clone(),
                    limiter_config.clone(),
                    clock.clone(),
                );
                (name.clone(), Arc::new(limiter))
            })
            .collect();

        Self {
            limiters,
            dev_mode: config.dev_mode,
        }
    }

    /// Look up a limiter by name
    pub fn get(&self, name: &str) -> Result<Arc<FixedWindowRateLimiter>> {
        self.limiters
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::UnknownLimiter(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FixedWindowRateLimiter>> {
        self.limiters.values()
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Sweep expired entries from every limiter. Returns the total removed.
    pub fn cleanup_all(&self) -> usize {
        let removed: usize = self.limiters.values().map(|limiter| limiter.cleanup()).sum();

        tracing::debug!(removed = removed, "Rate limiter sweep completed");
        removed
    }
}
