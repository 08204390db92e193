use crate::config::LimiterConfig;
use crate::observability::MetricsRecorder;
use crate::rate_limit::clock::{Clock, SystemClock};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

/// Per-identifier counter for the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitEntry {
    pub count: u32,
    /// Unix timestamp (ms) at which the window closes
    pub reset_time: i64,
}

impl RateLimitEntry {
    fn is_expired(&self, now: i64) -> bool {
        now >= self.reset_time
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// The rate limit (max requests per window)
    pub limit: u32,
    /// Number of requests remaining in the current window
    pub remaining: u32,
    /// Unix timestamp (ms) when the window resets
    pub reset_time: i64,
    /// Configured rejection message, only set when not allowed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, rounded up
    pub fn retry_after_secs(&self, now: i64) -> u64 {
        let millis = self.reset_time.saturating_sub(now).max(0) as u64;
        millis.div_ceil(1000)
    }
}

/// In-memory fixed-window rate limiter keyed by identifier
pub struct FixedWindowRateLimiter {
    name: String,
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    entries: DashMap<String, RateLimitEntry>,
}

impl FixedWindowRateLimiter {
    /// Create a limiter that reads the system clock
    pub fn new(name: impl Into<String>, config: LimiterConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: LimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            entries: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Count one request for `identifier` and decide whether it is admitted
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        let now = self.clock.now_millis();
        let limit = self.config.max_requests;

        // The entry guard holds the shard write lock for the whole read-modify-write.
        let mut entry = self
            .entries
            .entry(identifier.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                reset_time: now,
            });

        let decision = if entry.count == 0 || entry.is_expired(now) {
            let window = i64::try_from(self.config.window_ms).unwrap_or(i64::MAX);
            *entry = RateLimitEntry {
                count: 1,
                reset_time: now.saturating_add(window),
            };
            RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(1),
                reset_time: entry.reset_time,
                message: None,
            }
        } else if entry.count >= limit {
            RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_time: entry.reset_time,
                message: Some(self.config.message().to_string()),
            }
        } else {
            entry.count += 1;
            RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit - entry.count,
                reset_time: entry.reset_time,
                message: None,
            }
        };
        drop(entry);

        tracing::debug!(
            limiter = %self.name,
            identifier = %identifier,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Rate limit check result"
        );
        MetricsRecorder::record_rate_limit_check(&self.name, decision.allowed);

        decision
    }

    /// Current entry for `identifier` without counting a request.
    /// Expired entries are reported as absent.
    pub fn peek(&self, identifier: &str) -> Option<RateLimitEntry> {
        let now = self.clock.now_millis();
        self.entries
            .get(identifier)
            .map(|entry| *entry)
            .filter(|entry| !entry.is_expired(now))
    }

    /// Forget `identifier`; its next request opens a fresh window
    pub fn reset(&self, identifier: &str) -> bool {
        let removed = self.entries.remove(identifier).is_some();
        if removed {
            tracing::info!(limiter = %self.name, identifier = %identifier, "Rate limit reset");
        }
        removed
    }

    /// Drop every entry whose window has closed. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.reset_time >= now);
        let removed = before.saturating_sub(self.entries.len());

        MetricsRecorder::record_cleanup(&self.name, removed, self.entries.len());
        removed
    }

    /// Number of tracked identifiers, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
