use crate::errors::{AppError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;

const DEFAULT_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

/// Longest accepted window (seven days)
pub const MAX_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Period of the background sweep of expired entries
    pub cleanup_interval_seconds: u64,
    /// Prefix identifiers with `dev-` (local development)
    #[serde(default)]
    pub dev_mode: bool,
    pub limiters: BTreeMap<String, LimiterConfig>,
}

/// Settings for one named limiter, fixed at construction
#[derive(Debug, Clone, Deserialize)]
pub struct LimiterConfig {
    pub window_ms: u64,
    pub max_requests: u32,
    #[serde(default)]
    pub message: Option<String>,
    // Accepted for compatibility, not consulted when counting.
    #[serde(default)]
    pub skip_successful_requests: bool,
    #[serde(default)]
    pub skip_failed_requests: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl LimiterConfig {
    pub fn new(window_ms: u64, max_requests: u32, message: &str) -> Self {
        Self {
            window_ms,
            max_requests,
            message: Some(message.to_string()),
            skip_successful_requests: false,
            skip_failed_requests: false,
        }
    }

    /// Message returned with rejected requests
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or(DEFAULT_LIMIT_MESSAGE)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let limiters = [
            (
                "api",
                LimiterConfig::new(60_000, 100, "Too many API requests, please try again later."),
            ),
            (
                "auth",
                LimiterConfig::new(
                    15 * 60_000,
                    5,
                    "Too many authentication attempts, please try again later.",
                ),
            ),
            (
                "tasks",
                LimiterConfig::new(60_000, 30, "Too many task operations, please slow down."),
            ),
            (
                "forms",
                LimiterConfig::new(
                    60_000,
                    10,
                    "Too many form submissions, please try again later.",
                ),
            ),
        ]
        .into_iter()
        .map(|(name, config)| (name.to_string(), config))
        .collect();

        Self {
            cleanup_interval_seconds: 300,
            dev_mode: false,
            limiters,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let environment =
            env::var("THROTTLE_GUARD_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(
                config::File::with_name(&format!("config/{}", environment)).required(false),
            )
            // e.g., THROTTLE_GUARD__SERVER__PORT=8080
            .add_source(
                config::Environment::with_prefix("THROTTLE_GUARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Configuration("Invalid port number".to_string()));
        }

        self.rate_limit.validate()
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cleanup_interval_seconds == 0 {
            return Err(AppError::Configuration(
                "Cleanup interval must be at least one second".to_string(),
            ));
        }

        if self.limiters.is_empty() {
            return Err(AppError::Configuration(
                "At least one rate limiter is required".to_string(),
            ));
        }

        for (name, limiter) in &self.limiters {
            if limiter.window_ms == 0 {
                return Err(AppError::Configuration(format!(
                    "Rate limiter '{}' needs a non-zero window",
                    name
                )));
            }
            if limiter.window_ms > MAX_WINDOW_MS {
                return Err(AppError::Configuration(format!(
                    "Rate limiter '{}' window exceeds {} ms",
                    name, MAX_WINDOW_MS
                )));
            }
            if limiter.max_requests == 0 {
                return Err(AppError::Configuration(format!(
                    "Rate limiter '{}' must admit at least one request per window",
                    name
                )));
            }
        }

        Ok(())
    }
}
