pub mod cleanup;
pub mod clock;
pub mod limiter;
pub mod middleware;
pub mod registry;

pub use cleanup::CleanupTask;
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{FixedWindowRateLimiter, RateLimitDecision, RateLimitEntry};
pub use middleware::{
    admit, client_identifier, rate_limit_action, rate_limit_middleware, with_rate_limit,
    IdentifierFn, RateLimitGuard, RateLimitRejection,
};
pub use registry::RateLimiterRegistry;
