//! Request guards: rate limiting and the cron bearer token

pub mod cron_auth;
pub mod rate_limit;

pub use cron_auth::require_cron_secret;
pub use rate_limit::{InMemoryRateLimiter, PgRateLimiter, RateLimitBackend};
