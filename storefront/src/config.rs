//! Storefront configuration

use std::time::Duration;

use crate::pricing::PricingConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Storefront configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    /// HTTP listen port
    pub http_port: u16,
    /// PostgreSQL connection URL. `None` selects the in-memory store (development only).
    pub database_url: Option<String>,
    /// Hold window for a checkout's reservations
    pub reservation_ttl: Duration,
    /// Expiry sweeper tick
    pub sweep_interval: Duration,
    /// Shipping fee and free-shipping threshold (cents)
    pub pricing: PricingConfig,
    /// ISO currency code sent to the payment provider (lowercase)
    pub currency: String,
    /// Accepted webhook timestamp skew
    pub webhook_tolerance_secs: i64,
    /// How long processed webhook event ids are kept for dedup
    pub idempotency_retention: Duration,
    /// Catalog read cache entry lifetime
    pub catalog_cache_ttl: Duration,
    /// Max checkout-init requests per client per minute
    pub checkout_rate_limit: u32,
    /// Max payment-intent requests per client per minute
    pub payment_rate_limit: u32,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Bearer token for /cron/* endpoints
    pub cron_secret: String,
    /// Stripe API base URL
    pub stripe_api_base: String,
    /// Emit JSON logs (LOG_FORMAT=json)
    pub log_json: bool,
}

impl Default for Config {
    /// Development defaults
    fn default() -> Self {
        Self {
            environment: "development".into(),
            http_port: 8080,
            database_url: None,
            reservation_ttl: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60),
            pricing: PricingConfig::default(),
            currency: "eur".into(),
            webhook_tolerance_secs: 300,
            idempotency_retention: Duration::from_secs(72 * 3600),
            catalog_cache_ttl: Duration::from_secs(60),
            checkout_rate_limit: 10,
            payment_rate_limit: 5,
            stripe_secret_key: "dev-STRIPE_SECRET_KEY-not-for-production".into(),
            stripe_webhook_secret: "dev-STRIPE_WEBHOOK_SECRET-not-for-production".into(),
            cron_secret: "dev-CRON_SECRET-not-for-production".into(),
            stripe_api_base: "https://api.stripe.com".into(),
            log_json: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let defaults = Self::default();
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let database_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        if database_url.is_none() && environment != "development" {
            return Err(format!("DATABASE_URL must be set in {environment} environment").into());
        }

        let secs = |name: &str, default: Duration| {
            env_parse::<u64>(name).map_or(default, Duration::from_secs)
        };

        Ok(Self {
            http_port: env_parse("HTTP_PORT").unwrap_or(defaults.http_port),
            database_url,
            reservation_ttl: secs("RESERVATION_TTL_SECS", defaults.reservation_ttl),
            sweep_interval: secs("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            pricing: PricingConfig {
                shipping_flat_fee: env_parse("SHIPPING_FLAT_FEE_CENTS")
                    .unwrap_or(defaults.pricing.shipping_flat_fee),
                free_shipping_threshold: env_parse("FREE_SHIPPING_THRESHOLD_CENTS")
                    .unwrap_or(defaults.pricing.free_shipping_threshold),
            },
            currency: std::env::var("CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or(defaults.currency),
            webhook_tolerance_secs: env_parse("WEBHOOK_TOLERANCE_SECS")
                .unwrap_or(defaults.webhook_tolerance_secs),
            idempotency_retention: env_parse::<u64>("IDEMPOTENCY_RETENTION_HOURS")
                .map_or(defaults.idempotency_retention, |h| {
                    Duration::from_secs(h * 3600)
                }),
            catalog_cache_ttl: secs("CATALOG_CACHE_TTL_SECS", defaults.catalog_cache_ttl),
            checkout_rate_limit: env_parse("CHECKOUT_RATE_LIMIT")
                .unwrap_or(defaults.checkout_rate_limit),
            payment_rate_limit: env_parse("PAYMENT_RATE_LIMIT")
                .unwrap_or(defaults.payment_rate_limit),
            stripe_secret_key: Self::require_secret("STRIPE_SECRET_KEY", &environment)?,
            stripe_webhook_secret: Self::require_secret("STRIPE_WEBHOOK_SECRET", &environment)?,
            cron_secret: Self::require_secret("CRON_SECRET", &environment)?,
            stripe_api_base: std::env::var("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            log_json: std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),
            environment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.is_development());
        assert_eq!(config.reservation_ttl, Duration::from_secs(900));
        assert_eq!(config.pricing.shipping_flat_fee, 500);
        assert_eq!(config.pricing.free_shipping_threshold, 5000);
        assert_eq!(config.checkout_rate_limit, 10);
    }

    #[test]
    fn test_dev_secret_fallback() {
        let val = Config::require_secret("STOREFRONT_TEST_UNSET_SECRET", "development").unwrap();
        assert_eq!(val, "dev-STOREFRONT_TEST_UNSET_SECRET-not-for-production");
        assert!(Config::require_secret("STOREFRONT_TEST_UNSET_SECRET", "production").is_err());
    }
}
