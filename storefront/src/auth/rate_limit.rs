//! Application-layer rate limiting for checkout and payment routes
//!
//! Fixed-window counters behind [`RateLimitBackend`]:
//! - [`InMemoryRateLimiter`]: process-local, single-instance deployments only
//! - [`PgRateLimiter`]: counters in Postgres, shared by every instance

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::error::AppError;
use shared::util::now_millis;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::db;

/// Counters idle for longer than this are dropped by `cleanup`
const IDLE_RETENTION: Duration = Duration::from_secs(300);

/// Fixed window length for every limited route
const WINDOW: Duration = Duration::from_secs(60);

#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Count one request. Returns `true` if allowed, `false` if rate-limited.
    async fn check(&self, route: &'static str, client: &str, max_requests: u32, window: Duration)
    -> bool;

    /// Drop stale counters
    async fn cleanup(&self);
}

struct IpEntry {
    count: u32,
    window_start: Instant,
}

#[derive(Default)]
pub struct InMemoryRateLimiter {
    /// route name -> (client -> entry)
    inner: Mutex<HashMap<&'static str, HashMap<String, IpEntry>>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimiter {
    async fn check(
        &self,
        route: &'static str,
        client: &str,
        max_requests: u32,
        window: Duration,
    ) -> bool {
        let mut map = self.inner.lock().await;
        let route_map = map.entry(route).or_default();
        let now = Instant::now();

        let entry = route_map.entry(client.to_owned()).or_insert_with(|| IpEntry {
            count: 0,
            window_start: now,
        });

        // Reset window if expired
        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        entry.count <= max_requests
    }

    async fn cleanup(&self) {
        let mut map = self.inner.lock().await;
        let now = Instant::now();

        for route_map in map.values_mut() {
            route_map.retain(|_, entry| now.duration_since(entry.window_start) < IDLE_RETENTION);
        }

        // Remove empty route maps
        map.retain(|_, route_map| !route_map.is_empty());
    }
}

pub struct PgRateLimiter {
    pool: PgPool,
}

impl PgRateLimiter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitBackend for PgRateLimiter {
    async fn check(
        &self,
        route: &'static str,
        client: &str,
        max_requests: u32,
        window: Duration,
    ) -> bool {
        let window_ms = (window.as_millis() as i64).max(1);
        let window_start = now_millis() / window_ms * window_ms;
        let key = format!("{route}:{client}");
        match db::rate_limits::hit(&self.pool, &key, window_start).await {
            Ok(count) => u32::try_from(count).is_ok_and(|c| c <= max_requests),
            Err(e) => {
                // fail open
                tracing::warn!(error = %e, route, "Rate limit counter unavailable, allowing request");
                true
            }
        }
    }

    async fn cleanup(&self) {
        let cutoff = now_millis() - IDLE_RETENTION.as_millis() as i64;
        match db::rate_limits::purge_before(&self.pool, cutoff).await {
            Ok(n) if n > 0 => tracing::debug!(removed = n, "Rate limit counters purged"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to purge rate limit counters"),
        }
    }
}

/// Extract client IP: X-Forwarded-For header first (load balancer), then peer address.
pub fn extract_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
    {
        // X-Forwarded-For can be comma-separated; first entry is the original client
        if let Some(first) = val.split(',').next() {
            let ip = first.trim();
            if !ip.is_empty() {
                return ip.to_owned();
            }
        }
    }

    // Fallback: peer address from extensions (ConnectInfo)
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

fn too_many_requests() -> Response {
    AppError::too_many_requests().into_response()
}

/// Rate limit middleware for checkout init / cancel (per IP, per minute)
pub async fn checkout_rate_limit(
    State(state): State<crate::state::AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_ip(&request);
    let max = state.config.checkout_rate_limit;
    if !state.rate_limiter.check("checkout", &ip, max, WINDOW).await {
        tracing::info!(client = %ip, "Checkout rate limit exceeded");
        return Err(too_many_requests());
    }
    Ok(next.run(request).await)
}

/// Rate limit middleware for payment-intent creation (per IP, per minute)
pub async fn payment_rate_limit(
    State(state): State<crate::state::AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_ip(&request);
    let max = state.config.payment_rate_limit;
    if !state.rate_limiter.check("payment", &ip, max, WINDOW).await {
        tracing::info!(client = %ip, "Payment rate limit exceeded");
        return Err(too_many_requests());
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn test_fixed_window_blocks_after_max() {
        let limiter = InMemoryRateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("checkout", "1.2.3.4", 3, WINDOW).await);
        }
        assert!(!limiter.check("checkout", "1.2.3.4", 3, WINDOW).await);
        // other clients and routes have their own counters
        assert!(limiter.check("checkout", "5.6.7.8", 3, WINDOW).await);
        assert!(limiter.check("payment", "1.2.3.4", 3, WINDOW).await);
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_millis(30);
        assert!(limiter.check("checkout", "ip", 1, window).await);
        assert!(!limiter.check("checkout", "ip", 1, window).await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.check("checkout", "ip", 1, window).await);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_entries() {
        let limiter = InMemoryRateLimiter::new();
        limiter.check("checkout", "ip", 1, WINDOW).await;
        limiter.cleanup().await;
        assert!(!limiter.check("checkout", "ip", 1, WINDOW).await);
    }

    #[test]
    fn test_extract_ip_prefers_forwarded_for() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_ip(&request), "203.0.113.7");

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_ip(&bare), "unknown");
    }
}
