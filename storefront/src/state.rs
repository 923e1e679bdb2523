//! Application state

use std::sync::Arc;

use crate::auth::{InMemoryRateLimiter, PgRateLimiter, RateLimitBackend};
use crate::catalog::CatalogService;
use crate::checkout::CheckoutService;
use crate::config::Config;
use crate::inventory::{ReservationManager, RetryPolicy, StockLedger};
use crate::payment::{PaymentGateway, PaymentReconciler, StripeGateway};
use crate::store::{MemoryStore, PgStore, Store};
use crate::sweeper::ExpirySweeper;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    /// Tag-invalidated product / variant read cache
    pub catalog: Arc<CatalogService>,
    pub ledger: StockLedger,
    pub reservations: Arc<ReservationManager>,
    pub checkout: Arc<CheckoutService>,
    pub reconciler: Arc<PaymentReconciler>,
    pub sweeper: Arc<ExpirySweeper>,
    /// Rate limiter for checkout and payment routes
    pub rate_limiter: Arc<dyn RateLimitBackend>,
}

impl AppState {
    /// Production wiring: Postgres when `DATABASE_URL` is set, Stripe gateway
    pub async fn new(config: Config) -> Result<Self, BoxError> {
        let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(
            config.stripe_secret_key.clone(),
            config.stripe_api_base.clone(),
        ));

        let (store, rate_limiter): (Arc<dyn Store>, Arc<dyn RateLimitBackend>) =
            match &config.database_url {
                Some(url) => {
                    let pg = PgStore::connect(url).await?;
                    tracing::info!("Connected to PostgreSQL, migrations applied");
                    let limiter = PgRateLimiter::new(pg.pool().clone());
                    (Arc::new(pg), Arc::new(limiter))
                }
                None => {
                    tracing::warn!("DATABASE_URL not set, using in-memory store (development only)");
                    (
                        Arc::new(MemoryStore::new()),
                        Arc::new(InMemoryRateLimiter::new()),
                    )
                }
            };

        Ok(Self::from_parts(config, store, gateway, rate_limiter))
    }

    /// Assemble the services over explicit backends
    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        rate_limiter: Arc<dyn RateLimitBackend>,
    ) -> Self {
        let retry = RetryPolicy::default();
        let catalog = Arc::new(CatalogService::new(store.clone(), config.catalog_cache_ttl));
        let reservations = Arc::new(ReservationManager::new(
            store.clone(),
            catalog.clone(),
            config.reservation_ttl,
            retry,
        ));
        let checkout = Arc::new(CheckoutService::new(
            store.clone(),
            catalog.clone(),
            reservations.clone(),
            gateway,
            config.pricing,
            config.currency.clone(),
            retry,
        ));
        let reconciler = Arc::new(PaymentReconciler::new(
            store.clone(),
            reservations.clone(),
            retry,
        ));
        let sweeper = Arc::new(ExpirySweeper::new(
            store.clone(),
            reservations.clone(),
            catalog.clone(),
            config.idempotency_retention,
            retry,
        ));

        Self {
            config: Arc::new(config),
            ledger: StockLedger::new(store.clone(), retry),
            store,
            catalog,
            reservations,
            checkout,
            reconciler,
            sweeper,
            rate_limiter,
        }
    }
}
