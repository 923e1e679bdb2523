//! Catalog reads for pricing
//!
//! [`CatalogService`] serves products and variants through a tagged cache and
//! assembles the [`CatalogSnapshot`] the Pricing Oracle prices against.
//! Stock figures in cached variants are never used for availability; the
//! Stock Ledger always reads the store.

pub mod cache;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use shared::models::{CartItemInput, Product, Variant};

use crate::store::{Store, StoreResult};

pub use cache::{CacheTag, TaggedCache};

/// Products and variants referenced by one cart
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    products: HashMap<i64, Product>,
    variants: HashMap<i64, Variant>,
}

impl CatalogSnapshot {
    pub fn product(&self, id: i64) -> Option<&Product> {
        self.products.get(&id)
    }

    pub fn variant(&self, id: i64) -> Option<&Variant> {
        self.variants.get(&id)
    }

    pub fn insert_product(&mut self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn insert_variant(&mut self, variant: Variant) {
        self.variants.insert(variant.id, variant);
    }
}

pub struct CatalogService {
    store: Arc<dyn Store>,
    products: TaggedCache<i64, Product>,
    variants: TaggedCache<i64, Variant>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self {
            store,
            products: TaggedCache::new(ttl),
            variants: TaggedCache::new(ttl),
        }
    }

    pub async fn product(&self, id: i64) -> StoreResult<Option<Product>> {
        if let Some(p) = self.products.get(&id) {
            return Ok(Some(p));
        }
        let product = self.store.product(id).await?;
        if let Some(p) = &product {
            self.products.insert(id, p.clone(), vec![CacheTag::Product(id)]);
        }
        Ok(product)
    }

    pub async fn variant(&self, id: i64) -> StoreResult<Option<Variant>> {
        if let Some(v) = self.variants.get(&id) {
            return Ok(Some(v));
        }
        let variant = self.store.variant(id).await?;
        if let Some(v) = &variant {
            self.variants.insert(
                id,
                v.clone(),
                vec![CacheTag::Variant(id), CacheTag::Product(v.product_id)],
            );
        }
        Ok(variant)
    }

    /// Load every product and variant a cart refers to. Missing ids are
    /// simply absent from the snapshot; pricing reports them per line.
    pub async fn snapshot_for(&self, items: &[CartItemInput]) -> StoreResult<CatalogSnapshot> {
        let mut snapshot = CatalogSnapshot::default();
        let mut product_ids: BTreeSet<i64> = items.iter().filter_map(|i| i.product_id).collect();

        let variant_ids: BTreeSet<i64> = items.iter().filter_map(|i| i.variant_id).collect();
        for id in variant_ids {
            if let Some(v) = self.variant(id).await? {
                product_ids.insert(v.product_id);
                snapshot.insert_variant(v);
            }
        }
        for id in product_ids {
            if let Some(p) = self.product(id).await? {
                snapshot.insert_product(p);
            }
        }
        Ok(snapshot)
    }

    /// Invalidate cached entries carrying `tag` in both caches
    pub fn invalidate(&self, tag: CacheTag) {
        let removed = self.products.invalidate(tag) + self.variants.invalidate(tag);
        tracing::debug!(?tag, removed, "Catalog cache invalidated");
    }

    pub fn evict_expired(&self) {
        self.products.evict_expired();
        self.variants.evict_expired();
    }
}
