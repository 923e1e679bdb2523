//! Tag-invalidated read cache
//!
//! Every entry carries the tags it depends on; writers invalidate by tag
//! instead of by key pattern. Entries also expire after a fixed TTL.

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Invalidation tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTag {
    Product(i64),
    Variant(i64),
}

struct CachedEntry<V> {
    value: V,
    tags: Vec<CacheTag>,
    expires_at: Instant,
}

/// Thread-safe TTL cache with tag invalidation
pub struct TaggedCache<K, V> {
    entries: DashMap<K, CachedEntry<V>>,
    ttl: Duration,
}

impl<K, V> TaggedCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&self, key: K, value: V, tags: Vec<CacheTag>) {
        self.entries.insert(
            key,
            CachedEntry {
                value,
                tags,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every entry tagged with `tag`. Returns the number removed.
    pub fn invalidate(&self, tag: CacheTag) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.tags.contains(&tag));
        before.saturating_sub(self.entries.len())
    }

    /// Drop expired entries
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_by_tag_only_hits_tagged() {
        let cache: TaggedCache<i64, &str> = TaggedCache::new(Duration::from_secs(60));
        cache.insert(1, "a", vec![CacheTag::Variant(1), CacheTag::Product(7)]);
        cache.insert(2, "b", vec![CacheTag::Variant(2), CacheTag::Product(7)]);
        cache.insert(3, "c", vec![CacheTag::Variant(3), CacheTag::Product(8)]);

        assert_eq!(cache.invalidate(CacheTag::Variant(1)), 1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some("b"));

        // no prefix/pattern confusion: Product(7) never matches Product(70)
        cache.insert(4, "d", vec![CacheTag::Product(70)]);
        assert_eq!(cache.invalidate(CacheTag::Product(7)), 1);
        assert_eq!(cache.get(&4), Some("d"));
        assert_eq!(cache.get(&3), Some("c"));
    }

    #[test]
    fn test_entries_expire() {
        let cache: TaggedCache<i64, i64> = TaggedCache::new(Duration::ZERO);
        cache.insert(1, 10, vec![CacheTag::Product(1)]);
        assert_eq!(cache.get(&1), None);
        cache.evict_expired();
        assert!(cache.is_empty());
    }
}
