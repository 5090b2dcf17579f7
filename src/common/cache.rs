//! In-memory cache for storing key-value pairs.
//!
//! Uses moka's high-performance concurrent cache implementation.

use moka::sync::Cache;

/// Thread-safe in-memory cache with configurable capacity.
///
/// Used for compiled published graphs, keyed by `flow_id@version`, so that a
/// turn never recompiles a graph that another session already loaded.
#[derive(Clone)]
pub struct MemCache<K, V> {
    entries: Cache<K, V>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a new [`MemCache`].
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::new(capacity as u64),
        }
    }

    /// Insert or replace an entry.
    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.entries.insert(key, value);
    }

    /// Get a clone of the entry for `key`.
    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.get(key)
    }

    /// Drop the entry for `key`.
    pub fn remove(
        &self,
        key: &K,
    ) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::MemCache;

    #[test]
    fn test_cache_set_get_remove() {
        let cache: MemCache<String, u64> = MemCache::new(8);
        cache.set("flow@1".to_string(), 1);
        assert_eq!(cache.get(&"flow@1".to_string()), Some(1));
        cache.remove(&"flow@1".to_string());
        assert_eq!(cache.get(&"flow@1".to_string()), None);
    }
}
