use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

/// Cache entry stamped with its write time.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at_ms: i64,
}

/// Time-bounded cache owned by whoever builds the resolvers.
///
/// Entries older than `ttl` are never returned by [`TtlCache::get_fresh`].
/// Concurrent writers to the same key race harmlessly: the last write wins.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Value and its age in milliseconds, regardless of expiry.
    pub fn get(&self, key: &K) -> Option<(V, i64)> {
        self.get_at(key, Utc::now().timestamp_millis())
    }

    pub fn get_at(&self, key: &K, now_ms: i64) -> Option<(V, i64)> {
        let entries = self.entries.read().ok()?;
        entries
            .get(key)
            .map(|entry| (entry.value.clone(), (now_ms - entry.fetched_at_ms).max(0)))
    }

    /// Value only if it is younger than the TTL.
    pub fn get_fresh(&self, key: &K) -> Option<V> {
        self.get_fresh_at(key, Utc::now().timestamp_millis())
    }

    pub fn get_fresh_at(&self, key: &K, now_ms: i64) -> Option<V> {
        let (value, age_ms) = self.get_at(key, now_ms)?;
        if (age_ms as u128) < self.ttl.as_millis() {
            Some(value)
        } else {
            debug!("Cache entry expired ({}ms old)", age_ms);
            None
        }
    }

    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Utc::now().timestamp_millis());
    }

    pub fn put_at(&self, key: K, value: V, fetched_at_ms: i64) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, CacheEntry { value, fetched_at_ms });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
