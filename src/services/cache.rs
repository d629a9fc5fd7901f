use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(60_000);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

/// Key/value store whose freshness is tracked for the whole collection.
///
/// There is one `last_refresh` clock shared by every entry. Any `set` or
/// `set_many` (even with nothing in it) restarts that clock, so caching a
/// single entity also makes a stale bulk listing look fresh again.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, V>,
    last_refresh: Instant,
    ttl: Duration,
    stats: CacheStats,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            last_refresh: Instant::now(),
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(value) => {
                self.stats.hits += 1;
                Some(value.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn set(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
        self.stats.writes += 1;
        self.last_refresh = Instant::now();
    }

    pub fn set_many<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.entries.insert(key, value);
            self.stats.writes += 1;
        }
        self.last_refresh = Instant::now();
    }

    /// Drops one entry. The freshness clock is left alone.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    /// Empties the cache without touching the freshness clock.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> Vec<V> {
        self.entries.values().cloned().collect()
    }

    pub fn is_stale(&self) -> bool {
        self.last_refresh.elapsed() > self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const SHORT: Duration = Duration::from_millis(30);

    fn wait_past(ttl: Duration) {
        sleep(ttl + Duration::from_millis(20));
    }

    #[test]
    fn fresh_after_set_and_stale_after_ttl() {
        let mut cache: TtlCache<String, u32> = TtlCache::new(SHORT);
        cache.set("a".to_string(), 1);
        assert!(!cache.is_stale());

        wait_past(SHORT);
        assert!(cache.is_stale());
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn get_on_absent_key_is_none() {
        let mut cache: TtlCache<String, u32> = TtlCache::default();
        assert_eq!(cache.get(&"missing".to_string()), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn empty_set_many_still_refreshes_the_clock() {
        let mut cache: TtlCache<String, u32> = TtlCache::new(SHORT);
        wait_past(SHORT);
        assert!(cache.is_stale());

        cache.set_many(Vec::new());
        assert!(!cache.is_stale());
        assert!(cache.is_empty());
    }

    #[test]
    fn caching_one_unrelated_entry_unstales_the_whole_collection() {
        let mut cache: TtlCache<String, u32> = TtlCache::new(SHORT);
        cache.set_many(vec![("a".to_string(), 1), ("b".to_string(), 2)]);
        wait_past(SHORT);
        assert!(cache.is_stale());

        cache.set("z".to_string(), 26);
        assert!(!cache.is_stale());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn clear_and_remove_leave_freshness_alone() {
        let mut cache: TtlCache<String, u32> = TtlCache::new(SHORT);
        cache.set("a".to_string(), 1);
        wait_past(SHORT);

        cache.remove(&"a".to_string());
        cache.clear();
        assert!(cache.is_stale());
        assert!(cache.values().is_empty());
    }
}
