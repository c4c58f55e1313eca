//! Small TTL cache used for taxonomy lookups and arbitration verdicts.
//!
//! The original system kept module-level maps keyed by channel id; here the
//! cache is an explicit value passed by reference into the core, with an
//! invalidation call for upstream taxonomy/source updates.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// Thread-safe map with per-cache TTL and bounded size.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.inner.lock().ok()?;
        let entry = guard.get(key)?;
        if entry.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        if let Ok(mut guard) = self.inner.lock() {
            // Expired entries go first; if still over budget, drop arbitrary
            // entries rather than grow without bound.
            if guard.len() >= self.max_entries {
                let ttl = self.ttl;
                guard.retain(|_, e| e.stored_at.elapsed() <= ttl);
            }
            while guard.len() >= self.max_entries {
                if let Some(k) = guard.keys().next().cloned() {
                    guard.remove(&k);
                } else {
                    break;
                }
            }
            guard.insert(
                key,
                Entry {
                    value,
                    stored_at: Instant::now(),
                },
            );
        }
    }

    /// Drop one key (upstream update for a single channel).
    pub fn invalidate(&self, key: &K) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.remove(key);
        }
    }

    /// Drop everything.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_after_insert_and_invalidate() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60), 16);
        cache.insert("a".into(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        cache.invalidate(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(0), 16);
        cache.insert("a".into(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn size_stays_bounded() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(60), 4);
        for i in 0..20 {
            cache.insert(i, i);
        }
        assert!(cache.len() <= 4);
    }
}
