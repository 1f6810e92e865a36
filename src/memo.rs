//! Bounded FIFO memo for external lookups
//!
//! Owned by whichever component issues the calls; nothing here is global.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Translation memo capacity
pub const TRANSLATION_CACHE_CAPACITY: usize = 100;

/// Dictionary memo capacity
pub const DICTIONARY_CACHE_CAPACITY: usize = 200;

/// Fixed-capacity map that evicts the oldest insertion first
#[derive(Clone, Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    order: VecDeque<K>,
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    /// Empty cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached value for `key`. Lookups do not refresh insertion order.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Insert or overwrite. Overwriting keeps the original insertion slot.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

/// Memo key for a translation request
pub fn translation_key(text: &str, target: &str, source: Option<&str>) -> String {
    format!("{}:{}:{}", text, target, source.unwrap_or("auto"))
}

/// Memo key for a dictionary request
pub fn dictionary_key(word: &str, lang: &str) -> String {
    format!("{}:{}", word, lang)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_first() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn test_overwrite_keeps_slot() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        cache.insert("c", 3);
        // "a" was still the oldest insertion
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(&2));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = BoundedCache::new(0);
        cache.insert(1, "x");
        cache.insert(2, "y");
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.get(&2), Some(&"y"));
    }

    #[test]
    fn test_keys() {
        assert_eq!(translation_key("hola", "en", None), "hola:en:auto");
        assert_eq!(translation_key("hola", "en", Some("es")), "hola:en:es");
        assert_eq!(dictionary_key("whale", "en"), "whale:en");
    }
}
