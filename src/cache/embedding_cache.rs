use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe LRU cache for query embeddings
///
/// An evaluation run embeds the same test questions once per retriever; the
/// cache keeps the HTTP embedder from paying for each of them more than once.
pub struct EmbeddingCache {
    cache: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl EmbeddingCache {
    /// Create a new embedding cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Mutex::new(LruCache::new(cap)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Vec<f32>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a cached embedding, counting the hit or miss
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let found = self.lock().get(text).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store an embedding, evicting the least recently used entry when full
    pub fn put(&self, text: String, embedding: Vec<f32>) {
        self.lock().put(text, embedding);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (usize, usize) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let cache = EmbeddingCache::new(10);
        cache.put("what does fireball do".to_string(), vec![0.6, 0.8]);
        assert_eq!(cache.get("what does fireball do"), Some(vec![0.6, 0.8]));
        assert!(cache.get("unknown question").is_none());
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_eviction_respects_recent_use() {
        let cache = EmbeddingCache::new(2);
        cache.put("q1".to_string(), vec![1.0]);
        cache.put("q2".to_string(), vec![2.0]);

        // Touch q1 so q2 becomes the eviction candidate
        let _ = cache.get("q1");
        cache.put("q3".to_string(), vec![3.0]);

        assert!(cache.get("q1").is_some());
        assert!(cache.get("q2").is_none());
        assert!(cache.get("q3").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let cache = EmbeddingCache::new(0);
        assert!(cache.is_empty());
        cache.put("a".to_string(), vec![1.0]);
        cache.put("b".to_string(), vec![2.0]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b").is_some());
    }
}
