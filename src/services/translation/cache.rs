use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use xxhash_rust::xxh3::xxh3_64;

use crate::core::types::TranslationMethod;
use crate::utils::Metrics;

/// In-process LRU of finished translations.
///
/// Keys are xxHash3 digests of (method, source text), so the same text sent
/// through different backends is cached separately.
pub struct TranslationCache {
    // None when caching is disabled
    cache: Option<Mutex<LruCache<u64, String>>>,
    metrics: Option<Metrics>,
}

impl TranslationCache {
    /// `max_entries == 0` disables the cache
    pub fn new(max_entries: usize, metrics: Option<Metrics>) -> Self {
        Self {
            cache: NonZeroUsize::new(max_entries).map(|n| Mutex::new(LruCache::new(n))),
            metrics,
        }
    }

    pub fn generate_key(method: TranslationMethod, text: &str) -> u64 {
        let mut hash_input = Vec::with_capacity(method.as_str().len() + 1 + text.len());
        hash_input.extend_from_slice(method.as_str().as_bytes());
        hash_input.push(0);
        hash_input.extend_from_slice(text.as_bytes());
        xxh3_64(&hash_input)
    }

    pub fn get(&self, method: TranslationMethod, text: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        let hit = cache.lock().get(&Self::generate_key(method, text)).cloned();

        if let Some(ref m) = self.metrics {
            if hit.is_some() {
                m.record_cache_hit();
            } else {
                m.record_cache_miss();
            }
        }
        hit
    }

    pub fn put(&self, method: TranslationMethod, text: &str, translated: &str) {
        if let Some(cache) = &self.cache {
            cache
                .lock()
                .put(Self::generate_key(method, text), translated.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_put_get() {
        let metrics = Metrics::new();
        let cache = TranslationCache::new(8, Some(metrics.clone()));

        assert_eq!(cache.get(TranslationMethod::Google, "こんにちは"), None);
        cache.put(TranslationMethod::Google, "こんにちは", "Hello");
        assert_eq!(
            cache.get(TranslationMethod::Google, "こんにちは").as_deref(),
            Some("Hello")
        );
        // Keyed per method
        assert_eq!(cache.get(TranslationMethod::Bing, "こんにちは"), None);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 2);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = TranslationCache::new(2, None);
        cache.put(TranslationMethod::Hf, "a", "A");
        cache.put(TranslationMethod::Hf, "b", "B");
        cache.put(TranslationMethod::Hf, "c", "C");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(TranslationMethod::Hf, "a"), None);
    }

    #[test]
    fn test_disabled_cache() {
        let cache = TranslationCache::new(0, None);
        cache.put(TranslationMethod::Google, "a", "A");
        assert!(cache.is_empty());
        assert_eq!(cache.get(TranslationMethod::Google, "a"), None);
    }

    #[test]
    fn test_key_generation() {
        let k1 = TranslationCache::generate_key(TranslationMethod::Google, "test");
        let k2 = TranslationCache::generate_key(TranslationMethod::Google, "test");
        let k3 = TranslationCache::generate_key(TranslationMethod::Baidu, "test");
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
    }
}
