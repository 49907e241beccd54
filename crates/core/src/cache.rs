//! Category Cache
//!
//! Session-scoped memory of lesson content already fetched per category.
//! Entries are never evicted; the cache lives as long as its lesson session.
//! The backing store is injectable so callers can observe or fake it.

use crate::{category::CategoryKey, normalize::LessonContent};
use std::collections::HashMap;
use tracing::debug;

/// Storage behind a [`CategoryCache`].
#[cfg_attr(test, mockall::automock)]
pub trait LessonStore: Send {
    fn get(&self, key: &CategoryKey) -> Option<LessonContent>;
    fn put(&mut self, key: CategoryKey, content: LessonContent);
    fn len(&self) -> usize;
}

/// The default in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<CategoryKey, LessonContent>,
}

impl LessonStore for MemoryStore {
    fn get(&self, key: &CategoryKey) -> Option<LessonContent> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: CategoryKey, content: LessonContent) {
        self.entries.insert(key, content);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Hit/miss counters for a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Maps a category key to the lesson content fetched for it.
pub struct CategoryCache {
    store: Box<dyn LessonStore>,
    stats: CacheStats,
}

impl Default for CategoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryCache {
    pub fn new() -> Self {
        Self::with_store(Box::new(MemoryStore::default()))
    }

    pub fn with_store(store: Box<dyn LessonStore>) -> Self {
        Self {
            store,
            stats: CacheStats::default(),
        }
    }

    /// Returns the cached content for `key`, counting the hit or miss.
    pub fn lookup(&mut self, key: &CategoryKey) -> Option<LessonContent> {
        let found = self.store.get(key);
        if found.is_some() {
            self.stats.hits += 1;
            debug!(category = %key, "Lesson cache hit");
        } else {
            self.stats.misses += 1;
            debug!(category = %key, "Lesson cache miss");
        }
        found
    }

    pub fn store(&mut self, key: CategoryKey, content: LessonContent) {
        debug!(category = %key, lines = content.len(), "Caching lesson content");
        self.store.put(key, content);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_lesson;
    use mockall::predicate::eq;

    #[test]
    fn test_lookup_counts_hits_and_misses() {
        let mut cache = CategoryCache::new();
        let key = CategoryKey::from("Grammar");
        assert!(cache.lookup(&key).is_none());

        cache.store(key.clone(), normalize_lesson("a\nb"));
        assert_eq!(cache.lookup(&key).unwrap().lines(), ["a", "b"]);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_store_overwrites_same_key() {
        let mut cache = CategoryCache::new();
        cache.store("Idioms".into(), normalize_lesson("old"));
        cache.store("Idioms".into(), normalize_lesson("new"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&"Idioms".into()).unwrap().lines(), ["new"]);
    }

    #[test]
    fn test_delegates_to_injected_store() {
        let mut store = MockLessonStore::new();
        store
            .expect_get()
            .with(eq(CategoryKey::from("Vocabulary")))
            .times(1)
            .returning(|_| Some(normalize_lesson("word")));
        store.expect_len().return_const(1usize);

        let mut cache = CategoryCache::with_store(Box::new(store));
        assert_eq!(
            cache.lookup(&"Vocabulary".into()).unwrap().lines(),
            ["word"]
        );
        assert!(!cache.is_empty());
    }
}
