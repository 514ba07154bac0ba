use std::collections::HashMap;
use std::sync::RwLock;

use crate::question::Question;

/// Key-value store from a question's identity to a previously obtained
/// raw response string.
///
/// Keys are a deterministic hash of the rendered prompt: identical
/// prompts always map to the same key, distinct prompts collide only at
/// the birthday bound. Eviction, persistence, and sharing are left to
/// alternative implementations; the handler only needs get/set.
pub trait Cache: Send + Sync {
    /// Generate the cache key for a question.
    fn question_key(&self, question: &Question) -> u64 {
        question.cache_key()
    }

    /// Store the raw response for a question.
    fn set(&self, question: &Question, raw: &str);

    /// Retrieve the cached raw response, if any.
    fn get(&self, question: &Question) -> Option<String>;
}

/// In-memory cache scoped to the instance's lifetime. No eviction, not
/// persistent across runs.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<u64, String>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for InMemoryCache {
    fn set(&self, question: &Question, raw: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(self.question_key(question), raw.to_string());
        }
    }

    fn get(&self, question: &Question) -> Option<String> {
        let entries = self.entries.read().ok()?;
        entries.get(&self.question_key(question)).cloned()
    }
}

/// No-op cache: always misses. Disables caching without branching caller
/// code.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl Cache for NullCache {
    fn set(&self, _question: &Question, _raw: &str) {}

    fn get(&self, _question: &Question) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_set_get() {
        let cache = InMemoryCache::new();
        let q = Question::new("foo?");

        cache.set(&q, "bar!");

        assert_eq!(cache.get(&q), Some("bar!".to_string()));
    }

    #[test]
    fn test_cache_miss() {
        let cache = InMemoryCache::new();
        let q = Question::new("missing?");

        assert_eq!(cache.get(&q), None);
    }

    #[test]
    fn test_cache_distinct_prompts() {
        let cache = InMemoryCache::new();
        let hello = Question::new("hello");
        let goodbye = Question::new("goodbye");

        cache.set(&hello, "Hi!");
        cache.set(&goodbye, "Bye!");

        assert_eq!(cache.get(&hello), Some("Hi!".to_string()));
        assert_eq!(cache.get(&goodbye), Some("Bye!".to_string()));
    }

    #[test]
    fn test_equal_prompts_share_entry() {
        let cache = InMemoryCache::new();
        let first = Question::new("same");
        let second = Question::new("same");

        cache.set(&first, "stored");

        assert_eq!(cache.get(&second), Some("stored".to_string()));
    }

    #[test]
    fn test_null_cache_always_misses() {
        let cache = NullCache;
        let q = Question::new("irrelevant?");

        cache.set(&q, "should not store");

        assert_eq!(cache.get(&q), None);
    }
}
