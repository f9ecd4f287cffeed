//! LRU + TTL cache for deterministic sub-LLM results.
//!
//! Keys bind the prompt to the user and conversation so identical prompts
//! from different contexts never share entries. Only consulted for the
//! asset-fallback synthesis turn; the main reasoning path is never cached.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use meshpilot_config::CacheConfig;

/// Canonical key material. Field order is fixed by this struct, so the
/// serialized form is stable.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyMaterial<'a> {
    prompt: &'a str,
    user_id: &'a str,
    conversation_id: &'a str,
}

/// SHA-256 of the canonical JSON of `{prompt, userId, conversationId}`.
pub fn cache_key(prompt: &str, user_id: &str, conversation_id: &str) -> String {
    let material = KeyMaterial {
        prompt,
        user_id,
        conversation_id,
    };
    let json = serde_json::to_string(&material).unwrap_or_default();
    let digest = Sha256::digest(json.as_bytes());
    format!("{digest:x}")
}

struct Entry {
    value: String,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Usage order, least recent first.
    order: Vec<String>,
}

/// Bounded cache with LRU eviction and TTL expiry on read.
pub struct CodeCache {
    max_entries: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl CodeCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            max_entries: config.max_entries.max(1),
            ttl: Duration::from_secs(config.ttl_secs),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        let stale = match inner.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if stale {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }

        // Mark as most recently used.
        inner.order.retain(|k| k != key);
        inner.order.push(key.to_string());
        inner.entries.get(key).map(|e| e.value.clone())
    }

    pub fn set(&self, key: &str, value: String) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        inner.order.retain(|k| k != key);
        inner.order.push(key.to_string());
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );

        while inner.entries.len() > self.max_entries {
            let evicted = inner.order.remove(0);
            inner.entries.remove(&evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache(max_entries: usize, ttl_secs: u64) -> CodeCache {
        CodeCache::new(&CacheConfig {
            max_entries,
            ttl_secs,
        })
    }

    #[test]
    fn key_binds_user_and_conversation() {
        let a = cache_key("make a cube", "user-1", "conv-1");
        let b = cache_key("make a cube", "user-2", "conv-1");
        let c = cache_key("make a cube", "user-1", "conv-2");
        let d = cache_key("make a cube", "user-1", "conv-1");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, d);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test(start_paused = true)]
    async fn get_returns_latest_set() {
        let cache = small_cache(10, 300);
        cache.set("k", "v1".into());
        cache.set("k", "v2".into());
        assert_eq!(cache.get("k").as_deref(), Some("v2"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_are_absent_and_purged() {
        let cache = small_cache(10, 300);
        cache.set("k", "v".into());
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn just_inside_ttl_still_hits() {
        let cache = small_cache(10, 300);
        cache.set("k", "v".into());
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_least_recently_used() {
        let cache = small_cache(2, 300);
        cache.set("a", "1".into());
        cache.set("b", "2".into());
        // Touch "a" so "b" is the eviction candidate.
        let _ = cache.get("a");
        cache.set("c", "3".into());

        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c").as_deref(), Some("3"));
    }
}
