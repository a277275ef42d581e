//! Bounded-staleness cache: an entry is valid only while its age is below
//! the TTL it was constructed with.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// TTL cache keyed by string. Starts empty on process start; holds no state
/// across restarts.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (V, Instant)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get the value if it is still fresh. Expired entries are dropped.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, written_at)) if written_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value with the current timestamp.
    pub async fn insert(&self, key: impl Into<String>, value: V) {
        self.entries
            .lock()
            .await
            .insert(key.into(), (value, Instant::now()));
    }

    /// Drop one key.
    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Full invalidation. Operational tooling only.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(1800));
        cache.insert("k", 42).await;

        tokio::time::advance(Duration::from_secs(1799)).await;
        assert_eq!(cache.get("k").await, Some(42));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn insert_refreshes_the_clock() {
        let cache = TtlCache::new(Duration::from_secs(100));
        cache.insert("k", 1).await;
        tokio::time::advance(Duration::from_secs(90)).await;
        cache.insert("k", 2).await;
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(cache.get("k").await, Some(2));
    }

    #[tokio::test]
    async fn clear_and_invalidate() {
        let cache = TtlCache::new(Duration::from_secs(100));
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;

        cache.invalidate("a").await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(2));

        cache.clear().await;
        assert_eq!(cache.get("b").await, None);
    }
}
