// SPDX-License-Identifier: MIT OR Apache-2.0
//! TTL'd result cache, keyed by the canonical JSON of a query.

use crate::DiscoveryResult;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct CachedResult {
    result: DiscoveryResult,
    expires_at: Instant,
}

/// A bounded-lifetime cache of [`DiscoveryResult`]s keyed by query.
#[derive(Clone)]
pub struct ResultCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CachedResult>>>,
}

impl ResultCache {
    /// Create a cache with the given time-to-live.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Return the cached result for `key` if present and not expired.
    pub async fn get(&self, key: &str) -> Option<DiscoveryResult> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if Instant::now() >= entry.expires_at {
            return None;
        }
        Some(entry.result.clone())
    }

    /// Store `result` under `key` with a fresh TTL.
    pub async fn put(&self, key: String, result: DiscoveryResult) {
        let mut entries = self.entries.write().await;
        entries.insert(key, CachedResult { result, expires_at: Instant::now() + self.ttl });
    }

    /// Drop every cached entry. Called whenever a registration succeeds, so
    /// the cache never serves results that predate a newly-registered agent.
    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    /// Current number of cached entries, including expired-but-unevicted
    /// ones.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn empty_result() -> DiscoveryResult {
        DiscoveryResult {
            agents: Vec::new(),
            total: 0,
            returned: 0,
            query: crate::DiscoveryQuery::default(),
            executed_at: Utc::now(),
            execution_time_ms: 0,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.put("key".into(), empty_result()).await;
        assert!(cache.get("key").await.is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let cache = ResultCache::new(Duration::from_millis(1));
        cache.put("key".into(), empty_result()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.get("key").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_entry() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.put("a".into(), empty_result()).await;
        cache.put("b".into(), empty_result()).await;
        cache.invalidate_all().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let cache = ResultCache::new(Duration::from_secs(60));
        assert!(cache.get("absent").await.is_none());
    }
}
