//! Consumer-side configuration cache.
//!
//! The moderation front end sees a message for every chat event; fetching
//! configuration over HTTP each time would put the backend on the hot path.
//! [`ConfigCache`] memoizes fetches per community for a short TTL (30
//! seconds by default, matching how quickly dashboard edits should reach
//! enforcement).
//!
//! An expired entry is treated as absent and refetched; stale reads happen
//! only inside the TTL window, never after. Concurrent misses on the same
//! key are not deduplicated: at most one redundant fetch per overlap, traded
//! for not holding a lock across the network call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::client::ClientError;
use crate::document::AutomodConfig;

/// How long a fetched document stays authoritative.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// The fetch behind a cache miss failed; the caller's policy is to skip
/// enforcement for that event, never to block or retry inline.
#[derive(Debug, Error)]
#[error("configuration unavailable for community {community_id}")]
pub struct ConfigUnavailable {
    pub community_id: String,
    #[source]
    pub source: ClientError,
}

/// Where cache misses get their documents from.
///
/// Implemented by [`crate::client::ApiClient`]; tests implement it with a
/// counting stub.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    async fn fetch_config(&self, community_id: &str) -> Result<AutomodConfig, ClientError>;
}

struct CacheEntry {
    config: Arc<AutomodConfig>,
    expires_at: Instant,
}

/// Read-through, process-local, TTL-bounded.
pub struct ConfigCache {
    fetcher: Arc<dyn ConfigFetcher>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ConfigCache {
    pub fn new(fetcher: Arc<dyn ConfigFetcher>) -> Self {
        Self::with_ttl(fetcher, DEFAULT_TTL)
    }

    pub fn with_ttl(fetcher: Arc<dyn ConfigFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live cached document, or fetch and cache it.
    ///
    /// Failures are never cached; the next call fetches again.
    pub async fn get(&self, community_id: &str) -> Result<Arc<AutomodConfig>, ConfigUnavailable> {
        if let Some(config) = self.live_entry(community_id) {
            return Ok(config);
        }

        debug!(community = %community_id, "Config cache miss, fetching");
        let fetched = self
            .fetcher
            .fetch_config(community_id)
            .await
            .map_err(|source| ConfigUnavailable {
                community_id: community_id.to_string(),
                source,
            })?;

        let config = Arc::new(fetched);
        self.entries.lock().unwrap().insert(
            community_id.to_string(),
            CacheEntry {
                config: config.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(config)
    }

    /// Drop entries past their expiry (housekeeping).
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .retain(|_, entry| entry.expires_at > now);
    }

    /// Entries currently held, live or not.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    fn live_entry(&self, community_id: &str) -> Option<Arc<AutomodConfig>> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(community_id)?;
        if entry.expires_at > Instant::now() {
            Some(entry.config.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConfigFetcher for CountingFetcher {
        async fn fetch_config(&self, _community_id: &str) -> Result<AutomodConfig, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ClientError::Status(reqwest::StatusCode::BAD_GATEWAY))
            } else {
                Ok(AutomodConfig::default())
            }
        }
    }

    #[tokio::test]
    async fn test_hit_within_ttl_skips_fetch() {
        let fetcher = CountingFetcher::new();
        let cache = ConfigCache::with_ttl(fetcher.clone(), Duration::from_secs(60));

        cache.get("c1").await.unwrap();
        cache.get("c1").await.unwrap();
        cache.get("c1").await.unwrap();

        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_refetches_once() {
        let fetcher = CountingFetcher::new();
        let cache = ConfigCache::with_ttl(fetcher.clone(), Duration::from_millis(20));

        cache.get("c1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        cache.get("c1").await.unwrap();
        cache.get("c1").await.unwrap();

        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_fetch_independently() {
        let fetcher = CountingFetcher::new();
        let cache = ConfigCache::with_ttl(fetcher.clone(), Duration::from_secs(60));

        cache.get("c1").await.unwrap();
        cache.get("c2").await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_cached() {
        let fetcher = CountingFetcher::failing();
        let cache = ConfigCache::with_ttl(fetcher.clone(), Duration::from_secs(60));

        let err = cache.get("c1").await.unwrap_err();
        assert_eq!(err.community_id, "c1");
        assert!(cache.is_empty());

        let _ = cache.get("c1").await.unwrap_err();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_evict_expired_drops_dead_entries() {
        let fetcher = CountingFetcher::new();
        let cache = ConfigCache::with_ttl(fetcher, Duration::from_millis(10));

        cache.get("c1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        cache.evict_expired();
        assert!(cache.is_empty());
    }
}
