//! Durable per-community storage (Redis).
//!
//! The config and stats stores are the sole durable owners of their
//! documents. Both are plain key/value: documents are read and written
//! whole, last write wins, and there is no locking, versioning, or atomic
//! increment. Concurrent folds on the same community can drop an increment;
//! the stats are advisory and tolerate it.
//!
//! ## Redis key patterns
//!
//! ```text
//! warden:config:{communityId}   → AutomodConfig JSON
//! warden:stats:{communityId}    → StatsDocument JSON
//! warden:transcript:{key}       → stored HTML, verbatim
//! ```

use async_trait::async_trait;
use deadpool_redis::redis::cmd;
use deadpool_redis::Pool;
use thiserror::Error;
use tracing::error;

use crate::document::AutomodConfig;
use crate::stats::StatsDocument;

/// Storage failures. All of them surface as a 500 at the API boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to get Redis connection: {0}")]
    Connection(String),

    #[error("Redis command failed: {0}")]
    Redis(String),

    #[error("stored document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Authoritative configuration documents.
///
/// `read` of an unconfigured community returns the default document, never
/// an error.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn read(&self, community_id: &str) -> Result<AutomodConfig, StoreError>;
    async fn write(&self, community_id: &str, config: &AutomodConfig) -> Result<(), StoreError>;
}

/// Running counters, zero-valued until the first fold.
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn read(&self, community_id: &str) -> Result<StatsDocument, StoreError>;
    async fn write(&self, community_id: &str, stats: &StatsDocument) -> Result<(), StoreError>;
}

/// Transcript blobs: pure put/get, no synchronization requirement.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn put(&self, key: &str, html: &str) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

fn config_key(community_id: &str) -> String {
    format!("warden:config:{community_id}")
}

fn stats_key(community_id: &str) -> String {
    format!("warden:stats:{community_id}")
}

fn transcript_key(key: &str) -> String {
    format!("warden:transcript:{key}")
}

/// Redis-backed stores sharing one connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.get().await.map_err(|e| {
            error!(error = %e, key = %key, "Failed to get Redis connection");
            StoreError::Connection(e.to_string())
        })?;

        let raw: Option<String> = cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "Redis GET failed");
                StoreError::Redis(e.to_string())
            })?;

        Ok(raw)
    }

    async fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(|e| {
            error!(error = %e, key = %key, "Failed to get Redis connection");
            StoreError::Connection(e.to_string())
        })?;

        let _: () = cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "Redis SET failed");
                StoreError::Redis(e.to_string())
            })?;

        Ok(())
    }
}

#[async_trait]
impl ConfigStore for RedisStore {
    async fn read(&self, community_id: &str) -> Result<AutomodConfig, StoreError> {
        match self.get_raw(&config_key(community_id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(AutomodConfig::default()),
        }
    }

    async fn write(&self, community_id: &str, config: &AutomodConfig) -> Result<(), StoreError> {
        let raw = serde_json::to_string(config)?;
        self.set_raw(&config_key(community_id), &raw).await
    }
}

#[async_trait]
impl StatsStore for RedisStore {
    async fn read(&self, community_id: &str) -> Result<StatsDocument, StoreError> {
        match self.get_raw(&stats_key(community_id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(StatsDocument::default()),
        }
    }

    async fn write(&self, community_id: &str, stats: &StatsDocument) -> Result<(), StoreError> {
        let raw = serde_json::to_string(stats)?;
        self.set_raw(&stats_key(community_id), &raw).await
    }
}

#[async_trait]
impl TranscriptStore for RedisStore {
    async fn put(&self, key: &str, html: &str) -> Result<(), StoreError> {
        self.set_raw(&transcript_key(key), html).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.get_raw(&transcript_key(key)).await
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::document::Feature;
    use serde_json::json;

    #[tokio::test]
    async fn test_unconfigured_community_reads_default() {
        let store = MemoryStore::new();
        let config = ConfigStore::read(&store, "nobody").await.unwrap();
        assert_eq!(config, AutomodConfig::default());

        let stats = StatsStore::read(&store, "nobody").await.unwrap();
        assert_eq!(stats, StatsDocument::default());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();

        for percent in [50.0, 60.0, 70.0] {
            let config = AutomodConfig::from_value(&json!({
                "enabled": true,
                "filters": { "caps": { "enabled": true, "percent": percent } }
            }));
            ConfigStore::write(&store, "c1", &config).await.unwrap();
        }

        let stored = ConfigStore::read(&store, "c1").await.unwrap();
        match &stored.filters.caps {
            Feature::Enabled(caps) => assert_eq!(caps.percent, 70.0),
            Feature::Disabled => panic!("caps filter lost"),
        }
    }

    #[tokio::test]
    async fn test_transcript_put_get() {
        let store = MemoryStore::new();
        assert_eq!(store.get("t1").await.unwrap(), None);

        store.put("t1", "<html>log</html>").await.unwrap();
        assert_eq!(
            store.get("t1").await.unwrap().as_deref(),
            Some("<html>log</html>")
        );
    }
}
