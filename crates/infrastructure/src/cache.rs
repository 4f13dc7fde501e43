//! Cache module - generation cache backends
//!
//! Successful generations are cached under a SHA-256 digest of the canonical
//! request, so identical (model, prompt, parameters) triples are answered
//! without contacting the provider until the entry's TTL elapses.

use async_trait::async_trait;
use llm_leaderboard_domain::{GenerationRequest, TokenUsage};
use parking_lot::RwLock;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::{Error, Result};

/// Hex SHA-256 digest identifying a generation request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Digest of the canonical JSON form of the request.
    ///
    /// Field order is fixed by the request struct and JSON object keys inside
    /// a response schema serialize sorted, so equal requests always hash equal.
    pub fn for_request(request: &GenerationRequest) -> Self {
        let canonical = serde_json::to_vec(request).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What gets stored for a cached generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedGeneration {
    pub text: String,
    pub usage: TokenUsage,
}

/// Cache of successful generations.
#[async_trait]
pub trait GenerationCache: Send + Sync {
    /// Get a live entry
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedGeneration>>;

    /// Store an entry with the cache's TTL
    async fn put(&self, key: &CacheKey, value: &CachedGeneration) -> Result<()>;
}

/// Process-local cache with lazy expiry
pub struct InMemoryGenerationCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, (Instant, CachedGeneration)>>,
}

impl InMemoryGenerationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl GenerationCache for InMemoryGenerationCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedGeneration>> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some((stored_at, value)) if stored_at.elapsed() < self.ttl => {
                    return Ok(Some(value.clone()));
                }
                None => return Ok(None),
                Some(_) => {}
            }
        }
        // expired
        self.entries.write().remove(key);
        debug!(key = %key, "Cache entry expired");
        Ok(None)
    }

    async fn put(&self, key: &CacheKey, value: &CachedGeneration) -> Result<()> {
        self.entries
            .write()
            .insert(key.clone(), (Instant::now(), value.clone()));
        Ok(())
    }
}

/// Redis-backed cache shared between runs and machines
pub struct RedisGenerationCache {
    connection: ConnectionManager,
    ttl: Duration,
    key_prefix: String,
}

impl RedisGenerationCache {
    /// Connect to Redis.
    #[instrument(skip(url, key_prefix))]
    pub async fn connect(url: &str, ttl: Duration, key_prefix: impl Into<String>) -> Result<Self> {
        info!("Connecting to Redis generation cache");

        let client = Client::open(url).map_err(Error::Cache)?;
        let connection = ConnectionManager::new(client).await.map_err(Error::Cache)?;

        info!("Redis generation cache connected");
        Ok(Self {
            connection,
            ttl,
            key_prefix: key_prefix.into(),
        })
    }

    fn full_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl GenerationCache for RedisGenerationCache {
    #[instrument(skip(self))]
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedGeneration>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(self.full_key(key)).await.map_err(Error::Cache)?;

        match value {
            Some(s) => {
                let parsed = serde_json::from_str(&s).map_err(Error::Serialization)?;
                debug!(key = %key, "Cache hit");
                Ok(Some(parsed))
            }
            None => {
                debug!(key = %key, "Cache miss");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, value))]
    async fn put(&self, key: &CacheKey, value: &CachedGeneration) -> Result<()> {
        let serialized = serde_json::to_string(value).map_err(Error::Serialization)?;
        let mut conn = self.connection.clone();

        conn.set_ex::<_, _, ()>(self.full_key(key), serialized, self.ttl.as_secs().max(1))
            .await
            .map_err(Error::Cache)?;

        debug!(key = %key, ttl_secs = self.ttl.as_secs(), "Cache set");
        Ok(())
    }
}

impl fmt::Debug for RedisGenerationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisGenerationCache")
            .field("ttl", &self.ttl)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}
