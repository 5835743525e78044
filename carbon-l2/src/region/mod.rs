//! A named key space in the backing store.
//!
//! Store keys are laid out as `{prefix}{region}:{generation}:{encoded cache key}`.
//! The backing client cannot enumerate or clear keys, so `evict_all` bumps the
//! generation kept under `{prefix}{region}:__generation` and every older key
//! becomes unreachable until the store evicts it on its own.

pub mod entry;
pub mod key_locks;
pub mod memory;
pub mod registry;

pub use entry::{Item, LockEntry, RegionEntry};
pub use key_locks::{KeyGuard, KeyLocks};
pub use memory::MemoryKvClient;
pub use registry::RegionFactory;

use crate::domain::{CacheKey, TxContext};
use crate::keys::{CacheKeyCodec, DefaultKeyCodec};
use crate::ports::KvClient;
use crate::timestamp::{Timestamper, millis_to_timestamp_units};
use shared::config::RegionSettings;
use shared::{Error, Result};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Region {
    name: String,
    client: Arc<dyn KvClient>,
    codec: Arc<dyn CacheKeyCodec>,
    settings: RegionSettings,
    timestamper: Arc<Timestamper>,
    key_locks: KeyLocks,
}

impl Region {
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn KvClient>,
        settings: RegionSettings,
        timestamper: Arc<Timestamper>,
    ) -> Self {
        Self::with_codec(name, client, Arc::new(DefaultKeyCodec), settings, timestamper)
    }

    pub fn with_codec(
        name: impl Into<String>,
        client: Arc<dyn KvClient>,
        codec: Arc<dyn CacheKeyCodec>,
        settings: RegionSettings,
        timestamper: Arc<Timestamper>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            codec,
            settings,
            timestamper,
            key_locks: KeyLocks::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &RegionSettings {
        &self.settings
    }

    pub fn codec(&self) -> &dyn CacheKeyCodec {
        self.codec.as_ref()
    }

    pub fn next_timestamp(&self) -> u64 {
        self.timestamper.next()
    }

    /// Soft lock lifetime in timestamp units
    pub fn timeout(&self) -> u64 {
        millis_to_timestamp_units(self.settings.lock_timeout_ms)
    }

    /// Start a transaction context stamped by this region's clock
    pub fn begin_transaction(&self) -> TxContext {
        TxContext::new(self.next_timestamp())
    }

    /// Serialize read-modify-write sequences on one key within this process
    pub async fn lock_key(&self, key: &CacheKey) -> KeyGuard<'_> {
        self.key_locks.lock(key).await
    }

    pub async fn get(&self, key: &CacheKey) -> Result<Option<RegionEntry>> {
        let store_key = self.store_key(key).await?;
        match self.client.get(&store_key).await? {
            Some(bytes) => {
                let entry = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::Serialization(format!(
                        "region '{}' holds an undecodable entry for {}: {}",
                        self.name, key, e
                    ))
                })?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    pub async fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Always overwrites
    pub async fn put(&self, key: &CacheKey, entry: &RegionEntry) -> Result<()> {
        let store_key = self.store_key(key).await?;
        let bytes = serde_json::to_vec(entry)?;
        self.client.put(store_key, bytes).await?;
        debug!("Region '{}' stored {}", self.name, key);
        Ok(())
    }

    /// Idempotent on absent keys
    pub async fn evict(&self, key: &CacheKey) -> Result<()> {
        let store_key = self.store_key(key).await?;
        let existed = self.client.delete(&store_key).await?;
        debug!("Region '{}' evicted {} (existed: {})", self.name, key, existed);
        Ok(())
    }

    pub async fn evict_all(&self) -> Result<()> {
        if !self.settings.clear_supported {
            warn!(
                "Region '{}' cannot be cleared: clearing is disabled in the configuration",
                self.name
            );
            return Ok(());
        }
        let next = self.generation().await? + 1;
        self.client
            .put(self.generation_key(), next.to_string().into_bytes())
            .await?;
        debug!("Region '{}' cleared, now at generation {}", self.name, next);
        Ok(())
    }

    /// Recover the cache key from a raw store key of this region, whatever its generation
    pub fn decode_store_key(&self, store_key: &[u8]) -> Result<CacheKey> {
        let raw = std::str::from_utf8(store_key)
            .map_err(|e| Error::Serialization(format!("store key is not UTF-8: {}", e)))?;
        let rest = raw
            .strip_prefix(self.key_namespace().as_str())
            .ok_or_else(|| {
                Error::Serialization(format!("store key does not belong to region '{}'", self.name))
            })?;
        let (generation, encoded) = rest
            .split_once(':')
            .ok_or_else(|| Error::Serialization("store key has no generation".to_string()))?;
        if generation.is_empty() || !generation.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Serialization(format!(
                "store key has an invalid generation '{}'",
                generation
            )));
        }
        self.codec.decode(encoded)
    }

    async fn generation(&self) -> Result<u64> {
        if !self.settings.clear_supported {
            return Ok(0);
        }
        match self.client.get(&self.generation_key()).await? {
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| {
                    Error::Serialization(format!("region '{}' has a corrupt generation", self.name))
                }),
            None => Ok(0),
        }
    }

    async fn store_key(&self, key: &CacheKey) -> Result<Vec<u8>> {
        let generation = self.generation().await?;
        let encoded = self.codec.encode(key)?;
        Ok(format!("{}{}:{}", self.key_namespace(), generation, encoded).into_bytes())
    }

    fn key_namespace(&self) -> String {
        format!("{}{}:", self.settings.key_prefix, self.name)
    }

    fn generation_key(&self) -> Vec<u8> {
        format!("{}__generation", self.key_namespace()).into_bytes()
    }
}

impl Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("client", &"<dyn KvClient>")
            .finish()
    }
}
