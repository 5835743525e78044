use async_trait::async_trait;
use carbon_l2::ports::KvClient;
use moka::future::Cache;
use shared::Result;
use shared::config::StoreSettings;
use std::fmt::Debug;
use std::time::Duration;

/// Moka-based store with optional entry bound and TTL.
/// Capacity and expiry are properties of the store; regions never see them.
pub struct MokaKvClient {
    cache: Cache<Vec<u8>, Vec<u8>>,
}

impl MokaKvClient {
    pub fn new(name: String, max_entries: Option<u64>, default_ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().name(&name);

        if let Some(capacity) = max_entries {
            builder = builder.max_capacity(capacity);
        }

        if let Some(ttl) = default_ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            cache: builder.build(),
        }
    }

    pub fn from_settings(name: String, settings: &StoreSettings) -> Self {
        Self::new(
            name,
            settings.max_entries,
            settings.ttl_ms.map(Duration::from_millis),
        )
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl KvClient for MokaKvClient {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        // absent or expired
        Ok(self.cache.get(key).await)
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.cache.insert(key, value).await;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool> {
        Ok(self.cache.remove(key).await.is_some())
    }
}

impl Debug for MokaKvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaKvClient")
            .field("entry_count", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .finish()
    }
}
