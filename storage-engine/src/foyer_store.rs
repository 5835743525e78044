use async_trait::async_trait;
use carbon_l2::ports::KvClient;
use foyer::{Cache, CacheBuilder};
use shared::Result;
use shared::config::StoreSettings;
use std::fmt::Debug;
use std::sync::Arc;

/// Foyer-based in-memory store, bounded by the bytes of keys plus values
pub struct FoyerKvClient {
    cache: Arc<Cache<Vec<u8>, Vec<u8>>>,
}

impl FoyerKvClient {
    /// Create a new Foyer in-memory store with the given memory capacity in bytes
    pub fn new(name: String, mem_bytes: usize) -> Self {
        let cache = CacheBuilder::new(mem_bytes)
            .with_name(name)
            .with_weighter(|key: &Vec<u8>, value: &Vec<u8>| key.len() + value.len())
            .build();

        Self {
            cache: Arc::new(cache),
        }
    }

    pub fn from_settings(name: String, settings: &StoreSettings) -> Self {
        Self::new(name, settings.mem_bytes)
    }
}

#[async_trait]
impl KvClient for FoyerKvClient {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.cache.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool> {
        Ok(self.cache.remove(key).is_some())
    }
}

impl Debug for FoyerKvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoyerKvClient")
            .field("cache", &"<foyer::Cache>")
            .finish()
    }
}
