use crate::domain::{CacheKey, CacheValue, Version};
use crate::region::{Item, Region, RegionEntry};
use shared::Result;
use std::sync::Arc;
use tracing::debug;

/// State and behaviour shared by every strategy: the bound region and the
/// minimal-put rule used by the variants without soft locks
#[derive(Debug, Clone)]
pub struct AccessBase {
    region: Arc<Region>,
}

impl AccessBase {
    pub fn new(region: Arc<Region>) -> Self {
        Self { region }
    }

    pub fn region(&self) -> &Arc<Region> {
        &self.region
    }

    /// Fresh item stamped with the region clock
    pub fn item(&self, value: CacheValue, version: Option<Version>) -> RegionEntry {
        RegionEntry::Item(Item::new(value, version, self.region.next_timestamp()))
    }

    pub async fn read(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        Ok(self.region.get(key).await?.and_then(RegionEntry::into_value))
    }

    pub async fn write(
        &self,
        key: &CacheKey,
        value: CacheValue,
        version: Option<Version>,
    ) -> Result<()> {
        self.region.put(key, &self.item(value, version)).await
    }

    /// Skip the write when minimal puts apply and something is already cached
    pub async fn put_unless_cached(
        &self,
        key: &CacheKey,
        value: CacheValue,
        version: Option<Version>,
        minimal_put_override: bool,
    ) -> Result<bool> {
        if minimal_put_override && self.region.contains(key).await? {
            debug!(
                "Region '{}': minimal put skipped for {}, already cached",
                self.region.name(),
                key
            );
            return Ok(false);
        }
        self.write(key, value, version).await?;
        Ok(true)
    }
}
