use super::{AccessBase, EntityRegionAccess};
use crate::domain::{AccessType, CacheKey, CacheValue, SoftLock, TxContext, Version};
use crate::region::Region;
use async_trait::async_trait;
use shared::Result;
use std::sync::Arc;
use tracing::debug;

/// Strategy for data that tolerates brief staleness.
/// Writes evict instead of overwriting, so the next read goes to the database.
#[derive(Debug, Clone)]
pub struct NonstrictReadWriteAccess {
    base: AccessBase,
}

impl NonstrictReadWriteAccess {
    pub fn new(region: Arc<Region>) -> Self {
        Self {
            base: AccessBase::new(region),
        }
    }
}

#[async_trait]
impl EntityRegionAccess for NonstrictReadWriteAccess {
    fn access_type(&self) -> AccessType {
        AccessType::NonstrictReadWrite
    }

    fn region(&self) -> &Arc<Region> {
        self.base.region()
    }

    async fn get(
        &self,
        _tx: &TxContext,
        key: &CacheKey,
        _tx_timestamp: u64,
    ) -> Result<Option<CacheValue>> {
        self.base.read(key).await
    }

    async fn put_from_load(
        &self,
        _tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        _tx_timestamp: u64,
        version: Option<Version>,
        minimal_put_override: bool,
    ) -> Result<bool> {
        self.base
            .put_unless_cached(key, value, version, minimal_put_override)
            .await
    }

    async fn lock_item(
        &self,
        _tx: &TxContext,
        _key: &CacheKey,
        _version: Option<Version>,
    ) -> Result<Option<SoftLock>> {
        Ok(None)
    }

    async fn unlock_item(
        &self,
        _tx: &TxContext,
        key: &CacheKey,
        _lock: Option<SoftLock>,
    ) -> Result<()> {
        self.base.region().evict(key).await
    }

    async fn insert(
        &self,
        _tx: &TxContext,
        _key: &CacheKey,
        _value: CacheValue,
        _version: Option<Version>,
    ) -> Result<bool> {
        Ok(false)
    }

    async fn after_insert(
        &self,
        _tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        version: Option<Version>,
    ) -> Result<bool> {
        self.base.write(key, value, version).await?;
        Ok(true)
    }

    async fn update(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        _value: CacheValue,
        _current_version: Option<Version>,
        _previous_version: Option<Version>,
    ) -> Result<bool> {
        debug!(
            "Region '{}': tx {} updates {}, evicting",
            self.base.region().name(),
            tx.id,
            key
        );
        self.base.region().evict(key).await?;
        Ok(false)
    }

    async fn after_update(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        _value: CacheValue,
        _current_version: Option<Version>,
        _previous_version: Option<Version>,
        lock: Option<SoftLock>,
    ) -> Result<bool> {
        self.unlock_item(tx, key, lock).await?;
        Ok(false)
    }
}
