use super::{AccessBase, EntityRegionAccess};
use crate::domain::{AccessType, CacheKey, CacheValue, SoftLock, TxContext, Version};
use crate::region::Region;
use async_trait::async_trait;
use shared::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Strategy for entities that never change after creation.
///
/// A key is either absent or cached. Nothing is ever locked; the only write
/// paths are loads and the commit of the creating transaction.
#[derive(Debug, Clone)]
pub struct ReadOnlyAccess {
    base: AccessBase,
}

impl ReadOnlyAccess {
    pub fn new(region: Arc<Region>) -> Self {
        Self {
            base: AccessBase::new(region),
        }
    }

    fn unsupported(&self, key: &CacheKey) -> Error {
        warn!(
            "Region '{}': attempted to update read-only entity {}",
            self.base.region().name(),
            key
        );
        Error::UnsupportedOperation(format!("can't write to a read-only object: {}", key))
    }
}

#[async_trait]
impl EntityRegionAccess for ReadOnlyAccess {
    fn access_type(&self) -> AccessType {
        AccessType::ReadOnly
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

    /// Evicts whether or not anything was written in between
    async fn unlock_item(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        _lock: Option<SoftLock>,
    ) -> Result<()> {
        debug!(
            "Region '{}': unlock of read-only {} by tx {}, evicting",
            self.base.region().name(),
            key,
            tx.id
        );
        self.base.region().evict(key).await
    }

    /// Filled after commit, nothing to cache yet
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
        _tx: &TxContext,
        key: &CacheKey,
        _value: CacheValue,
        _current_version: Option<Version>,
        _previous_version: Option<Version>,
    ) -> Result<bool> {
        Err(self.unsupported(key))
    }

    async fn after_update(
        &self,
        _tx: &TxContext,
        key: &CacheKey,
        _value: CacheValue,
        _current_version: Option<Version>,
        _previous_version: Option<Version>,
        _lock: Option<SoftLock>,
    ) -> Result<bool> {
        Err(self.unsupported(key))
    }
}
