//! Access strategies translate the engine's cache lifecycle calls into region
//! operations. Callers hold an `Arc<dyn EntityRegionAccess>` and never the
//! concrete variant.
//!
//! Write lifecycle as seen by a strategy: `lock_item` and `insert`/`update` at
//! flush time, then `after_insert`/`after_update` once the database commit
//! succeeded, or a bare `unlock_item` when it rolled back.

pub mod base;
pub mod nonstrict;
pub mod read_only;
pub mod read_write;
pub mod transactional;

pub use base::AccessBase;
pub use nonstrict::NonstrictReadWriteAccess;
pub use read_only::ReadOnlyAccess;
pub use read_write::ReadWriteAccess;
pub use transactional::{Completion, TransactionSynchronization, TransactionalAccess};

use crate::domain::{AccessType, CacheKey, CacheValue, Identifier, SoftLock, TxContext, Version};
use crate::ports::VersionComparator;
use crate::region::Region;
use async_trait::async_trait;
use shared::Result;
use std::sync::Arc;

#[async_trait]
pub trait EntityRegionAccess: Send + Sync + 'static {
    fn access_type(&self) -> AccessType;

    fn region(&self) -> &Arc<Region>;

    /// Cached value for `key`, or `None` when absent or not safe to serve
    async fn get(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        tx_timestamp: u64,
    ) -> Result<Option<CacheValue>>;

    /// Cache a value just read from the database. Returns whether it was stored.
    async fn put_from_load(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        tx_timestamp: u64,
        version: Option<Version>,
        minimal_put_override: bool,
    ) -> Result<bool>;

    /// `put_from_load` with the region's configured minimal-put setting
    async fn put_from_load_default(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        tx_timestamp: u64,
        version: Option<Version>,
    ) -> Result<bool> {
        let minimal_puts = self.region().settings().minimal_puts;
        self.put_from_load(tx, key, value, tx_timestamp, version, minimal_puts)
            .await
    }

    async fn lock_item(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        version: Option<Version>,
    ) -> Result<Option<SoftLock>>;

    async fn unlock_item(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        lock: Option<SoftLock>,
    ) -> Result<()>;

    /// No strategy takes region-wide locks
    async fn lock_region(&self) -> Result<Option<SoftLock>> {
        Ok(None)
    }

    async fn unlock_region(&self, _lock: Option<SoftLock>) -> Result<()> {
        self.evict_all().await
    }

    /// Called at flush time, before the database commit
    async fn insert(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        version: Option<Version>,
    ) -> Result<bool>;

    /// Called once the inserting transaction committed
    async fn after_insert(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        version: Option<Version>,
    ) -> Result<bool>;

    async fn update(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        current_version: Option<Version>,
        previous_version: Option<Version>,
    ) -> Result<bool>;

    async fn after_update(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        current_version: Option<Version>,
        previous_version: Option<Version>,
        lock: Option<SoftLock>,
    ) -> Result<bool>;

    /// The entity was deleted by `tx`
    async fn remove(&self, _tx: &TxContext, key: &CacheKey) -> Result<()> {
        self.region().evict(key).await
    }

    async fn remove_all(&self) -> Result<()> {
        self.region().evict_all().await
    }

    /// Drop one entry regardless of transactions
    async fn evict(&self, key: &CacheKey) -> Result<()> {
        self.region().evict(key).await
    }

    async fn evict_all(&self) -> Result<()> {
        self.region().evict_all().await
    }

    /// Hook for two-phase completion; only the transactional variant has one
    fn synchronization(&self) -> Option<&dyn TransactionSynchronization> {
        None
    }

    fn generate_cache_key(
        &self,
        id: Identifier,
        entity_type: &str,
        tenant: Option<&str>,
    ) -> CacheKey {
        self.region().codec().generate_cache_key(id, entity_type, tenant)
    }

    fn get_cache_key_id(&self, key: &CacheKey) -> Identifier {
        self.region().codec().get_cache_key_id(key)
    }
}

/// Bind a strategy of the given type to `region`.
/// `comparator` is the entity's versioning strategy; `None` for unversioned entities.
pub fn build_access_strategy(
    access_type: AccessType,
    region: Arc<Region>,
    comparator: Option<Arc<dyn VersionComparator>>,
) -> Arc<dyn EntityRegionAccess> {
    match access_type {
        AccessType::ReadOnly => Arc::new(ReadOnlyAccess::new(region)),
        AccessType::NonstrictReadWrite => Arc::new(NonstrictReadWriteAccess::new(region)),
        AccessType::ReadWrite => Arc::new(ReadWriteAccess::new(region, comparator)),
        AccessType::Transactional => Arc::new(TransactionalAccess::new(region)),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::ports::NaturalVersionOrder;

    #[tokio::test]
    async fn test_factory_builds_each_variant() {
        for access_type in [
            AccessType::ReadOnly,
            AccessType::NonstrictReadWrite,
            AccessType::ReadWrite,
            AccessType::Transactional,
        ] {
            let access =
                build_access_strategy(access_type, region(), Some(Arc::new(NaturalVersionOrder)));
            assert_eq!(access.access_type(), access_type);
            assert_eq!(
                access.synchronization().is_some(),
                access_type == AccessType::Transactional
            );
        }
    }

    #[tokio::test]
    async fn test_never_written_keys_are_absent_for_every_variant() {
        for access_type in [
            AccessType::ReadOnly,
            AccessType::NonstrictReadWrite,
            AccessType::ReadWrite,
            AccessType::Transactional,
        ] {
            let access = build_access_strategy(access_type, region(), None);
            let tx = tx(access.region());
            let result = access.get(&tx, &key(42), tx.timestamp).await.unwrap();
            assert!(result.is_none(), "{} served a value never written", access_type);
        }
    }

    #[tokio::test]
    async fn test_after_insert_then_get_for_non_transactional_variants() {
        for access_type in [
            AccessType::ReadOnly,
            AccessType::NonstrictReadWrite,
            AccessType::ReadWrite,
        ] {
            let access = build_access_strategy(access_type, region(), None);
            let writer = tx(access.region());
            assert!(
                access
                    .after_insert(&writer, &key(1), value("v1"), None)
                    .await
                    .unwrap()
            );

            let reader = tx(access.region());
            let cached = access.get(&reader, &key(1), reader.timestamp).await.unwrap();
            assert_eq!(cached, Some(value("v1")), "{}", access_type);
        }
    }

    #[tokio::test]
    async fn test_key_codec_delegation() {
        let access = build_access_strategy(AccessType::ReadWrite, region(), None);
        let key = access.generate_cache_key(Identifier::Long(5), "Person", Some("acme"));
        assert_eq!(key, CacheKey::new(5i64, "Person", Some("acme".to_string())));
        assert_eq!(access.get_cache_key_id(&key), Identifier::Long(5));
    }

    #[tokio::test]
    async fn test_region_lock_is_never_taken_and_unlock_clears() {
        let access = build_access_strategy(AccessType::NonstrictReadWrite, region(), None);
        let tx = tx(access.region());
        access.after_insert(&tx, &key(1), value("v"), None).await.unwrap();

        let lock = access.lock_region().await.unwrap();
        assert!(lock.is_none());
        access.unlock_region(lock).await.unwrap();
        assert!(!access.region().contains(&key(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_from_load_default_follows_settings() {
        let settings = shared::config::RegionSettings {
            minimal_puts: true,
            ..Default::default()
        };
        let access = build_access_strategy(AccessType::ReadOnly, region_with(settings), None);
        let tx = tx(access.region());
        assert!(
            access
                .put_from_load_default(&tx, &key(1), value("v1"), tx.timestamp, None)
                .await
                .unwrap()
        );
        assert!(
            !access
                .put_from_load_default(&tx, &key(1), value("v2"), tx.timestamp, None)
                .await
                .unwrap()
        );
    }
}
