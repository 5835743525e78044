use super::{AccessBase, EntityRegionAccess};
use crate::domain::{AccessType, CacheKey, CacheValue, SoftLock, TxContext, Version};
use crate::ports::VersionComparator;
use crate::region::{LockEntry, Region, RegionEntry};
use async_trait::async_trait;
use shared::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

/// Strategy with soft locks kept in the region's own key space.
///
/// While any transaction writes a key, a `LockEntry` replaces the cached item,
/// so readers miss and go to the database. Locks are re-entrant across
/// transactions and carry a timeout after which a crashed writer's lock no
/// longer blocks loads. Every read-modify-write of one key runs under the
/// region's per-key mutex.
pub struct ReadWriteAccess {
    base: AccessBase,
    source: Uuid,
    next_lock_id: AtomicU64,
    comparator: Option<Arc<dyn VersionComparator>>,
}

impl ReadWriteAccess {
    pub fn new(region: Arc<Region>, comparator: Option<Arc<dyn VersionComparator>>) -> Self {
        Self {
            base: AccessBase::new(region),
            source: Uuid::new_v4(),
            next_lock_id: AtomicU64::new(0),
            comparator,
        }
    }

    fn comparator(&self) -> Option<&dyn VersionComparator> {
        self.comparator.as_deref()
    }

    fn next_lock_id(&self) -> u64 {
        self.next_lock_id.fetch_add(1, Ordering::Relaxed)
    }

    fn matching_lock(entry: Option<RegionEntry>, lock: Option<&SoftLock>) -> Option<LockEntry> {
        match (entry, lock) {
            (Some(RegionEntry::Lock(stored)), Some(lock)) if stored.matches(lock) => Some(stored),
            _ => None,
        }
    }

    /// A committed update lost the race when its version does not move forward
    fn is_stale(&self, current: Option<&Version>, previous: Option<&Version>) -> bool {
        match (self.comparator(), current, previous) {
            (Some(cmp), Some(current), Some(previous)) => !cmp.is_older(previous, current),
            _ => false,
        }
    }

    async fn release(&self, key: &CacheKey, mut lock: LockEntry) -> Result<()> {
        let region = self.base.region();
        lock.unlock(region.next_timestamp());
        region.put(key, &RegionEntry::Lock(lock)).await
    }

    /// The lock we were given is gone: the store evicted it or it was replaced.
    /// Freeze the key with a released lock that expires one timeout from now.
    async fn handle_lock_expiry(&self, tx: &TxContext, key: &CacheKey) -> Result<()> {
        let region = self.base.region();
        warn!(
            "Region '{}': soft lock on {} held by tx {} expired or was evicted by the store; \
             consider a longer lock timeout",
            region.name(),
            key,
            tx.id
        );
        let timestamp = region.next_timestamp().saturating_add(region.timeout());
        let mut lock = LockEntry::new(self.source, self.next_lock_id(), tx.id, timestamp, None);
        lock.unlock(timestamp);
        region.put(key, &RegionEntry::Lock(lock)).await
    }
}

impl std::fmt::Debug for ReadWriteAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadWriteAccess")
            .field("region", self.base.region())
            .field("source", &self.source)
            .field("versioned", &self.comparator.is_some())
            .finish()
    }
}

#[async_trait]
impl EntityRegionAccess for ReadWriteAccess {
    fn access_type(&self) -> AccessType {
        AccessType::ReadWrite
    }

    fn region(&self) -> &Arc<Region> {
        self.base.region()
    }

    async fn get(
        &self,
        _tx: &TxContext,
        key: &CacheKey,
        tx_timestamp: u64,
    ) -> Result<Option<CacheValue>> {
        match self.base.region().get(key).await? {
            Some(entry) if entry.is_readable(tx_timestamp) => Ok(entry.into_value()),
            Some(_) => {
                debug!(
                    "Region '{}': {} is locked or newer than the reader, treating as a miss",
                    self.base.region().name(),
                    key
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put_from_load(
        &self,
        _tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        tx_timestamp: u64,
        version: Option<Version>,
        _minimal_put_override: bool,
    ) -> Result<bool> {
        let region = self.base.region();
        let _guard = region.lock_key(key).await;

        let writeable = match region.get(key).await? {
            None => true,
            Some(entry) => entry.is_writeable(tx_timestamp, version.as_ref(), self.comparator()),
        };
        if !writeable {
            debug!("Region '{}': load of {} not cached, entry is newer or locked", region.name(), key);
            return Ok(false);
        }
        self.base.write(key, value, version).await?;
        Ok(true)
    }

    async fn lock_item(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        version: Option<Version>,
    ) -> Result<Option<SoftLock>> {
        let region = self.base.region();
        let _guard = region.lock_key(key).await;

        let timeout = region.next_timestamp().saturating_add(region.timeout());
        let lock = match region.get(key).await? {
            Some(RegionEntry::Lock(mut lock)) => {
                lock.relock(timeout);
                lock
            }
            Some(RegionEntry::Item(item)) => {
                LockEntry::new(self.source, self.next_lock_id(), tx.id, timeout, item.version)
            }
            None => LockEntry::new(self.source, self.next_lock_id(), tx.id, timeout, version),
        };
        region.put(key, &RegionEntry::Lock(lock.clone())).await?;
        debug!(
            "Region '{}': tx {} locked {} (holders: {})",
            region.name(),
            tx.id,
            key,
            lock.multiplicity
        );
        Ok(Some(lock.to_soft_lock()))
    }

    async fn unlock_item(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        lock: Option<SoftLock>,
    ) -> Result<()> {
        let region = self.base.region();
        let _guard = region.lock_key(key).await;

        match Self::matching_lock(region.get(key).await?, lock.as_ref()) {
            Some(stored) => self.release(key, stored).await,
            None => self.handle_lock_expiry(tx, key).await,
        }
    }

    /// Nothing is cached before commit
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
        let region = self.base.region();
        let _guard = region.lock_key(key).await;

        if region.contains(key).await? {
            return Ok(false);
        }
        self.base.write(key, value, version).await?;
        Ok(true)
    }

    /// Nothing is cached before commit
    async fn update(
        &self,
        _tx: &TxContext,
        _key: &CacheKey,
        _value: CacheValue,
        _current_version: Option<Version>,
        _previous_version: Option<Version>,
    ) -> Result<bool> {
        Ok(false)
    }

    async fn after_update(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        current_version: Option<Version>,
        previous_version: Option<Version>,
        lock: Option<SoftLock>,
    ) -> Result<bool> {
        let region = self.base.region();
        let _guard = region.lock_key(key).await;

        let Some(stored) = Self::matching_lock(region.get(key).await?, lock.as_ref()) else {
            self.handle_lock_expiry(tx, key).await?;
            return Ok(false);
        };

        if stored.concurrent {
            debug!(
                "Region '{}': {} was written concurrently, leaving it to the database",
                region.name(),
                key
            );
            self.release(key, stored).await?;
            return Ok(false);
        }
        if self.is_stale(current_version.as_ref(), previous_version.as_ref()) {
            debug!(
                "Region '{}': stale update of {} rejected ({:?} -> {:?})",
                region.name(),
                key,
                previous_version,
                current_version
            );
            self.release(key, stored).await?;
            return Ok(false);
        }

        self.base.write(key, value, current_version).await?;
        Ok(true)
    }

    /// Deletion is covered by the soft lock taken for it; only unlocked entries are dropped
    async fn remove(&self, _tx: &TxContext, key: &CacheKey) -> Result<()> {
        let region = self.base.region();
        let _guard = region.lock_key(key).await;

        match region.get(key).await? {
            Some(RegionEntry::Lock(lock)) if lock.is_held() => Ok(()),
            Some(_) => region.evict(key).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::ports::NaturalVersionOrder;
    use shared::config::RegionSettings;

    fn access() -> ReadWriteAccess {
        ReadWriteAccess::new(region(), None)
    }

    fn versioned() -> ReadWriteAccess {
        ReadWriteAccess::new(region(), Some(Arc::new(NaturalVersionOrder)))
    }

    #[tokio::test]
    async fn test_after_insert_only_fills_empty_slot() {
        let access = access();
        let tx = tx(access.region());
        assert!(access.after_insert(&tx, &key(1), value("v1"), None).await.unwrap());
        assert!(!access.after_insert(&tx, &key(1), value("v2"), None).await.unwrap());

        let reader = access.region().begin_transaction();
        assert_eq!(
            access.get(&reader, &key(1), reader.timestamp).await.unwrap(),
            Some(value("v1"))
        );
    }

    #[tokio::test]
    async fn test_inserting_transaction_does_not_read_its_own_insert() {
        let access = access();
        let tx = tx(access.region());
        assert!(access.after_insert(&tx, &key(1), value("v1"), None).await.unwrap());

        assert!(access.get(&tx, &key(1), tx.timestamp).await.unwrap().is_none());
        let next = access.region().begin_transaction();
        assert_eq!(
            access.get(&next, &key(1), next.timestamp).await.unwrap(),
            Some(value("v1"))
        );
    }

    #[tokio::test]
    async fn test_get_hides_items_cached_after_reader_started() {
        let access = access();
        let reader = access.region().begin_transaction();
        let writer = access.region().begin_transaction();
        access.after_insert(&writer, &key(1), value("v"), None).await.unwrap();

        assert!(access.get(&reader, &key(1), reader.timestamp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_locked_key_is_a_miss_for_other_transactions() {
        let access = access();
        let setup = access.region().begin_transaction();
        access.after_insert(&setup, &key(1), value("v"), None).await.unwrap();

        let t1 = access.region().begin_transaction();
        let t2 = access.region().begin_transaction();
        let lock1 = access.lock_item(&t1, &key(1), None).await.unwrap();
        assert!(lock1.is_some());

        assert!(access.get(&t2, &key(1), t2.timestamp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_two_transactions_lock_and_release() {
        let access = access();
        let setup = access.region().begin_transaction();
        access.after_insert(&setup, &key(1), value("v1"), None).await.unwrap();

        let t1 = access.region().begin_transaction();
        let t2 = access.region().begin_transaction();
        let lock1 = access.lock_item(&t1, &key(1), None).await.unwrap();
        let lock2 = access.lock_item(&t2, &key(1), None).await.unwrap();
        assert_eq!(
            lock1.as_ref().map(|l| (l.source, l.lock_id)),
            lock2.as_ref().map(|l| (l.source, l.lock_id))
        );

        assert!(access.get(&t2, &key(1), t2.timestamp).await.unwrap().is_none());
        access.unlock_item(&t1, &key(1), lock1).await.unwrap();
        assert!(access.get(&t2, &key(1), t2.timestamp).await.unwrap().is_none());

        // still held by t2, so a load must not slip in
        let loader = access.region().begin_transaction();
        assert!(
            !access
                .put_from_load(&loader, &key(1), value("v1"), loader.timestamp, None, false)
                .await
                .unwrap()
        );

        access.unlock_item(&t2, &key(1), lock2).await.unwrap();

        let loader = access.region().begin_transaction();
        assert!(
            access
                .put_from_load(&loader, &key(1), value("v2"), loader.timestamp, None, false)
                .await
                .unwrap()
        );
        let reader = access.region().begin_transaction();
        assert_eq!(
            access.get(&reader, &key(1), reader.timestamp).await.unwrap(),
            Some(value("v2"))
        );
    }

    #[tokio::test]
    async fn test_load_started_before_unlock_is_rejected() {
        let access = access();
        let writer = access.region().begin_transaction();
        let lock = access.lock_item(&writer, &key(1), None).await.unwrap();

        let early_loader = access.region().begin_transaction();
        access.unlock_item(&writer, &key(1), lock).await.unwrap();

        assert!(
            !access
                .put_from_load(&early_loader, &key(1), value("old"), early_loader.timestamp, None, false)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_after_update_writes_new_value() {
        let access = versioned();
        let setup = access.region().begin_transaction();
        access
            .after_insert(&setup, &key(1), value("v1"), Some(Version::Number(1)))
            .await
            .unwrap();

        let tx = access.region().begin_transaction();
        let lock = access
            .lock_item(&tx, &key(1), Some(Version::Number(1)))
            .await
            .unwrap();
        assert!(
            !access
                .update(&tx, &key(1), value("v2"), Some(Version::Number(2)), Some(Version::Number(1)))
                .await
                .unwrap()
        );
        assert!(
            access
                .after_update(
                    &tx,
                    &key(1),
                    value("v2"),
                    Some(Version::Number(2)),
                    Some(Version::Number(1)),
                    lock,
                )
                .await
                .unwrap()
        );

        let reader = access.region().begin_transaction();
        assert_eq!(
            access.get(&reader, &key(1), reader.timestamp).await.unwrap(),
            Some(value("v2"))
        );
    }

    #[tokio::test]
    async fn test_after_update_rejects_stale_version() {
        let access = versioned();
        let tx = access.region().begin_transaction();
        let lock = access
            .lock_item(&tx, &key(1), Some(Version::Number(3)))
            .await
            .unwrap();

        let written = access
            .after_update(
                &tx,
                &key(1),
                value("stale"),
                Some(Version::Number(3)),
                Some(Version::Number(3)),
                lock,
            )
            .await
            .unwrap();
        assert!(!written);

        let reader = access.region().begin_transaction();
        assert!(access.get(&reader, &key(1), reader.timestamp).await.unwrap().is_none());
        match access.region().get(&key(1)).await.unwrap() {
            Some(RegionEntry::Lock(lock)) => assert!(!lock.is_held()),
            other => panic!("expected a released lock, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_after_update_with_concurrent_lock_only_releases() {
        let access = access();
        let t1 = access.region().begin_transaction();
        let t2 = access.region().begin_transaction();
        let lock1 = access.lock_item(&t1, &key(1), None).await.unwrap();
        let lock2 = access.lock_item(&t2, &key(1), None).await.unwrap();

        assert!(
            !access
                .after_update(&t1, &key(1), value("a"), None, None, lock1)
                .await
                .unwrap()
        );
        assert!(
            !access
                .after_update(&t2, &key(1), value("b"), None, None, lock2)
                .await
                .unwrap()
        );

        match access.region().get(&key(1)).await.unwrap() {
            Some(RegionEntry::Lock(lock)) => {
                assert!(!lock.is_held());
                assert!(lock.concurrent);
            }
            other => panic!("expected a released lock, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_after_update_with_foreign_lock_freezes_key() {
        let access = access();
        let tx = access.region().begin_transaction();
        access.lock_item(&tx, &key(1), None).await.unwrap();
        access.region().evict(&key(1)).await.unwrap();

        let forged = SoftLock {
            source: Uuid::new_v4(),
            lock_id: 99,
            owner: tx.id,
            version: None,
        };
        assert!(
            !access
                .after_update(&tx, &key(1), value("v"), None, None, Some(forged))
                .await
                .unwrap()
        );

        let loader = access.region().begin_transaction();
        assert!(
            !access
                .put_from_load(&loader, &key(1), value("v"), loader.timestamp, None, false)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_expired_lock_no_longer_blocks_loads() {
        let region = region_with(RegionSettings {
            lock_timeout_ms: 0,
            ..RegionSettings::default()
        });
        let access = ReadWriteAccess::new(region, None);
        let crashed = access.region().begin_transaction();
        access.lock_item(&crashed, &key(1), None).await.unwrap();

        let loader = access.region().begin_transaction();
        assert!(
            access
                .put_from_load(&loader, &key(1), value("v"), loader.timestamp, None, false)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_huge_lock_timeout_still_excludes_loads() {
        let region = region_with(RegionSettings {
            lock_timeout_ms: u64::MAX,
            ..RegionSettings::default()
        });
        let access = ReadWriteAccess::new(region, None);
        let writer = access.region().begin_transaction();
        let lock = access.lock_item(&writer, &key(1), None).await.unwrap();
        assert!(lock.is_some());

        let loader = access.region().begin_transaction();
        assert!(
            !access
                .put_from_load(&loader, &key(1), value("v"), loader.timestamp, None, false)
                .await
                .unwrap()
        );

        // a lost lock freezes the key with the same saturated timeout
        access.evict(&key(1)).await.unwrap();
        access.unlock_item(&writer, &key(1), lock).await.unwrap();
        let later = access.region().begin_transaction();
        assert!(
            !access
                .put_from_load(&later, &key(1), value("v"), later.timestamp, None, false)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_put_from_load_respects_versions() {
        let access = versioned();
        let tx = access.region().begin_transaction();
        assert!(
            access
                .put_from_load(&tx, &key(1), value("v2"), tx.timestamp, Some(Version::Number(2)), false)
                .await
                .unwrap()
        );
        assert!(
            !access
                .put_from_load(&tx, &key(1), value("v1"), tx.timestamp, Some(Version::Number(1)), false)
                .await
                .unwrap()
        );
        assert!(
            access
                .put_from_load(&tx, &key(1), value("v3"), tx.timestamp, Some(Version::Number(3)), false)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unversioned_item_is_not_replaced_by_load() {
        let access = access();
        let tx = tx(access.region());
        assert!(
            access
                .put_from_load(&tx, &key(1), value("v1"), tx.timestamp, None, false)
                .await
                .unwrap()
        );
        assert!(
            !access
                .put_from_load(&tx, &key(1), value("v2"), tx.timestamp, None, false)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_remove_keeps_held_lock() {
        let access = access();
        let tx = access.region().begin_transaction();
        access.lock_item(&tx, &key(1), None).await.unwrap();
        access.remove(&tx, &key(1)).await.unwrap();
        assert!(matches!(
            access.region().get(&key(1)).await.unwrap(),
            Some(RegionEntry::Lock(_))
        ));

        access.after_insert(&tx, &key(2), value("v"), None).await.unwrap();
        access.remove(&tx, &key(2)).await.unwrap();
        assert!(!access.region().contains(&key(2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_lockers_from_tasks() {
        let access = Arc::new(access());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let access = access.clone();
            handles.push(tokio::spawn(async move {
                let tx = access.region().begin_transaction();
                access.lock_item(&tx, &key(1), None).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        match access.region().get(&key(1)).await.unwrap() {
            Some(RegionEntry::Lock(lock)) => assert_eq!(lock.multiplicity, 8),
            other => panic!("expected a lock, got {:?}", other),
        }
    }
}
