use super::{AccessBase, EntityRegionAccess};
use crate::domain::{AccessType, CacheKey, CacheValue, SoftLock, TxContext, TxId, Version};
use crate::region::Region;
use async_trait::async_trait;
use dashmap::DashMap;
use shared::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a transaction as reported by the external coordinator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    Committed,
    RolledBack,
}

/// Completion callbacks driven by an external two-phase commit coordinator
#[async_trait]
pub trait TransactionSynchronization: Send + Sync {
    async fn before_completion(&self, tx: &TxContext) -> Result<()>;

    async fn after_completion(&self, tx: &TxContext, completion: Completion) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq)]
enum PendingWrite {
    Put {
        key: CacheKey,
        value: CacheValue,
        version: Option<Version>,
    },
    Evict {
        key: CacheKey,
    },
}

impl PendingWrite {
    fn key(&self) -> &CacheKey {
        match self {
            PendingWrite::Put { key, .. } | PendingWrite::Evict { key } => key,
        }
    }
}

/// Strictest strategy: writes made by a transaction are staged and reach the
/// region only when the coordinator reports a commit. A transaction sees its
/// own staged writes; everyone else sees the region.
#[derive(Debug)]
pub struct TransactionalAccess {
    base: AccessBase,
    pending: DashMap<TxId, Vec<PendingWrite>>,
}

impl TransactionalAccess {
    pub fn new(region: Arc<Region>) -> Self {
        Self {
            base: AccessBase::new(region),
            pending: DashMap::new(),
        }
    }

    /// Transactions with staged writes that have not completed yet
    pub fn pending_transactions(&self) -> usize {
        self.pending.len()
    }

    async fn apply(&self, write: &PendingWrite) -> Result<()> {
        match write {
            PendingWrite::Put {
                key,
                value,
                version,
            } => self.base.write(key, value.clone(), version.clone()).await,
            PendingWrite::Evict { key } => self.base.region().evict(key).await,
        }
    }

    fn stage(&self, tx: &TxContext, write: PendingWrite) {
        debug!(
            "Region '{}': tx {} staged a write to {}",
            self.base.region().name(),
            tx.id,
            write.key()
        );
        self.pending.entry(tx.id).or_default().push(write);
    }

    /// Latest staged write of `tx` for `key`, if any
    fn staged(&self, tx: &TxContext, key: &CacheKey) -> Option<PendingWrite> {
        self.pending
            .get(&tx.id)
            .and_then(|writes| writes.iter().rev().find(|w| w.key() == key).cloned())
    }
}

#[async_trait]
impl EntityRegionAccess for TransactionalAccess {
    fn access_type(&self) -> AccessType {
        AccessType::Transactional
    }

    fn region(&self) -> &Arc<Region> {
        self.base.region()
    }

    async fn get(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        _tx_timestamp: u64,
    ) -> Result<Option<CacheValue>> {
        match self.staged(tx, key) {
            Some(PendingWrite::Put { value, .. }) => Ok(Some(value)),
            Some(PendingWrite::Evict { .. }) => Ok(None),
            None => self.base.read(key).await,
        }
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
        _key: &CacheKey,
        _lock: Option<SoftLock>,
    ) -> Result<()> {
        Ok(())
    }

    async fn insert(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        version: Option<Version>,
    ) -> Result<bool> {
        self.stage(
            tx,
            PendingWrite::Put {
                key: key.clone(),
                value,
                version,
            },
        );
        Ok(true)
    }

    async fn after_insert(
        &self,
        _tx: &TxContext,
        _key: &CacheKey,
        _value: CacheValue,
        _version: Option<Version>,
    ) -> Result<bool> {
        Ok(false)
    }

    async fn update(
        &self,
        tx: &TxContext,
        key: &CacheKey,
        value: CacheValue,
        current_version: Option<Version>,
        _previous_version: Option<Version>,
    ) -> Result<bool> {
        self.stage(
            tx,
            PendingWrite::Put {
                key: key.clone(),
                value,
                version: current_version,
            },
        );
        Ok(true)
    }

    async fn after_update(
        &self,
        _tx: &TxContext,
        _key: &CacheKey,
        _value: CacheValue,
        _current_version: Option<Version>,
        _previous_version: Option<Version>,
        _lock: Option<SoftLock>,
    ) -> Result<bool> {
        Ok(false)
    }

    async fn remove(&self, tx: &TxContext, key: &CacheKey) -> Result<()> {
        self.stage(tx, PendingWrite::Evict { key: key.clone() });
        Ok(())
    }

    fn synchronization(&self) -> Option<&dyn TransactionSynchronization> {
        Some(self)
    }
}

#[async_trait]
impl TransactionSynchronization for TransactionalAccess {
    async fn before_completion(&self, tx: &TxContext) -> Result<()> {
        let staged = self.pending.get(&tx.id).map_or(0, |writes| writes.len());
        debug!(
            "Region '{}': tx {} preparing with {} staged write(s)",
            self.base.region().name(),
            tx.id,
            staged
        );
        Ok(())
    }

    async fn after_completion(&self, tx: &TxContext, completion: Completion) -> Result<()> {
        let Some((_, writes)) = self.pending.remove(&tx.id) else {
            return Ok(());
        };
        let region = self.base.region();

        if completion == Completion::RolledBack {
            debug!(
                "Region '{}': tx {} rolled back, discarding {} staged write(s)",
                region.name(),
                tx.id,
                writes.len()
            );
            return Ok(());
        }

        debug!(
            "Region '{}': tx {} committed, applying {} staged write(s)",
            region.name(),
            tx.id,
            writes.len()
        );
        let mut first_error = None;
        let mut unapplied = Vec::new();
        for write in writes {
            if let Err(e) = self.apply(&write).await {
                warn!(
                    "Region '{}': tx {} could not apply its staged write to {}: {}",
                    region.name(),
                    tx.id,
                    write.key(),
                    e
                );
                // the committed database state must not be shadowed by the old entry
                if region.evict(write.key()).await.is_err() {
                    unapplied.push(write);
                }
                first_error.get_or_insert(e);
            }
        }
        if !unapplied.is_empty() {
            self.pending.insert(tx.id, unapplied);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
