use crate::domain::{CacheValue, SoftLock, TxId, Version};
use crate::ports::VersionComparator;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a region stores under one cache key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegionEntry {
    Item(Item),
    Lock(LockEntry),
}

impl RegionEntry {
    /// Whether a transaction started at `tx_timestamp` may see this entry's value
    pub fn is_readable(&self, tx_timestamp: u64) -> bool {
        match self {
            RegionEntry::Item(item) => item.is_readable(tx_timestamp),
            RegionEntry::Lock(_) => false,
        }
    }

    /// Whether a load at `tx_timestamp` carrying `version` may replace this entry
    pub fn is_writeable(
        &self,
        tx_timestamp: u64,
        version: Option<&Version>,
        comparator: Option<&dyn VersionComparator>,
    ) -> bool {
        match self {
            RegionEntry::Item(item) => item.is_writeable(version, comparator),
            RegionEntry::Lock(lock) => lock.is_writeable(tx_timestamp, version, comparator),
        }
    }

    pub fn into_value(self) -> Option<CacheValue> {
        match self {
            RegionEntry::Item(item) => Some(item.value),
            RegionEntry::Lock(_) => None,
        }
    }
}

/// A cached value together with the version and the time it was cached
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub value: CacheValue,
    pub version: Option<Version>,
    pub timestamp: u64,
}

impl Item {
    pub fn new(value: CacheValue, version: Option<Version>, timestamp: u64) -> Self {
        Self {
            value,
            version,
            timestamp,
        }
    }

    fn is_readable(&self, tx_timestamp: u64) -> bool {
        tx_timestamp > self.timestamp
    }

    // unversioned items are never replaced by a load
    fn is_writeable(
        &self,
        version: Option<&Version>,
        comparator: Option<&dyn VersionComparator>,
    ) -> bool {
        match (&self.version, version, comparator) {
            (Some(existing), Some(candidate), Some(cmp)) => cmp.is_older(existing, candidate),
            _ => false,
        }
    }
}

/// A soft lock stored in place of an item while transactions write the key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockEntry {
    pub source: Uuid,
    pub lock_id: u64,
    pub owner: TxId,
    pub timeout: u64,
    pub version: Option<Version>,
    pub multiplicity: u32,
    pub concurrent: bool,
    pub unlock_timestamp: u64,
}

impl LockEntry {
    pub fn new(
        source: Uuid,
        lock_id: u64,
        owner: TxId,
        timeout: u64,
        version: Option<Version>,
    ) -> Self {
        Self {
            source,
            lock_id,
            owner,
            timeout,
            version,
            multiplicity: 1,
            concurrent: false,
            unlock_timestamp: 0,
        }
    }

    pub fn matches(&self, lock: &SoftLock) -> bool {
        self.source == lock.source && self.lock_id == lock.lock_id
    }

    pub fn is_held(&self) -> bool {
        self.multiplicity > 0
    }

    /// Another transaction takes the same lock
    pub fn relock(&mut self, timeout: u64) {
        self.concurrent = true;
        self.multiplicity += 1;
        self.timeout = timeout;
    }

    pub fn unlock(&mut self, timestamp: u64) {
        self.multiplicity = self.multiplicity.saturating_sub(1);
        if self.multiplicity == 0 {
            self.unlock_timestamp = timestamp;
        }
    }

    pub fn to_soft_lock(&self) -> SoftLock {
        SoftLock {
            source: self.source,
            lock_id: self.lock_id,
            owner: self.owner,
            version: self.version.clone(),
        }
    }

    fn is_writeable(
        &self,
        tx_timestamp: u64,
        version: Option<&Version>,
        comparator: Option<&dyn VersionComparator>,
    ) -> bool {
        if tx_timestamp > self.timeout {
            // the locking transaction is presumed dead
            return true;
        }
        if self.is_held() {
            return false;
        }
        match (&self.version, version, comparator) {
            (Some(existing), Some(candidate), Some(cmp)) => cmp.is_older(existing, candidate),
            _ => tx_timestamp > self.unlock_timestamp,
        }
    }
}
