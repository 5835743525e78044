#![deny(clippy::all)]

use crate::domain::Version;
use async_trait::async_trait;
use shared::Result;
use std::cmp::Ordering;

// Ports are the pluggable extension points for the backing store and the
// engine's versioning strategy

/// Port for the key-value network client that reaches the backing store.
/// Failures surface as `Error::StoreUnavailable`.
#[async_trait]
pub trait KvClient: Send + Sync + 'static {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;
    /// Returns whether the key existed
    async fn delete(&self, key: &[u8]) -> Result<bool>;
}

/// Port for the entity's versioning strategy.
/// `None` means the two versions cannot be ordered.
pub trait VersionComparator: Send + Sync + 'static {
    fn compare(&self, a: &Version, b: &Version) -> Option<Ordering>;

    /// True when `existing` is strictly older than `candidate`
    fn is_older(&self, existing: &Version, candidate: &Version) -> bool {
        self.compare(existing, candidate) == Some(Ordering::Less)
    }
}

/// Numeric versions and timestamps each ordered naturally; mixed kinds never order
#[derive(Clone, Copy, Debug, Default)]
pub struct NaturalVersionOrder;

impl VersionComparator for NaturalVersionOrder {
    fn compare(&self, a: &Version, b: &Version) -> Option<Ordering> {
        match (a, b) {
            (Version::Number(a), Version::Number(b)) => Some(a.cmp(b)),
            (Version::Timestamp(a), Version::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}
