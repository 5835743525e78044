//! Second-level cache access strategies for an ORM, backed by a distributed
//! key-value store reached through the [`ports::KvClient`] port.
//!
//! Build a [`region::RegionFactory`] over a client at startup, then bind one
//! [`strategy::EntityRegionAccess`] per mapped entity:
//!
//! ```ignore
//! let factory = RegionFactory::new(client, Config::load());
//! let people = factory.build_access("people", AccessType::ReadWrite, None).await;
//! let tx = factory.begin_transaction();
//! let key = people.generate_cache_key(Identifier::Long(1), "Person", None);
//! let cached = people.get(&tx, &key, tx.timestamp).await?;
//! ```

pub mod domain;
pub mod keys;
pub mod ports;
pub mod region;
pub mod strategy;
pub mod timestamp;

pub use domain::{
    AccessType, CacheKey, CacheValue, Identifier, SoftLock, TxContext, TxId, Version,
};
pub use keys::{CacheKeyCodec, DefaultKeyCodec};
pub use ports::{KvClient, NaturalVersionOrder, VersionComparator};
pub use region::{MemoryKvClient, Region, RegionFactory};
pub use strategy::{
    Completion, EntityRegionAccess, TransactionSynchronization, build_access_strategy,
};
