use serde::{Deserialize, Serialize};
use shared::Error;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Primary-key value of a cached entity
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identifier {
    Long(i64),
    Text(String),
    Uuid(Uuid),
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Identifier::Long(value)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Identifier::Text(value.to_string())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Identifier::Text(value)
    }
}

impl From<Uuid> for Identifier {
    fn from(value: Uuid) -> Self {
        Identifier::Uuid(value)
    }
}

/// Key of one cached entity: (entity type, identifier, tenant).
/// Two keys are equal iff all three parts are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub entity_type: String,
    pub id: Identifier,
    pub tenant: Option<String>,
}

impl CacheKey {
    pub fn new(
        id: impl Into<Identifier>,
        entity_type: impl Into<String>,
        tenant: Option<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            tenant,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match &self.id {
            Identifier::Long(v) => v.to_string(),
            Identifier::Text(v) => v.clone(),
            Identifier::Uuid(v) => v.to_string(),
        };
        match &self.tenant {
            Some(tenant) => write!(f, "{}#{}@{}", self.entity_type, id, tenant),
            None => write!(f, "{}#{}", self.entity_type, id),
        }
    }
}

/// Entity version as produced by the engine's versioning strategy
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Version {
    Number(i64),
    /// Milliseconds since the Unix epoch
    Timestamp(i64),
}

/// Disassembled entity state, opaque to the strategies
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheValue {
    #[serde(with = "serde_bytes")]
    pub state: Vec<u8>,
    pub version: Option<Version>,
}

impl CacheValue {
    pub fn new(state: impl Into<Vec<u8>>, version: Option<Version>) -> Self {
        Self {
            state: state.into(),
            version,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub Uuid);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The database transaction on whose behalf a strategy call is made
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxContext {
    pub id: TxId,
    /// Start timestamp of the transaction (txTimestamp)
    pub timestamp: u64,
}

impl TxContext {
    pub fn new(timestamp: u64) -> Self {
        Self {
            id: TxId(Uuid::new_v4()),
            timestamp,
        }
    }
}

/// Token handed out by `lock_item` and given back to `unlock_item`/`after_update`.
/// Identifies a stored lock by its source strategy and lock id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftLock {
    pub source: Uuid,
    pub lock_id: u64,
    pub owner: TxId,
    pub version: Option<Version>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessType {
    ReadOnly,
    NonstrictReadWrite,
    ReadWrite,
    Transactional,
}

impl AccessType {
    pub fn external_name(&self) -> &'static str {
        match self {
            AccessType::ReadOnly => "read-only",
            AccessType::NonstrictReadWrite => "nonstrict-read-write",
            AccessType::ReadWrite => "read-write",
            AccessType::Transactional => "transactional",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.external_name())
    }
}

impl FromStr for AccessType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read-only" => Ok(AccessType::ReadOnly),
            "nonstrict-read-write" => Ok(AccessType::NonstrictReadWrite),
            "read-write" => Ok(AccessType::ReadWrite),
            "transactional" => Ok(AccessType::Transactional),
            other => Err(Error::InvalidConfig(format!("unknown access type '{}'", other))),
        }
    }
}
