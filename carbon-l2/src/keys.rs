use crate::domain::{CacheKey, Identifier};
use shared::Result;

/// Maps (identifier, entity type, tenant) to a cache key and back.
/// Implementations must be pure and injective over the triple.
pub trait CacheKeyCodec: Send + Sync + 'static {
    fn generate_cache_key(
        &self,
        id: Identifier,
        entity_type: &str,
        tenant: Option<&str>,
    ) -> CacheKey;

    fn get_cache_key_id(&self, key: &CacheKey) -> Identifier;

    /// Deterministic textual form used inside store keys
    fn encode(&self, key: &CacheKey) -> Result<String>;

    fn decode(&self, encoded: &str) -> Result<CacheKey>;
}

/// JSON based codec. Field order is fixed by the struct, so equal keys
/// always encode to the same string and distinct keys never collide.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultKeyCodec;

impl CacheKeyCodec for DefaultKeyCodec {
    fn generate_cache_key(
        &self,
        id: Identifier,
        entity_type: &str,
        tenant: Option<&str>,
    ) -> CacheKey {
        CacheKey {
            entity_type: entity_type.to_string(),
            id,
            tenant: tenant.map(str::to_string),
        }
    }

    fn get_cache_key_id(&self, key: &CacheKey) -> Identifier {
        key.id.clone()
    }

    fn encode(&self, key: &CacheKey) -> Result<String> {
        Ok(serde_json::to_string(key)?)
    }

    fn decode(&self, encoded: &str) -> Result<CacheKey> {
        Ok(serde_json::from_str(encoded)?)
    }
}
