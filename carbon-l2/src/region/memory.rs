use crate::ports::KvClient;
use async_trait::async_trait;
use dashmap::DashMap;
use shared::Result;

/// Process-local `KvClient` backed by a concurrent map.
/// Useful for embedding and for exercising strategies without a network store.
#[derive(Debug, Default)]
pub struct MemoryKvClient {
    entries: DashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryKvClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvClient for MemoryKvClient {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_client_put_get_delete() {
        let client = MemoryKvClient::new();
        assert!(client.get(b"k").await.unwrap().is_none());

        client.put(b"k".to_vec(), b"v1".to_vec()).await.unwrap();
        client.put(b"k".to_vec(), b"v2".to_vec()).await.unwrap();
        assert_eq!(client.get(b"k").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(client.len(), 1);

        assert!(client.delete(b"k").await.unwrap());
        assert!(!client.delete(b"k").await.unwrap());
        assert!(client.is_empty());
    }
}
