use async_trait::async_trait;
use carbon_l2::ports::KvClient;
use shared::config::StoreSettings;
use shared::{Error, Result};
use std::path::Path;

/// Sled-backed store that survives restarts of a single node
pub struct SledKvClient {
    db: sled::Db,
}

impl SledKvClient {
    /// Open (or create) the database at `path`, creating the parent directory if needed
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::StoreUnavailable(format!("Failed to create directory: {}", e)))?;
        }

        let db = sled::open(path)
            .map_err(|e| Error::StoreUnavailable(format!("Failed to open Sled database: {}", e)))?;

        Ok(Self { db })
    }

    pub fn from_settings(settings: &StoreSettings) -> Result<Self> {
        Self::new(Path::new(&settings.data_dir).join("carbon-l2.sled"))
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::StoreUnavailable(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl KvClient for SledKvClient {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .db
            .get(key)
            .map_err(|e| Error::StoreUnavailable(format!("Failed to get key: {}", e)))?;
        Ok(value.map(|bytes| bytes.to_vec()))
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.db
            .insert(key, value)
            .map_err(|e| Error::StoreUnavailable(format!("Failed to put key: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool> {
        let removed = self
            .db
            .remove(key)
            .map_err(|e| Error::StoreUnavailable(format!("Failed to delete key: {}", e)))?
            .is_some();
        Ok(removed)
    }
}

impl std::fmt::Debug for SledKvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledKvClient")
            .field("entries", &self.db.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sled_store_put_get_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledKvClient::new(temp_dir.path().join("test.sled")).unwrap();

        assert!(store.get(b"k").await.unwrap().is_none());
        store.put(b"k".to_vec(), b"v".to_vec()).await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.delete(b"k").await.unwrap());
        assert!(!store.delete(b"k").await.unwrap());
    }

    #[tokio::test]
    async fn test_sled_store_from_settings_creates_data_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let data_dir = temp_dir.path().join("nested");
        let settings = StoreSettings {
            data_dir: data_dir.to_string_lossy().to_string(),
            ..StoreSettings::default()
        };

        let store = SledKvClient::from_settings(&settings).unwrap();
        store.put(b"k".to_vec(), b"v".to_vec()).await.unwrap();
        store.flush().unwrap();
        assert!(data_dir.join("carbon-l2.sled").exists());
    }
}
