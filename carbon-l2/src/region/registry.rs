use super::Region;
use crate::domain::{AccessType, TxContext};
use crate::ports::{KvClient, VersionComparator};
use crate::strategy::{EntityRegionAccess, build_access_strategy};
use crate::timestamp::Timestamper;
use shared::Result;
use shared::config::Config;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Builds regions and binds access strategies to them.
/// Created once at startup; one region instance per name.
pub struct RegionFactory {
    client: Arc<dyn KvClient>,
    config: Config,
    timestamper: Arc<Timestamper>,
    // Maps region name -> region
    regions: RwLock<HashMap<String, Arc<Region>>>,
}

impl Debug for RegionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionFactory")
            .field("config", &self.config)
            .field("regions", &"<RwLock<HashMap>>")
            .finish()
    }
}

impl RegionFactory {
    pub fn new(client: Arc<dyn KvClient>, config: Config) -> Self {
        Self {
            client,
            config,
            timestamper: Arc::new(Timestamper::new()),
            regions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn next_timestamp(&self) -> u64 {
        self.timestamper.next()
    }

    pub fn begin_transaction(&self) -> TxContext {
        TxContext::new(self.next_timestamp())
    }

    /// Return the region registered under `name`, creating it on first use
    pub async fn build_region(&self, name: &str) -> Arc<Region> {
        if let Some(region) = self.regions.read().await.get(name) {
            return region.clone();
        }

        let mut regions = self.regions.write().await;
        regions
            .entry(name.to_string())
            .or_insert_with(|| {
                info!("Creating cache region '{}'", name);
                Arc::new(Region::new(
                    name,
                    self.client.clone(),
                    self.config.region.clone(),
                    self.timestamper.clone(),
                ))
            })
            .clone()
    }

    pub async fn build_access(
        &self,
        name: &str,
        access_type: AccessType,
        comparator: Option<Arc<dyn VersionComparator>>,
    ) -> Arc<dyn EntityRegionAccess> {
        let region = self.build_region(name).await;
        build_access_strategy(access_type, region, comparator)
    }

    /// Bind the access type named by `CARBON_L2_DEFAULT_ACCESS_TYPE`
    pub async fn build_default_access(
        &self,
        name: &str,
        comparator: Option<Arc<dyn VersionComparator>>,
    ) -> Result<Arc<dyn EntityRegionAccess>> {
        let access_type: AccessType = self.config.default_access_type.parse()?;
        Ok(self.build_access(name, access_type, comparator).await)
    }

    pub async fn region(&self, name: &str) -> Option<Arc<Region>> {
        self.regions.read().await.get(name).cloned()
    }

    pub async fn region_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.regions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Forget a region. Its entries stay in the store until evicted there.
    pub async fn drop_region(&self, name: &str) -> bool {
        let dropped = self.regions.write().await.remove(name).is_some();
        if dropped {
            info!("Dropped cache region '{}'", name);
        }
        dropped
    }
}
