use anyhow::Result;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::model::{AssetDoc, Id, PublishedIds};
use crate::store::traits::{AssetStore, PublishedIdStore, Store};

type SubsetKey = (String, Id, String);

/// In-memory production database, used when no PostgreSQL connection is
/// configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    assets: RwLock<HashMap<String, Vec<AssetDoc>>>,
    published: RwLock<HashMap<SubsetKey, Vec<PublishedIds>>>,
    asset_queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(project_name: &str, assets: Vec<AssetDoc>) -> Self {
        let store = Self::new();
        store.assets.write().insert(project_name.to_string(), assets);
        store
    }

    /// Number of asset queries served so far.
    pub fn asset_queries(&self) -> usize {
        self.asset_queries.load(Ordering::SeqCst)
    }

    fn count_query(&self) {
        self.asset_queries.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl AssetStore for MemoryStore {
    async fn get_assets(&self, project_name: &str) -> Result<Vec<AssetDoc>> {
        self.count_query();
        Ok(self
            .assets
            .read()
            .get(project_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_asset_by_name(&self, project_name: &str, name: &str) -> Result<Option<AssetDoc>> {
        self.count_query();
        let assets = self.assets.read();
        Ok(assets
            .get(project_name)
            .and_then(|docs| docs.iter().find(|doc| doc.name == name).cloned()))
    }

    async fn upsert_asset(&self, project_name: &str, asset: AssetDoc) -> Result<()> {
        let mut assets = self.assets.write();
        let docs = assets.entry(project_name.to_string()).or_default();
        match docs.iter_mut().find(|doc| doc.id == asset.id) {
            Some(existing) => *existing = asset,
            None => docs.push(asset),
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PublishedIdStore for MemoryStore {
    async fn latest_published_ids(
        &self,
        project_name: &str,
        asset_id: &str,
        subset: &str,
    ) -> Result<Option<PublishedIds>> {
        let key = (project_name.to_string(), asset_id.to_string(), subset.to_string());
        Ok(self
            .published
            .read()
            .get(&key)
            .and_then(|versions| versions.last().cloned()))
    }

    async fn record_published_ids(
        &self,
        project_name: &str,
        asset_id: &str,
        subset: &str,
        ids_by_path: BTreeMap<String, String>,
        representations: Vec<String>,
    ) -> Result<PublishedIds> {
        let key = (project_name.to_string(), asset_id.to_string(), subset.to_string());
        let mut published = self.published.write();
        let versions = published.entry(key).or_default();
        let record = PublishedIds {
            asset_id: asset_id.to_string(),
            subset: subset.to_string(),
            version: versions.last().map(|v| v.version + 1).unwrap_or(1),
            ids_by_path,
            representations,
        };
        versions.push(record.clone());
        Ok(record)
    }
}

impl Store for MemoryStore {}
