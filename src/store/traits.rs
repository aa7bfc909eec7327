use anyhow::Result;
use std::collections::BTreeMap;

use crate::model::{AssetDoc, PublishedIds};

/// Production database surface for asset entities.
#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    /// All assets of a project
    async fn get_assets(&self, project_name: &str) -> Result<Vec<AssetDoc>>;
    /// Asset with the given name, if the project has one
    async fn get_asset_by_name(&self, project_name: &str, name: &str) -> Result<Option<AssetDoc>>;
    async fn upsert_asset(&self, project_name: &str, asset: AssetDoc) -> Result<()>;
}

/// History of node identities per published subset version.
#[async_trait::async_trait]
pub trait PublishedIdStore: Send + Sync {
    /// Latest recorded version of a subset, if it was ever published
    async fn latest_published_ids(
        &self,
        project_name: &str,
        asset_id: &str,
        subset: &str,
    ) -> Result<Option<PublishedIds>>;
    /// Record a new version and return it with its assigned version number
    async fn record_published_ids(
        &self,
        project_name: &str,
        asset_id: &str,
        subset: &str,
        ids_by_path: BTreeMap<String, String>,
        representations: Vec<String>,
    ) -> Result<PublishedIds>;
}

pub trait Store: AssetStore + PublishedIdStore + Send + Sync {}
