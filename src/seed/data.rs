use anyhow::Result;
use log::info;

use crate::model::AssetDoc;
use crate::store::traits::Store;

pub const DEMO_PROJECT: &str = "demo";

/// Assets of the demo project as `(id, name)`.
const DEMO_ASSETS: &[(&str, &str)] = &[
    ("5f1a0c3e9b1d4a0001a1b2c3", "hero"),
    ("5f1a0c3e9b1d4a0001a1b2c4", "sidekick"),
    ("5f1a0c3e9b1d4a0001a1b2c5", "propSword"),
    ("5f1a0c3e9b1d4a0001a1b2c6", "sh010"),
    ("5f1a0c3e9b1d4a0001a1b2c7", "sh020"),
];

pub fn demo_assets() -> Vec<AssetDoc> {
    DEMO_ASSETS
        .iter()
        .map(|(id, name)| AssetDoc::new(id, name))
        .collect()
}

pub async fn load_seed_data<S: Store + ?Sized>(store: &S) -> Result<()> {
    for asset in demo_assets() {
        store.upsert_asset(DEMO_PROJECT, asset).await?;
    }
    info!(
        "Seeded project '{}' with {} assets",
        DEMO_PROJECT,
        DEMO_ASSETS.len()
    );
    Ok(())
}
