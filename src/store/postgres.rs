use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, Executor, PgPool, Row};
use std::collections::BTreeMap;

use crate::model::{AssetDoc, PublishedIds};
use crate::store::traits::{AssetStore, PublishedIdStore, Store};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
    id TEXT PRIMARY KEY,
    project_name TEXT NOT NULL,
    name TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS assets_project_idx ON assets (project_name);
CREATE TABLE IF NOT EXISTS published_versions (
    project_name TEXT NOT NULL,
    asset_id TEXT NOT NULL,
    subset TEXT NOT NULL,
    version INTEGER NOT NULL,
    representations TEXT[] NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (project_name, asset_id, subset, version)
);
CREATE TABLE IF NOT EXISTS published_node_ids (
    project_name TEXT NOT NULL,
    asset_id TEXT NOT NULL,
    subset TEXT NOT NULL,
    version INTEGER NOT NULL,
    node_path TEXT NOT NULL,
    cb_id TEXT NOT NULL,
    PRIMARY KEY (project_name, asset_id, subset, version, node_path)
);
"#;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create the tables this store reads from, if missing
    pub async fn migrate(&self) -> Result<()> {
        self.pool
            .execute(SCHEMA)
            .await
            .context("Failed to create schema")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn asset_from_row(row: &sqlx::postgres::PgRow) -> AssetDoc {
    AssetDoc {
        id: row.get("id"),
        name: row.get("name"),
    }
}

#[async_trait::async_trait]
impl AssetStore for PostgresStore {
    async fn get_assets(&self, project_name: &str) -> Result<Vec<AssetDoc>> {
        let rows = sqlx::query("SELECT id, name FROM assets WHERE project_name = $1 ORDER BY name")
            .bind(project_name)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch assets")?;

        Ok(rows.iter().map(asset_from_row).collect())
    }

    async fn get_asset_by_name(&self, project_name: &str, name: &str) -> Result<Option<AssetDoc>> {
        let row = sqlx::query("SELECT id, name FROM assets WHERE project_name = $1 AND name = $2")
            .bind(project_name)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch asset by name")?;

        Ok(row.as_ref().map(asset_from_row))
    }

    async fn upsert_asset(&self, project_name: &str, asset: AssetDoc) -> Result<()> {
        sqlx::query(
            "INSERT INTO assets (id, project_name, name) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET project_name = EXCLUDED.project_name, name = EXCLUDED.name",
        )
        .bind(&asset.id)
        .bind(project_name)
        .bind(&asset.name)
        .execute(&self.pool)
        .await
        .context("Failed to upsert asset")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PublishedIdStore for PostgresStore {
    async fn latest_published_ids(
        &self,
        project_name: &str,
        asset_id: &str,
        subset: &str,
    ) -> Result<Option<PublishedIds>> {
        let version_row = sqlx::query(
            "SELECT version, representations FROM published_versions
             WHERE project_name = $1 AND asset_id = $2 AND subset = $3
             ORDER BY version DESC LIMIT 1",
        )
        .bind(project_name)
        .bind(asset_id)
        .bind(subset)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest version")?;

        let Some(version_row) = version_row else {
            return Ok(None);
        };
        let version: i32 = version_row.get("version");

        let rows = sqlx::query(
            "SELECT node_path, cb_id FROM published_node_ids
             WHERE project_name = $1 AND asset_id = $2 AND subset = $3 AND version = $4",
        )
        .bind(project_name)
        .bind(asset_id)
        .bind(subset)
        .bind(version)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch published node ids")?;

        Ok(Some(PublishedIds {
            asset_id: asset_id.to_string(),
            subset: subset.to_string(),
            version,
            ids_by_path: rows
                .iter()
                .map(|row| (row.get("node_path"), row.get("cb_id")))
                .collect(),
            representations: version_row.get("representations"),
        }))
    }

    async fn record_published_ids(
        &self,
        project_name: &str,
        asset_id: &str,
        subset: &str,
        ids_by_path: BTreeMap<String, String>,
        representations: Vec<String>,
    ) -> Result<PublishedIds> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        let row = sqlx::query(
            "INSERT INTO published_versions (project_name, asset_id, subset, version, representations)
             SELECT $1, $2, $3, COALESCE(MAX(version), 0) + 1, $4 FROM published_versions
             WHERE project_name = $1 AND asset_id = $2 AND subset = $3
             RETURNING version",
        )
        .bind(project_name)
        .bind(asset_id)
        .bind(subset)
        .bind(&representations)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert published version")?;
        let version: i32 = row.get("version");

        for (node_path, cb_id) in &ids_by_path {
            sqlx::query(
                "INSERT INTO published_node_ids (project_name, asset_id, subset, version, node_path, cb_id)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(project_name)
            .bind(asset_id)
            .bind(subset)
            .bind(version)
            .bind(node_path)
            .bind(cb_id)
            .execute(&mut *tx)
            .await
            .context("Failed to insert published node id")?;
        }

        tx.commit().await.context("Failed to commit published ids")?;

        Ok(PublishedIds {
            asset_id: asset_id.to_string(),
            subset: subset.to_string(),
            version,
            ids_by_path,
            representations,
        })
    }
}

impl Store for PostgresStore {}
