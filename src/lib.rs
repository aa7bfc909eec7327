pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::PublishError;

// Export logic types
pub use logic::{
    default_plugins, IdentityRules, IdentityStore, Plugin, PluginInfo, PublishEnv, PublishPipeline,
    RepairSummary, RequiredNodeSelector, Stage,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryScene, MemoryStore, PostgresStore, SceneSnapshot, Store};

use std::sync::Arc;

use crate::api::handlers::ApiState;
use crate::config::AppConfig;

/// Build the store the configuration asks for: PostgreSQL when a database
/// URL is configured, the in-memory store otherwise. The in-memory store
/// always gets the demo data; PostgreSQL only with `LOAD_SEED_DATA=true`.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let load_seed = std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true";

    match config.database_url() {
        Some(database_url) => {
            log::info!("Connecting to PostgreSQL...");
            let max_connections = config.database.max_connections.unwrap_or(10);
            let store = PostgresStore::new(&database_url, max_connections).await?;
            store.migrate().await?;
            if load_seed {
                seed::load_seed_data(&store).await?;
            }
            run_server(store, config).await
        }
        None => {
            log::warn!("No database configured, using in-memory store");
            let store = MemoryStore::new();
            seed::load_seed_data(&store).await?;
            run_server(store, config).await
        }
    }
}

async fn run_server<S: Store + 'static>(store: S, config: AppConfig) -> anyhow::Result<()> {
    use tokio::net::TcpListener;

    let bind_address = config.server_address();
    let app = api::routes::create_router().with_state(Arc::new(ApiState::new(store, config)));

    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("cbId publish server running on http://{}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
