use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Publish runs over a scene snapshot
        .route("/publish", post(handlers::publish_scene::<S>))
        .route("/publish/validate", post(handlers::validate_scene::<S>))
        .route("/publish/repair", post(handlers::repair_scene::<S>))
        // Identity helpers
        .route("/ids/generate", post(handlers::generate_ids::<S>))
        .route("/projects/:project/assets", get(handlers::list_assets::<S>))
}
