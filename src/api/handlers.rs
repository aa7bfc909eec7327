use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::logic::{IdentityRules, PublishEnv, PublishPipeline, RepairSummary, Stage};
use crate::model::{generate_id, AssetDoc, Context, Id, PublishReport};
use crate::store::{AttributeWrite, MemoryScene, SceneSnapshot, Store};

/// Most ids a single generate request may ask for.
pub const MAX_GENERATED_IDS: usize = 1000;

pub struct ApiState<S> {
    pub store: S,
    pub config: AppConfig,
    pub pipeline: PublishPipeline,
}

impl<S: Store> ApiState<S> {
    pub fn new(store: S, config: AppConfig) -> Self {
        let pipeline = PublishPipeline::from_config(&config);
        Self {
            store,
            config,
            pipeline,
        }
    }

    fn rules(&self) -> IdentityRules {
        IdentityRules::from_config(&self.config.identity)
    }

    fn host<'a>(&'a self, requested: &'a Option<String>) -> &'a str {
        requested.as_deref().unwrap_or(self.config.identity.host.as_str())
    }
}

pub type AppState<S> = Arc<ApiState<S>>;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// A scene to run the publish plugins against.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub project: String,
    pub scene: SceneSnapshot,
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RepairRequest {
    pub project: String,
    pub scene: SceneSnapshot,
    #[serde(default)]
    pub host: Option<String>,
    /// Only run the repair of this plugin; all failed plugins otherwise.
    #[serde(default)]
    pub plugin: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RepairResponse {
    pub report: PublishReport,
    pub summary: RepairSummary,
    pub writes: Vec<AttributeWrite>,
    pub scene: SceneSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct GenerateIdsRequest {
    pub asset_id: Id,
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct GenerateIdsResponse {
    pub asset_id: Id,
    pub ids: Vec<Id>,
}

/// Collect and validate a scene without publishing anything.
pub async fn validate_scene<S: Store>(
    State(state): State<AppState<S>>,
    RequestJson(request): RequestJson<PublishRequest>,
) -> ApiResult<PublishReport> {
    let scene = MemoryScene::from_snapshot(request.scene);
    let env = PublishEnv::new(&scene, &state.store, state.rules(), state.host(&request.host));

    let mut context = Context::new(&request.project);
    let report = state
        .pipeline
        .run_until(&env, &mut context, Stage::Validator)
        .await;
    Ok(Json(report))
}

/// Full publish run: validated instances get their node ids integrated.
pub async fn publish_scene<S: Store>(
    State(state): State<AppState<S>>,
    RequestJson(request): RequestJson<PublishRequest>,
) -> ApiResult<PublishReport> {
    let scene = MemoryScene::from_snapshot(request.scene);
    let env = PublishEnv::new(&scene, &state.store, state.rules(), state.host(&request.host));

    let mut context = Context::new(&request.project);
    let report = state.pipeline.run(&env, &mut context).await;
    if report.success() {
        info!("Published {} instances to '{}'", context.len(), request.project);
    }
    Ok(Json(report))
}

/// Validate, then repair what failed. The caller re-validates the returned
/// scene explicitly.
pub async fn repair_scene<S: Store>(
    State(state): State<AppState<S>>,
    RequestJson(request): RequestJson<RepairRequest>,
) -> ApiResult<RepairResponse> {
    let scene = MemoryScene::from_snapshot(request.scene);
    let env = PublishEnv::new(&scene, &state.store, state.rules(), state.host(&request.host));

    let mut context = Context::new(&request.project);
    let report = state
        .pipeline
        .run_until(&env, &mut context, Stage::Validator)
        .await;
    if let Some(reason) = &report.aborted {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(reason))));
    }

    let summary = state
        .pipeline
        .repair(&env, &mut context, &report, request.plugin.as_deref())
        .await;
    if !summary.is_complete() {
        warn!("{} repairs could not complete", summary.errors.len());
    }

    Ok(Json(RepairResponse {
        report,
        summary,
        writes: scene.writes(),
        scene: scene.snapshot(),
    }))
}

pub async fn generate_ids<S: Store>(
    State(_state): State<AppState<S>>,
    RequestJson(request): RequestJson<GenerateIdsRequest>,
) -> ApiResult<GenerateIdsResponse> {
    if request.asset_id.is_empty() || request.asset_id.contains(':') {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("asset_id must be non-empty and must not contain ':'")),
        ));
    }
    let count = request.count.unwrap_or(1);
    if count == 0 || count > MAX_GENERATED_IDS {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(&format!(
                "count must be between 1 and {}",
                MAX_GENERATED_IDS
            ))),
        ));
    }

    let ids = (0..count).map(|_| generate_id(&request.asset_id)).collect();
    Ok(Json(GenerateIdsResponse {
        asset_id: request.asset_id,
        ids,
    }))
}

pub async fn list_assets<S: Store>(
    State(state): State<AppState<S>>,
    Path(project): Path<String>,
) -> ApiResult<ListResponse<AssetDoc>> {
    match state.store.get_assets(&project).await {
        Ok(assets) => {
            let total = assets.len();
            Ok(Json(ListResponse {
                items: assets,
                total,
            }))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(&e.to_string())),
        )),
    }
}
