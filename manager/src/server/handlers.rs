//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use manager_api::models::{
    BuildStepView, BuildView, DeployListResponse, DeployRequest, DeployResponse, DeployView,
    ErrorResponse, HealthResponse, VersionResponse, WorkloadView,
};
use tracing::error;

use crate::errors::ManagerError;
use crate::models::deploy::Deploy;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Error returned by the deploy handlers
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Manager(ManagerError),
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        ApiError::Manager(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Manager(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Manager(e) if e.is_invalid_argument() => StatusCode::BAD_REQUEST,
            ApiError::Manager(e) if e.is_remote() => StatusCode::BAD_GATEWAY,
            ApiError::Manager(ManagerError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Manager(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            ApiError::BadRequest(message) | ApiError::NotFound(message) => message,
            ApiError::Manager(e) => {
                if status.is_server_error() {
                    error!("Request failed: {}", e);
                }
                e.to_string()
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "deploy-manager".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// JSON 404 for paths outside the API
pub async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}

/// Start a deploy
pub async fn create_deploy_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.git_repo.trim().is_empty() {
        return Err(ApiError::BadRequest("git_repo is required".to_string()));
    }
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }

    let deploy_id = state
        .orchestrator
        .deploy(
            &request.git_repo,
            &request.name,
            request.envs.unwrap_or_default(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(DeployResponse { deploy_id })))
}

/// List every deploy
pub async fn list_deploys_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let deploys: Vec<DeployView> = state
        .orchestrator
        .list_deploys()
        .await?
        .into_iter()
        .map(deploy_view)
        .collect();
    let total = deploys.len();

    Ok(Json(DeployListResponse { deploys, total }))
}

/// Get one deploy
pub async fn get_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deploy = state.orchestrator.get_deploy(&id).await?;
    Ok(Json(deploy_view(deploy)))
}

/// Destroy a deploy
pub async fn delete_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.destroy(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn deploy_view(deploy: Deploy) -> DeployView {
    let status = deploy
        .build
        .status
        .map(|s| s.as_str())
        .unwrap_or("pending")
        .to_string();

    DeployView {
        id: deploy.id,
        name: deploy.name,
        git_repo: deploy.git_repo,
        build: BuildView {
            job_id: deploy.build.job_id,
            job_name: deploy.build.job_name,
            image_name: deploy.build.image_name,
            status,
            steps: deploy
                .build
                .steps
                .into_iter()
                .map(|s| BuildStepView {
                    step: s.step.to_string(),
                    error: (!s.error.is_empty()).then_some(s.error),
                })
                .collect(),
        },
        workload: WorkloadView {
            job_id: deploy.workload.job_id,
            job_name: deploy.workload.job_name,
            envs: deploy.workload.envs,
            url: deploy.workload.url,
        },
    }
}
