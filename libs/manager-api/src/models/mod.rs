//! Manager API models

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Deploy request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub git_repo: String,
    pub name: String,
    #[serde(default)]
    pub envs: Option<HashMap<String, String>>,
}

/// Deploy response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub deploy_id: String,
}

/// A recorded build step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStepView {
    pub step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build phase of a deploy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildView {
    pub job_id: String,
    pub job_name: String,
    pub image_name: String,
    /// One of `pending`, `loading`, `completed`, `error`
    pub status: String,
    pub steps: Vec<BuildStepView>,
}

/// Run phase of a deploy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadView {
    pub job_id: String,
    pub job_name: String,
    pub envs: HashMap<String, String>,
    pub url: String,
}

/// Deploy details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployView {
    pub id: String,
    pub name: String,
    pub git_repo: String,
    pub build: BuildView,
    pub workload: WorkloadView,
}

/// Deploy list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployListResponse {
    pub deploys: Vec<DeployView>,
    pub total: usize,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
