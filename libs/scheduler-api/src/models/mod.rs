//! Scheduler API models

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Status code the scheduler uses for rejected arguments
pub const CODE_INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";

/// Image build scheduling request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleImageBuildRequest {
    pub workload_id: String,
    pub git_repo_url: String,
}

/// Image build scheduling response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleImageBuildResponse {
    pub job_name: String,
    pub image_name: String,
}

/// Workload scheduling request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWorkloadRequest {
    #[serde(default)]
    pub envs: HashMap<String, String>,
    pub workload_id: String,
}

/// Workload scheduling response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWorkloadResponse {
    pub job_name: String,
    #[serde(default)]
    pub url: String,
}

/// Job removal request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnScheduleJobRequest {
    pub job_id: String,
}

/// Job removal response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnScheduleJobResponse {}

/// Error body returned by the scheduler on any non-2xx answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStatus {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl RemoteStatus {
    pub fn is_invalid_argument(&self) -> bool {
        self.code.eq_ignore_ascii_case(CODE_INVALID_ARGUMENT)
    }
}
