//! HTTP scheduler client

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scheduler_api::models::{
    RemoteStatus, ScheduleImageBuildRequest, ScheduleImageBuildResponse, ScheduleWorkloadRequest,
    ScheduleWorkloadResponse, UnScheduleJobRequest, UnScheduleJobResponse,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::{ManagerError, SchedulerError};
use crate::scheduler::{ImageBuildJob, Scheduler, WorkloadJob};
use crate::utils::user_agent;

/// Scheduler reached over JSON request/response
pub struct HttpScheduler {
    client: Client,
    base_url: String,
}

impl HttpScheduler {
    /// Create a new scheduler client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ManagerError> {
        url::Url::parse(base_url).map_err(|e| {
            ManagerError::ConfigError(format!("invalid scheduler url {base_url}: {e}"))
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .map_err(|e| ManagerError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SchedulerError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Scheduler POST {} failed: {} - {}", path, status, body);
            return Err(classify(status, &body));
        }

        response.json().await.map_err(|e| SchedulerError::Remote {
            code: "INTERNAL".to_string(),
            message: format!("undecodable scheduler response: {e}"),
        })
    }
}

#[async_trait]
impl Scheduler for HttpScheduler {
    async fn schedule_image_build(
        &self,
        workload_id: &str,
        git_repo_url: &str,
    ) -> Result<ImageBuildJob, SchedulerError> {
        let request = ScheduleImageBuildRequest {
            workload_id: workload_id.to_string(),
            git_repo_url: git_repo_url.to_string(),
        };
        let response: ScheduleImageBuildResponse =
            self.post("/v1/image-builds", &request).await?;

        Ok(ImageBuildJob {
            job_name: response.job_name,
            image_name: response.image_name,
        })
    }

    async fn schedule_workload(
        &self,
        envs: &HashMap<String, String>,
        workload_id: &str,
    ) -> Result<WorkloadJob, SchedulerError> {
        let request = ScheduleWorkloadRequest {
            envs: envs.clone(),
            workload_id: workload_id.to_string(),
        };
        let response: ScheduleWorkloadResponse = self.post("/v1/workloads", &request).await?;

        Ok(WorkloadJob {
            job_name: response.job_name,
            url: response.url,
        })
    }

    async fn unschedule_job(&self, job_id: &str) -> Result<(), SchedulerError> {
        let request = UnScheduleJobRequest {
            job_id: job_id.to_string(),
        };
        let _: UnScheduleJobResponse = self.post("/v1/jobs/unschedule", &request).await?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> SchedulerError {
    SchedulerError::Remote {
        code: "UNAVAILABLE".to_string(),
        message: err.to_string(),
    }
}

/// Map a non-2xx answer onto the scheduler error taxonomy
pub(crate) fn classify(status: StatusCode, body: &str) -> SchedulerError {
    let remote = serde_json::from_str::<RemoteStatus>(body).ok();

    let message = remote
        .as_ref()
        .map(|r| r.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    let invalid_argument = status == StatusCode::BAD_REQUEST
        || remote.as_ref().is_some_and(RemoteStatus::is_invalid_argument);
    if invalid_argument {
        return SchedulerError::InvalidArgument(message);
    }

    let code = remote
        .map(|r| r.code)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| code_name(status));

    SchedulerError::Remote { code, message }
}

fn code_name(status: StatusCode) -> String {
    match status {
        StatusCode::NOT_FOUND => "NOT_FOUND".to_string(),
        StatusCode::CONFLICT => "ALREADY_EXISTS".to_string(),
        StatusCode::UNAUTHORIZED => "UNAUTHENTICATED".to_string(),
        StatusCode::FORBIDDEN => "PERMISSION_DENIED".to_string(),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => "UNAVAILABLE".to_string(),
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => {
            "DEADLINE_EXCEEDED".to_string()
        }
        StatusCode::INTERNAL_SERVER_ERROR => "INTERNAL".to_string(),
        other => other.as_u16().to_string(),
    }
}
