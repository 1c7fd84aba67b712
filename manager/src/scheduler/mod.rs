//! Cluster scheduler port

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::SchedulerError;

pub mod http;

pub use http::HttpScheduler;

/// An accepted image build job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuildJob {
    pub job_name: String,
    pub image_name: String,
}

/// An accepted workload job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadJob {
    pub job_name: String,
    pub url: String,
}

/// Submits jobs to the external cluster scheduler.
///
/// Errors are split into `SchedulerError::InvalidArgument` (the caller sent
/// something the scheduler refuses) and `SchedulerError::Remote` (everything
/// else, transport failures included).
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule_image_build(
        &self,
        workload_id: &str,
        git_repo_url: &str,
    ) -> Result<ImageBuildJob, SchedulerError>;

    async fn schedule_workload(
        &self,
        envs: &HashMap<String, String>,
        workload_id: &str,
    ) -> Result<WorkloadJob, SchedulerError>;

    async fn unschedule_job(&self, job_id: &str) -> Result<(), SchedulerError>;
}
