//! Logging decorators for the repository, scheduler and message ports

use std::collections::HashMap;
use std::fmt::Display;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::{MessageError, RepositoryError, SchedulerError};
use crate::message::{Message, Subscription};
use crate::models::deploy::{BuildStep, Deploy, Status};
use crate::repository::Repository;
use crate::scheduler::{ImageBuildJob, Scheduler, WorkloadJob};

/// Wraps a port implementation and logs every call with its outcome and
/// duration.
pub struct Logged<T> {
    inner: T,
    component: &'static str,
}

impl<T> Logged<T> {
    pub fn new(component: &'static str, inner: T) -> Self {
        Self { inner, component }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn log<V, E: Display>(&self, method: &str, id: &str, started: Instant, result: &Result<V, E>) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(_) => debug!(
                component = self.component,
                method,
                id,
                elapsed_ms,
                "call succeeded"
            ),
            Err(e) => warn!(
                component = self.component,
                method,
                id,
                elapsed_ms,
                error = %e,
                "call failed"
            ),
        }
    }
}

#[async_trait]
impl<T: Repository> Repository for Logged<T> {
    async fn create_deploy(&self, deploy: &Deploy) -> Result<String, RepositoryError> {
        let started = Instant::now();
        let result = self.inner.create_deploy(deploy).await;
        let id = result.as_deref().unwrap_or_default();
        self.log("create_deploy", id, started, &result);
        result
    }

    async fn get_deploy(&self, id: &str) -> Result<Deploy, RepositoryError> {
        let started = Instant::now();
        let result = self.inner.get_deploy(id).await;
        self.log("get_deploy", id, started, &result);
        result
    }

    async fn list_deploy(&self) -> Result<Vec<Deploy>, RepositoryError> {
        let started = Instant::now();
        let result = self.inner.list_deploy().await;
        self.log("list_deploy", "", started, &result);
        result
    }

    async fn update_deploy(&self, deploy: &Deploy) -> Result<(), RepositoryError> {
        let started = Instant::now();
        let result = self.inner.update_deploy(deploy).await;
        self.log("update_deploy", &deploy.id, started, &result);
        result
    }

    async fn delete_deploy(&self, id: &str) -> Result<(), RepositoryError> {
        let started = Instant::now();
        let result = self.inner.delete_deploy(id).await;
        self.log("delete_deploy", id, started, &result);
        result
    }

    async fn init_build(
        &self,
        id: &str,
        job_name: &str,
        job_id: &str,
        image_name: &str,
    ) -> Result<(), RepositoryError> {
        let started = Instant::now();
        let result = self.inner.init_build(id, job_name, job_id, image_name).await;
        self.log("init_build", id, started, &result);
        result
    }

    async fn init_workload(
        &self,
        id: &str,
        job_name: &str,
        job_id: &str,
        envs: &HashMap<String, String>,
        url: &str,
    ) -> Result<(), RepositoryError> {
        let started = Instant::now();
        let result = self
            .inner
            .init_workload(id, job_name, job_id, envs, url)
            .await;
        self.log("init_workload", id, started, &result);
        result
    }

    async fn set_build_status(&self, id: &str, status: Status) -> Result<(), RepositoryError> {
        let started = Instant::now();
        let result = self.inner.set_build_status(id, status).await;
        self.log("set_build_status", id, started, &result);
        result
    }

    async fn record_build_step(&self, id: &str, step: &BuildStep) -> Result<(), RepositoryError> {
        let started = Instant::now();
        let result = self.inner.record_build_step(id, step).await;
        self.log("record_build_step", id, started, &result);
        result
    }
}

#[async_trait]
impl<T: Scheduler> Scheduler for Logged<T> {
    async fn schedule_image_build(
        &self,
        workload_id: &str,
        git_repo_url: &str,
    ) -> Result<ImageBuildJob, SchedulerError> {
        let started = Instant::now();
        let result = self
            .inner
            .schedule_image_build(workload_id, git_repo_url)
            .await;
        self.log("schedule_image_build", workload_id, started, &result);
        result
    }

    async fn schedule_workload(
        &self,
        envs: &HashMap<String, String>,
        workload_id: &str,
    ) -> Result<WorkloadJob, SchedulerError> {
        let started = Instant::now();
        let result = self.inner.schedule_workload(envs, workload_id).await;
        self.log("schedule_workload", workload_id, started, &result);
        result
    }

    async fn unschedule_job(&self, job_id: &str) -> Result<(), SchedulerError> {
        let started = Instant::now();
        let result = self.inner.unschedule_job(job_id).await;
        self.log("unschedule_job", job_id, started, &result);
        result
    }
}

#[async_trait]
impl<T: Message> Message for Logged<T> {
    async fn init(&self) -> Result<(), MessageError> {
        let started = Instant::now();
        let result = self.inner.init().await;
        self.log("init", "", started, &result);
        result
    }

    async fn consume_build_events(&self, deploy_id: &str) -> Result<Subscription, MessageError> {
        let started = Instant::now();
        let result = self.inner.consume_build_events(deploy_id).await;
        self.log("consume_build_events", deploy_id, started, &result);
        result
    }
}
