//! Deploy persistence port

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::RepositoryError;
use crate::models::deploy::{BuildStep, Deploy, Status};

pub mod document;
pub mod memory;

pub use memory::MemoryRepository;

/// Durable storage for `Deploy` aggregates.
///
/// Every operation keyed by id fails with `RepositoryError::NotFound` when no
/// document matches. Implementations must be safe for concurrent use.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Store a new deploy and return its assigned id
    async fn create_deploy(&self, deploy: &Deploy) -> Result<String, RepositoryError>;

    async fn get_deploy(&self, id: &str) -> Result<Deploy, RepositoryError>;

    async fn list_deploy(&self) -> Result<Vec<Deploy>, RepositoryError>;

    /// Replace every field but the id
    async fn update_deploy(&self, deploy: &Deploy) -> Result<(), RepositoryError>;

    async fn delete_deploy(&self, id: &str) -> Result<(), RepositoryError>;

    async fn init_build(
        &self,
        id: &str,
        job_name: &str,
        job_id: &str,
        image_name: &str,
    ) -> Result<(), RepositoryError>;

    async fn init_workload(
        &self,
        id: &str,
        job_name: &str,
        job_id: &str,
        envs: &HashMap<String, String>,
        url: &str,
    ) -> Result<(), RepositoryError>;

    async fn set_build_status(&self, id: &str, status: Status) -> Result<(), RepositoryError>;

    /// Append a step; never overwrites earlier ones
    async fn record_build_step(&self, id: &str, step: &BuildStep) -> Result<(), RepositoryError>;
}
