//! Error types for the deploy manager

use thiserror::Error;

/// Errors raised by a `Repository` implementation
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid deploy id: {0}")]
    InvalidId(String),

    #[error("corrupt document: {0}")]
    Corrupt(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors raised by a `Scheduler` implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The scheduler rejected the request arguments (caller fault)
    #[error("scheduler: {0}")]
    InvalidArgument(String),

    /// Any other remote or transport failure
    #[error("{code}: {message}")]
    Remote { code: String, message: String },
}

/// Errors raised by a `Message` implementation
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("build events for {0} already have a consumer")]
    AlreadySubscribed(String),

    #[error("release error: {0}")]
    Release(String),
}

/// Main error type for the deploy manager
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("deploy creation: {0}")]
    DeployCreation(#[source] RepositoryError),

    #[error("image build scheduling: {0}")]
    ImageBuildScheduling(#[source] SchedulerError),

    #[error("storing build infos: {0}")]
    StoringBuildInfos(#[source] RepositoryError),

    #[error("build status: {0}")]
    BuildStatus(#[source] RepositoryError),

    #[error("consume events: {0}")]
    ConsumeEvents(#[source] MessageError),

    #[error("message bus init: {0}")]
    MessageInit(#[source] MessageError),

    #[error("recording build step: {0}")]
    RecordBuildStep(#[source] RepositoryError),

    #[error("workload scheduling: {0}")]
    WorkloadScheduling(#[source] SchedulerError),

    #[error("storing workload infos: {0}")]
    StoringWorkloadInfos(#[source] RepositoryError),

    #[error("get deploy: {0}")]
    GetDeploy(#[source] RepositoryError),

    #[error("list deploys: {0}")]
    ListDeploys(#[source] RepositoryError),

    #[error("delete deploy: {0}")]
    DeleteDeploy(#[source] RepositoryError),

    #[error("unschedule job: {0}")]
    UnScheduleJob(#[source] SchedulerError),

    #[error("internal: unrecognized build step for deploy {deploy_id} ({detail})")]
    UnrecognizedStep { deploy_id: String, detail: String },

    #[error("manager is shutting down")]
    ShuttingDown,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ManagerError {
    fn repository_error(&self) -> Option<&RepositoryError> {
        match self {
            ManagerError::DeployCreation(e)
            | ManagerError::StoringBuildInfos(e)
            | ManagerError::BuildStatus(e)
            | ManagerError::RecordBuildStep(e)
            | ManagerError::StoringWorkloadInfos(e)
            | ManagerError::GetDeploy(e)
            | ManagerError::ListDeploys(e)
            | ManagerError::DeleteDeploy(e) => Some(e),
            _ => None,
        }
    }

    fn scheduler_error(&self) -> Option<&SchedulerError> {
        match self {
            ManagerError::ImageBuildScheduling(e)
            | ManagerError::WorkloadScheduling(e)
            | ManagerError::UnScheduleJob(e) => Some(e),
            _ => None,
        }
    }

    /// The targeted deploy document does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self.repository_error(), Some(RepositoryError::NotFound(_)))
    }

    /// The caller supplied something unusable: a malformed id or arguments
    /// the scheduler rejected
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.repository_error(), Some(RepositoryError::InvalidId(_)))
            || matches!(self.scheduler_error(), Some(SchedulerError::InvalidArgument(_)))
    }

    /// A remote scheduler failure that is not the caller's fault
    pub fn is_remote(&self) -> bool {
        matches!(self.scheduler_error(), Some(SchedulerError::Remote { .. }))
    }

    /// The build-event producer sent something that is not a build step
    pub fn is_protocol_fault(&self) -> bool {
        matches!(self, ManagerError::UnrecognizedStep { .. })
    }
}
