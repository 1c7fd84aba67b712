//! Build-event state machine

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::errors::ManagerError;
use crate::models::deploy::{BuildStep, Status, Step};
use crate::repository::Repository;
use crate::scheduler::Scheduler;

/// What one build-step notification does to a deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Not a build step at all. Mark the build failed without recording it.
    Reject,
    /// A recognized step reported a failure. Record it and stop.
    Fail,
    /// The image was pushed. Record it, then start the workload.
    Complete,
    /// Intermediate progress. Record it and keep going.
    Advance,
}

impl Transition {
    pub fn of(event: &BuildStep) -> Self {
        match (event.step, event.is_error()) {
            (Step::Unknown, _) => Transition::Reject,
            (_, true) => Transition::Fail,
            (Step::Push, false) => Transition::Complete,
            (Step::Init | Step::Clone | Step::Build, false) => Transition::Advance,
        }
    }

    /// Status the build ends in after this transition, if any
    pub fn terminal_status(self) -> Option<Status> {
        match self {
            Transition::Reject | Transition::Fail => Some(Status::Error),
            Transition::Complete => Some(Status::Completed),
            Transition::Advance => None,
        }
    }
}

/// Apply one build-step notification to the stored deploy.
///
/// Returns `Ok(true)` when the build phase reached its intended end (either
/// status), `Ok(false)` when more events are expected. An `Err` stops the
/// consumer as well; `ManagerError::UnrecognizedStep` marks a producer defect
/// rather than a build failure.
pub async fn handle_event(
    repository: &dyn Repository,
    scheduler: &dyn Scheduler,
    event: &BuildStep,
    deploy_id: &str,
    envs: &HashMap<String, String>,
) -> Result<bool, ManagerError> {
    let transition = Transition::of(event);
    debug!("Deploy {} step {} -> {:?}", deploy_id, event.step, transition);

    match transition {
        Transition::Reject => {
            repository
                .set_build_status(deploy_id, Status::Error)
                .await
                .map_err(ManagerError::BuildStatus)?;

            Err(ManagerError::UnrecognizedStep {
                deploy_id: deploy_id.to_string(),
                detail: if event.error.is_empty() {
                    event.step.to_string()
                } else {
                    event.error.clone()
                },
            })
        }

        Transition::Fail => {
            repository
                .record_build_step(deploy_id, event)
                .await
                .map_err(ManagerError::RecordBuildStep)?;
            repository
                .set_build_status(deploy_id, Status::Error)
                .await
                .map_err(ManagerError::BuildStatus)?;

            warn!(
                "Build of {} failed at {}: {}",
                deploy_id, event.step, event.error
            );
            Ok(true)
        }

        Transition::Complete => {
            repository
                .record_build_step(deploy_id, event)
                .await
                .map_err(ManagerError::RecordBuildStep)?;
            repository
                .set_build_status(deploy_id, Status::Completed)
                .await
                .map_err(ManagerError::BuildStatus)?;

            let workload = match scheduler.schedule_workload(envs, deploy_id).await {
                Ok(workload) => workload,
                Err(e) => {
                    error!("Workload scheduling for {} failed: {}", deploy_id, e);
                    if let Err(status_err) =
                        repository.set_build_status(deploy_id, Status::Error).await
                    {
                        warn!(
                            "Unable to mark build of {} as failed: {}",
                            deploy_id, status_err
                        );
                    }
                    return Err(ManagerError::WorkloadScheduling(e));
                }
            };

            repository
                .init_workload(
                    deploy_id,
                    &workload.job_name,
                    &workload.job_name,
                    envs,
                    &workload.url,
                )
                .await
                .map_err(ManagerError::StoringWorkloadInfos)?;

            info!(
                "Deploy {} built, workload {} at {}",
                deploy_id, workload.job_name, workload.url
            );
            Ok(true)
        }

        Transition::Advance => {
            repository
                .record_build_step(deploy_id, event)
                .await
                .map_err(ManagerError::RecordBuildStep)?;
            Ok(false)
        }
    }
}
