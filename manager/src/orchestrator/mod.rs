//! Deploy orchestration
//!
//! `deploy` runs the synchronous prefix (create, schedule the image build,
//! store build infos, mark loading, subscribe) and hands the event stream to
//! a background [`BuildWatcher`]. Each watcher is the sole writer of its
//! deploy's build and workload fields until it stops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::errors::ManagerError;
use crate::message::{Message, Subscription};
use crate::models::deploy::{BuildStep, Deploy, Status};
use crate::repository::Repository;
use crate::scheduler::Scheduler;

pub mod fsm;
pub mod watcher;

pub use watcher::{BuildWatcher, WatchOutcome};

/// Build watcher settings
#[derive(Debug, Clone, Default)]
pub struct BuildSettings {
    /// Give up on a build that has not reached a terminal step in time.
    /// The deploy keeps its status; only the subscription is released.
    pub timeout: Option<Duration>,
}

pub struct Orchestrator {
    repository: Arc<dyn Repository>,
    scheduler: Arc<dyn Scheduler>,
    message: Arc<dyn Message>,
    settings: BuildSettings,
    shutdown_tx: broadcast::Sender<()>,
    closing: AtomicBool,
    watchers: Mutex<JoinSet<WatchOutcome>>,
}

impl Orchestrator {
    pub fn new(
        repository: Arc<dyn Repository>,
        scheduler: Arc<dyn Scheduler>,
        message: Arc<dyn Message>,
        settings: BuildSettings,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            repository,
            scheduler,
            message,
            settings,
            shutdown_tx,
            closing: AtomicBool::new(false),
            watchers: Mutex::new(JoinSet::new()),
        }
    }

    /// Start the build+run pipeline of a repository. Returns the new deploy
    /// id once build events are subscribed; the rest happens in background.
    pub async fn deploy(
        &self,
        git_repo: &str,
        name: &str,
        envs: HashMap<String, String>,
    ) -> Result<String, ManagerError> {
        if self.is_closing() {
            return Err(ManagerError::ShuttingDown);
        }

        let deploy = Deploy::new(name, git_repo, envs.clone());
        let deploy_id = self
            .repository
            .create_deploy(&deploy)
            .await
            .map_err(ManagerError::DeployCreation)?;

        let job = self
            .scheduler
            .schedule_image_build(&deploy_id, git_repo)
            .await
            .map_err(ManagerError::ImageBuildScheduling)?;

        self.repository
            .init_build(&deploy_id, &job.job_name, &job.job_name, &job.image_name)
            .await
            .map_err(ManagerError::StoringBuildInfos)?;

        self.repository
            .set_build_status(&deploy_id, Status::Loading)
            .await
            .map_err(ManagerError::BuildStatus)?;

        let subscription = match self.message.consume_build_events(&deploy_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                if let Err(status_err) = self
                    .repository
                    .set_build_status(&deploy_id, Status::Error)
                    .await
                {
                    warn!(
                        "Unable to mark build of {} as failed: {}",
                        deploy_id, status_err
                    );
                }
                return Err(ManagerError::ConsumeEvents(e));
            }
        };

        self.spawn_watcher(&deploy_id, envs, subscription).await?;

        info!(
            "Deploy {} accepted: {} from {} (build job {})",
            deploy_id, name, git_repo, job.job_name
        );
        Ok(deploy_id)
    }

    async fn spawn_watcher(
        &self,
        deploy_id: &str,
        envs: HashMap<String, String>,
        subscription: Subscription,
    ) -> Result<(), ManagerError> {
        let mut watchers = self.watchers.lock().await;
        reap(&mut watchers);

        // checked under the lock so shutdown cannot signal before the
        // watcher has subscribed to it
        if self.is_closing() {
            drop(watchers);
            if let Err(e) = subscription.release.release().await {
                warn!("Failed to release build events of {}: {}", deploy_id, e);
            }
            return Err(ManagerError::ShuttingDown);
        }

        let watcher = BuildWatcher {
            deploy_id: deploy_id.to_string(),
            envs,
            repository: self.repository.clone(),
            scheduler: self.scheduler.clone(),
            subscription,
            shutdown_rx: self.shutdown_tx.subscribe(),
            timeout: self.settings.timeout,
        };
        watchers.spawn(watcher.run());
        Ok(())
    }

    /// Apply one build event to a deploy
    pub async fn handle_event(
        &self,
        event: &BuildStep,
        deploy_id: &str,
        envs: &HashMap<String, String>,
    ) -> Result<bool, ManagerError> {
        fsm::handle_event(
            self.repository.as_ref(),
            self.scheduler.as_ref(),
            event,
            deploy_id,
            envs,
        )
        .await
    }

    /// Remove a deploy and unschedule its workload job. Not idempotent, and
    /// an in-flight build watcher is left to notice the deletion itself.
    pub async fn destroy(&self, deploy_id: &str) -> Result<(), ManagerError> {
        let deploy = self
            .repository
            .get_deploy(deploy_id)
            .await
            .map_err(ManagerError::GetDeploy)?;

        self.repository
            .delete_deploy(deploy_id)
            .await
            .map_err(ManagerError::DeleteDeploy)?;

        self.scheduler
            .unschedule_job(&deploy.workload.job_id)
            .await
            .map_err(ManagerError::UnScheduleJob)?;

        info!("Deploy {} destroyed", deploy_id);
        Ok(())
    }

    pub async fn get_deploy(&self, deploy_id: &str) -> Result<Deploy, ManagerError> {
        self.repository
            .get_deploy(deploy_id)
            .await
            .map_err(ManagerError::GetDeploy)
    }

    pub async fn list_deploys(&self) -> Result<Vec<Deploy>, ManagerError> {
        self.repository
            .list_deploy()
            .await
            .map_err(ManagerError::ListDeploys)
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Number of build watchers still running
    pub async fn active_watchers(&self) -> usize {
        let mut watchers = self.watchers.lock().await;
        reap(&mut watchers);
        watchers.len()
    }

    /// Stop accepting deploys and cancel every build watcher. Watchers still
    /// running after `grace` are aborted; their subscriptions are released by
    /// the drop guard.
    pub async fn shutdown(&self, grace: Duration) {
        self.closing.store(true, Ordering::SeqCst);

        let mut watchers = self.watchers.lock().await;
        let _ = self.shutdown_tx.send(());
        info!("Stopping {} build watchers", watchers.len());

        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = watchers.join_next().await {
                log_join_error(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "{} build watchers still running after {:?}, aborting",
                watchers.len(),
                grace
            );
            watchers.abort_all();
            while watchers.join_next().await.is_some() {}
        }
    }
}

fn reap(watchers: &mut JoinSet<WatchOutcome>) {
    while let Some(result) = watchers.try_join_next() {
        log_join_error(result);
    }
}

fn log_join_error(result: Result<WatchOutcome, tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Build watcher panicked: {}", e);
        }
    }
}
