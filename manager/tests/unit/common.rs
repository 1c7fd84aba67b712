//! Test doubles for the scheduler and message ports

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deploy_manager::errors::{MessageError, SchedulerError};
use deploy_manager::message::{Message, ReleaseHandle, Subscription};
use deploy_manager::models::deploy::BuildStep;
use deploy_manager::orchestrator::{BuildSettings, Orchestrator};
use deploy_manager::repository::MemoryRepository;
use deploy_manager::scheduler::{ImageBuildJob, Scheduler, WorkloadJob};
use futures::StreamExt;
use tokio::sync::mpsc;

pub const BUILD_JOB: &str = "build-abc";
pub const IMAGE: &str = "reg/cobold/abc";
pub const WORKLOAD_JOB: &str = "workload-abc";
pub const WORKLOAD_URL: &str = "https://abc.apps.example";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    ImageBuild {
        workload_id: String,
        git_repo_url: String,
    },
    Workload {
        envs: HashMap<String, String>,
        workload_id: String,
    },
    UnSchedule {
        job_id: String,
    },
}

/// Records every call and answers with fixed jobs unless told to fail
#[derive(Default)]
pub struct FakeScheduler {
    calls: Mutex<Vec<SchedulerCall>>,
    pub fail_image_build: Mutex<Option<SchedulerError>>,
    pub fail_workload: Mutex<Option<SchedulerError>>,
    pub fail_unschedule: Mutex<Option<SchedulerError>>,
}

impl FakeScheduler {
    pub fn calls(&self) -> Vec<SchedulerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn workload_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SchedulerCall::Workload { .. }))
            .count()
    }

    pub fn unschedule_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SchedulerCall::UnSchedule { job_id } => Some(job_id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SchedulerCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(slot: &Mutex<Option<SchedulerError>>) -> Result<(), SchedulerError> {
        match slot.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Scheduler for FakeScheduler {
    async fn schedule_image_build(
        &self,
        workload_id: &str,
        git_repo_url: &str,
    ) -> Result<ImageBuildJob, SchedulerError> {
        self.record(SchedulerCall::ImageBuild {
            workload_id: workload_id.to_string(),
            git_repo_url: git_repo_url.to_string(),
        });
        Self::failure(&self.fail_image_build)?;
        Ok(ImageBuildJob {
            job_name: BUILD_JOB.to_string(),
            image_name: IMAGE.to_string(),
        })
    }

    async fn schedule_workload(
        &self,
        envs: &HashMap<String, String>,
        workload_id: &str,
    ) -> Result<WorkloadJob, SchedulerError> {
        self.record(SchedulerCall::Workload {
            envs: envs.clone(),
            workload_id: workload_id.to_string(),
        });
        Self::failure(&self.fail_workload)?;
        Ok(WorkloadJob {
            job_name: WORKLOAD_JOB.to_string(),
            url: WORKLOAD_URL.to_string(),
        })
    }

    async fn unschedule_job(&self, job_id: &str) -> Result<(), SchedulerError> {
        self.record(SchedulerCall::UnSchedule {
            job_id: job_id.to_string(),
        });
        Self::failure(&self.fail_unschedule)
    }
}

#[derive(Default)]
struct MessageState {
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<BuildStep>>>,
    released: Mutex<Vec<String>>,
}

/// In-process build-event bus: tests publish steps per deploy
#[derive(Default)]
pub struct FakeMessage {
    state: Arc<MessageState>,
    inits: AtomicUsize,
    consumes: AtomicUsize,
    pub fail_consume: Mutex<Option<MessageError>>,
}

impl FakeMessage {
    /// Deliver a step to the deploy's subscriber
    pub fn publish(&self, deploy_id: &str, step: BuildStep) {
        let senders = self.state.senders.lock().unwrap();
        if let Some(tx) = senders.get(deploy_id) {
            let _ = tx.send(step);
        }
    }

    /// End the deploy's event stream without a terminal step
    pub fn close_stream(&self, deploy_id: &str) {
        self.state.senders.lock().unwrap().remove(deploy_id);
    }

    pub fn released(&self) -> Vec<String> {
        self.state.released.lock().unwrap().clone()
    }

    pub fn is_released(&self, deploy_id: &str) -> bool {
        self.released().iter().any(|id| id == deploy_id)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn consumes(&self) -> usize {
        self.consumes.load(Ordering::SeqCst)
    }

    /// Wait until the deploy's subscription has been released
    pub async fn wait_released(&self, deploy_id: &str) {
        let released = wait_until(move || async move { self.is_released(deploy_id) }).await;
        assert!(released, "subscription of {deploy_id} was never released");
    }
}

#[async_trait]
impl Message for FakeMessage {
    async fn init(&self) -> Result<(), MessageError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn consume_build_events(&self, deploy_id: &str) -> Result<Subscription, MessageError> {
        self.consumes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_consume.lock().unwrap().take() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .senders
            .lock()
            .unwrap()
            .insert(deploy_id.to_string(), tx);

        let events = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed();

        let state = self.state.clone();
        let id = deploy_id.to_string();
        let release = ReleaseHandle::new(deploy_id, move || async move {
            state.senders.lock().unwrap().remove(&id);
            state.released.lock().unwrap().push(id);
            Ok(())
        });

        Ok(Subscription { events, release })
    }
}

pub struct Harness {
    pub repository: Arc<MemoryRepository>,
    pub scheduler: Arc<FakeScheduler>,
    pub message: Arc<FakeMessage>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn harness() -> Harness {
    harness_with(BuildSettings::default())
}

pub fn harness_with(settings: BuildSettings) -> Harness {
    let repository = Arc::new(MemoryRepository::new());
    let scheduler = Arc::new(FakeScheduler::default());
    let message = Arc::new(FakeMessage::default());

    let orchestrator = Arc::new(Orchestrator::new(
        repository.clone(),
        scheduler.clone(),
        message.clone(),
        settings,
    ));

    Harness {
        repository,
        scheduler,
        message,
        orchestrator,
    }
}

pub fn envs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Poll `condition` for up to two seconds
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
