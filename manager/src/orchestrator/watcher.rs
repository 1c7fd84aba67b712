//! Background consumer of one deploy's build events

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::message::Subscription;
use crate::models::deploy::Status;
use crate::orchestrator::fsm::{handle_event, Transition};
use crate::repository::Repository;
use crate::scheduler::Scheduler;

/// How a build watcher stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The build phase reached its terminal status
    Finished(Status),
    /// The producer sent something that is not a build step
    Rejected(String),
    /// Persisting progress or scheduling the workload failed
    Faulted(String),
    /// The subscription closed before a terminal event
    StreamEnded,
    /// The orchestrator is shutting down
    Cancelled,
    /// No terminal event within the build timeout
    TimedOut,
}

/// Drains the build events of one deploy through the state machine
pub struct BuildWatcher {
    pub deploy_id: String,
    pub envs: HashMap<String, String>,
    pub repository: Arc<dyn Repository>,
    pub scheduler: Arc<dyn Scheduler>,
    pub subscription: Subscription,
    pub shutdown_rx: broadcast::Receiver<()>,
    pub timeout: Option<Duration>,
}

impl BuildWatcher {
    /// Consume events until the build ends, then release the subscription.
    /// The release runs on every exit path.
    pub async fn run(self) -> WatchOutcome {
        let BuildWatcher {
            deploy_id,
            envs,
            repository,
            scheduler,
            subscription: Subscription {
                mut events,
                release,
            },
            mut shutdown_rx,
            timeout,
        } = self;

        debug!("Watching build events of {}", deploy_id);

        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break WatchOutcome::Cancelled,
                _ = &mut deadline => break WatchOutcome::TimedOut,
                next = events.next() => {
                    let Some(event) = next else {
                        break WatchOutcome::StreamEnded;
                    };

                    match handle_event(&*repository, &*scheduler, &event, &deploy_id, &envs).await {
                        Ok(false) => continue,
                        Ok(true) => match Transition::of(&event).terminal_status() {
                            Some(status) => break WatchOutcome::Finished(status),
                            None => continue,
                        },
                        Err(e) if e.is_protocol_fault() => break WatchOutcome::Rejected(e.to_string()),
                        Err(e) => {
                            if e.is_not_found() {
                                info!("Deploy {} was removed during its build", deploy_id);
                            }
                            break WatchOutcome::Faulted(e.to_string());
                        }
                    }
                }
            }
        };

        match &outcome {
            WatchOutcome::Finished(status) => {
                info!("Build watcher of {} finished: {}", deploy_id, status)
            }
            WatchOutcome::Rejected(reason) => {
                error!("Build events of {} are malformed: {}", deploy_id, reason)
            }
            WatchOutcome::Faulted(reason) => {
                warn!("Build watcher of {} stopped: {}", deploy_id, reason)
            }
            WatchOutcome::StreamEnded => {
                warn!("Build events of {} ended before a terminal step", deploy_id)
            }
            WatchOutcome::Cancelled => info!("Build watcher of {} cancelled", deploy_id),
            WatchOutcome::TimedOut => {
                warn!("Build of {} timed out after {:?}", deploy_id, timeout)
            }
        }

        if let Err(e) = release.release().await {
            warn!("Failed to release build events of {}: {}", deploy_id, e);
        }

        outcome
    }
}
