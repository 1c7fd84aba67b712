//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::errors::ManagerError;
use crate::message::{Message, MqttMessage};
use crate::middleware::Logged;
use crate::orchestrator::Orchestrator;
use crate::repository::{MemoryRepository, Repository};
use crate::scheduler::{HttpScheduler, Scheduler};
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// Run the deploy manager until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ManagerError> {
    info!("Initializing deploy manager...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start deploy manager: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    // Shutdown
    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), ManagerError> {
    let repository = init_repository(options).await?;

    let scheduler: Arc<dyn Scheduler> = Arc::new(Logged::new(
        "scheduler",
        HttpScheduler::new(&options.scheduler.base_url, options.scheduler.timeout)?,
    ));
    info!("Scheduler at {}", options.scheduler.base_url);

    let message = init_message(options, shutdown_manager).await?;

    let orchestrator = Arc::new(Orchestrator::new(
        repository,
        scheduler,
        message,
        options.build.clone(),
    ));
    shutdown_manager.with_orchestrator(orchestrator.clone())?;

    init_server(options, orchestrator, shutdown_manager, shutdown_tx.subscribe()).await
}

async fn init_repository(options: &AppOptions) -> Result<Arc<dyn Repository>, ManagerError> {
    let repository = match options.storage.documents_file {
        Some(ref file) => {
            info!("Loading deploy documents from {}", file.path().display());
            MemoryRepository::open(file.clone())
                .await
                .map_err(|e| ManagerError::ConfigError(format!("deploy documents: {e}")))?
        }
        None => {
            info!("Keeping deploy documents in memory");
            MemoryRepository::new()
        }
    };

    Ok(Arc::new(Logged::new("repository", repository)))
}

async fn init_message(
    options: &AppOptions,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<dyn Message>, ManagerError> {
    info!(
        "Connecting to MQTT broker {}:{}...",
        options.mqtt.address.host, options.mqtt.address.port
    );

    let message = MqttMessage::new(&options.mqtt).map_err(ManagerError::MessageInit)?;
    let message = Arc::new(Logged::new("message", message));
    message.init().await.map_err(ManagerError::MessageInit)?;

    shutdown_manager.with_message(message.clone())?;
    Ok(message)
}

async fn init_server(
    options: &AppOptions,
    orchestrator: Arc<Orchestrator>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ManagerError> {
    info!("Initializing HTTP API...");

    let server_handle = serve(&options.server, Arc::new(ServerState::new(orchestrator)), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    server_handle: Option<JoinHandle<Result<(), ManagerError>>>,
    orchestrator: Option<Arc<Orchestrator>>,
    message: Option<Arc<Logged<MqttMessage>>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            server_handle: None,
            orchestrator: None,
            message: None,
        }
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), ManagerError>>,
    ) -> Result<(), ManagerError> {
        if self.server_handle.is_some() {
            return Err(ManagerError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub fn with_orchestrator(&mut self, orchestrator: Arc<Orchestrator>) -> Result<(), ManagerError> {
        if self.orchestrator.is_some() {
            return Err(ManagerError::ShutdownError("orchestrator already set".to_string()));
        }
        self.orchestrator = Some(orchestrator);
        Ok(())
    }

    pub fn with_message(&mut self, message: Arc<Logged<MqttMessage>>) -> Result<(), ManagerError> {
        if self.message.is_some() {
            return Err(ManagerError::ShutdownError("message already set".to_string()));
        }
        self.message = Some(message);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ManagerError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), ManagerError> {
        info!("Shutting down deploy manager...");

        // 1. HTTP API, so no new deploys arrive
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| ManagerError::ShutdownError(e.to_string()))??;
        }

        // 2. Build watchers, releasing their subscriptions
        if let Some(orchestrator) = self.orchestrator.take() {
            orchestrator
                .shutdown(self.lifecycle_options.watcher_grace)
                .await;
        }

        // 3. Build-event bus
        if let Some(message) = self.message.take() {
            message.inner().close().await;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
