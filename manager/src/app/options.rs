//! Application configuration options

use std::time::Duration;

use crate::filesys::file::File;
use crate::message::mqtt::MqttConfig;
use crate::orchestrator::BuildSettings;

/// Main application options
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Build-event bus configuration
    pub mqtt: MqttConfig,

    /// Scheduler client configuration
    pub scheduler: SchedulerOptions,

    /// Build watcher settings
    pub build: BuildSettings,
}

/// Lifecycle options for the manager
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Time running build watchers get to stop before they are aborted
    pub watcher_grace: Duration,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            watcher_grace: Duration::from_secs(10),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Snapshot file of the deploy documents; in memory only when `None`
    pub documents_file: Option<File>,
}

/// Scheduler client options
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8082".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP API server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}
