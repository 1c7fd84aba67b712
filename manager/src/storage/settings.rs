//! Settings file management

use secrecy::SecretString;
use serde::Deserialize;

use crate::logs::LogLevel;

/// Manager settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily-rolling log files to this directory
    #[serde(default)]
    pub log_dir: Option<String>,

    /// HTTP API configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// MQTT broker configuration
    #[serde(default)]
    pub mqtt_broker: MqttBrokerSettings,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Document storage
    #[serde(default)]
    pub storage: StorageSettings,

    /// Build watcher configuration
    #[serde(default)]
    pub build: BuildSettings,

    /// How long running build watchers get to stop on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_shutdown_grace() -> u64 {
    10
}

/// HTTP API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// MQTT broker settings
#[derive(Debug, Clone, Deserialize)]
pub struct MqttBrokerSettings {
    /// Broker host
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Use TLS
    #[serde(default)]
    pub tls: bool,

    /// Optional path to a PEM-encoded CA certificate for broker TLS verification.
    /// When absent, the system certificate store is used.
    #[serde(default)]
    pub ca_cert_path: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<SecretString>,

    /// Session id kept by the broker across reconnects
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Topic prefix of the build-progress exchange
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Keep the session across restarts
    #[serde(default = "default_true")]
    pub persistent_session: bool,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "deploy-manager".to_string()
}

fn default_exchange() -> String {
    crate::message::topics::BUILD_IMAGE_EXCHANGE.to_string()
}

impl Default for MqttBrokerSettings {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            tls: false,
            ca_cert_path: None,
            username: None,
            password: None,
            client_id: default_client_id(),
            exchange: default_exchange(),
            persistent_session: true,
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    /// Base URL of the scheduler API
    #[serde(default = "default_scheduler_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_scheduler_timeout")]
    pub timeout_secs: u64,
}

fn default_scheduler_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_scheduler_timeout() -> u64 {
    30
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            base_url: default_scheduler_url(),
            timeout_secs: default_scheduler_timeout(),
        }
    }
}

/// Document storage settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSettings {
    /// Snapshot file of the deploy documents. Defaults to the storage layout.
    #[serde(default)]
    pub documents_file: Option<String>,

    /// Keep documents in memory only
    #[serde(default)]
    pub in_memory: bool,
}

/// Build watcher settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSettings {
    /// Stop watching a build after this many seconds. Unbounded when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}
