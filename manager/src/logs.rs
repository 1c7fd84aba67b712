//! Tracing subscriber setup

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::errors::ManagerError;

const LOG_FILE_PREFIX: &str = "deploy-manager.log";

/// Dependencies that are chatty at debug level
const QUIET_TARGETS: &[&str] = &["hyper=info", "hyper_util=info", "rumqttc=info", "reqwest=info"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Default directives when `RUST_LOG` is unset
    fn directives(self) -> String {
        let mut directives = vec![self.as_str().to_string()];
        if matches!(self, LogLevel::Trace | LogLevel::Debug) {
            directives.extend(QUIET_TARGETS.iter().map(|t| t.to_string()));
        }
        directives.join(",")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub log_level: LogLevel,
    pub stdout: bool,
    /// Daily-rolling file output goes here when set
    pub log_dir: Option<PathBuf>,
    pub json_format: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            stdout: true,
            log_dir: None,
            json_format: false,
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn stdout_layer(json: bool) -> BoxedLayer {
    let layer = tracing_fmt::layer().with_target(true);
    if json {
        layer.json().with_current_span(false).boxed()
    } else {
        layer.boxed()
    }
}

fn file_layer(log_dir: &Path, json: bool) -> Result<(BoxedLayer, WorkerGuard), ManagerError> {
    std::fs::create_dir_all(log_dir)?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));

    let layer = tracing_fmt::layer().with_writer(writer).with_ansi(false);
    let layer = if json { layer.json().boxed() } else { layer.boxed() };
    Ok((layer, guard))
}

/// Install the global subscriber. `RUST_LOG` overrides `log_level`.
///
/// Keep the returned guard alive until exit, dropping it flushes the file
/// writer.
pub fn init_logging(options: LogOptions) -> Result<Option<WorkerGuard>, ManagerError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.log_level.directives()));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if options.stdout {
        layers.push(stdout_layer(options.json_format));
    }

    let guard = match options.log_dir {
        Some(ref log_dir) => {
            let (layer, guard) = file_layer(log_dir, options.json_format)?;
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ManagerError::ConfigError(format!("logging already initialized: {e}")))?;

    Ok(guard)
}
