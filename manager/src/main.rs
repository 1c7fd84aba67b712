//! Deploy Manager - Entry Point
//!
//! Accepts deploy requests, schedules image builds, follows build progress
//! over MQTT and schedules the resulting workload.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use deploy_manager::app::options::{
    AppOptions, LifecycleOptions, SchedulerOptions, ServerOptions, StorageOptions,
};
use deploy_manager::app::run::run;
use deploy_manager::filesys::file::File;
use deploy_manager::logs::{init_logging, LogLevel, LogOptions};
use deploy_manager::message::mqtt::{MqttAddress, MqttConfig};
use deploy_manager::orchestrator::BuildSettings;
use deploy_manager::storage::layout::StorageLayout;
use deploy_manager::storage::settings::Settings;
use deploy_manager::utils::version_info;

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    // Retrieve the settings file
    let layout = StorageLayout::from_env();
    let settings_file = match cli_args.get("settings") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let settings = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!(
                    "Unable to read settings file {}: {e}",
                    settings_file.path().display()
                );
                return;
            }
        }
    } else {
        Settings::default()
    };

    // Initialize logging
    let log_level = match cli_args.get("log-level").map(|l| l.parse::<LogLevel>()) {
        Some(Ok(level)) => level,
        Some(Err(e)) => {
            eprintln!("{e}");
            return;
        }
        None => settings.log_level,
    };
    let log_options = LogOptions {
        log_level,
        json_format: settings.log_json,
        log_dir: settings.log_dir.as_ref().map(|dir| layout.resolve(dir)),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    if !settings_file.exists().await {
        warn!(
            "No settings file at {}, using defaults",
            settings_file.path().display()
        );
    }

    let options = app_options(&settings, &layout);

    info!("Running deploy manager with options: {:?}", options);
    let result = run(options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the deploy manager: {e}");
        std::process::exit(1);
    }
}

fn app_options(settings: &Settings, layout: &StorageLayout) -> AppOptions {
    let documents_file = if settings.storage.in_memory {
        None
    } else {
        Some(match settings.storage.documents_file {
            Some(ref path) => File::new(layout.resolve(path)),
            None => layout.documents_file(),
        })
    };

    AppOptions {
        lifecycle: LifecycleOptions {
            watcher_grace: Duration::from_secs(settings.shutdown_grace_secs),
            ..Default::default()
        },
        storage: StorageOptions { documents_file },
        server: ServerOptions {
            host: settings.server.host.clone(),
            port: settings.server.port,
        },
        mqtt: MqttConfig {
            address: MqttAddress {
                host: settings.mqtt_broker.host.clone(),
                port: settings.mqtt_broker.port,
                use_tls: settings.mqtt_broker.tls,
                ca_cert_path: settings.mqtt_broker.ca_cert_path.clone(),
            },
            client_id: settings.mqtt_broker.client_id.clone(),
            persistent_session: settings.mqtt_broker.persistent_session,
            username: settings.mqtt_broker.username.clone(),
            password: settings.mqtt_broker.password.clone(),
            exchange: settings.mqtt_broker.exchange.clone(),
            ..Default::default()
        },
        scheduler: SchedulerOptions {
            base_url: settings.scheduler.base_url.clone(),
            timeout: Duration::from_secs(settings.scheduler.timeout_secs),
        },
        build: BuildSettings {
            timeout: settings.build.timeout_secs.map(Duration::from_secs),
        },
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
