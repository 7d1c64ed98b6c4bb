//! JackBridge Daemon - JACK connection manager service.
//!
//! Owns the router transport, the reconciliation engine and the state
//! store, restores the saved connections on startup, watches router
//! health and serves IPC requests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

mod config;
mod server;
mod signals;

use config::Config;
use jackbridge_ipc::{IpcServer, Method, socket_path};
use jackbridge_jack::{HostRunner, ProcessMonitor, ReconciliationEngine, Transport};
use jackbridge_state::{StateError, StateStore};
use server::Daemon;

/// Crates that log at the configured level.
const LOG_TARGETS: &[&str] = &[
    "jackbridge_daemon",
    "jackbridge_core",
    "jackbridge_jack",
    "jackbridge_state",
    "jackbridge_ipc",
];

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;
    let _log_guard = init_logging(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting JackBridge daemon");
    config.validate().context("Invalid configuration")?;
    info!(
        method = %config.router.method,
        host = %config.router.host,
        presets = config.presets.len(),
        aliases = config.devices.len(),
        "Configuration loaded"
    );

    let transport = Arc::new(Transport::new(config.transport_config()?));
    let engine = ReconciliationEngine::new(transport, config.device_map(), config.presets());
    let store = StateStore::at(config.state_path()?);
    info!(path = %store.path().display(), "State store ready");
    let process = ProcessMonitor::new(config.process_config(), HostRunner::new(config.timeout()));

    let socket_path = socket_path();
    let (ipc_server, mut request_rx) =
        IpcServer::bind(&socket_path).await.context("Failed to start IPC server")?;
    let ipc_server = Arc::new(ipc_server);

    let daemon = Arc::new(Daemon::new(
        engine,
        store,
        process,
        config.restore_policy(),
        config.state.auto_save,
        ipc_server.event_sender(),
    ));

    let ipc_handle = {
        let server = Arc::clone(&ipc_server);
        tokio::spawn(async move { server.run().await })
    };

    let mut shutdown_rx = signals::setup_signal_handlers()?;

    if config.state.auto_restore {
        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move {
            match daemon.restore().await {
                Ok(outcome) => info!(
                    attempts = outcome.attempts,
                    entries = outcome.entries,
                    reconnected = outcome.batch.succeeded,
                    failed = outcome.batch.failed,
                    "Startup restore finished"
                ),
                Err(StateError::NotFound(_)) => info!("No saved state to restore"),
                Err(e) => warn!(error = %e, "Startup restore failed"),
            }
        });
    }

    let monitor_handle = {
        let daemon = Arc::clone(&daemon);
        let mut interval = tokio::time::interval(Duration::from_millis(config.monitor.interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                daemon.check_health().await;
            }
        })
    };

    info!("JackBridge daemon running");

    loop {
        tokio::select! {
            Some(incoming) = request_rx.recv() => {
                debug!(
                    client_id = incoming.client_id,
                    request_id = incoming.request.id,
                    "Handling IPC request"
                );

                if matches!(incoming.request.method, Method::Shutdown) {
                    info!("Shutdown requested over IPC");
                    incoming.respond(Ok(json!({"success": true}))).await;
                    break;
                }

                // Each request runs on its own task; the update gate
                // decides which mutations proceed.
                let daemon = Arc::clone(&daemon);
                tokio::spawn(async move {
                    let result = daemon.handle(&incoming.request.method).await;
                    incoming.respond(result).await;
                });
            }

            Some(signal) = shutdown_rx.recv() => {
                info!(signal, "Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down...");
    monitor_handle.abort();
    ipc_handle.abort();

    info!("JackBridge daemon stopped");
    Ok(())
}

/// Install the console and file layers. The returned guard flushes the
/// file writer on drop and must live as long as the process.
fn init_logging(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::from_default_env()
    } else {
        let level = &config.daemon.log_level;
        let mut filter = EnvFilter::new("warn");
        for target in LOG_TARGETS {
            filter = filter.add_directive(format!("{target}={level}").parse()?);
        }
        filter
    };

    let console = config.logging.console_enabled.then(fmt::layer);

    let (file, guard) = if config.logging.file_enabled {
        let path = log_file_path(config)?;
        let dir = path.parent().map(PathBuf::from).unwrap_or_default();
        let prefix = path.file_name().map_or_else(|| "jackbridge.log".into(), |n| n.to_os_string());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {dir:?}"))?;

        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, prefix));
        (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry().with(filter).with(console).with(file).init();
    Ok(guard)
}

fn log_file_path(config: &Config) -> Result<PathBuf> {
    if let Some(path) = &config.logging.file_path {
        return Ok(path.clone());
    }
    let dirs = ProjectDirs::from("com", "jackbridge", "JackBridge")
        .context("Could not determine log directory")?;
    Ok(dirs.data_dir().join("logs").join("jackbridge.log"))
}
