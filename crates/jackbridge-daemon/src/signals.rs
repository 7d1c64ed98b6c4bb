//! Signal handling for graceful shutdown.

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::info;

/// Listen for SIGTERM and SIGINT.
///
/// The returned receiver yields the name of the first signal seen.
///
/// # Errors
/// Fails if the SIGTERM handler cannot be registered.
pub fn setup_signal_handlers() -> Result<mpsc::Receiver<&'static str>> {
    let (tx, rx) = mpsc::channel(1);

    let mut terminate = signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let tx_term = tx.clone();
    tokio::spawn(async move {
        if terminate.recv().await.is_some() {
            info!("Received SIGTERM");
            let _ = tx_term.send("SIGTERM").await;
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT");
            let _ = tx.send("SIGINT").await;
        }
    });

    Ok(rx)
}
