//! OS signal handling.
//!
//! # Responsibilities
//! - SIGINT/SIGTERM trigger graceful shutdown
//! - SIGHUP forces a config reload without touching the file
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Returns once shutdown has been triggered, by a signal or elsewhere

use std::sync::Arc;

use crate::config::ConfigWatcher;
use crate::lifecycle::Shutdown;

/// Handle process signals until shutdown.
#[cfg(unix)]
pub async fn handle_signals(shutdown: Shutdown, watcher: Arc<ConfigWatcher>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down");
                break;
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
                break;
            }
            _ = hangup.recv() => {
                tracing::info!(path = %watcher.path().display(), "Received SIGHUP, reloading config");
                watcher.reload_and_notify();
            }
            _ = shutdown.wait() => return Ok(()),
        }
    }

    shutdown.trigger();
    Ok(())
}

/// Handle process signals until shutdown.
#[cfg(not(unix))]
pub async fn handle_signals(shutdown: Shutdown, _watcher: Arc<ConfigWatcher>) -> std::io::Result<()> {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("Received Ctrl-C, shutting down");
            shutdown.trigger();
        }
        _ = shutdown.wait() => {}
    }
    Ok(())
}
