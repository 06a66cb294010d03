//! Live config demo service.
//!
//! Emits a heartbeat at every level once per interval so that editing the
//! config file visibly changes what gets printed.
//!
//! ```text
//!   http-config.json ──▶ ConfigWatcher ──▶ LogSink (threshold swap)
//!                            ▲                  │
//!                 SIGHUP ────┘                  ▼
//!                                      heartbeat records on stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use live_config::config::DEFAULT_CONFIG_PATH;
use live_config::lifecycle::signals::handle_signals;
use live_config::{ConfigWatcher, LogFormat, LogLevel, LogSink, Shutdown};

#[derive(Parser)]
#[command(name = "live-config")]
#[command(about = "Service whose log level follows a watched config file", long_about = None)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Seconds between heartbeats.
    #[arg(short, long, default_value_t = 1)]
    interval_secs: u64,

    /// Log output format.
    #[arg(short, long, value_enum, default_value_t = LogFormat::Json)]
    format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let sink = LogSink::install(LogLevel::Info, cli.format)?;
    let watcher = Arc::new(ConfigWatcher::new(&cli.config));
    sink.attach(&watcher);

    tracing::info!(
        path = %watcher.path().display(),
        mode = ?watcher.mode(),
        log_level = %sink.level(),
        "Starting live-config service"
    );

    let shutdown = Shutdown::new();
    let signals = tokio::spawn(handle_signals(shutdown.clone(), Arc::clone(&watcher)));

    let mut ticker = tokio::time::interval(Duration::from_secs(cli.interval_secs.max(1)));
    let mut iteration: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                iteration += 1;
                tracing::info!(iteration, status = "healthy", "Application running");
                tracing::debug!(iteration, mode = ?watcher.mode(), "Debug message for troubleshooting");
                tracing::warn!(iteration, "Simulated warning for testing");
                tracing::error!(iteration, error_type = "test_error", "Simulated error for testing");
            }
            _ = shutdown.wait() => break,
        }
    }

    signals.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
