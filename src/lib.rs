//! Live-reloading configuration for long-running services.
//!
//! A [`ConfigWatcher`] loads a small JSON config file, keeps it cached for
//! lock-free reads and reloads it whenever the file is written or
//! recreated, fanning each new value out to registered callbacks. The
//! [`LogSink`] is the stock observer: it keeps the process log level in
//! step with the file.
//!
//! ```no_run
//! use live_config::{ConfigWatcher, LogFormat, LogLevel, LogSink};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = LogSink::install(LogLevel::Info, LogFormat::Json)?;
//! let watcher = ConfigWatcher::new("http-config.json");
//! sink.attach(&watcher);
//!
//! tracing::info!(log_level = %watcher.load_config().log_level, "ready");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::{Config, ConfigWatcher, LogLevel, WatchMode};
pub use lifecycle::Shutdown;
pub use observability::{LogFormat, LogSink};
