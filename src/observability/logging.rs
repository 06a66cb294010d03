//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the process-wide `tracing` subscriber
//! - Own the verbosity threshold and swap it at runtime
//! - Follow `log_level` changes published by a [`ConfigWatcher`]
//!
//! # Design Decisions
//! - One [`LogSink`] per process; nothing else touches the global filter
//! - The threshold lives behind a `reload::Layer`, so changing it does not
//!   rebuild the subscriber
//! - JSON to stdout by default, pretty format for local development

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, Registry};

use crate::config::{ConfigWatcher, LogLevel};

/// Error type for logging setup and level changes.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to install global subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
    #[error("failed to update log level: {0}")]
    Reload(#[from] reload::Error),
}

/// Output format of log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Process-scoped log sink with a swappable verbosity threshold.
pub struct LogSink {
    handle: reload::Handle<LevelFilter, Registry>,
    current: AtomicU8,
}

impl LogSink {
    /// Build a sink and the filter layer it controls, without installing
    /// anything globally.
    pub fn new(level: LogLevel) -> (Self, reload::Layer<LevelFilter, Registry>) {
        let (layer, handle) = reload::Layer::new(level_filter(level));
        let sink = Self {
            handle,
            current: AtomicU8::new(encode(level)),
        };
        (sink, layer)
    }

    /// Install the global subscriber writing to stdout.
    pub fn install(level: LogLevel, format: LogFormat) -> Result<Arc<Self>, LoggingError> {
        let (sink, filter) = Self::new(level);
        let registry = tracing_subscriber::registry().with(filter);

        match format {
            LogFormat::Json => registry
                .with(fmt::layer().json().with_writer(std::io::stdout))
                .try_init()?,
            LogFormat::Pretty => registry
                .with(fmt::layer().pretty().with_writer(std::io::stdout))
                .try_init()?,
        }

        Ok(Arc::new(sink))
    }

    /// Current threshold.
    pub fn level(&self) -> LogLevel {
        decode(self.current.load(Ordering::Acquire))
    }

    /// Swap the threshold. Records already filtered are not affected.
    pub fn set_level(&self, level: LogLevel) -> Result<(), LoggingError> {
        self.handle.reload(level_filter(level))?;
        let previous = decode(self.current.swap(encode(level), Ordering::AcqRel));
        if previous != level {
            tracing::info!(new_level = %level, previous_level = %previous, "Log level updated");
        }
        Ok(())
    }

    /// Apply the watcher's current level and follow every reload.
    pub fn attach(self: &Arc<Self>, watcher: &ConfigWatcher) {
        let sink = Arc::clone(self);
        watcher.subscribe(move |config| sink.apply(config.log_level));
    }

    fn apply(&self, level: LogLevel) {
        if let Err(e) = self.set_level(level) {
            tracing::error!(error = %e, level = %level, "Failed to apply log level");
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink").field("level", &self.level()).finish()
    }
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

fn encode(level: LogLevel) -> u8 {
    match level {
        LogLevel::Debug => 0,
        LogLevel::Info => 1,
        LogLevel::Warn => 2,
        LogLevel::Error => 3,
    }
}

fn decode(val: u8) -> LogLevel {
    match val {
        0 => LogLevel::Debug,
        2 => LogLevel::Warn,
        3 => LogLevel::Error,
        _ => LogLevel::Info,
    }
}
