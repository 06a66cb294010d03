//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! config watcher reload
//!     → LogSink callback (logging.rs)
//!     → reload::Layer threshold swap
//!     → subsequent records filtered at the new level
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - A single owner of the verbosity threshold per process

pub mod logging;

pub use logging::{LogFormat, LogSink, LoggingError};
