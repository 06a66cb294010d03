//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Force a config reload
//!
//! Shutdown (shutdown.rs):
//!     Broadcast to long-running tasks → Exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
