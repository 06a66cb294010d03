//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON)
//!     → loader.rs (read & deserialize, default on failure)
//!     → Config (immutable)
//!     → cached as Arc<Config> in watcher.rs
//!
//! On file change:
//!     watcher.rs receives a write/create event for the tracked path
//!     → loader.rs loads new config
//!     → atomic swap of Arc<Config>
//!     → callbacks observe new config, in registration order
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - Load and parse failures degrade to the default config, never an error
//! - The parent directory is watched so delete+create saves are seen

pub mod loader;
pub mod schema;
pub mod watcher;

pub use loader::{load_config, try_load_config, ConfigError};
pub use schema::{Config, LogLevel};
pub use watcher::{ConfigWatcher, WatchError, WatchMode, WatchOptions};

/// Conventional config file name, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "http-config.json";
