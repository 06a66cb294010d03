//! Configuration schema definitions.
//!
//! The document is a small JSON object. Unknown fields are ignored and every
//! field has a default, so `{}` is a valid configuration.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Root configuration, as read from the watched file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Config {
    /// Log verbosity threshold.
    pub log_level: LogLevel,
}

// Keys are collected into a map first, so a repeated key keeps its last value.
impl<'de> Deserialize<'de> for Config {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::<String, Value>::deserialize(deserializer)?;

        let log_level = match fields.get("log_level") {
            None => LogLevel::default(),
            Some(Value::String(name)) => LogLevel::parse_lossy(name),
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "invalid type for log_level: expected a string, found {other}"
                )))
            }
        };

        Ok(Config { log_level })
    }
}

/// Log verbosity, from most to least verbose.
///
/// Parsed case-insensitively. Anything outside the four known names,
/// including the empty string, falls back to [`LogLevel::Info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name, mapping unknown names to `Info`.
    pub fn parse_lossy(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARN" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl From<String> for LogLevel {
    fn from(name: String) -> Self {
        Self::parse_lossy(&name)
    }
}

impl From<&str> for LogLevel {
    fn from(name: &str) -> Self {
        Self::parse_lossy(name)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
