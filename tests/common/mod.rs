//! Shared utilities for watcher integration tests.
#![allow(dead_code)]

use std::fs;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use live_config::config::watcher::{FsEvent, FsEventKind, WatchChannels, WatchError};
use live_config::{Config, LogLevel};
use tokio::sync::mpsc;

/// Sending side of a simulated watch.
pub struct MockWatch {
    pub events: mpsc::UnboundedSender<FsEvent>,
    pub errors: mpsc::UnboundedSender<WatchError>,
}

impl MockWatch {
    /// Create a simulated watch and the channels to hand to the watcher.
    pub fn new() -> (Self, WatchChannels) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (errors, error_rx) = mpsc::unbounded_channel();
        (Self { events, errors }, WatchChannels::new(event_rx, error_rx))
    }

    pub fn send(&self, path: &Path, kind: FsEventKind) {
        self.events.send(FsEvent::new(path, kind)).unwrap();
    }
}

/// Write `{"log_level": level}` to `path`.
pub fn write_level(path: &Path, level: &str) {
    fs::write(path, format!(r#"{{"log_level":"{}"}}"#, level)).unwrap();
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, check: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Records `(callback name, level)` for every invocation.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<(String, LogLevel)>>>,
}

impl Recorder {
    pub fn callback(&self, name: &str) -> impl Fn(Arc<Config>) + Send + Sync + 'static {
        let calls = self.calls.clone();
        let name = name.to_string();
        move |config: Arc<Config>| calls.lock().unwrap().push((name.clone(), config.log_level))
    }

    pub fn calls(&self) -> Vec<(String, LogLevel)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn count_of(&self, name: &str, level: LogLevel) -> usize {
        self.calls()
            .iter()
            .filter(|(n, l)| n == name && *l == level)
            .count()
    }
}

/// Run `f` and fail the test if it takes longer than `timeout`.
pub async fn within<F: Future>(timeout: Duration, f: F) -> F::Output {
    tokio::time::timeout(timeout, f).await.expect("timed out")
}
