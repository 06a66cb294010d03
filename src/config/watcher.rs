//! Configuration file watcher for hot reload.
//!
//! # Responsibilities
//! - Cache the current [`Config`] and serve it to any number of readers
//! - Watch the config file's directory and reload on write/create
//! - Fan each reloaded config out to registered callbacks, in order
//!
//! # Design Decisions
//! - The directory is watched, not the file, so that editors which save via
//!   delete+create or rename-into-place keep being observed
//! - Reads are lock-free (`ArcSwap`); a reader sees either the old or the new
//!   config, never a partial one
//! - Callbacks are snapshotted under a brief read lock and invoked outside of
//!   it, so a callback may register further callbacks
//! - If the watch cannot be established the watcher keeps serving the cached
//!   config (cache-only mode) instead of failing

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::load_config;
use crate::config::schema::Config;

/// A registered observer of config reloads.
pub type Callback = Arc<dyn Fn(Arc<Config>) + Send + Sync>;

/// Errors raised while establishing or running a filesystem watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("filesystem watch failed: {0}")]
    Notify(#[from] notify::Error),
    #[error("no Tokio runtime available to run the watch loop")]
    NoRuntime,
    #[error("{0}")]
    Backend(String),
}

/// Whether live reload is active.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// The background loop is running over an established watch.
    Live = 0,
    /// The watch could not be established; only the cached config is served.
    CacheOnly = 1,
    /// The background loop ended after one of its channels closed.
    Stopped = 2,
}

impl From<u8> for WatchMode {
    fn from(val: u8) -> Self {
        match val {
            0 => WatchMode::Live,
            1 => WatchMode::CacheOnly,
            _ => WatchMode::Stopped,
        }
    }
}

/// Kind of filesystem change, as seen by the reload loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
    Other,
}

impl FsEventKind {
    /// Only writes and creations trigger a reload.
    pub fn triggers_reload(self) -> bool {
        matches!(self, FsEventKind::Create | FsEventKind::Write)
    }
}

/// A change to a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FsEventKind) -> Self {
        Self { path: path.into(), kind }
    }

    /// Flatten a notify event into one event per affected path.
    fn from_notify(event: Event) -> Vec<FsEvent> {
        let kind = event.kind;
        event
            .paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| FsEvent::new(path, classify(&kind, index)))
            .collect()
    }
}

fn classify(kind: &EventKind, path_index: usize) -> FsEventKind {
    match kind {
        EventKind::Create(_) => FsEventKind::Create,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => FsEventKind::Write,
        EventKind::Modify(ModifyKind::Metadata(_)) => FsEventKind::Chmod,
        // A rename onto a path brings a new file into existence there.
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FsEventKind::Create,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if path_index == 1 => FsEventKind::Create,
        EventKind::Modify(ModifyKind::Name(_)) => FsEventKind::Rename,
        EventKind::Remove(_) => FsEventKind::Remove,
        _ => FsEventKind::Other,
    }
}

/// Receiving ends of an established watch.
///
/// Dropping this releases the underlying OS watch, if any.
pub struct WatchChannels {
    events: mpsc::UnboundedReceiver<FsEvent>,
    errors: mpsc::UnboundedReceiver<WatchError>,
    _guard: Option<Box<dyn Send>>,
}

impl WatchChannels {
    pub fn new(
        events: mpsc::UnboundedReceiver<FsEvent>,
        errors: mpsc::UnboundedReceiver<WatchError>,
    ) -> Self {
        Self { events, errors, _guard: None }
    }

    /// Keep `guard` alive for as long as the channels are in use.
    pub fn with_guard(mut self, guard: impl Send + 'static) -> Self {
        self._guard = Some(Box::new(guard));
        self
    }
}

/// Source of filesystem notifications for a directory.
pub trait WatchBackend {
    /// Start watching `dir` (non-recursively).
    fn watch(self, dir: &Path) -> Result<WatchChannels, WatchError>;
}

impl<F> WatchBackend for F
where
    F: FnOnce(&Path) -> Result<WatchChannels, WatchError>,
{
    fn watch(self, dir: &Path) -> Result<WatchChannels, WatchError> {
        self(dir)
    }
}

/// Already-established channels, for callers that produce events themselves.
impl WatchBackend for WatchChannels {
    fn watch(self, _dir: &Path) -> Result<WatchChannels, WatchError> {
        Ok(self)
    }
}

/// Watch backend using the platform's recommended `notify` watcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyBackend;

impl WatchBackend for NotifyBackend {
    fn watch(self, dir: &Path) -> Result<WatchChannels, WatchError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for fs_event in FsEvent::from_notify(event) {
                        let _ = event_tx.send(fs_event);
                    }
                }
                Err(e) => {
                    let _ = error_tx.send(WatchError::Notify(e));
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(WatchChannels::new(event_rx, error_rx).with_guard(watcher))
    }
}

/// Tuning for the reload loop.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    /// How long to absorb follow-up events after a qualifying one before
    /// reloading. A single save usually produces a burst of events.
    pub settle: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(50),
        }
    }
}

struct Shared {
    path: PathBuf,
    dir: PathBuf,
    canonical_dir: Option<PathBuf>,
    current: ArcSwap<Config>,
    callbacks: RwLock<Vec<Callback>>,
    /// Serializes reload-and-notify cycles.
    cycle: Mutex<()>,
    mode: AtomicU8,
}

impl Shared {
    fn mode(&self) -> WatchMode {
        WatchMode::from(self.mode.load(Ordering::Acquire))
    }

    fn set_mode(&self, mode: WatchMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    fn is_tracked(&self, candidate: &Path) -> bool {
        if candidate == self.path {
            return true;
        }
        if candidate.file_name() != self.path.file_name() {
            return false;
        }
        match candidate.parent() {
            Some(parent) => parent == self.dir || self.canonical_dir.as_deref() == Some(parent),
            None => false,
        }
    }

    fn reload_and_notify(&self) {
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(path = %self.path.display(), "Reloading config and notifying callbacks");

        let config = Arc::new(load_config(&self.path));
        let previous = self.current.swap(Arc::clone(&config));
        if previous.log_level != config.log_level {
            tracing::info!(
                path = %self.path.display(),
                log_level = %config.log_level,
                previous = %previous.log_level,
                "Config loaded successfully"
            );
        }

        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if !callbacks.is_empty() {
            tracing::info!(
                callback_count = callbacks.len(),
                log_level = %config.log_level,
                "Notifying config change callbacks"
            );
        }

        for (index, callback) in callbacks.iter().enumerate() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(Arc::clone(&config))));
            if result.is_err() {
                tracing::error!(callback = index, "Config callback panicked");
            }
        }

        tracing::debug!(callback_count = callbacks.len(), "All callbacks notified");
    }
}

/// Cached, live-reloading view of a config file.
///
/// Construct it from within a Tokio runtime: the reload loop runs as a task
/// on the ambient runtime. Without one the watcher starts in
/// [`WatchMode::CacheOnly`].
///
/// Callbacks run synchronously on the reload task, one after another. A
/// slow callback delays the ones registered after it and the next reload,
/// so observers with their own cadence should hand the config off to their
/// own task. A callback must not call [`ConfigWatcher::reload_and_notify`]
/// on the same watcher; that deadlocks.
pub struct ConfigWatcher {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Load `path` and start watching its directory with `notify`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_backend(path, NotifyBackend)
    }

    /// Like [`ConfigWatcher::new`] with a custom source of events.
    pub fn with_backend(path: impl AsRef<Path>, backend: impl WatchBackend) -> Self {
        Self::with_options(path, backend, WatchOptions::default())
    }

    pub fn with_options(
        path: impl AsRef<Path>,
        backend: impl WatchBackend,
        options: WatchOptions,
    ) -> Self {
        let (path, dir) = resolve(path.as_ref());
        tracing::debug!(path = %path.display(), "Creating config watcher");

        let initial = load_config(&path);
        tracing::info!(path = %path.display(), log_level = %initial.log_level, "Config loaded successfully");

        let shared = Arc::new(Shared {
            canonical_dir: std::fs::canonicalize(&dir).ok(),
            path,
            dir,
            current: ArcSwap::from_pointee(initial),
            callbacks: RwLock::new(Vec::new()),
            cycle: Mutex::new(()),
            mode: AtomicU8::new(WatchMode::CacheOnly as u8),
        });

        let task = match spawn_watch_loop(&shared, backend, options) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %shared.path.display(),
                    watching_dir = %shared.dir.display(),
                    "Failed to watch config directory, serving cached config only"
                );
                None
            }
        };

        Self { shared, task }
    }

    /// Current config. Never touches the filesystem.
    pub fn load_config(&self) -> Arc<Config> {
        self.shared.current.load_full()
    }

    /// Register a callback for every subsequent reload.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: Fn(Arc<Config>) + Send + Sync + 'static,
    {
        let mut callbacks = self
            .shared
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        callbacks.push(Arc::new(callback));
        tracing::debug!(total_callbacks = callbacks.len(), "Added config callback");
    }

    /// Register a callback and invoke it once with the current config.
    ///
    /// Runs under the reload cycle lock, so no reload can land between the
    /// registration and the initial call and leave the observer stale.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(Arc<Config>) + Send + Sync + 'static,
    {
        let _cycle = self.shared.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        let callback: Callback = Arc::new(callback);
        self.add_callback({
            let callback = Arc::clone(&callback);
            move |config| callback(config)
        });
        callback(self.load_config());
    }

    /// Reload the file now and notify every callback.
    ///
    /// The background loop calls this on each qualifying change; it is
    /// public for manual triggers such as a SIGHUP handler.
    pub fn reload_and_notify(&self) {
        self.shared.reload_and_notify();
    }

    /// Absolute path of the tracked file.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn mode(&self) -> WatchMode {
        self.shared.mode()
    }

    pub fn callback_count(&self) -> usize {
        self.shared
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("path", &self.shared.path)
            .field("mode", &self.shared.mode())
            .field("config", &self.shared.current.load_full())
            .finish()
    }
}

/// Make `path` absolute and pick the directory to watch.
fn resolve(path: &Path) -> (PathBuf, PathBuf) {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    (path, dir)
}

fn spawn_watch_loop(
    shared: &Arc<Shared>,
    backend: impl WatchBackend,
    options: WatchOptions,
) -> Result<JoinHandle<()>, WatchError> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
    let channels = backend.watch(&shared.dir)?;

    shared.set_mode(WatchMode::Live);
    tracing::debug!(
        path = %shared.path.display(),
        watching_dir = %shared.dir.display(),
        "File watcher started successfully"
    );

    Ok(runtime.spawn(watch_loop(Arc::clone(shared), channels, options.settle)))
}

async fn watch_loop(shared: Arc<Shared>, mut channels: WatchChannels, settle: Duration) {
    loop {
        tokio::select! {
            event = channels.events.recv() => {
                let Some(event) = event else {
                    tracing::debug!(path = %shared.path.display(), "File watcher events channel closed");
                    break;
                };
                if !event.kind.triggers_reload() || !shared.is_tracked(&event.path) {
                    continue;
                }

                tracing::info!(path = %shared.path.display(), event = ?event.kind, "Config file change detected");
                let open = absorb_burst(&mut channels.events, settle).await;
                shared.reload_and_notify();

                if !open {
                    tracing::debug!(path = %shared.path.display(), "File watcher events channel closed");
                    break;
                }
            }
            error = channels.errors.recv() => {
                let Some(error) = error else {
                    tracing::debug!(path = %shared.path.display(), "File watcher errors channel closed");
                    break;
                };
                tracing::error!(error = %error, path = %shared.path.display(), "File watcher error");
            }
        }
    }

    shared.set_mode(WatchMode::Stopped);
}

/// Drain events arriving within `settle`. Returns `false` once the channel
/// is closed.
async fn absorb_burst(events: &mut mpsc::UnboundedReceiver<FsEvent>, settle: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + settle;
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(_)) => continue,
            Ok(None) => return false,
            Err(_) => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;
    use notify::event::{AccessKind, AccessMode, CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::fs;

    fn failing_backend(_dir: &Path) -> Result<WatchChannels, WatchError> {
        Err(WatchError::Backend("simulated watcher creation failure".into()))
    }

    #[test]
    fn test_classify_notify_events() {
        let cases = [
            (EventKind::Create(CreateKind::File), FsEventKind::Create),
            (EventKind::Modify(ModifyKind::Data(DataChange::Content)), FsEventKind::Write),
            (EventKind::Modify(ModifyKind::Any), FsEventKind::Write),
            (EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)), FsEventKind::Chmod),
            (EventKind::Modify(ModifyKind::Name(RenameMode::From)), FsEventKind::Rename),
            (EventKind::Modify(ModifyKind::Name(RenameMode::To)), FsEventKind::Create),
            (EventKind::Remove(RemoveKind::File), FsEventKind::Remove),
            (EventKind::Access(AccessKind::Close(AccessMode::Write)), FsEventKind::Other),
        ];
        for (kind, expected) in cases {
            assert_eq!(classify(&kind, 0), expected, "{kind:?}");
        }
    }

    #[test]
    fn test_rename_both_splits_source_and_target() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/etc/app/config.json.tmp"))
            .add_path(PathBuf::from("/etc/app/config.json"));

        let events = FsEvent::from_notify(event);
        assert_eq!(
            events,
            vec![
                FsEvent::new("/etc/app/config.json.tmp", FsEventKind::Rename),
                FsEvent::new("/etc/app/config.json", FsEventKind::Create),
            ]
        );
    }

    #[test]
    fn test_resolve_bare_file_name() {
        let (path, dir) = resolve(Path::new("http-config.json"));
        assert!(path.is_absolute());
        assert!(path.ends_with("http-config.json"));
        assert_eq!(path.parent(), Some(dir.as_path()));

        let (path, dir) = resolve(Path::new("/srv/app/config.json"));
        assert_eq!(path, PathBuf::from("/srv/app/config.json"));
        assert_eq!(dir, PathBuf::from("/srv/app"));
    }

    #[test]
    fn test_no_runtime_degrades_to_cache_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"log_level":"WARN"}"#).unwrap();

        let watcher = ConfigWatcher::new(&path);
        assert_eq!(watcher.mode(), WatchMode::CacheOnly);
        assert_eq!(watcher.load_config().log_level, LogLevel::Warn);
    }

    #[test]
    fn test_tracked_path_matching() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let watcher = ConfigWatcher::with_backend(&path, failing_backend);
        let shared = &watcher.shared;

        assert!(shared.is_tracked(&path));
        assert!(shared.is_tracked(&dir.path().join(".").join("config.json")));
        assert!(!shared.is_tracked(&dir.path().join("other.json")));
        assert!(!shared.is_tracked(&dir.path().join("nested").join("config.json")));
        if let Some(canonical) = &shared.canonical_dir {
            assert!(shared.is_tracked(&canonical.join("config.json")));
        }
    }

    #[test]
    fn test_panicking_callback_does_not_stop_fan_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let watcher = ConfigWatcher::with_backend(&path, failing_backend);

        let seen = Arc::new(Mutex::new(Vec::new()));
        watcher.add_callback(|_| panic!("observer bug"));
        let s = seen.clone();
        watcher.add_callback(move |cfg| s.lock().unwrap().push(cfg.log_level));

        fs::write(&path, r#"{"log_level":"ERROR"}"#).unwrap();
        watcher.reload_and_notify();
        fs::write(&path, r#"{"log_level":"DEBUG"}"#).unwrap();
        watcher.reload_and_notify();

        assert_eq!(*seen.lock().unwrap(), vec![LogLevel::Error, LogLevel::Debug]);
    }

    #[test]
    fn test_subscribe_is_not_missed_by_concurrent_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"log_level":"WARN"}"#).unwrap();

        for _ in 0..50 {
            let watcher = ConfigWatcher::with_backend(&path, failing_backend);
            fs::write(&path, r#"{"log_level":"DEBUG"}"#).unwrap();

            let seen = Arc::new(Mutex::new(Vec::new()));
            std::thread::scope(|s| {
                s.spawn(|| watcher.reload_and_notify());
                let seen = seen.clone();
                watcher.subscribe(move |cfg| seen.lock().unwrap().push(cfg.log_level));
            });

            assert_eq!(seen.lock().unwrap().last(), Some(&LogLevel::Debug));
            fs::write(&path, r#"{"log_level":"WARN"}"#).unwrap();
        }
    }

    #[test]
    fn test_callback_may_register_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let watcher = Arc::new(ConfigWatcher::with_backend(&path, failing_backend));

        let w = Arc::downgrade(&watcher);
        watcher.add_callback(move |_| {
            if let Some(w) = w.upgrade() {
                w.add_callback(|_| {});
            }
        });

        watcher.reload_and_notify();
        assert_eq!(watcher.callback_count(), 2);

        // The callback added during the first cycle runs from the second on.
        watcher.reload_and_notify();
        assert_eq!(watcher.callback_count(), 3);
    }
}
