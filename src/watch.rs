//! Hot reload and file watching support.
//!
//! When a watched file changes (or a poll interval elapses) the whole load
//! pipeline runs again. A successful load replaces the current value; a
//! failed one keeps the previous value and reports the errors.
//!
//! This module is only available with the `watch` feature enabled.
//!
//! # Example
//!
//! ```ignore
//! use cairn::prelude::*;
//!
//! let (config, watcher) = Config::<AppConfig>::builder()
//!     .source(File::new("config.toml"))
//!     .source(Env::prefix("APP_"))
//!     .poll_interval(Duration::from_secs(30))
//!     .build_watched()?;
//!
//! let current = config.current();
//!
//! watcher.on_change(|event| match event {
//!     ConfigEvent::Reloaded { changed_sources } => println!("reloaded from {:?}", changed_sources),
//!     ConfigEvent::ReloadFailed { errors } => eprintln!("reload failed: {:?}", errors),
//!     _ => {}
//! });
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use stillwater::Validation;

use crate::config::ConfigBuilder;
use crate::describe::Describe;
use crate::env::ConfigEnv;
use crate::error::{ConfigError, ConfigErrors, LoadError, SourceErrorKind};

const DEBOUNCE: Duration = Duration::from_millis(100);
const TICK: Duration = Duration::from_millis(50);

/// Events emitted during configuration watching.
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// Configuration was successfully reloaded.
    Reloaded {
        /// What triggered the reload: changed paths, `poll` or `manual`.
        changed_sources: Vec<String>,
    },
    /// A reload failed; the previous value stays current.
    ReloadFailed { errors: Vec<String> },
    /// A source file changed (before reload attempt).
    SourceChanged { path: PathBuf },
    /// Watcher encountered an error.
    WatchError { message: String },
}

/// Fans events out to every subscriber.
#[derive(Clone)]
struct EventSender {
    senders: Arc<RwLock<Vec<mpsc::Sender<ConfigEvent>>>>,
}

impl EventSender {
    fn new() -> Self {
        Self {
            senders: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn send(&self, event: ConfigEvent) {
        let mut senders = self.senders.write().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|sender| sender.send(event.clone()).is_ok());
    }

    fn subscribe(&self) -> mpsc::Receiver<ConfigEvent> {
        let (tx, rx) = mpsc::channel();
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }
}

/// Configuration that can be hot-reloaded.
///
/// Use `current()` to get the latest value.
pub struct WatchedConfig<T> {
    current: Arc<RwLock<Arc<T>>>,
}

impl<T> WatchedConfig<T> {
    /// The current value (cheap Arc clone). Only a successful reload
    /// replaces it.
    pub fn current(&self) -> Arc<T> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<T> Clone for WatchedConfig<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

type ReloadFn = Box<dyn Fn() -> Result<(), ConfigErrors> + Send + Sync>;

/// Handle on the background reload thread.
///
/// Dropping it stops watching.
pub struct ConfigWatcher {
    _watcher: Option<RecommendedWatcher>,
    stop_signal: Arc<AtomicBool>,
    event_sender: EventSender,
    reload_fn: ReloadFn,
}

impl ConfigWatcher {
    /// Subscribe to configuration events.
    pub fn subscribe(&self) -> mpsc::Receiver<ConfigEvent> {
        self.event_sender.subscribe()
    }

    /// Call `callback` for each event on a dedicated thread.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(ConfigEvent) + Send + 'static,
    {
        let rx = self.subscribe();
        std::thread::spawn(move || {
            while let Ok(event) = rx.recv() {
                callback(event);
            }
        });
    }

    /// Stop watching for changes.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Run the pipeline now.
    ///
    /// On failure the previous value is preserved and the errors returned.
    pub fn reload(&self) -> Result<(), ConfigErrors> {
        (self.reload_fn)()
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reruns a builder against a fixed environment and swaps the result in.
struct Reloader<T> {
    builder: Arc<ConfigBuilder<T>>,
    env: Arc<dyn ConfigEnv>,
    current: Arc<RwLock<Arc<T>>>,
    event_sender: EventSender,
}

impl<T> Clone for Reloader<T> {
    fn clone(&self) -> Self {
        Self {
            builder: Arc::clone(&self.builder),
            env: Arc::clone(&self.env),
            current: Arc::clone(&self.current),
            event_sender: self.event_sender.clone(),
        }
    }
}

impl<T> Reloader<T>
where
    T: DeserializeOwned + Describe + Send + Sync + 'static,
{
    fn reload(&self, trigger: Vec<String>) -> Result<(), ConfigErrors> {
        match self.builder.load_with_env(self.env.as_ref()) {
            Validation::Success(value) => {
                *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(value);
                tracing::debug!(trigger = ?trigger, "configuration reloaded");
                self.event_sender.send(ConfigEvent::Reloaded {
                    changed_sources: trigger,
                });
                Ok(())
            }
            Validation::Failure(errors) => {
                tracing::warn!(errors = errors.len(), "reload failed, keeping previous configuration");
                self.event_sender.send(ConfigEvent::ReloadFailed {
                    errors: errors.iter().map(|e| e.to_string()).collect(),
                });
                Err(errors)
            }
        }
    }
}

/// Load once, then keep the value current.
///
/// The initial load must succeed. `File` sources backed by a path are
/// watched; with a poll interval the pipeline also reruns on that schedule.
pub fn build_watched<T>(
    builder: ConfigBuilder<T>,
    env: Arc<dyn ConfigEnv>,
) -> Result<(WatchedConfig<T>, ConfigWatcher), LoadError>
where
    T: DeserializeOwned + Describe + Send + Sync + 'static,
{
    let type_name = T::describe().type_name();
    let initial = match builder.load_with_env(env.as_ref()) {
        Validation::Success(value) => value,
        Validation::Failure(errors) => return Err(LoadError::new(type_name, errors)),
    };

    let current = Arc::new(RwLock::new(Arc::new(initial)));
    let event_sender = EventSender::new();
    let stop_signal = Arc::new(AtomicBool::new(false));
    let watch_paths = builder.watch_paths();
    let poll = builder.polling();

    let (changed_tx, changed_rx) = mpsc::channel();
    let watcher = if watch_paths.is_empty() {
        None
    } else {
        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    for path in event.paths {
                        let _ = changed_tx.send(path);
                    }
                }
            }
        })
        .map_err(|e| {
            LoadError::new(
                type_name.clone(),
                ConfigErrors::single(ConfigError::SourceError {
                    source_name: "watcher".into(),
                    kind: SourceErrorKind::Other {
                        message: e.to_string(),
                    },
                }),
            )
        })?;
        for path in &watch_paths {
            if let Err(e) = watcher.watch(path, RecursiveMode::NonRecursive) {
                // The file might appear later; a poll interval still covers it.
                event_sender.send(ConfigEvent::WatchError {
                    message: format!("failed to watch {}: {}", path.display(), e),
                });
            }
        }
        Some(watcher)
    };

    let reloader = Reloader {
        builder: Arc::new(builder),
        env,
        current: Arc::clone(&current),
        event_sender: event_sender.clone(),
    };
    spawn_reload_handler(reloader.clone(), changed_rx, Arc::clone(&stop_signal), poll);

    let reload_fn: ReloadFn = Box::new(move || reloader.reload(vec!["manual".to_string()]));
    Ok((
        WatchedConfig { current },
        ConfigWatcher {
            _watcher: watcher,
            stop_signal,
            event_sender,
            reload_fn,
        },
    ))
}

fn spawn_reload_handler<T>(
    reloader: Reloader<T>,
    changed_rx: mpsc::Receiver<PathBuf>,
    stop_signal: Arc<AtomicBool>,
    poll: Option<Duration>,
) where
    T: DeserializeOwned + Describe + Send + Sync + 'static,
{
    std::thread::spawn(move || {
        let mut last_reload = Instant::now();
        let mut last_poll = Instant::now();
        let mut watching = true;

        while !stop_signal.load(Ordering::SeqCst) {
            if watching {
                match changed_rx.recv_timeout(TICK) {
                    Ok(path) => {
                        if last_reload.elapsed() >= DEBOUNCE {
                            reloader
                                .event_sender
                                .send(ConfigEvent::SourceChanged { path: path.clone() });
                            let _ = reloader.reload(vec![path.display().to_string()]);
                            last_reload = Instant::now();
                        }
                        continue;
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => watching = false,
                }
            } else {
                std::thread::sleep(TICK);
            }

            match poll {
                Some(interval) if last_poll.elapsed() >= interval => {
                    let _ = reloader.reload(vec!["poll".to_string()]);
                    last_poll = Instant::now();
                    last_reload = last_poll;
                }
                Some(_) => {}
                None if !watching => break,
                None => {}
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::{FieldDesc, RecordDesc, TypeDesc};
    use crate::env::{MockEnv, RealEnv};
    use crate::sources::{File, PartialDefaults};
    use crate::Config;

    #[derive(Debug, Clone, serde::Deserialize)]
    struct WatchTestConfig {
        host: String,
        port: i64,
    }

    impl Describe for WatchTestConfig {
        fn describe() -> TypeDesc {
            TypeDesc::Record(
                RecordDesc::new("WatchTestConfig")
                    .field(FieldDesc::new("host", String::describe()))
                    .field(FieldDesc::new("port", i64::describe())),
            )
        }
    }

    #[test]
    fn test_event_sender_multiple_subscribers() {
        let sender = EventSender::new();
        let rx1 = sender.subscribe();
        let rx2 = sender.subscribe();

        sender.send(ConfigEvent::WatchError {
            message: "test error".to_string(),
        });

        for rx in [rx1, rx2] {
            match rx.recv_timeout(Duration::from_millis(100)).unwrap() {
                ConfigEvent::WatchError { message } => assert_eq!(message, "test error"),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_event_sender_drops_closed_channels() {
        let sender = EventSender::new();
        drop(sender.subscribe());
        let rx = sender.subscribe();
        sender.send(ConfigEvent::WatchError {
            message: "x".to_string(),
        });
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_ok());
        assert_eq!(sender.senders.read().unwrap().len(), 1);
    }

    #[test]
    fn test_manual_reload_without_files() {
        let (watched, watcher) = Config::<WatchTestConfig>::builder()
            .source(PartialDefaults::new().set("host", "localhost").set("port", 8080))
            .build_watched_with_env(Arc::new(MockEnv::new()))
            .unwrap();
        let rx = watcher.subscribe();

        assert_eq!(watched.current().host, "localhost");
        assert!(watcher.reload().is_ok());
        match rx.recv_timeout(Duration::from_millis(500)).unwrap() {
            ConfigEvent::Reloaded { changed_sources } => assert_eq!(changed_sources, vec!["manual"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_initial_failure_is_a_load_error() {
        let err = Config::<WatchTestConfig>::builder()
            .source(PartialDefaults::new().set("host", "localhost"))
            .build_watched_with_env(Arc::new(MockEnv::new()))
            .err()
            .unwrap();
        assert_eq!(err.type_name(), "WatchTestConfig");
    }

    #[test]
    fn test_file_change_reloads_and_bad_change_keeps_old_value() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "host = \"localhost\"\nport = 8080\n").unwrap();

        let (watched, watcher) = Config::<WatchTestConfig>::builder()
            .source(File::new(&config_path))
            .build_watched_with_env(Arc::new(RealEnv::new()))
            .unwrap();
        let rx = watcher.subscribe();
        assert_eq!(watched.current().port, 8080);

        std::thread::sleep(Duration::from_millis(150));
        std::fs::write(&config_path, "host = \"example.com\"\nport = 9090\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && watched.current().port != 9090 {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(watched.current().host, "example.com");

        std::thread::sleep(Duration::from_millis(150));
        std::fs::write(&config_path, "host = \"broken\"\nport = \"nope\"\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut failed = false;
        while Instant::now() < deadline && !failed {
            if let Ok(ConfigEvent::ReloadFailed { .. }) = rx.recv_timeout(Duration::from_millis(100)) {
                failed = true;
            }
        }
        assert!(failed);
        assert_eq!(watched.current().port, 9090);
    }
}
