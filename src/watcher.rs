//! Recursive directory watcher that reports created, modified and settled
//! files matching a set of glob patterns.

use crate::error::WatcherError;
use crate::listener::{self, Listener, ListenerKind, ListenerRegistry, WatchEvent};
use crate::quiescence::{QuiescenceTracker, SweepHandle, Sweeper};
use glob::{MatchOptions, Pattern};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub root: PathBuf,
    /// Matched against the file name only. An empty list matches every file.
    pub patterns: Vec<String>,
    pub case_sensitive: bool,
    pub silence_threshold: Duration,
    pub sweep_interval: Duration,
}

impl WatchConfig {
    /// Sweep period actually used. Zero is raised to one millisecond.
    pub fn effective_sweep_interval(&self) -> Duration {
        self.sweep_interval.max(MIN_SWEEP_INTERVAL)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./"),
            patterns: Vec::new(),
            case_sensitive: true,
            silence_threshold: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternMatcher {
    patterns: Vec<Pattern>,
    options: MatchOptions,
}

impl PatternMatcher {
    pub fn new(patterns: &[String], case_sensitive: bool) -> Result<Self, WatcherError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|source| WatcherError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            options: MatchOptions {
                case_sensitive,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|pattern| pattern.matches_with(name, self.options))
    }
}

/// State shared between the caller, the notify thread and the sweeper.
struct Shared {
    state: RwLock<WatcherState>,
    listeners: Arc<RwLock<ListenerRegistry>>,
    tracker: Arc<QuiescenceTracker>,
}

impl Shared {
    /// Dispatches one raw notify event. Holds the state read lock so a
    /// concurrent `stop` cannot change state mid-dispatch.
    fn handle(&self, matcher: &PatternMatcher, event: Event) {
        let state = self.state.read();
        if *state == WatcherState::Idle {
            return;
        }
        for watch_event in translate(event) {
            if !matcher.matches(&watch_event.path) || watch_event.path.is_dir() {
                continue;
            }
            self.dispatch(watch_event);
        }
    }

    fn dispatch(&self, event: WatchEvent) {
        match event.kind {
            listener::WatchEventKind::Created => {
                tracing::debug!(path = %event.path.display(), "file created");
                let listeners = self.snapshot(ListenerKind::Created);
                listener::invoke_all(&listeners, ListenerKind::Created, &event);
            }
            listener::WatchEventKind::Modified => {
                let listeners = self.snapshot(ListenerKind::Modified);
                listener::invoke_all(&listeners, ListenerKind::Modified, &event);
                if self.tracker.touch(event) {
                    tracing::debug!("pending files, sweeper active");
                }
            }
        }
    }

    fn snapshot(&self, kind: ListenerKind) -> Vec<Listener> {
        self.listeners.read().listeners(kind).to_vec()
    }
}

/// Maps a raw notify event to the created/modified events we care about.
/// The destination of a rename counts as a modification. Backends that pair
/// renames report `To` and then `Both` for the same move; only `To` is kept.
fn translate(event: Event) -> Vec<WatchEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().map(WatchEvent::created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From | RenameMode::Both)) => Vec::new(),
        EventKind::Modify(_) => event.paths.into_iter().map(WatchEvent::modified).collect(),
        _ => Vec::new(),
    }
}

struct Session {
    watcher: RecommendedWatcher,
    sweep: SweepHandle,
}

pub struct PathWatcher {
    config: WatchConfig,
    shared: Arc<Shared>,
    session: Option<Session>,
}

impl PathWatcher {
    pub fn new(config: WatchConfig) -> Self {
        let tracker = Arc::new(QuiescenceTracker::new(config.silence_threshold));
        Self {
            config,
            shared: Arc::new(Shared {
                state: RwLock::new(WatcherState::Idle),
                listeners: Arc::new(RwLock::new(ListenerRegistry::new())),
                tracker,
            }),
            session: None,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Replaces the watch configuration. Only allowed while idle.
    pub fn configure(&mut self, config: WatchConfig) -> Result<(), WatcherError> {
        if self.state() != WatcherState::Idle {
            return Err(WatcherError::AlreadyWatching);
        }
        if config.silence_threshold != self.shared.tracker.silence_threshold() {
            self.shared = Arc::new(Shared {
                state: RwLock::new(WatcherState::Idle),
                listeners: Arc::clone(&self.shared.listeners),
                tracker: Arc::new(QuiescenceTracker::new(config.silence_threshold)),
            });
        }
        self.config = config;
        Ok(())
    }

    pub fn set_root(&mut self, root: impl Into<PathBuf>) -> Result<(), WatcherError> {
        let mut config = self.config.clone();
        config.root = root.into();
        self.configure(config)
    }

    pub fn register<F>(&self, kind: ListenerKind, listener: F)
    where
        F: Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.listeners.write().register(kind, Arc::new(listener));
    }

    pub fn state(&self) -> WatcherState {
        *self.shared.state.read_recursive()
    }

    pub fn is_watching(&self) -> bool {
        self.state() == WatcherState::Watching
    }

    pub fn pending_len(&self) -> usize {
        self.shared.tracker.pending_len()
    }

    pub fn start(&mut self) -> Result<(), WatcherError> {
        if self.state() != WatcherState::Idle {
            return Err(WatcherError::AlreadyWatching);
        }
        let matcher = PatternMatcher::new(&self.config.patterns, self.config.case_sensitive)?;
        let root = &self.config.root;
        fs::create_dir_all(root).map_err(|source| WatcherError::CreateRoot {
            path: root.clone(),
            source,
        })?;

        let sweep = Sweeper::spawn(
            Arc::clone(&self.shared.tracker),
            Arc::clone(&self.shared.listeners),
            self.config.effective_sweep_interval(),
        )
        .map_err(|source| WatcherError::Notify(notify::Error::io(source)))?;

        let shared = Arc::clone(&self.shared);
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => shared.handle(&matcher, event),
                Err(err) => tracing::error!(error = %err, "file watcher error"),
            }
        });
        let mut watcher = match watcher {
            Ok(watcher) => watcher,
            Err(err) => {
                abort_sweep(sweep);
                return Err(err.into());
            }
        };

        // Set before subscribing so the first events are not dropped.
        *self.shared.state.write() = WatcherState::Watching;
        if let Err(err) = watcher.watch(root, RecursiveMode::Recursive) {
            *self.shared.state.write() = WatcherState::Idle;
            abort_sweep(sweep);
            return Err(err.into());
        }

        tracing::info!(
            root = %root.display(),
            patterns = ?self.config.patterns,
            "watching for downloads"
        );
        self.session = Some(Session { watcher, sweep });
        Ok(())
    }

    /// Waits for every pending file to settle, then releases the OS
    /// subscription. No listener runs after this returns.
    pub fn stop(&mut self) -> Result<(), WatcherError> {
        let Some(session) = self.session.take() else {
            return Err(WatcherError::NotWatching);
        };
        tracing::info!(pending = self.pending_len(), "shutting down file observation");
        *self.shared.state.write() = WatcherState::Stopping;

        let joined = session.sweep.stop();

        *self.shared.state.write() = WatcherState::Idle;
        let dropped = self.shared.tracker.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded events that arrived after the final sweep");
        }
        drop(session.watcher);

        joined.map_err(|_| WatcherError::SweepPanicked)
    }
}

/// Stops a sweeper whose session failed to start. Returns false if the
/// sweep thread had panicked.
fn abort_sweep(sweep: SweepHandle) -> bool {
    match sweep.stop() {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!("sweep thread panicked while aborting start");
            false
        }
    }
}

impl Drop for PathWatcher {
    fn drop(&mut self) {
        if self.session.is_some() {
            let _ = self.stop();
        }
    }
}
