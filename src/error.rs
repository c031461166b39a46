//! Watcher error types.

use std::path::PathBuf;

/// Errors reported by [`crate::watcher::PathWatcher`].
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// `start` or `configure` called while the watcher is not idle.
    #[error("watcher already active")]
    AlreadyWatching,

    /// `stop` called while the watcher is idle.
    #[error("watcher is not running")]
    NotWatching,

    /// A glob pattern could not be compiled.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// The watch root could not be created.
    #[error("create watch root {}: {source}", path.display())]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Notify backend error.
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The sweep thread panicked outside of a listener.
    #[error("sweep thread panicked")]
    SweepPanicked,
}
