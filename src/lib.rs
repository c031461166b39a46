pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod convert;
pub mod downloader;
pub mod error;
pub mod listener;
pub mod logging;
pub mod pipeline;
pub mod quiescence;
pub mod storage;
pub mod watcher;

pub use app::run;
pub use error::WatcherError;
pub use listener::{ListenerKind, WatchEvent, WatchEventKind};
pub use watcher::{PathWatcher, WatchConfig, WatcherState};
