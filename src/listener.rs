use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Created,
            path: path.into(),
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Modified,
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Created,
    Modified,
    /// The file has not been modified for a full silence threshold.
    Settled,
}

pub type Listener = Arc<dyn Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync>;

/// Ordered callbacks per listener kind. Registration order is invocation order.
#[derive(Default, Clone)]
pub struct ListenerRegistry {
    created: Vec<Listener>,
    modified: Vec<Listener>,
    settled: Vec<Listener>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ListenerKind, listener: Listener) {
        self.list_mut(kind).push(listener);
    }

    pub fn listeners(&self, kind: ListenerKind) -> &[Listener] {
        match kind {
            ListenerKind::Created => &self.created,
            ListenerKind::Modified => &self.modified,
            ListenerKind::Settled => &self.settled,
        }
    }

    fn list_mut(&mut self, kind: ListenerKind) -> &mut Vec<Listener> {
        match kind {
            ListenerKind::Created => &mut self.created,
            ListenerKind::Modified => &mut self.modified,
            ListenerKind::Settled => &mut self.settled,
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("created", &self.created.len())
            .field("modified", &self.modified.len())
            .field("settled", &self.settled.len())
            .finish()
    }
}

/// Runs every listener in order. A listener that errors or panics is logged
/// and the remaining listeners still run. Returns the number of failures.
pub fn invoke_all(listeners: &[Listener], kind: ListenerKind, event: &WatchEvent) -> usize {
    let mut failures = 0;
    for (index, listener) in listeners.iter().enumerate() {
        match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                failures += 1;
                tracing::warn!(
                    ?kind,
                    index,
                    path = %event.path.display(),
                    error = %format!("{err:#}"),
                    "listener failed"
                );
            }
            Err(_) => {
                failures += 1;
                tracing::error!(
                    ?kind,
                    index,
                    path = %event.path.display(),
                    "listener panicked"
                );
            }
        }
    }
    failures
}
