//! Settle detection for files written by a process we do not control.
//!
//! Every modify event refreshes a per-path timestamp. A path whose timestamp
//! is older than the silence threshold is considered finished: its entry is
//! evicted and the settled listeners receive the last event seen for it.

use crate::listener::{self, Listener, ListenerKind, ListenerRegistry, WatchEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, select};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PendingFile {
    pub path: PathBuf,
    pub last_modified_at: Instant,
    pub last_event: WatchEvent,
}

#[derive(Debug)]
pub struct QuiescenceTracker {
    pending: Mutex<HashMap<PathBuf, PendingFile>>,
    silence_threshold: Duration,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl QuiescenceTracker {
    pub fn new(silence_threshold: Duration) -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            pending: Mutex::new(HashMap::new()),
            silence_threshold,
            wake_tx,
            wake_rx,
        }
    }

    pub fn silence_threshold(&self) -> Duration {
        self.silence_threshold
    }

    /// Records a modify event now. Returns true when this touch moved the
    /// tracker from empty to pending.
    pub fn touch(&self, event: WatchEvent) -> bool {
        self.touch_at(event, Instant::now())
    }

    pub fn touch_at(&self, event: WatchEvent, at: Instant) -> bool {
        let became_active = {
            let mut pending = self.pending.lock();
            let was_empty = pending.is_empty();
            let path = event.path.clone();
            pending.insert(
                path.clone(),
                PendingFile {
                    path,
                    last_modified_at: at,
                    last_event: event,
                },
            );
            was_empty
        };
        if became_active {
            // A full channel already carries a wake-up.
            let _ = self.wake_tx.try_send(());
        }
        became_active
    }

    /// Removes and returns every entry silent for longer than the threshold,
    /// oldest first.
    pub fn take_settled(&self, now: Instant) -> Vec<PendingFile> {
        let mut pending = self.pending.lock();
        let mut settled = Vec::new();
        pending.retain(|_, entry| {
            if now.saturating_duration_since(entry.last_modified_at) > self.silence_threshold {
                settled.push(entry.clone());
                false
            } else {
                true
            }
        });
        settled.sort_by_key(|entry| entry.last_modified_at);
        settled
    }

    /// Evicts settled entries and runs the listeners for each of them.
    /// Returns how many entries settled.
    pub fn settle(&self, now: Instant, listeners: &[Listener]) -> usize {
        let settled = self.take_settled(now);
        for entry in &settled {
            tracing::debug!(path = %entry.path.display(), "file settled");
            listener::invoke_all(listeners, ListenerKind::Settled, &entry.last_event);
        }
        settled.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn is_pending(&self, path: &std::path::Path) -> bool {
        self.pending.lock().contains_key(path)
    }

    /// Drops every pending entry. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut pending = self.pending.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    fn wake_receiver(&self) -> Receiver<()> {
        self.wake_rx.clone()
    }
}

/// Background loop that evaluates the tracker once per interval while
/// entries are pending and parks otherwise.
pub struct Sweeper {
    tracker: Arc<QuiescenceTracker>,
    listeners: Arc<RwLock<ListenerRegistry>>,
    interval: Duration,
    wake_rx: Receiver<()>,
    stop_rx: Receiver<()>,
}

pub struct SweepHandle {
    stop_tx: Sender<()>,
    join: thread::JoinHandle<()>,
}

impl SweepHandle {
    /// Asks the sweeper to drain and waits for it to exit. The thread keeps
    /// ticking until no entry is pending and one more quiet interval passed.
    pub fn stop(self) -> thread::Result<()> {
        let _ = self.stop_tx.send(());
        self.join.join()
    }
}

impl Sweeper {
    pub fn spawn(
        tracker: Arc<QuiescenceTracker>,
        listeners: Arc<RwLock<ListenerRegistry>>,
        interval: Duration,
    ) -> std::io::Result<SweepHandle> {
        let (stop_tx, stop_rx) = bounded(1);
        let sweeper = Sweeper {
            wake_rx: tracker.wake_receiver(),
            tracker,
            listeners,
            interval,
            stop_rx,
        };
        let join = thread::Builder::new()
            .name("ytclip-sweep".to_string())
            .spawn(move || sweeper.run())?;
        Ok(SweepHandle { stop_tx, join })
    }

    fn run(self) {
        tracing::debug!(interval = ?self.interval, "sweeper started");
        let mut stopping = false;
        loop {
            if !stopping && self.tracker.is_empty() {
                select! {
                    recv(self.wake_rx) -> _ => {}
                    recv(self.stop_rx) -> _ => {
                        stopping = true;
                    }
                }
            }

            if stopping {
                thread::sleep(self.interval);
            } else {
                match self.stop_rx.recv_timeout(self.interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        stopping = true;
                        continue;
                    }
                }
            }

            let listeners = self
                .listeners
                .read()
                .listeners(ListenerKind::Settled)
                .to_vec();
            self.tracker.settle(Instant::now(), &listeners);

            if stopping && self.tracker.is_empty() {
                break;
            }
        }
        tracing::debug!("sweeper stopped");
    }
}
