use anyhow::Result;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use ytclip::{ListenerKind, PathWatcher, WatchConfig, WatchEvent, WatcherState};

fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    done()
}

fn recorder() -> (Arc<Mutex<Vec<PathBuf>>>, impl Fn(&WatchEvent) -> Result<()> + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |event: &WatchEvent| -> Result<()> {
        sink.lock().push(event.path.clone());
        Ok(())
    })
}

#[test]
fn growing_file_settles_once_after_writes_stop() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path().join("downloads");
    let mut watcher = PathWatcher::new(WatchConfig {
        root: root.clone(),
        patterns: vec!["*.mp3".to_string()],
        case_sensitive: true,
        silence_threshold: Duration::from_millis(300),
        sweep_interval: Duration::from_millis(25),
    });
    let (settled, on_settled) = recorder();
    let (created, on_created) = recorder();
    watcher.register(ListenerKind::Settled, on_settled);
    watcher.register(ListenerKind::Created, on_created);
    watcher.start()?;
    assert_eq!(watcher.state(), WatcherState::Watching);

    let collection = root.join("Mix");
    fs::create_dir_all(&collection)?;
    thread::sleep(Duration::from_millis(200));

    let target = collection.join("Song-abc.mp3");
    let ignored = collection.join("Song-abc.txt");
    fs::write(&ignored, b"notes")?;
    let mut file = OpenOptions::new().create(true).append(true).open(&target)?;
    for _ in 0..5 {
        file.write_all(&[0u8; 1024])?;
        file.flush()?;
        thread::sleep(Duration::from_millis(50));
    }
    drop(file);

    assert!(wait_for(Duration::from_secs(5), || !settled.lock().is_empty()));
    thread::sleep(Duration::from_millis(600));
    assert_eq!(settled.lock().as_slice(), [target.clone()]);
    assert!(created.lock().contains(&target));
    assert!(!created.lock().contains(&ignored));

    watcher.stop()?;
    assert!(!watcher.is_watching());
    assert_eq!(watcher.pending_len(), 0);
    Ok(())
}

#[test]
fn stop_waits_for_pending_files() -> Result<()> {
    let dir = tempdir()?;
    let mut watcher = PathWatcher::new(WatchConfig {
        root: dir.path().to_path_buf(),
        patterns: Vec::new(),
        case_sensitive: true,
        silence_threshold: Duration::from_millis(150),
        sweep_interval: Duration::from_millis(100),
    });
    let (settled, on_settled) = recorder();
    watcher.register(ListenerKind::Settled, on_settled);
    watcher.start()?;

    let target = dir.path().join("track.m4a");
    fs::write(&target, b"data")?;
    assert!(wait_for(Duration::from_secs(2), || watcher.pending_len() > 0));

    watcher.stop()?;
    assert_eq!(settled.lock().as_slice(), [target]);
    assert_eq!(watcher.state(), WatcherState::Idle);
    Ok(())
}

#[test]
fn renamed_partial_download_is_modified_once() -> Result<()> {
    let dir = tempdir()?;
    let mut watcher = PathWatcher::new(WatchConfig {
        root: dir.path().to_path_buf(),
        patterns: vec!["*.mp3".to_string()],
        case_sensitive: true,
        silence_threshold: Duration::from_millis(150),
        sweep_interval: Duration::from_millis(100),
    });
    let (modified, on_modified) = recorder();
    let (settled, on_settled) = recorder();
    watcher.register(ListenerKind::Modified, on_modified);
    watcher.register(ListenerKind::Settled, on_settled);
    watcher.start()?;

    let partial = dir.path().join("a.part");
    let target = dir.path().join("a.mp3");
    fs::write(&partial, b"audio")?;
    fs::rename(&partial, &target)?;
    assert!(wait_for(Duration::from_secs(2), || watcher.pending_len() > 0));

    watcher.stop()?;
    assert_eq!(modified.lock().as_slice(), [target.clone()]);
    assert_eq!(settled.lock().as_slice(), [target]);
    Ok(())
}
