//! Download, wait for each file to settle, then trim it into the processed
//! directory.

use crate::config::Config;
use crate::convert::Converter;
use crate::downloader::{DownloadProgress, Downloader};
use crate::listener::{ListenerKind, WatchEvent};
use crate::storage;
use crate::watcher::PathWatcher;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub type DoneHook = Box<dyn Fn(&Path) -> Result<()> + Send>;

pub struct DownloadPipeline {
    watcher: PathWatcher,
    downloader: Downloader,
    temporary_dir: PathBuf,
    done_hooks: Vec<DoneHook>,
}

impl DownloadPipeline {
    /// `duration` is in minutes; 0 keeps files whole.
    pub fn new(config: &Config, duration: u32) -> Self {
        Self::with_converter(
            config,
            duration,
            Converter::new(&config.processed_dir, config.encoder.clone()),
        )
    }

    pub fn with_converter(config: &Config, duration: u32, converter: Converter) -> Self {
        let temporary_dir = config.temporary_dir.clone();
        let watcher = PathWatcher::new(config.watch_config());

        let root = temporary_dir.clone();
        watcher.register(ListenerKind::Settled, move |event: &WatchEvent| {
            process_settled(&converter, &root, duration, event)
        });
        watcher.register(ListenerKind::Created, |event: &WatchEvent| {
            tracing::info!(path = %event.path.display(), "download started");
            Ok(())
        });

        let mut done_hooks: Vec<DoneHook> = Vec::new();
        if !config.keep_temporary {
            done_hooks.push(Box::new(|dir: &Path| {
                tracing::info!(dir = %dir.display(), "removing temporary downloads");
                storage::remove_dir(dir)
            }));
        }

        Self {
            watcher,
            downloader: Downloader::new(config.downloader.clone(), &temporary_dir),
            temporary_dir,
            done_hooks,
        }
    }

    pub fn watcher(&self) -> &PathWatcher {
        &self.watcher
    }

    pub fn add_done_hook<F>(&mut self, hook: F)
    where
        F: Fn(&Path) -> Result<()> + Send + 'static,
    {
        self.done_hooks.push(Box::new(hook));
    }

    /// Starts watching the temporary directory for finished downloads.
    pub fn convert_downloads(&mut self) -> Result<()> {
        self.watcher.start().context("start download watcher")
    }

    pub fn download<F>(&self, source: &str, progress: F) -> Result<Vec<String>>
    where
        F: FnMut(DownloadProgress),
    {
        self.downloader.download(source, progress)
    }

    /// Waits for pending files to be processed, then runs the done hooks.
    pub fn done(&mut self) -> Result<()> {
        if self.watcher.is_watching() {
            self.watcher.stop().context("stop download watcher")?;
        }
        for hook in &self.done_hooks {
            hook(&self.temporary_dir)?;
        }
        Ok(())
    }
}

fn process_settled(converter: &Converter, root: &Path, duration: u32, event: &WatchEvent) -> Result<()> {
    if !event.path.is_file() {
        tracing::debug!(path = %event.path.display(), "settled file is gone");
        return Ok(());
    }
    let (collection, filename) = storage::split_download_path(root, &event.path)?;
    let Some(clip) = converter.trim(&event.path, duration)? else {
        tracing::debug!(path = %event.path.display(), "not an audio file we handle");
        return Ok(());
    };
    let filename = converter.process_filename(&filename);
    let target = converter.write(&collection, &clip, &filename)?;
    tracing::info!(
        collection = %collection,
        target = %target.display(),
        "processed download"
    );
    Ok(())
}

/// Trims every handled file in one already downloaded collection folder.
pub fn trim_collection(config: &Config, collection: &str, duration: u32) -> Result<Vec<PathBuf>> {
    let converter = Converter::new(&config.processed_dir, config.encoder.clone());
    let dir = if collection == storage::NO_COLLECTION {
        config.temporary_dir.clone()
    } else {
        config.temporary_dir.join(collection)
    };
    tracing::info!(dir = %dir.display(), duration, "trimming collection");
    let mut written = Vec::new();
    for file in storage::list_files(&dir)? {
        let Some(clip) = converter.trim(&file, duration)? else {
            continue;
        };
        let filename = file
            .file_name()
            .context("collection entry has no file name")?
            .to_string_lossy()
            .into_owned();
        let filename = converter.process_filename(&filename);
        written.push(converter.write(collection, &clip, &filename)?);
    }
    Ok(written)
}
