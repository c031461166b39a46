use crate::cli::{Cli, Commands, DownloadArgs, TrimArgs};
use crate::config::{Config, ConfigStore};
use crate::downloader::{DownloadProgress, DownloadStatus};
use crate::logging;
use crate::pipeline::{self, DownloadPipeline};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

pub fn run() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    match cli.command {
        None => run_download(cli.download),
        Some(Commands::Download(args)) => run_download(args),
        Some(Commands::Trim(args)) => run_trim(args),
        Some(Commands::Config) => print_config(),
    }
}

fn load_config() -> Result<Config> {
    let store = ConfigStore::new()?;
    let config = store.load()?;
    tracing::debug!(path = %store.path().display(), "loaded config");
    Ok(config)
}

fn apply_download_args(config: &mut Config, args: &DownloadArgs) {
    if let Some(dir) = &args.temporary_dir {
        config.temporary_dir = dir.clone();
    }
    if let Some(dir) = &args.processed_dir {
        config.processed_dir = dir.clone();
    }
    if args.keep_temporary {
        config.keep_temporary = true;
    }
}

fn run_download(args: DownloadArgs) -> Result<()> {
    let mut config = load_config()?;
    apply_download_args(&mut config, &args);
    let source = args
        .source
        .as_deref()
        .context("missing --source (video ID, playlist ID or URL)")?;
    let duration = args.duration.unwrap_or(0);
    tracing::info!(
        source,
        duration,
        temporary_dir = %config.temporary_dir.display(),
        processed_dir = %config.processed_dir.display(),
        "starting app"
    );

    let mut pipeline = DownloadPipeline::new(&config, duration);
    pipeline.convert_downloads()?;

    let pb = progress_bar();
    let result = pipeline.download(source, |update| report_progress(&pb, update));
    pb.finish_and_clear();

    match result {
        Ok(collections) => {
            tracing::info!(collections = ?collections, "download finished, waiting for conversions");
            pipeline.done()
        }
        Err(err) => {
            if let Err(done_err) = pipeline.done() {
                tracing::error!(error = %format!("{done_err:#}"), "cleanup after failed download");
            }
            Err(err)
        }
    }
}

fn run_trim(args: TrimArgs) -> Result<()> {
    let mut config = load_config()?;
    if let Some(dir) = args.temporary_dir {
        config.temporary_dir = dir;
    }
    if let Some(dir) = args.processed_dir {
        config.processed_dir = dir;
    }
    let written = pipeline::trim_collection(&config, &args.collection, args.duration)?;
    tracing::info!(collection = %args.collection, files = written.len(), "trim complete");
    Ok(())
}

fn print_config() -> Result<()> {
    let store = ConfigStore::new()?;
    let config = store.load()?;
    println!("# {}", store.path().display());
    print!("{}", serde_yaml::to_string(&config).context("serialize config")?);
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

fn report_progress(pb: &ProgressBar, update: DownloadProgress) {
    pb.set_position(update.percent.clamp(0.0, 100.0) as u64);
    if update.status == DownloadStatus::Finished {
        tracing::info!("Finished download.");
        pb.set_position(0);
    }
}
