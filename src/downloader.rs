//! Drives `yt-dlp` as a subprocess and reads its log output.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

const STDERR_TAIL: usize = 20;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DownloaderConfig {
    pub binary: String,
    pub audio_format: String,
    pub audio_quality: String,
    pub no_playlist: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            audio_format: "mp3".to_string(),
            audio_quality: "192K".to_string(),
            no_playlist: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Downloading,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub percent: f32,
    pub status: DownloadStatus,
}

/// Collects collection folder names from downloader log lines.
#[derive(Debug)]
pub struct DownloadLog {
    destination: Regex,
    progress: Regex,
    collections: Vec<String>,
}

impl DownloadLog {
    pub fn new(output_root: &Path) -> Result<Self> {
        let root = output_root.to_string_lossy();
        let root = root.trim_end_matches('/');
        let destination = Regex::new(&format!("{}/([^/]+)/", regex::escape(root)))
            .context("build destination pattern")?;
        let progress = Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)%")
            .context("build progress pattern")?;
        Ok(Self {
            destination,
            progress,
            collections: Vec::new(),
        })
    }

    /// Handles one stdout line. Returns the progress it reports, if any.
    pub fn debug(&mut self, msg: &str) -> Option<DownloadProgress> {
        if let Some(collection) = self.extract_collection(msg) {
            if !self.collections.contains(&collection) {
                tracing::info!(collection = %collection, "new download collection");
                self.collections.push(collection);
            }
        }
        tracing::debug!(line = msg, "downloader");
        self.parse_progress(msg)
    }

    pub fn warning(&self, msg: &str) {
        tracing::warn!(line = msg, "downloader");
    }

    pub fn error(&self, msg: &str) {
        tracing::error!(line = msg, "downloader");
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    pub fn into_collections(self) -> Vec<String> {
        self.collections
    }

    fn extract_collection(&self, msg: &str) -> Option<String> {
        if !(msg.contains("download") && msg.contains("Destination")) {
            return None;
        }
        self.destination
            .captures(msg)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn parse_progress(&self, msg: &str) -> Option<DownloadProgress> {
        if msg.starts_with("[download]") && msg.contains("has already been downloaded") {
            return Some(DownloadProgress {
                percent: 100.0,
                status: DownloadStatus::Finished,
            });
        }
        let caps = self.progress.captures(msg)?;
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let status = if percent >= 100.0 {
            DownloadStatus::Finished
        } else {
            DownloadStatus::Downloading
        };
        Some(DownloadProgress { percent, status })
    }
}

#[derive(Debug, Clone)]
pub struct Downloader {
    config: DownloaderConfig,
    output_root: PathBuf,
}

impl Downloader {
    pub fn new(config: DownloaderConfig, output_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            output_root: output_root.into(),
        }
    }

    pub fn output_template(&self) -> String {
        let root = self.output_root.to_string_lossy();
        format!(
            "{}/%(playlist_title)s/%(title)s-%(id)s.%(ext)s",
            root.trim_end_matches('/')
        )
    }

    pub fn args(&self, source: &str) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            self.config.audio_format.clone(),
            "--audio-quality".to_string(),
            self.config.audio_quality.clone(),
            "--restrict-filenames".to_string(),
            "--newline".to_string(),
            "-o".to_string(),
            self.output_template(),
        ];
        if self.config.no_playlist {
            args.push("--no-playlist".to_string());
        }
        args.push(source.to_string());
        args
    }

    /// Downloads `source` and returns the collection folders it wrote into,
    /// in first-seen order. No retry on failure.
    pub fn download<F>(&self, source: &str, mut progress: F) -> Result<Vec<String>>
    where
        F: FnMut(DownloadProgress),
    {
        let mut log = DownloadLog::new(&self.output_root)?;
        tracing::info!(source, binary = %self.config.binary, "starting download");
        let mut child = Command::new(&self.config.binary)
            .args(self.args(source))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {}", self.config.binary))?;

        let stderr = child.stderr.take().context("open downloader stderr")?;
        let stderr_reader = thread::spawn(move || {
            let mut lines = Vec::new();
            for line in BufReader::new(stderr).lines().map_while(std::result::Result::ok) {
                lines.push(line);
            }
            lines
        });

        let stdout = child.stdout.take().context("open downloader stdout")?;
        for line in BufReader::new(stdout).lines() {
            let line = line.context("read downloader output")?;
            if let Some(update) = log.debug(&line) {
                progress(update);
            }
        }

        let status = child.wait().context("wait for downloader")?;
        let stderr_lines = stderr_reader
            .join()
            .map_err(|_| anyhow::anyhow!("downloader stderr reader panicked"))?;
        for line in &stderr_lines {
            if line.starts_with("ERROR") {
                log.error(line);
            } else {
                log.warning(line);
            }
        }

        if !status.success() {
            let start = stderr_lines.len().saturating_sub(STDERR_TAIL);
            return Err(anyhow::anyhow!(
                "{} failed for {source} with status {status}: {}",
                self.config.binary,
                stderr_lines[start..].join("\n")
            ));
        }
        Ok(log.into_collections())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> DownloadLog {
        DownloadLog::new(Path::new("./download_temporary_data/")).expect("valid patterns")
    }

    #[test]
    fn extracts_collection_from_destination_lines() {
        let mut log = log();
        log.debug("[download] Destination: ./download_temporary_data/Chill_Mix/Song-abc123.webm");
        log.debug("[download] Destination: ./download_temporary_data/Chill_Mix/Other-def456.webm");
        log.debug("[download] Destination: ./download_temporary_data/NA/Single-xyz.webm");
        assert_eq!(log.collections(), ["Chill_Mix".to_string(), "NA".to_string()]);
    }

    #[test]
    fn ignores_lines_without_both_markers() {
        let mut log = log();
        log.debug("[ExtractAudio] Destination: Mix/Song-a.mp3");
        log.debug("[download] ./download_temporary_data/Mix/Song-a.webm");
        log.debug("[download] Destination: /elsewhere/Mix/Song-a.webm");
        log.debug("[youtube] abc123: Downloading webpage");
        assert!(log.collections().is_empty());
    }

    #[test]
    fn parses_progress_lines() {
        let log = log();
        assert_eq!(
            log.parse_progress("[download]  42.3% of 3.45MiB at 1.2MiB/s ETA 00:02"),
            Some(DownloadProgress {
                percent: 42.3,
                status: DownloadStatus::Downloading
            })
        );
        assert_eq!(
            log.parse_progress("[download] 100% of 3.45MiB in 00:00:03")
                .map(|p| p.status),
            Some(DownloadStatus::Finished)
        );
        assert_eq!(
            log.parse_progress("[download] ./x/Song.mp3 has already been downloaded")
                .map(|p| p.status),
            Some(DownloadStatus::Finished)
        );
        assert_eq!(log.parse_progress("[youtube] Extracting URL"), None);
    }

    #[test]
    fn args_carry_template_and_flags() {
        let downloader = Downloader::new(DownloaderConfig::default(), "./download_temporary_data/");
        let args = downloader.args("PL123");
        assert_eq!(
            downloader.output_template(),
            "./download_temporary_data/%(playlist_title)s/%(title)s-%(id)s.%(ext)s"
        );
        assert!(args.windows(2).any(|w| w[0] == "--audio-format" && w[1] == "mp3"));
        assert!(args.iter().any(|arg| arg == "--no-playlist"));
        assert!(args.iter().any(|arg| arg == "--restrict-filenames"));
        assert_eq!(args.last().map(String::as_str), Some("PL123"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_downloader_is_an_error() {
        let config = DownloaderConfig {
            binary: "false".to_string(),
            ..DownloaderConfig::default()
        };
        let err = Downloader::new(config, "/tmp/ytclip-test")
            .download("abc", |_| {})
            .unwrap_err();
        assert!(err.to_string().contains("failed for abc"));
    }

    #[test]
    fn missing_binary_is_an_error() {
        let config = DownloaderConfig {
            binary: "ytclip-no-such-downloader".to_string(),
            ..DownloaderConfig::default()
        };
        let err = Downloader::new(config, "/tmp/ytclip-test")
            .download("abc", |_| {})
            .unwrap_err();
        assert!(format!("{err:#}").contains("spawn ytclip-no-such-downloader"));
    }
}
