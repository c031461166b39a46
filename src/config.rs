use crate::audio::EncoderConfig;
use crate::downloader::DownloaderConfig;
use crate::storage;
use crate::watcher::WatchConfig;
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub temporary_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub patterns: Vec<String>,
    pub case_sensitive: bool,
    /// A file counts as finished after this long without modifications.
    pub silence_threshold_ms: u64,
    pub sweep_interval_ms: u64,
    pub keep_temporary: bool,
    pub downloader: DownloaderConfig,
    pub encoder: EncoderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temporary_dir: PathBuf::from("./download_temporary_data/"),
            processed_dir: PathBuf::from("./files/"),
            patterns: vec!["*.mp3".to_string()],
            case_sensitive: true,
            silence_threshold_ms: 1000,
            sweep_interval_ms: 1000,
            keep_temporary: false,
            downloader: DownloaderConfig::default(),
            encoder: EncoderConfig::default(),
        }
    }
}

impl Config {
    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            root: self.temporary_dir.clone(),
            patterns: self.patterns.clone(),
            case_sensitive: self.case_sensitive,
            silence_threshold: Duration::from_millis(self.silence_threshold_ms),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }
}

pub const CONFIG_ENV: &str = "YTCLIP_CONFIG";

/// YAML file holding [`Config`]. Lives at `~/.config/ytclip.yaml` unless
/// `YTCLIP_CONFIG` points elsewhere.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new() -> Result<Self> {
        if let Some(path) = env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
            return Ok(Self::at(path));
        }
        let home = BaseDirs::new()
            .context("unable to resolve home directory")?
            .home_dir()
            .to_path_buf();
        Ok(Self::at(home.join(".config").join("ytclip.yaml")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means defaults; missing keys fall back field by field.
    pub fn load(&self) -> Result<Config> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("read config {}", self.path.display()));
            }
        };
        serde_yaml::from_str(&raw).with_context(|| format!("parse config {}", self.path.display()))
    }

    /// Writes a sibling temp file, then renames it over the config.
    pub fn save(&self, config: &Config) -> Result<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        storage::ensure_dir(dir)?;
        let yaml = serde_yaml::to_string(config).context("serialize config")?;
        let staging = self.path.with_extension("yaml.tmp");
        fs::write(&staging, yaml)
            .with_context(|| format!("write config {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("replace config {}", self.path.display()))
    }
}
