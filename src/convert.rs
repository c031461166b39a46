//! Trim and rename settled downloads into the processed directory.

use crate::audio::{self, AudioClip, EncoderConfig};
use crate::storage::{self, NO_COLLECTION};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type FilenameMap = Box<dyn Fn(&str) -> String + Send + Sync>;

pub struct Converter {
    output_dir: PathBuf,
    encoder: EncoderConfig,
    filename_maps: Vec<FilenameMap>,
}

impl Converter {
    pub fn new(output_dir: impl Into<PathBuf>, encoder: EncoderConfig) -> Self {
        Self {
            output_dir: output_dir.into(),
            encoder,
            filename_maps: vec![Box::new(remove_after_dash) as FilenameMap],
        }
    }

    /// Appends a transform to the filename chain.
    pub fn add_filename_map<F>(&mut self, map: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.filename_maps.push(Box::new(map));
    }

    pub fn accepts(&self, file: &Path) -> bool {
        file.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.encoder
                    .extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }

    /// Limits `file` to its first `minutes`. Zero keeps the file whole.
    /// Returns `None` for files the encoder does not handle.
    pub fn trim(&self, file: &Path, minutes: u32) -> Result<Option<AudioClip>> {
        if !self.accepts(file) {
            return Ok(None);
        }
        if minutes == 0 {
            return Ok(Some(AudioClip::passthrough(file)));
        }
        let limit = minutes_to_duration(minutes);
        let source_duration = audio::probe_duration(file)?;
        let limit = match source_duration {
            Some(total) if total <= limit => None,
            _ => Some(limit),
        };
        Ok(Some(AudioClip {
            source: file.to_path_buf(),
            limit,
            source_duration,
        }))
    }

    pub fn process_filename(&self, filename: &str) -> String {
        self.filename_maps
            .iter()
            .fold(filename.to_string(), |name, map| map(&name))
    }

    pub fn write_dir(&self, collection: &str) -> PathBuf {
        if collection.is_empty() || collection == NO_COLLECTION {
            self.output_dir.clone()
        } else {
            self.output_dir.join(collection)
        }
    }

    /// Encodes `clip` into `<output_dir>/<collection>/<filename>`.
    pub fn write(&self, collection: &str, clip: &AudioClip, filename: &str) -> Result<PathBuf> {
        let dir = self.write_dir(collection);
        storage::ensure_dir(&dir)?;
        let target = dir.join(filename);
        tracing::info!(
            source = %clip.source.display(),
            target = %target.display(),
            limit = ?clip.limit,
            "writing file"
        );
        audio::encode_clip(clip, &target, &self.encoder)?;
        Ok(target)
    }
}

fn minutes_to_duration(minutes: u32) -> Duration {
    Duration::from_secs(u64::from(minutes) * 60)
}

/// Drops the downloader's `-<id>` suffix: `"My Song-xyz123.mp3"` becomes
/// `"My Song.mp3"`.
pub fn remove_after_dash(filename: &str) -> String {
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    };
    let base = stem.split('-').next().unwrap_or(stem);
    let base = if base.is_empty() { stem } else { base };
    match ext {
        Some(ext) => format!("{base}.{ext}"),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use tempfile::tempdir;

    fn converter() -> Converter {
        Converter::new("./files/", EncoderConfig::default())
    }

    #[test]
    fn default_chain_strips_the_id_suffix() {
        let converter = converter();
        assert_eq!(converter.process_filename("My Song-xyz123.mp3"), "My Song.mp3");
        assert_eq!(converter.process_filename("Plain.mp3"), "Plain.mp3");
        assert_eq!(converter.process_filename("A-B-C.mp3"), "A.mp3");
    }

    #[test]
    fn leading_dash_keeps_the_stem() {
        assert_eq!(remove_after_dash("-abc.mp3"), "-abc.mp3");
        assert_eq!(remove_after_dash("noext-id"), "noext");
    }

    #[test]
    fn filename_maps_run_in_order() {
        let mut converter = converter();
        converter.add_filename_map(|name| name.replace('_', " "));
        converter.add_filename_map(|name| name.to_uppercase());
        assert_eq!(converter.process_filename("my_song-id.mp3"), "MY SONG.MP3");
    }

    #[test]
    fn zero_minutes_is_identity() -> Result<()> {
        let converter = converter();
        let source = Path::new("download/list/song.mp3");
        let clip = converter.trim(source, 0)?.context("mp3 accepted")?;
        assert_eq!(clip, AudioClip::passthrough(source));
        assert!(clip.is_passthrough());
        Ok(())
    }

    #[test]
    fn unsupported_extension_is_skipped() -> Result<()> {
        let converter = converter();
        assert!(converter.trim(Path::new("song.webm"), 1)?.is_none());
        assert!(converter.trim(Path::new("song.mp3.part"), 0)?.is_none());
        Ok(())
    }

    #[test]
    fn short_source_is_not_limited() -> Result<()> {
        let dir = tempdir()?;
        let wav = dir.path().join("tone.wav");
        crate::audio::write_tone_wav(&wav, 2)?;
        let converter = Converter::new(
            dir.path(),
            EncoderConfig {
                extensions: vec!["wav".to_string()],
                ..EncoderConfig::default()
            },
        );
        let clip = converter.trim(&wav, 1)?.context("wav accepted")?;
        assert!(clip.is_passthrough());
        assert!(clip.source_duration.is_some());
        Ok(())
    }

    #[test]
    fn no_collection_writes_to_the_root() {
        let converter = converter();
        assert_eq!(converter.write_dir(NO_COLLECTION), PathBuf::from("./files/"));
        assert_eq!(converter.write_dir("Mix"), PathBuf::from("./files/Mix"));
    }

    #[test]
    #[ignore = "requires ffmpeg"]
    fn write_creates_collection_dir() -> Result<()> {
        let dir = tempdir()?;
        let wav = dir.path().join("tone.wav");
        crate::audio::write_tone_wav(&wav, 1)?;
        let out = dir.path().join("processed");
        let converter = Converter::new(
            &out,
            EncoderConfig {
                extensions: vec!["wav".to_string()],
                ..EncoderConfig::default()
            },
        );
        let clip = converter.trim(&wav, 0)?.context("wav accepted")?;
        let target = converter.write("Mix", &clip, "tone.mp3")?;
        assert_eq!(target, out.join("Mix").join("tone.mp3"));
        assert!(target.is_file());
        Ok(())
    }
}
