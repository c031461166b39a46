use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// A source file plus the span of it that should be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub source: PathBuf,
    /// End of the clip. `None` keeps the whole source.
    pub limit: Option<Duration>,
    pub source_duration: Option<Duration>,
}

impl AudioClip {
    pub fn passthrough(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            limit: None,
            source_duration: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.limit.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EncoderConfig {
    pub binary: String,
    pub codec: String,
    pub bitrate: String,
    /// File extensions the trimmer accepts.
    pub extensions: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            codec: "libmp3lame".to_string(),
            bitrate: "192k".to_string(),
            extensions: vec!["mp3".to_string()],
        }
    }
}

/// Reads the container header and returns the track length when the
/// format declares it.
pub fn probe_duration(path: &Path) -> Result<Option<Duration>> {
    let file = File::open(path).with_context(|| format!("open audio {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("probe audio {}", path.display()))?;
    let track = probed
        .format
        .default_track()
        .context("no default audio track")?;
    let params = &track.codec_params;
    let duration = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => {
            Some(Duration::from_secs_f64(frames as f64 / rate as f64))
        }
        _ => None,
    };
    Ok(duration)
}

pub fn encode_args(clip: &AudioClip, output: &Path, encoder: &EncoderConfig) -> Result<Vec<String>> {
    let input = clip
        .source
        .to_str()
        .context("input path not valid utf-8")?
        .to_string();
    let output = output
        .to_str()
        .context("output path not valid utf-8")?
        .to_string();
    let mut args = vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input,
    ];
    if let Some(limit) = clip.limit {
        args.push("-t".to_string());
        args.push(format!("{:.3}", limit.as_secs_f64()));
    }
    args.extend([
        "-vn".to_string(),
        "-c:a".to_string(),
        encoder.codec.clone(),
        "-b:a".to_string(),
        encoder.bitrate.clone(),
        output,
    ]);
    Ok(args)
}

pub fn encode_clip(clip: &AudioClip, output: &Path, encoder: &EncoderConfig) -> Result<()> {
    let args = encode_args(clip, output, encoder)?;
    let result = Command::new(&encoder.binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("spawn {}", encoder.binary))?;
    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(anyhow::anyhow!(
            "{} failed with status {}: {}",
            encoder.binary,
            result.status,
            stderr.trim()
        ));
    }
    Ok(())
}

/// Writes a mono 8 kHz square-ish tone, used as a decodable fixture.
#[cfg(test)]
pub(crate) fn write_tone_wav(path: &Path, seconds: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..(8_000 * seconds) {
        let sample = ((i % 40) as i16 - 20) * 500;
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
