use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::TranscodeSettings;
use crate::{ConverterError, Result};

/// Audio handling for one ffmpeg attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioMode {
    /// Repackage the source audio stream unchanged
    Copy,
    /// Re-encode at a constant bitrate
    Reencode { codec: String, bitrate: String },
}

impl AudioMode {
    fn args(&self) -> Vec<String> {
        match self {
            AudioMode::Copy => vec!["-acodec".to_string(), "copy".to_string()],
            AudioMode::Reencode { codec, bitrate } => vec![
                "-acodec".to_string(),
                codec.clone(),
                "-b:a".to_string(),
                bitrate.clone(),
            ],
        }
    }

    fn describe(&self) -> String {
        match self {
            AudioMode::Copy => "stream copy".to_string(),
            AudioMode::Reencode { codec, bitrate } => format!("{} @ {}", codec, bitrate),
        }
    }
}

/// Extracts the audio track of a local video file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write the audio of `input` to `output`, replacing any existing file
    async fn convert(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Runs ffmpeg once per mode until one succeeds
pub struct FfmpegTranscoder {
    binary: String,
    modes: Vec<AudioMode>,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>, modes: Vec<AudioMode>) -> Self {
        Self {
            binary: binary.into(),
            modes,
        }
    }

    /// Stream copy first, then the configured re-encode
    pub fn from_settings(settings: &TranscodeSettings) -> Self {
        Self::new(
            settings.ffmpeg_path.clone(),
            vec![
                AudioMode::Copy,
                AudioMode::Reencode {
                    codec: settings.fallback_codec.clone(),
                    bitrate: settings.fallback_bitrate.clone(),
                },
            ],
        )
    }

    /// Command line arguments for one attempt
    pub fn build_args(input: &Path, output: &Path, mode: &AudioMode) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-vn".to_string(),
        ];
        args.extend(mode.args());
        args.extend([
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            output.to_string_lossy().into_owned(),
        ]);
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let mut last_error = String::from("no transcoding modes configured");

        for mode in &self.modes {
            tracing::debug!("Running {} ({}) on {}", self.binary, mode.describe(), input.display());

            let result = Command::new(&self.binary)
                .args(Self::build_args(input, output, mode))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await;

            let output_status = match result {
                Ok(output_status) => output_status,
                Err(e) => {
                    return Err(ConverterError::Conversion(format!(
                        "could not run {}: {}",
                        self.binary, e
                    ))
                    .into());
                }
            };

            if output_status.status.success() {
                return Ok(());
            }

            last_error = String::from_utf8_lossy(&output_status.stderr).trim().to_string();
            if last_error.is_empty() {
                last_error = format!("{} exited with {}", self.binary, output_status.status);
            }

            tracing::warn!("{} failed for {}: {}", mode.describe(), input.display(), last_error);
        }

        Err(ConverterError::Conversion(last_error).into())
    }
}
