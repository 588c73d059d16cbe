use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ConverterError;

/// Environment variable naming the Drive folder that holds the videos
pub const INPUT_FOLDER_ENV: &str = "INPUT_FOLDER_ID";
/// Environment variable naming the Drive folder that receives the audio files
pub const OUTPUT_FOLDER_ENV: &str = "OUTPUT_FOLDER_ID";
/// Environment variable toggling skip-if-exists (default `true`)
pub const SKIP_EXISTING_ENV: &str = "SKIP_EXISTING";
/// Environment variable overriding the credentials directory
pub const CREDENTIALS_DIR_ENV: &str = "CREDENTIALS_DIR";
/// Environment variable overriding the ffmpeg binary
pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";

/// Immutable run configuration, parsed once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Drive folder to scan for videos
    pub input_folder_id: String,

    /// Drive folder receiving converted audio
    pub output_folder_id: String,

    /// Skip videos whose audio output already exists
    pub skip_existing: bool,

    /// Tunables from the settings file
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding token.json, credentials.json and client_secret.json
    pub credentials_dir: PathBuf,

    /// Transcoder settings
    pub transcode: TranscodeSettings,

    /// Parent directory for the per-run scratch directory
    pub temp_dir: Option<PathBuf>,

    /// MIME types listed as convertible videos
    pub video_mime_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeSettings {
    /// ffmpeg binary name or path
    pub ffmpeg_path: String,

    /// Extension of produced audio files, without the dot
    pub audio_extension: String,

    /// MIME type sent when uploading audio files
    pub audio_mime_type: String,

    /// Codec used when stream copy is not possible
    pub fallback_codec: String,

    /// Constant bitrate used with the fallback codec
    pub fallback_bitrate: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials_dir: PathBuf::from("credentials"),
            transcode: TranscodeSettings::default(),
            temp_dir: None,
            video_mime_types: vec![
                "video/mp4".to_string(),
                "video/webm".to_string(),
                "video/quicktime".to_string(),
            ],
        }
    }
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            audio_extension: "m4a".to_string(),
            audio_mime_type: "audio/mp4".to_string(),
            fallback_codec: "aac".to_string(),
            fallback_bitrate: "128k".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the settings file (if any) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut settings = match Self::config_path() {
            Some(path) if path.exists() => {
                let content = fs_err::read_to_string(&path)
                    .context("Failed to read settings file")?;

                serde_yaml::from_str(&content).context("Failed to parse settings file")?
            }
            _ => Self::default(),
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would widen or break the folder listing
    pub fn validate(&self) -> Result<()> {
        if self.video_mime_types.iter().all(|mt| mt.trim().is_empty()) {
            return Err(ConverterError::Config(
                "video_mime_types must list at least one MIME type".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Apply environment overrides from an arbitrary lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(CREDENTIALS_DIR_ENV).filter(|v| !v.is_empty()) {
            self.credentials_dir = PathBuf::from(dir);
        }

        if let Some(ffmpeg) = lookup(FFMPEG_PATH_ENV).filter(|v| !v.is_empty()) {
            self.transcode.ffmpeg_path = ffmpeg;
        }
    }

    /// Cached user token written by the authorization flow
    pub fn token_path(&self) -> PathBuf {
        self.credentials_dir.join("token.json")
    }

    /// Service account key
    pub fn service_account_path(&self) -> PathBuf {
        self.credentials_dir.join("credentials.json")
    }

    /// OAuth client descriptor read by the authorization flow
    pub fn client_secret_path(&self) -> PathBuf {
        self.credentials_dir.join("client_secret.json")
    }

    /// Get settings file path
    fn config_path() -> Option<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir().map(|dir| dir.join("drive-audio-converter").join("config.yaml"))
    }

    /// Display effective settings
    pub fn display(&self) {
        println!("Current Settings:");
        println!("  Credentials Dir: {}", self.credentials_dir.display());
        println!("  FFmpeg: {}", self.transcode.ffmpeg_path);
        println!("  Audio Extension: {}", self.transcode.audio_extension);
        println!(
            "  Fallback Encoding: {} @ {}",
            self.transcode.fallback_codec, self.transcode.fallback_bitrate
        );
        println!("  Video Types: {}", self.video_mime_types.join(", "));
        if let Some(dir) = &self.temp_dir {
            println!("  Temp Dir: {}", dir.display());
        }
    }
}

impl Config {
    /// Build the run configuration from the process environment
    pub fn from_env(settings: Settings) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), settings)
    }

    /// Build the run configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F, settings: Settings) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = [INPUT_FOLDER_ENV, OUTPUT_FOLDER_ENV]
            .into_iter()
            .filter(|key| required(*key).is_none())
            .collect();

        if !missing.is_empty() {
            return Err(ConverterError::Config(format!(
                "missing environment variables: {}\n  \
                 {}: Drive folder ID holding the videos\n  \
                 {}: Drive folder ID receiving the audio files",
                missing.join(", "),
                INPUT_FOLDER_ENV,
                OUTPUT_FOLDER_ENV
            ))
            .into());
        }

        let skip_existing = lookup(SKIP_EXISTING_ENV)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        Ok(Self {
            input_folder_id: required(INPUT_FOLDER_ENV).unwrap_or_default(),
            output_folder_id: required(OUTPUT_FOLDER_ENV).unwrap_or_default(),
            skip_existing,
            settings,
        })
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Input Folder: {}", self.input_folder_id);
        println!("  Output Folder: {}", self.output_folder_id);
        println!("  Skip Existing: {}", self.skip_existing);
        self.settings.display();
    }
}
