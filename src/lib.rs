//! Drive Audio Converter - batch-convert Google Drive videos into audio files
//!
//! This library lists the video files of a Drive folder, strips their video stream with
//! ffmpeg and uploads the resulting audio files into a second Drive folder.

pub mod auth;
pub mod cli;
pub mod config;
pub mod convert;
pub mod drive;
pub mod transcode;
pub mod utils;

pub use auth::{Credential, CredentialChain, CredentialSource, TokenRecord};
pub use cli::{Cli, Commands};
pub use config::{Config, Settings};
pub use convert::{BatchConverter, ConversionOutcome, RunSummary};
pub use drive::{DriveClient, RemoteFile, StorageClient, UploadedFile};
pub use transcode::{AudioMode, FfmpegTranscoder, Transcoder};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the converter
#[derive(thiserror::Error, Debug)]
pub enum ConverterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No usable credentials: {0}")]
    AuthUnavailable(String),

    #[error("Authorization setup failed: {0}")]
    AuthSetup(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),
}
