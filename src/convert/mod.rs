use anyhow::Context;
use console::style;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::Config;
use crate::drive::{RemoteFile, StorageClient};
use crate::transcode::Transcoder;
use crate::utils::{format_file_size, format_optional_size, replace_extension, sanitize_filename};
use crate::Result;

/// Step at which a file failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckExisting,
    Download,
    Convert,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CheckExisting => write!(f, "check-existing"),
            Stage::Download => write!(f, "download"),
            Stage::Convert => write!(f, "convert"),
            Stage::Upload => write!(f, "upload"),
        }
    }
}

/// Result of processing one video
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted,
    Skipped,
    Failed { stage: Stage, reason: String },
}

/// Totals of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &ConversionOutcome) {
        match outcome {
            ConversionOutcome::Converted => self.converted += 1,
            ConversionOutcome::Skipped => self.skipped += 1,
            ConversionOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.converted + self.skipped + self.failed
    }

    /// Print the final tally
    pub fn print(&self) {
        println!("===================================");
        println!("  Done");
        println!("===================================");
        println!("{} converted: {}", style("✔").green(), self.converted);
        if self.skipped > 0 {
            println!("{} skipped:   {}", style("↷").yellow(), self.skipped);
        }
        if self.failed > 0 {
            println!("{} failed:    {}", style("✘").red(), self.failed);
        }
    }
}

/// Local file removed when the guard goes out of scope
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs_err::remove_file(&self.path) {
                tracing::warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Drives list → download → convert → upload for every video of the input folder
pub struct BatchConverter<S, T> {
    storage: S,
    transcoder: T,
}

impl<S, T> BatchConverter<S, T>
where
    S: StorageClient,
    T: Transcoder,
{
    pub fn new(storage: S, transcoder: T) -> Self {
        Self { storage, transcoder }
    }

    /// Convert every video of the input folder, one at a time
    pub async fn run(&self, config: &Config) -> Result<RunSummary> {
        println!("{} Scanning input folder...", style("📁").bold());
        let videos = self
            .storage
            .list_video_files(&config.input_folder_id)
            .await
            .context("Failed to list the input folder")?;

        let mut summary = RunSummary::default();

        if videos.is_empty() {
            println!("   No video files found");
            return Ok(summary);
        }

        println!("   Found {} video file(s)", videos.len());
        println!();
        tracing::info!("Converting {} video(s)", videos.len());

        let work_dir = match &config.settings.temp_dir {
            Some(root) => {
                fs_err::create_dir_all(root)?;
                TempDir::new_in(root)
            }
            None => TempDir::new(),
        }
        .context("Failed to create temporary directory")?;

        for video in &videos {
            println!("{} {} ({})", style("🎬").bold(), video.name, format_optional_size(video.size));

            let outcome = self.process(video, config, work_dir.path()).await;

            match &outcome {
                ConversionOutcome::Converted => {}
                ConversionOutcome::Skipped => {
                    println!("   {} skipped (output already exists)", style("↷").yellow());
                }
                ConversionOutcome::Failed { stage, reason } => {
                    println!("   {} {} failed: {}", style("✘").red(), stage, reason);
                    tracing::warn!("{} failed at {}: {}", video.name, stage, reason);
                }
            }
            println!();

            summary.record(&outcome);
        }

        Ok(summary)
    }

    /// Run one video through the pipeline; never fails the batch
    async fn process(&self, video: &RemoteFile, config: &Config, work_dir: &Path) -> ConversionOutcome {
        let audio_extension = &config.settings.transcode.audio_extension;
        let output_name = replace_extension(&video.name, audio_extension);

        if config.skip_existing {
            match self
                .storage
                .check_exists(&config.output_folder_id, &output_name)
                .await
            {
                Ok(true) => return ConversionOutcome::Skipped,
                Ok(false) => {}
                Err(e) => return failed(Stage::CheckExisting, e),
            }
        }

        // The Drive id keeps scratch names unique even when names collide
        let input = ScratchFile::new(
            work_dir.join(format!("{}_{}", sanitize_filename(&video.id), sanitize_filename(&video.name))),
        );
        let output = ScratchFile::new(
            work_dir.join(format!("{}_{}", sanitize_filename(&video.id), sanitize_filename(&output_name))),
        );

        println!("   ⬇  Downloading...");
        if let Err(e) = self.storage.download(&video.id, input.path()).await {
            return failed(Stage::Download, e);
        }

        println!("   🔄 Converting...");
        if let Err(e) = self.transcoder.convert(input.path(), output.path()).await {
            return failed(Stage::Convert, e);
        }

        if let Ok(metadata) = fs_err::metadata(output.path()) {
            println!("   📊 Audio size: {}", format_file_size(metadata.len()));
        }

        println!("   ⬆  Uploading...");
        match self
            .storage
            .upload(output.path(), &config.output_folder_id, &output_name)
            .await
        {
            Ok(uploaded) => {
                println!("   {} Done: {}", style("✔").green(), output_name);
                if let Some(link) = &uploaded.web_view_link {
                    tracing::debug!("Uploaded {} as {}", output_name, link);
                }
                ConversionOutcome::Converted
            }
            Err(e) => failed(Stage::Upload, e),
        }
    }
}

fn failed(stage: Stage, err: anyhow::Error) -> ConversionOutcome {
    ConversionOutcome::Failed {
        stage,
        reason: format!("{:#}", err),
    }
}
