use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "drive-audio",
    about = "Drive Audio Converter - Turn the videos of a Google Drive folder into audio files",
    version,
    long_about = "Downloads every video (mp4, webm, mov) of a Google Drive folder, strips the video stream with ffmpeg and uploads the audio as .m4a into a second folder. Folders are configured with the INPUT_FOLDER_ID, OUTPUT_FOLDER_ID and SKIP_EXISTING environment variables."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Convert all videos of the input folder (default)
    Convert,

    /// Authorize a personal Google account and save token.json
    Authorize,

    /// Show the effective configuration
    Config,
}

impl Cli {
    /// Subcommand to run, `convert` when none was given
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Convert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_convert() {
        let cli = Cli::try_parse_from(["drive-audio"]).unwrap();
        assert_eq!(cli.command(), Commands::Convert);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["drive-audio", "authorize", "--verbose", "-q"]).unwrap();
        assert_eq!(cli.command(), Commands::Authorize);
        assert!(cli.verbose);
        assert!(cli.quiet);
    }

    #[test]
    fn test_rejects_positional_arguments() {
        assert!(Cli::try_parse_from(["drive-audio", "convert", "folder-id"]).is_err());
    }
}
