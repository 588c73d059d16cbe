use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drive_audio_converter::auth::{self, CredentialChain};
use drive_audio_converter::{
    utils, BatchConverter, Cli, Commands, Config, DriveClient, FfmpegTranscoder, Settings,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "drive_audio_converter=debug"
    } else {
        "drive_audio_converter=info"
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = Settings::load()?;
    let http = reqwest::Client::builder()
        .user_agent(concat!("drive-audio-converter/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    match cli.command() {
        Commands::Convert => {
            let config = Config::from_env(settings)?;

            // Check for required external dependencies (non-fatal in Docker)
            let missing_deps = utils::check_dependencies(&config.settings.transcode.ffmpeg_path).await;
            if !missing_deps.is_empty() {
                eprintln!("⚠️  Dependency check warnings:");
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - tools may be available)");
            }

            println!("===================================");
            println!("  Drive video → audio converter");
            println!("===================================");
            println!();

            println!("🔗 Connecting to Google Drive...");
            let credential = CredentialChain::from_settings(&config.settings, http.clone())
                .resolve()
                .await?;
            println!("   Auth method: {}", credential.kind());
            println!("   {} Connected", style("✔").green());
            println!();

            let storage = DriveClient::new(http, credential, &config.settings).with_progress(!cli.quiet);
            let transcoder = FfmpegTranscoder::from_settings(&config.settings.transcode);

            let summary = BatchConverter::new(storage, transcoder).run(&config).await?;

            tracing::info!(
                "Run finished: {} converted, {} skipped, {} failed",
                summary.converted,
                summary.skipped,
                summary.failed
            );
            summary.print();
        }
        Commands::Authorize => {
            println!("===================================");
            println!("  OAuth authorization setup");
            println!("===================================");
            println!();

            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            auth::setup::authorize(&settings, &http, stdin, std::io::stdout()).await?;

            println!("You can now run `drive-audio convert`.");
        }
        Commands::Config => match Config::from_env(settings.clone()) {
            Ok(config) => config.display(),
            Err(e) => {
                println!("{}", e);
                println!();
                settings.display();
            }
        },
    }

    Ok(())
}
