//! Phosphor CLI — Command-line interface for rendering and export.
//!
//! Usage:
//!   phosphor export <INPUT>    Render media through the effect pipeline
//!   phosphor frames <INPUT>    Export frames as a tar of PNG stills
//!   phosphor record            Record a test pattern and export it
//!   phosphor check             Check that ffmpeg/ffprobe are available

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "phosphor",
    about = "Streaming frame export for the Phosphor effect pipeline",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a media file through the pipeline into a new container
    Export {
        /// Input media file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: mp4, webp, gif
        #[arg(long, default_value = "mp4")]
        format: String,

        /// Target frame rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Output width (defaults to the probed input width)
        #[arg(long)]
        width: Option<u32>,

        /// Output height (defaults to the probed input height)
        #[arg(long)]
        height: Option<u32>,

        /// Quality in [0, 1]
        #[arg(short, long, default_value = "0.9")]
        quality: f64,

        /// Duration to render in seconds (defaults to the probed duration)
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Export frames as a tar archive of PNG stills
    Frames {
        /// Input media file
        input: PathBuf,

        /// Output archive path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sampling rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Duration to sample in seconds (defaults to the probed duration)
        #[arg(long)]
        duration: Option<f64>,

        /// Export only the single frame at this timestamp
        #[arg(long)]
        at: Option<f64>,
    },

    /// Record a synthetic test pattern through the capture session
    Record {
        /// Output file path (defaults to recording.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: mp4, webp, gif, tar
        #[arg(long, default_value = "mp4")]
        format: String,

        /// Capture sampling rate in Hz
        #[arg(long, default_value = "30")]
        rate: u32,

        /// Export frame rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Recording duration in seconds
        #[arg(long, default_value = "3.0")]
        duration: f64,

        /// Capture width
        #[arg(long, default_value = "640")]
        width: u32,

        /// Capture height
        #[arg(long, default_value = "360")]
        height: u32,

        /// Quality in [0, 1]
        #[arg(short, long, default_value = "0.9")]
        quality: f64,
    },

    /// Check that the required external tools are available
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    phosphor_common::logging::init_logging(&phosphor_common::config::LoggingConfig {
        level: log_level.to_string(),
        json: false,
        file: None,
    });

    match cli.command {
        Commands::Export {
            input,
            output,
            format,
            fps,
            width,
            height,
            quality,
            duration,
        } => {
            commands::export::run(input, output, format, fps, width, height, quality, duration)
                .await
        }
        Commands::Frames {
            input,
            output,
            fps,
            duration,
            at,
        } => commands::frames::run(input, output, fps, duration, at).await,
        Commands::Record {
            output,
            format,
            rate,
            fps,
            duration,
            width,
            height,
            quality,
        } => {
            commands::record::run(output, format, rate, fps, duration, width, height, quality)
                .await
        }
        Commands::Check => commands::check::run(),
    }
}
