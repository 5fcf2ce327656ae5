// Command-line runner for the `flicker_vision` library.

use anyhow::Context;
use clap::{Parser, Subcommand};
use flicker_vision::core_modules::preprocess::DEFAULT_FRAMES_PER_SUM;
use flicker_vision::parallel_pipeline::{subtract_reference_dir, sum_frames_dir};
use flicker_vision::{BatchRunner, PipelineConfig};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(version, about = "Flicker detection and SNR scoring for fluorescence recordings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Detect, track and score flickers in every TIFF video of a directory.
    Analyze {
        input_dir: PathBuf,
        /// TOML file overriding the default pipeline parameters.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Number of videos analyzed concurrently. Defaults to the CPU count.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Subtract a camera-noise reference image from every video of a directory.
    SubtractBackground {
        input_dir: PathBuf,
        reference: PathBuf,
        output_dir: PathBuf,
    },
    /// Build pseudo low-frame-rate videos by summing groups of frames.
    Pseudo {
        input_dir: PathBuf,
        output_dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_FRAMES_PER_SUM)]
        frames_per_sum: usize,
    },
}

fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            input_dir,
            config,
            workers,
        } => {
            let config = match config {
                Some(path) => PipelineConfig::from_toml_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            let runner = BatchRunner::new(config, workers)?;
            let averages = runner
                .run(&input_dir)
                .await
                .with_context(|| format!("analyzing {}", input_dir.display()))?;
            for (video, average) in &averages {
                println!("{video}: {average}");
            }
        }
        Command::SubtractBackground {
            input_dir,
            reference,
            output_dir,
        } => {
            let written = subtract_reference_dir(&input_dir, &reference, &output_dir)
                .with_context(|| format!("subtracting {} from {}", reference.display(), input_dir.display()))?;
            tracing::info!("wrote {} videos to {}", written.len(), output_dir.display());
        }
        Command::Pseudo {
            input_dir,
            output_dir,
            frames_per_sum,
        } => {
            let written = sum_frames_dir(&input_dir, &output_dir, frames_per_sum)
                .with_context(|| format!("summing frames in {}", input_dir.display()))?;
            tracing::info!("wrote {} videos to {}", written.len(), output_dir.display());
        }
    }

    Ok(())
}
