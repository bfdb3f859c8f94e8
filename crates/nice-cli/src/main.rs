mod config;
mod dataset;
mod pipeline;
mod render;
mod results;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipeline::{SampleArgs, SummaryArgs, TrainArgs};

/// nice: train a NICE normalizing flow on images and sample from it.
#[derive(Parser)]
#[command(name = "nice", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training, sampling and inspecting checkpoints.
#[derive(Subcommand)]
enum Command {
    /// Train a flow on a folder of PNG images, resuming from the latest checkpoint.
    Train {
        /// Folder containing `*.png` training images.
        #[arg(long)]
        data_dir: PathBuf,
        /// Path to a TOML config file (e.g. configs/nice.toml).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory for checkpoints. Overrides the config file.
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
        /// Total number of epochs, including already completed ones.
        #[arg(long)]
        epochs: Option<usize>,
        /// Samples per minibatch.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Adam learning rate.
        #[arg(long)]
        lr: Option<f64>,
        /// Maximum number of images to load (sorted by file name).
        #[arg(long)]
        max_images: Option<usize>,
        /// Seed for initialization, shuffling and dequantization noise.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Write a grid of generated samples from the latest checkpoint.
    Sample {
        /// Checkpoint directory to load the flow from.
        #[arg(long, default_value = "checkpoints/nice")]
        checkpoint_dir: PathBuf,
        /// Output PNG path.
        #[arg(long)]
        output: PathBuf,
        /// Samples per grid side.
        #[arg(long, default_value_t = 5)]
        grid: u32,
        /// Seed for latent sampling.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Print loss statistics from the latest checkpoint.
    Summary {
        /// Checkpoint directory to inspect.
        #[arg(long, default_value = "checkpoints/nice")]
        checkpoint_dir: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            data_dir,
            config,
            checkpoint_dir,
            epochs,
            batch_size,
            lr,
            max_images,
            seed,
        } => pipeline::run_train(TrainArgs {
            data_dir,
            config,
            checkpoint_dir,
            epochs,
            batch_size,
            lr,
            max_images,
            seed,
        }),
        Command::Sample {
            checkpoint_dir,
            output,
            grid,
            seed,
        } => pipeline::run_sample(SampleArgs {
            checkpoint_dir,
            output,
            grid,
            seed,
        }),
        Command::Summary {
            checkpoint_dir,
            json,
        } => pipeline::run_summary(SummaryArgs {
            checkpoint_dir,
            json,
        }),
    }
}
