//! Training, sampling and summary pipelines behind the CLI subcommands.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;

use nice::{CheckpointStore, FlowSampler, InMemoryBatchSource, LikelihoodTrainer, NiceFlow};

use crate::config::{
    build_data_config, build_model_config, build_training_config, load_nice_toml, NiceToml,
    TrainingCliOverrides,
};
use crate::dataset::load_image_folder;
use crate::render::{image_side, write_sample_grid};
use crate::results::CheckpointSummary;

type TrainBackend = Autodiff<NdArray<f32>>;
type SampleBackend = NdArray<f32>;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// Folder of `*.png` training images.
    pub data_dir: PathBuf,
    /// Optional TOML config file.
    pub config: Option<PathBuf>,
    pub checkpoint_dir: Option<PathBuf>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub lr: Option<f64>,
    pub max_images: Option<usize>,
    pub seed: Option<u64>,
}

/// Arguments for the `sample` subcommand.
#[derive(Debug)]
pub struct SampleArgs {
    pub checkpoint_dir: PathBuf,
    /// Output PNG path.
    pub output: PathBuf,
    /// Samples per grid side.
    pub grid: u32,
    pub seed: u64,
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    pub checkpoint_dir: PathBuf,
    /// Output as JSON instead of human-readable text.
    pub json: bool,
}

fn progress_style() -> anyhow::Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
        .progress_chars("=> "))
}

/// Train (or resume training) a flow on an image folder.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config
    let toml = match &args.config {
        Some(path) => load_nice_toml(path)?,
        None => NiceToml::default(),
    };
    let data_config = build_data_config(&toml.data, args.max_images);
    let model_config = build_model_config(&toml.model, data_config.sample_dim());
    let training_config = build_training_config(
        &toml.training,
        &TrainingCliOverrides {
            checkpoint_dir: args
                .checkpoint_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            num_epochs: args.epochs,
            batch_size: args.batch_size,
            lr: args.lr,
            seed: args.seed,
        },
    );
    training_config.validate()?;

    // 2. Load images
    let mut rng = StdRng::seed_from_u64(training_config.seed);
    let samples = load_image_folder(&args.data_dir, &data_config, &mut rng)?;
    let num_samples = samples.len();
    let mut source =
        InMemoryBatchSource::new(samples, training_config.batch_size, training_config.seed)?;

    // 3. Build trainer, resuming when a checkpoint exists
    let device = Default::default();
    let optimizer = training_config
        .optimizer()
        .init::<TrainBackend, NiceFlow<TrainBackend>>();
    let num_epochs = training_config.num_epochs;
    let mut trainer = LikelihoodTrainer::<TrainBackend, _>::new(
        training_config,
        model_config,
        optimizer,
        device,
    )?;
    tracing::info!(
        num_samples,
        batches_per_epoch = source.num_batches(),
        start_epoch = trainer.start_epoch(),
        num_epochs,
        "Starting training"
    );

    // 4. Train with progress bar
    let pb = ProgressBar::new(num_epochs as u64);
    pb.set_style(progress_style()?);
    pb.set_position(trainer.epoch().min(num_epochs) as u64);

    let mut last_summary = None;
    while trainer.epoch() < num_epochs {
        let summary = trainer.train_epoch(&mut source)?;
        pb.set_message(format!(
            "loss={:.2} bpd={:.3}",
            summary.mean_loss, summary.bits_per_dim
        ));
        pb.inc(1);
        last_summary = Some(summary);
    }
    pb.finish_with_message("done");

    // 5. Print summary
    println!("\n--- Training Summary ---");
    println!("Samples: {num_samples}");
    println!(
        "Epochs: {} -> {} of {num_epochs}",
        trainer.start_epoch(),
        trainer.epoch()
    );
    println!("Steps (total): {}", trainer.loss_history().len());
    match last_summary {
        Some(summary) => println!("Last epoch: {summary}"),
        None => println!("Nothing to do: checkpoint already covers {num_epochs} epochs"),
    }
    println!("Checkpoints: {}", trainer.store().root().display());
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Draw a grid of samples from the latest checkpoint and write it as PNG.
pub fn run_sample(args: SampleArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.grid > 0, "--grid must be positive");

    let store = CheckpointStore::new(&args.checkpoint_dir);
    let device = Default::default();
    let sampler = FlowSampler::<SampleBackend>::load(&store, device)?.with_context(|| {
        format!("No checkpoint found in {}", args.checkpoint_dir.display())
    })?;

    let d_data = sampler.flow().d_data();
    let side = image_side(d_data)
        .with_context(|| format!("Flow dimension {d_data} is not a square RGB image"))?;

    let n = (args.grid * args.grid) as usize;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let samples = sampler.sample_rows(n, &mut rng)?;
    write_sample_grid(&samples, args.grid, side, &args.output)?;

    println!("Wrote {n} samples to {}", args.output.display());
    Ok(())
}

/// Print loss statistics from the latest checkpoint.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let store = CheckpointStore::new(&args.checkpoint_dir);
    let meta = store.latest_meta()?.with_context(|| {
        format!("No checkpoint found in {}", args.checkpoint_dir.display())
    })?;
    let summary = CheckpointSummary::from_meta(&meta);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let fmt_loss = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    println!("--- Checkpoint Summary ---");
    println!("Directory: {}", args.checkpoint_dir.display());
    println!("Last completed epoch: {}", summary.epoch);
    println!("Steps: {}", summary.steps);
    println!("First loss: {}", fmt_loss(summary.first_loss));
    println!("Last loss: {}", fmt_loss(summary.last_loss));
    println!("Best loss: {}", fmt_loss(summary.best_loss));

    Ok(())
}
