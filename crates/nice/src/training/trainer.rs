//! Maximum-likelihood training loop with checkpoint resume.
//!
//! Ties together the batch source, tensor bridge, loss and checkpoint store.
//! Each step computes the batch-summed NLL, backpropagates, and lets the
//! optimizer update every flow parameter. A checkpoint is written after
//! every completed epoch.

use std::time::Instant;

use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::distribution::StandardLogistic;
use crate::error::FlowError;
use crate::model::bridge::{rows_to_tensor, tensor_to_f64};
use crate::model::flow::{NiceConfig, NiceFlow};
use crate::training::checkpoint::{CheckpointStore, TrainingState};
use crate::training::data::BatchSource;
use crate::training::loss::negative_log_likelihood;
use crate::training::metrics::EpochSummary;

/// Configuration for likelihood training.
#[derive(Config, Debug)]
pub struct NiceTrainingConfig {
    /// Adam learning rate.
    #[config(default = 1e-3)]
    pub lr: f64,
    /// L2 penalty added to the gradients by Adam. 0 disables it.
    #[config(default = 0.9)]
    pub weight_decay: f64,
    /// Total number of epochs, counting epochs completed before a resume.
    #[config(default = 1500)]
    pub num_epochs: usize,
    /// Samples per minibatch.
    #[config(default = 64)]
    pub batch_size: usize,
    /// Seed for parameter initialization and batch shuffling.
    ///
    /// Initialization goes through `Backend::seed`, which burn keeps per
    /// process: other code drawing backend random tensors in the same
    /// process shifts the initial flow. Shuffling uses its own RNG.
    #[config(default = 0)]
    pub seed: u64,
    /// Steps between loss log lines. 0 disables per-step logging.
    #[config(default = 100)]
    pub log_interval: usize,
    /// Directory holding the checkpoint store.
    #[config(default = "String::from(\"checkpoints/nice\")")]
    pub checkpoint_dir: String,
    /// Checkpoint directories retained after each save.
    #[config(default = 1)]
    pub keep_checkpoints: usize,
}

impl NiceTrainingConfig {
    /// Check hyper-parameters before any state is built.
    pub fn validate(&self) -> Result<(), FlowError> {
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(FlowError::Configuration(format!(
                "lr must be positive, got {}",
                self.lr
            )));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(FlowError::Configuration(format!(
                "weight_decay must be non-negative, got {}",
                self.weight_decay
            )));
        }
        if self.batch_size == 0 {
            return Err(FlowError::Configuration("batch_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Adam configured with this run's L2 penalty.
    pub fn optimizer(&self) -> AdamConfig {
        let decay = (self.weight_decay > 0.0).then(|| WeightDecayConfig::new(self.weight_decay as f32));
        AdamConfig::new().with_weight_decay(decay)
    }

    /// Checkpoint store rooted at `checkpoint_dir`.
    pub fn store(&self) -> CheckpointStore {
        CheckpointStore::new(&self.checkpoint_dir).with_keep(self.keep_checkpoints)
    }
}

/// Likelihood trainer over an externally supplied optimizer.
///
/// Construction restores the latest checkpoint when one exists, so a killed
/// run picks up at the epoch after the last completed one with its
/// parameters, optimizer moments and loss history intact.
pub struct LikelihoodTrainer<B: AutodiffBackend, O> {
    config: NiceTrainingConfig,
    model_config: NiceConfig,
    model: NiceFlow<B>,
    optimizer: O,
    prior: StandardLogistic,
    store: CheckpointStore,
    device: B::Device,
    /// Next epoch to run.
    epoch: usize,
    start_epoch: usize,
    loss_history: Vec<f64>,
}

impl<B, O> LikelihoodTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<NiceFlow<B>, B>,
{
    /// Seed the backend, build a fresh flow from `model_config`, then resume
    /// from the checkpoint store if it holds a checkpoint.
    ///
    /// The backend seed is process-wide. Use [`Self::with_model`] to control
    /// initialization without touching it.
    pub fn new(
        config: NiceTrainingConfig,
        model_config: NiceConfig,
        optimizer: O,
        device: B::Device,
    ) -> Result<Self, FlowError> {
        config.validate()?;
        B::seed(config.seed);
        let model = model_config.init::<B>(&device)?;
        Self::with_model(config, model_config, model, optimizer, device)
    }

    /// Use a caller-built flow as the fresh-start state.
    ///
    /// The flow is still replaced by the checkpointed one on resume. A
    /// checkpoint saved from a different architecture than `model_config`
    /// is a `Configuration` error.
    pub fn with_model(
        config: NiceTrainingConfig,
        model_config: NiceConfig,
        model: NiceFlow<B>,
        optimizer: O,
        device: B::Device,
    ) -> Result<Self, FlowError> {
        config.validate()?;
        if let Some(diff) = model.architecture_mismatch(&model_config) {
            return Err(FlowError::Configuration(format!(
                "model does not match its config ({diff})"
            )));
        }

        let store = config.store();
        let prior = StandardLogistic::new(model.d_data());

        let (model, optimizer, epoch, loss_history) = match store.latest_dir()? {
            Some(dir) => {
                let TrainingState {
                    epoch,
                    loss_history,
                    model,
                    optimizer,
                } = store.load_from(&dir, model, optimizer, &device)?;
                tracing::info!(
                    completed_epoch = epoch,
                    steps = loss_history.len(),
                    path = %dir.display(),
                    "Resuming training"
                );
                (model, optimizer, epoch + 1, loss_history)
            }
            None => {
                tracing::info!(path = %store.root().display(), "No checkpoint found, starting fresh");
                (model, optimizer, 0, Vec::new())
            }
        };

        Ok(Self {
            config,
            model_config,
            model,
            optimizer,
            prior,
            store,
            device,
            epoch,
            start_epoch: epoch,
            loss_history,
        })
    }

    /// Run one optimization step on `batch` and return its loss.
    ///
    /// A non-finite loss aborts before any parameter is touched and leaves
    /// the loss history unchanged.
    pub fn train_step(&mut self, batch: &[Vec<f32>]) -> Result<f64, FlowError> {
        let x = rows_to_tensor::<B>(batch, self.model.d_data(), &self.device)?;
        let loss = negative_log_likelihood(&self.model, &self.prior, x)?;
        let value = tensor_to_f64(loss.clone());
        if !value.is_finite() {
            return Err(FlowError::NumericalInstability {
                epoch: self.epoch,
                step: self.loss_history.len(),
                loss: value,
            });
        }

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optimizer
            .step(self.config.lr, self.model.clone(), grads);
        self.loss_history.push(value);
        Ok(value)
    }

    /// Train one full pass over `source`, then checkpoint.
    pub fn train_epoch<S: BatchSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<EpochSummary, FlowError> {
        let d_data = self.model.d_data();
        FlowError::check_width(d_data, source.sample_dim())?;

        let epoch = self.epoch;
        let first_step = self.loss_history.len();
        let started = Instant::now();
        let mut examples = 0;

        for batch in source.epoch_batches(epoch) {
            examples += batch.len();
            let loss = self.train_step(&batch)?;
            let step = self.loss_history.len() - 1;
            if self.config.log_interval > 0 && step % self.config.log_interval == 0 {
                tracing::info!(epoch, step, loss = format!("{loss:.2}"), "Training step");
            }
        }

        let summary = EpochSummary::from_losses(epoch, &self.loss_history[first_step..], examples, d_data)
            .ok_or_else(|| {
                FlowError::Configuration(format!("batch source produced no batches for epoch {epoch}"))
            })?;

        self.store.save(
            epoch,
            &self.model,
            &self.optimizer,
            &self.loss_history,
            &self.model_config,
        )?;
        self.epoch += 1;

        tracing::info!(
            epoch,
            elapsed_secs = format!("{:.1}", started.elapsed().as_secs_f64()),
            "{summary}"
        );
        Ok(summary)
    }

    /// Run the epochs remaining up to `num_epochs`.
    ///
    /// Returns one summary per epoch run in this call; empty when a resumed
    /// run had already finished.
    pub fn train<S: BatchSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<Vec<EpochSummary>, FlowError> {
        let num_epochs = self.config.num_epochs;
        if self.epoch >= num_epochs {
            tracing::info!(epoch = self.epoch, num_epochs, "Training already complete");
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let mut summaries = Vec::with_capacity(num_epochs - self.epoch);
        while self.epoch < num_epochs {
            summaries.push(self.train_epoch(source)?);
        }

        tracing::info!(
            epochs = summaries.len(),
            steps = self.loss_history.len(),
            elapsed_secs = format!("{:.1}", started.elapsed().as_secs_f64()),
            "Training loop finished"
        );
        Ok(summaries)
    }

    /// Next epoch to run.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Epoch this trainer started at (0 on a fresh start).
    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    /// Every per-step loss, restored prefix included.
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    pub fn model(&self) -> &NiceFlow<B> {
        &self.model
    }

    pub fn config(&self) -> &NiceTrainingConfig {
        &self.config
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn into_model(self) -> NiceFlow<B> {
        self.model
    }
}
