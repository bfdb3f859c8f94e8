//! TOML config loading for the nice CLI.
//!
//! Deserializes `configs/nice.toml`, which has optional `[model]`,
//! `[training]` and `[data]` sections, then merges with CLI overrides.

use std::path::Path;

use anyhow::Context;
use nice::{NiceConfig, NiceTrainingConfig};
use serde::Deserialize;

/// Top-level structure matching `configs/nice.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct NiceToml {
    #[serde(default)]
    pub model: ModelOverrides,
    #[serde(default)]
    pub training: TrainingOverrides,
    #[serde(default)]
    pub data: DataOverrides,
}

/// Optional overrides for `NiceConfig` fields.
///
/// `d_data` is not listed: it always follows from the image size.
#[derive(Debug, Default, Deserialize)]
pub struct ModelOverrides {
    pub d_hidden: Option<usize>,
    pub n_couplings: Option<usize>,
    pub n_linear: Option<usize>,
    pub scale_init_std: Option<f64>,
    pub zero_init_couplings: Option<bool>,
}

/// Optional overrides for `NiceTrainingConfig` fields.
#[derive(Debug, Default, Deserialize)]
pub struct TrainingOverrides {
    pub lr: Option<f64>,
    pub weight_decay: Option<f64>,
    pub num_epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub seed: Option<u64>,
    pub log_interval: Option<usize>,
    pub checkpoint_dir: Option<String>,
    pub keep_checkpoints: Option<usize>,
}

/// Optional overrides for the image-folder dataset.
#[derive(Debug, Default, Deserialize)]
pub struct DataOverrides {
    pub max_images: Option<usize>,
    pub image_size: Option<u32>,
    pub dequantize: Option<bool>,
}

/// Image-folder dataset settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    /// Upper bound on images read, taken in sorted file-name order.
    pub max_images: usize,
    /// Side length images are resized to.
    pub image_size: u32,
    /// Add uniform noise in `[0, 1/255)` to every pixel.
    pub dequantize: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            max_images: 50_000,
            image_size: 32,
            dequantize: true,
        }
    }
}

impl DataConfig {
    /// Flattened RGB sample width, `3 · size²`.
    pub fn sample_dim(&self) -> usize {
        let side = self.image_size as usize;
        3 * side * side
    }
}

/// Training flags given on the command line. `None` leaves the TOML value.
#[derive(Debug, Default)]
pub struct TrainingCliOverrides {
    pub checkpoint_dir: Option<String>,
    pub num_epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub lr: Option<f64>,
    pub seed: Option<u64>,
}

/// Load and deserialize a `NiceToml` from a TOML file.
pub fn load_nice_toml(path: &Path) -> anyhow::Result<NiceToml> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: NiceToml = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded nice config");
    Ok(config)
}

/// Build a `NiceConfig` for samples of width `d_data` from TOML overrides.
pub fn build_model_config(overrides: &ModelOverrides, d_data: usize) -> NiceConfig {
    let mut config = NiceConfig::new().with_d_data(d_data);
    if let Some(n) = overrides.d_hidden {
        config.d_hidden = n;
    }
    if let Some(n) = overrides.n_couplings {
        config.n_couplings = n;
    }
    if let Some(n) = overrides.n_linear {
        config.n_linear = n;
    }
    if let Some(std) = overrides.scale_init_std {
        config.scale_init_std = std;
    }
    if let Some(zero) = overrides.zero_init_couplings {
        config.zero_init_couplings = zero;
    }
    config
}

/// Build a `NiceTrainingConfig` from defaults, TOML overrides and CLI flags.
///
/// Priority chain: built-in defaults < TOML values < CLI flags.
pub fn build_training_config(
    overrides: &TrainingOverrides,
    cli: &TrainingCliOverrides,
) -> NiceTrainingConfig {
    let mut config = NiceTrainingConfig::new();

    if let Some(lr) = overrides.lr {
        config.lr = lr;
    }
    if let Some(wd) = overrides.weight_decay {
        config.weight_decay = wd;
    }
    if let Some(n) = overrides.num_epochs {
        config.num_epochs = n;
    }
    if let Some(n) = overrides.batch_size {
        config.batch_size = n;
    }
    if let Some(seed) = overrides.seed {
        config.seed = seed;
    }
    if let Some(n) = overrides.log_interval {
        config.log_interval = n;
    }
    if let Some(dir) = &overrides.checkpoint_dir {
        config.checkpoint_dir = dir.clone();
    }
    if let Some(n) = overrides.keep_checkpoints {
        config.keep_checkpoints = n;
    }

    // CLI overrides take highest priority
    if let Some(dir) = &cli.checkpoint_dir {
        config.checkpoint_dir = dir.clone();
    }
    if let Some(n) = cli.num_epochs {
        config.num_epochs = n;
    }
    if let Some(n) = cli.batch_size {
        config.batch_size = n;
    }
    if let Some(lr) = cli.lr {
        config.lr = lr;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    config
}

/// Build a `DataConfig` from defaults, TOML overrides and `--max-images`.
pub fn build_data_config(overrides: &DataOverrides, max_images_cli: Option<usize>) -> DataConfig {
    let mut config = DataConfig::default();
    if let Some(n) = overrides.max_images {
        config.max_images = n;
    }
    if let Some(size) = overrides.image_size {
        config.image_size = size;
    }
    if let Some(dequantize) = overrides.dequantize {
        config.dequantize = dequantize;
    }
    if let Some(n) = max_images_cli {
        config.max_images = n;
    }
    config
}
