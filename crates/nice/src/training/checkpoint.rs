//! Durable, atomically published training checkpoints.
//!
//! Layout under the store root:
//!
//! ```text
//! LATEST            name of the newest complete checkpoint directory
//! epoch_{N}/
//!   model.mpk       flow parameters (named MessagePack, full precision)
//!   optimizer.mpk   optimizer state
//!   meta.json       {epoch, loss_history}
//!   config.json     NiceConfig the flow was built from
//! ```
//!
//! A checkpoint is written into `epoch_{N}.tmp/`, renamed to `epoch_{N}/`,
//! and only then published by replacing `LATEST` through a rename. A crash at
//! any point leaves `LATEST` naming the previous complete checkpoint. Saving
//! an epoch that already has a directory publishes `epoch_{N}.{rev}/` instead,
//! so the directory `LATEST` names is never removed before the pointer moves.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use burn::optim::Optimizer;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::model::flow::{NiceConfig, NiceFlow};

/// Pointer file naming the newest published checkpoint.
pub const LATEST_FILE: &str = "LATEST";

const MODEL_FILE: &str = "model";
const OPTIMIZER_FILE: &str = "optimizer";
const META_FILE: &str = "meta.json";
const CONFIG_FILE: &str = "config.json";
const EPOCH_PREFIX: &str = "epoch_";
const TMP_SUFFIX: &str = ".tmp";

/// Scalar training progress saved alongside the tensors.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointMeta {
    /// Index of the last completed epoch.
    pub epoch: usize,
    /// Every per-step loss recorded so far, in order.
    pub loss_history: Vec<f64>,
}

/// Full restorable training state.
pub struct TrainingState<B: AutodiffBackend, O> {
    pub epoch: usize,
    pub loss_history: Vec<f64>,
    pub model: NiceFlow<B>,
    pub optimizer: O,
}

/// Directory-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
    keep: usize,
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

fn corrupt(path: &Path, reason: impl Into<String>) -> FlowError {
    FlowError::CheckpointCorruption {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Write `bytes` to `path` and flush them to disk.
fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Flush directory entries, so completed renames survive a power loss.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Flush every file directly inside `dir`, then the directory itself.
fn sync_tree(dir: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::File::open(&path)?.sync_all()?;
        }
    }
    sync_dir(dir)
}

/// Parse `epoch_{N}` or a republished `epoch_{N}.{rev}` into `(N, rev)`.
fn parse_epoch_dir(name: &str) -> Option<(usize, u32)> {
    let rest = name.strip_prefix(EPOCH_PREFIX)?;
    match rest.split_once('.') {
        Some((epoch, rev)) => Some((epoch.parse().ok()?, rev.parse().ok()?)),
        None => Some((rest.parse().ok()?, 0)),
    }
}

impl CheckpointStore {
    /// Create a store rooted at `root`. Keeps only the newest checkpoint.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            keep: 1,
        }
    }

    /// Number of checkpoint directories retained after each save (min 1).
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist one epoch's training state and publish it as the latest
    /// checkpoint. Returns the checkpoint directory.
    pub fn save<B, O>(
        &self,
        epoch: usize,
        model: &NiceFlow<B>,
        optimizer: &O,
        loss_history: &[f64],
        config: &NiceConfig,
    ) -> Result<PathBuf, FlowError>
    where
        B: AutodiffBackend,
        O: Optimizer<NiceFlow<B>, B>,
    {
        fs::create_dir_all(&self.root)?;
        let base = format!("{EPOCH_PREFIX}{epoch}");
        let tmp_dir = self.root.join(format!("{base}{TMP_SUFFIX}"));
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        let recorder = recorder();
        model
            .clone()
            .save_file(tmp_dir.join(MODEL_FILE), &recorder)
            .map_err(|e| FlowError::Checkpoint(format!("failed to save model at epoch {epoch}: {e}")))?;
        Recorder::<B>::record(&recorder, optimizer.to_record(), tmp_dir.join(OPTIMIZER_FILE))
            .map_err(|e| {
                FlowError::Checkpoint(format!("failed to save optimizer at epoch {epoch}: {e}"))
            })?;

        let meta = CheckpointMeta {
            epoch,
            loss_history: loss_history.to_vec(),
        };
        let meta_bytes = serde_json::to_vec(&meta)
            .map_err(|e| FlowError::Checkpoint(format!("failed to encode metadata: {e}")))?;
        write_synced(&tmp_dir.join(META_FILE), &meta_bytes)?;
        config.save(tmp_dir.join(CONFIG_FILE))?;

        sync_tree(&tmp_dir)?;

        // An existing directory for this epoch may be the one LATEST names,
        // so it stays in place until the pointer has moved off it.
        let name = self.unused_name(&base);
        let final_dir = self.root.join(&name);
        fs::rename(&tmp_dir, &final_dir)?;
        sync_dir(&self.root)?;

        let pointer_tmp = self.root.join(format!("{LATEST_FILE}{TMP_SUFFIX}"));
        write_synced(&pointer_tmp, name.as_bytes())?;
        fs::rename(&pointer_tmp, self.root.join(LATEST_FILE))?;
        sync_dir(&self.root)?;

        self.prune(&name);

        tracing::info!(
            epoch,
            steps = loss_history.len(),
            path = %final_dir.display(),
            "Checkpoint saved (model + optimizer + meta)"
        );
        Ok(final_dir)
    }

    /// Directory of the latest published checkpoint, or `None` on a fresh
    /// store.
    pub fn latest_dir(&self) -> Result<Option<PathBuf>, FlowError> {
        let pointer = self.root.join(LATEST_FILE);
        let contents = match fs::read_to_string(&pointer) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let name = contents.trim();
        if parse_epoch_dir(name).is_none() {
            return Err(corrupt(
                &pointer,
                format!("{LATEST_FILE} does not name a checkpoint directory: {name:?}"),
            ));
        }
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(corrupt(&dir, "checkpoint directory is missing"));
        }
        Ok(Some(dir))
    }

    /// Scalar metadata of the latest checkpoint, without loading tensors.
    pub fn latest_meta(&self) -> Result<Option<CheckpointMeta>, FlowError> {
        match self.latest_dir()? {
            Some(dir) => read_meta(&dir).map(Some),
            None => Ok(None),
        }
    }

    /// Restore the latest checkpoint into the given model and optimizer.
    ///
    /// `Ok(None)` means no checkpoint has been published yet. A published
    /// checkpoint that cannot be restored in full is `CheckpointCorruption`.
    pub fn load<B, O>(
        &self,
        model: NiceFlow<B>,
        optimizer: O,
        device: &B::Device,
    ) -> Result<Option<TrainingState<B, O>>, FlowError>
    where
        B: AutodiffBackend,
        O: Optimizer<NiceFlow<B>, B>,
    {
        match self.latest_dir()? {
            Some(dir) => self.load_from(&dir, model, optimizer, device).map(Some),
            None => Ok(None),
        }
    }

    /// Restore a specific checkpoint directory.
    pub fn load_from<B, O>(
        &self,
        dir: &Path,
        model: NiceFlow<B>,
        optimizer: O,
        device: &B::Device,
    ) -> Result<TrainingState<B, O>, FlowError>
    where
        B: AutodiffBackend,
        O: Optimizer<NiceFlow<B>, B>,
    {
        let config = read_config(dir)?;
        if let Some(diff) = model.architecture_mismatch(&config) {
            return Err(FlowError::Configuration(format!(
                "checkpoint at {} was saved from a different architecture ({diff})",
                dir.display()
            )));
        }
        let meta = read_meta(dir)?;

        let recorder = recorder();
        let model = load_flow(dir, model, &recorder, device)?;
        let record = Recorder::<B>::load(&recorder, dir.join(OPTIMIZER_FILE), device)
            .map_err(|e| corrupt(dir, format!("failed to load optimizer: {e}")))?;
        let optimizer = optimizer.load_record(record);

        tracing::info!(
            epoch = meta.epoch,
            steps = meta.loss_history.len(),
            path = %dir.display(),
            "Restored model, optimizer and loss history"
        );

        Ok(TrainingState {
            epoch: meta.epoch,
            loss_history: meta.loss_history,
            model,
            optimizer,
        })
    }

    /// Rebuild the flow of the latest checkpoint for generation.
    ///
    /// Returns the stored config together with the flow.
    pub fn load_model<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<Option<(NiceConfig, NiceFlow<B>)>, FlowError> {
        let Some(dir) = self.latest_dir()? else {
            return Ok(None);
        };
        let config = read_config(&dir)?;
        let template = config
            .init::<B>(device)
            .map_err(|e| corrupt(&dir, format!("stored config is invalid: {e}")))?;
        let model = load_flow(&dir, template, &recorder(), device)?;
        Ok(Some((config, model)))
    }

    /// `base`, or `base.{rev}` with the first revision not on disk.
    fn unused_name(&self, base: &str) -> String {
        if !self.root.join(base).exists() {
            return base.to_string();
        }
        (1u32..)
            .map(|rev| format!("{base}.{rev}"))
            .find(|name| !self.root.join(name).exists())
            .unwrap_or_else(|| base.to_string())
    }

    /// Remove superseded checkpoint directories and stale temp directories.
    fn prune(&self, current: &str) {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %self.root.display(), error = %e, "Cannot list checkpoints for pruning");
                return;
            }
        };

        let mut older = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(EPOCH_PREFIX) && name.ends_with(TMP_SUFFIX) {
                older.push((None, entry.path()));
            } else if let Some(key) = parse_epoch_dir(&name) {
                if name != current {
                    older.push((Some(key), entry.path()));
                }
            }
        }
        // Newest first; temp directories sort last and are always removed.
        older.sort_by(|a, b| b.0.cmp(&a.0));

        let mut kept = 1;
        for (key, path) in older {
            if key.is_some() && kept < self.keep {
                kept += 1;
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => tracing::debug!(?key, path = %path.display(), "Pruned old checkpoint"),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to prune checkpoint")
                }
            }
        }
    }
}

fn read_meta(dir: &Path) -> Result<CheckpointMeta, FlowError> {
    let path = dir.join(META_FILE);
    let bytes = fs::read(&path).map_err(|e| corrupt(&path, format!("cannot read: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| corrupt(&path, format!("cannot parse: {e}")))
}

fn read_config(dir: &Path) -> Result<NiceConfig, FlowError> {
    let path = dir.join(CONFIG_FILE);
    NiceConfig::load(&path).map_err(|e| corrupt(&path, format!("cannot load config: {e}")))
}

fn load_flow<B: Backend>(
    dir: &Path,
    template: NiceFlow<B>,
    recorder: &NamedMpkFileRecorder<FullPrecisionSettings>,
    device: &B::Device,
) -> Result<NiceFlow<B>, FlowError> {
    let d_data = template.d_data();
    let model = template
        .load_file(dir.join(MODEL_FILE), recorder, device)
        .map_err(|e| corrupt(dir, format!("failed to load model: {e}")))?;

    let [scale_dim] = model.log_scale().dims();
    if scale_dim != d_data {
        return Err(corrupt(
            dir,
            format!("log-scale has {scale_dim} entries, expected {d_data}"),
        ));
    }
    for (i, coupling) in model.couplings().iter().enumerate() {
        if coupling.input_width() != d_data / 2 || coupling.output_width() != d_data / 2 {
            return Err(corrupt(
                dir,
                format!("coupling {i} widths do not match d/2 = {}", d_data / 2),
            ));
        }
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::optim::{AdamConfig, GradientsParams};
    use burn::tensor::Distribution;
    use tempfile::TempDir;

    use crate::distribution::StandardLogistic;
    use crate::training::loss::negative_log_likelihood;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn config() -> NiceConfig {
        NiceConfig::new()
            .with_d_data(4)
            .with_d_hidden(8)
            .with_n_couplings(2)
            .with_n_linear(3)
    }

    fn encode_values(model: &NiceFlow<TestAutodiffBackend>, x: Tensor<TestAutodiffBackend, 2>) -> Vec<f32> {
        let (z, _) = model.encode(x).unwrap();
        z.into_data().to_vec().unwrap()
    }

    fn step<O: Optimizer<NiceFlow<TestAutodiffBackend>, TestAutodiffBackend>>(
        model: NiceFlow<TestAutodiffBackend>,
        optim: &mut O,
        x: Tensor<TestAutodiffBackend, 2>,
    ) -> NiceFlow<TestAutodiffBackend> {
        let prior = StandardLogistic::new(4);
        let loss = negative_log_likelihood(&model, &prior, x).unwrap();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        optim.step(1e-2, model, grads)
    }

    #[test]
    fn test_fresh_store_has_no_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path().join("ckpt"));
        let device = Default::default();

        let model = config().init::<TestAutodiffBackend>(&device).unwrap();
        let optim = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();
        assert!(store.load(model, optim, &device).unwrap().is_none());
        assert!(store.latest_meta().unwrap().is_none());
        assert!(store.load_model::<NdArray<f32>>(&device).unwrap().is_none());
    }

    #[test]
    fn test_round_trip_restores_everything() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let device = Default::default();

        let x = Tensor::<TestAutodiffBackend, 2>::random([6, 4], Distribution::Uniform(0.0, 1.0), &device);
        let mut optim = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();
        let mut model = config().init::<TestAutodiffBackend>(&device).unwrap();
        for _ in 0..3 {
            model = step(model, &mut optim, x.clone());
        }

        let history = vec![12.3, 11.9, 11.5];
        store.save(7, &model, &optim, &history, &config()).unwrap();

        let template = config().init::<TestAutodiffBackend>(&device).unwrap();
        let fresh_optim = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();
        let state = store.load(template, fresh_optim, &device).unwrap().unwrap();

        assert_eq!(state.epoch, 7);
        assert_eq!(state.loss_history, history);
        assert_eq!(
            encode_values(&state.model, x.clone()),
            encode_values(&model, x.clone())
        );

        // Identical next step proves the Adam moments came back too.
        let mut restored_optim = state.optimizer;
        let continued = step(model, &mut optim, x.clone());
        let resumed = step(state.model, &mut restored_optim, x.clone());
        let a = encode_values(&continued, x.clone());
        let b = encode_values(&resumed, x);
        for (u, v) in a.iter().zip(&b) {
            assert!((u - v).abs() < 1e-6, "resumed step diverged: {u} vs {v}");
        }
    }

    #[test]
    fn test_load_model_for_generation() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let device = Default::default();

        let model = config().init::<TestAutodiffBackend>(&device).unwrap();
        let optim = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();
        store.save(0, &model, &optim, &[1.0], &config()).unwrap();

        let (stored_config, flow) = store.load_model::<NdArray<f32>>(&device).unwrap().unwrap();
        assert_eq!(stored_config.d_data, 4);
        assert_eq!(stored_config.n_couplings, 2);

        let expected: Vec<f32> = model.log_scale().into_data().to_vec().unwrap();
        let got: Vec<f32> = flow.log_scale().into_data().to_vec().unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_latest_points_to_newest_and_prunes() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let device = Default::default();
        let model = config().init::<TestAutodiffBackend>(&device).unwrap();
        let optim = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();

        store.save(0, &model, &optim, &[3.0], &config()).unwrap();
        store.save(1, &model, &optim, &[3.0, 2.0], &config()).unwrap();
        store.save(2, &model, &optim, &[3.0, 2.0, 1.0], &config()).unwrap();

        let meta = store.latest_meta().unwrap().unwrap();
        assert_eq!(meta.epoch, 2);
        assert_eq!(meta.loss_history, vec![3.0, 2.0, 1.0]);

        assert!(tmp.path().join("epoch_2").is_dir());
        assert!(!tmp.path().join("epoch_1").exists());
        assert!(!tmp.path().join("epoch_0").exists());
        assert!(!tmp.path().join("LATEST.tmp").exists());
    }

    #[test]
    fn test_keep_retains_recent_checkpoints() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path()).with_keep(2);
        let device = Default::default();
        let model = config().init::<TestAutodiffBackend>(&device).unwrap();
        let optim = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();

        for epoch in 0..4 {
            store.save(epoch, &model, &optim, &[], &config()).unwrap();
        }
        assert!(tmp.path().join("epoch_3").is_dir());
        assert!(tmp.path().join("epoch_2").is_dir());
        assert!(!tmp.path().join("epoch_1").exists());
        assert!(!tmp.path().join("epoch_0").exists());
    }

    #[test]
    fn test_interrupted_save_is_invisible() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let device = Default::default();
        let model = config().init::<TestAutodiffBackend>(&device).unwrap();
        let optim = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();
        store.save(4, &model, &optim, &[5.0], &config()).unwrap();

        // A crash mid-save leaves a partial temp directory behind.
        let partial = tmp.path().join("epoch_5.tmp");
        fs::create_dir_all(&partial).unwrap();
        fs::write(partial.join("meta.json"), b"{\"epoch\": 5").unwrap();

        let meta = store.latest_meta().unwrap().unwrap();
        assert_eq!(meta.epoch, 4);
    }

    #[test]
    fn test_missing_target_is_corruption() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(LATEST_FILE), "epoch_3").unwrap();
        let store = CheckpointStore::new(tmp.path());

        let err = store.latest_meta().unwrap_err();
        assert!(matches!(err, FlowError::CheckpointCorruption { .. }), "unexpected error: {err}");
    }

    #[test]
    fn test_garbled_pointer_is_corruption() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(LATEST_FILE), "../elsewhere").unwrap();
        let store = CheckpointStore::new(tmp.path());
        assert!(matches!(
            store.latest_dir(),
            Err(FlowError::CheckpointCorruption { .. })
        ));
    }

    #[test]
    fn test_damaged_artifacts_are_corruption() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let device = Default::default();
        let model = config().init::<TestAutodiffBackend>(&device).unwrap();
        let optim = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();
        let dir = store.save(0, &model, &optim, &[1.0], &config()).unwrap();

        fs::write(dir.join(META_FILE), b"not json").unwrap();
        assert!(matches!(
            store.latest_meta(),
            Err(FlowError::CheckpointCorruption { .. })
        ));

        store.save(1, &model, &optim, &[1.0], &config()).unwrap();
        let dir = store.latest_dir().unwrap().unwrap();
        fs::remove_file(dir.join("model.mpk")).unwrap();

        let template = config().init::<TestAutodiffBackend>(&device).unwrap();
        let fresh = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();
        let err = match store.load(template, fresh, &device) {
            Err(e) => e,
            Ok(_) => panic!("load should fail when model.mpk is missing"),
        };
        assert!(matches!(err, FlowError::CheckpointCorruption { .. }), "unexpected error: {err}");
    }

    #[test]
    fn test_architecture_mismatch_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let device = Default::default();
        let model = config().init::<TestAutodiffBackend>(&device).unwrap();
        let optim = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();
        store.save(0, &model, &optim, &[1.0], &config()).unwrap();

        let wider = config().with_d_data(6).init::<TestAutodiffBackend>(&device).unwrap();
        let fresh = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();
        let err = match store.load(wider, fresh, &device) {
            Err(e) => e,
            Ok(_) => panic!("load should reject a different architecture"),
        };
        assert!(matches!(err, FlowError::Configuration(_)), "unexpected error: {err}");
    }

    #[test]
    fn test_shift_network_mismatch_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let device = Default::default();
        let model = config().init::<TestAutodiffBackend>(&device).unwrap();
        let optim = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();
        store.save(0, &model, &optim, &[1.0], &config()).unwrap();

        // A different layer count would otherwise reach the record loader.
        for changed in [config().with_n_linear(4), config().with_d_hidden(16)] {
            let template = changed.init::<TestAutodiffBackend>(&device).unwrap();
            let fresh = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();
            let err = match store.load(template, fresh, &device) {
                Err(e) => e,
                Ok(_) => panic!("load should reject {changed:?}"),
            };
            assert!(matches!(err, FlowError::Configuration(_)), "unexpected error: {err}");
        }
    }

    #[test]
    fn test_resaving_an_epoch_keeps_latest_valid() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path()).with_keep(2);
        let device = Default::default();
        let model = config().init::<TestAutodiffBackend>(&device).unwrap();
        let optim = AdamConfig::new().init::<TestAutodiffBackend, NiceFlow<TestAutodiffBackend>>();

        let first = store.save(2, &model, &optim, &[4.0], &config()).unwrap();
        let second = store.save(2, &model, &optim, &[4.0, 3.0], &config()).unwrap();
        assert_ne!(first, second);
        assert_eq!(second, tmp.path().join("epoch_2.1"));
        assert!(first.is_dir(), "previous directory stays until pruned");

        assert_eq!(store.latest_dir().unwrap(), Some(second));
        let meta = store.latest_meta().unwrap().unwrap();
        assert_eq!(meta.epoch, 2);
        assert_eq!(meta.loss_history, vec![4.0, 3.0]);

        // keep=1 drops the superseded revision on the next save.
        let store = CheckpointStore::new(tmp.path());
        let third = store.save(3, &model, &optim, &[4.0, 3.0, 2.0], &config()).unwrap();
        assert_eq!(third, tmp.path().join("epoch_3"));
        assert!(!first.exists());
        assert!(!tmp.path().join("epoch_2.1").exists());
    }

    #[test]
    fn test_parse_epoch_dir() {
        assert_eq!(parse_epoch_dir("epoch_7"), Some((7, 0)));
        assert_eq!(parse_epoch_dir("epoch_7.2"), Some((7, 2)));
        assert_eq!(parse_epoch_dir("epoch_7.tmp"), None);
        assert_eq!(parse_epoch_dir("epoch_"), None);
        assert_eq!(parse_epoch_dir("LATEST"), None);
    }
}
