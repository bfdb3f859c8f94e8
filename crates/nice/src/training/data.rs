//! Batch sources for likelihood training.
//!
//! The trainer only needs an iterable of fixed-width rows per epoch. Image
//! decoding and preprocessing happen upstream; this module owns batching and
//! per-epoch shuffling.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::FlowError;

/// One minibatch: `batch` rows of `sample_dim` values each.
pub type Batch = Vec<Vec<f32>>;

/// Supplies minibatches for each training epoch.
pub trait BatchSource {
    /// Width of every sample produced by this source.
    fn sample_dim(&self) -> usize;

    /// Batches for one pass over the data. May reshuffle between epochs.
    fn epoch_batches(&mut self, epoch: usize) -> Box<dyn Iterator<Item = Batch> + '_>;
}

/// Batch source over samples held in memory.
///
/// Mirrors a shuffling data loader: a fresh permutation every epoch, fixed
/// batch size, and a shorter final batch when the sample count is not a
/// multiple of the batch size.
pub struct InMemoryBatchSource {
    samples: Vec<Vec<f32>>,
    dim: usize,
    batch_size: usize,
    shuffle: bool,
    order: Vec<usize>,
    seed: u64,
}

impl InMemoryBatchSource {
    /// Create a shuffling source.
    ///
    /// The permutation of each epoch depends only on `seed` and the epoch
    /// index, so a resumed run sees the same batches it would have seen
    /// without the restart.
    pub fn new(samples: Vec<Vec<f32>>, batch_size: usize, seed: u64) -> Result<Self, FlowError> {
        if samples.is_empty() {
            return Err(FlowError::Configuration("batch source has no samples".to_string()));
        }
        if batch_size == 0 {
            return Err(FlowError::Configuration("batch_size must be positive".to_string()));
        }
        let dim = samples[0].len();
        if dim == 0 {
            return Err(FlowError::Configuration("samples must not be empty vectors".to_string()));
        }
        for sample in &samples {
            FlowError::check_width(dim, sample.len())?;
        }

        let order = (0..samples.len()).collect();
        Ok(Self {
            samples,
            dim,
            batch_size,
            shuffle: true,
            order,
            seed,
        })
    }

    /// Disable shuffling; batches then follow insertion order.
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; construction rejects empty sample sets.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }
}

impl BatchSource for InMemoryBatchSource {
    fn sample_dim(&self) -> usize {
        self.dim
    }

    fn epoch_batches(&mut self, epoch: usize) -> Box<dyn Iterator<Item = Batch> + '_> {
        self.order.sort_unstable();
        if self.shuffle {
            let stream = (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            let mut rng = StdRng::seed_from_u64(self.seed ^ stream);
            self.order.shuffle(&mut rng);
        }
        let samples = &self.samples;
        Box::new(
            self.order
                .chunks(self.batch_size)
                .map(move |chunk| chunk.iter().map(|&i| samples[i].clone()).collect()),
        )
    }
}
