//! Generation from a trained flow.
//!
//! Provides `FlowSampler<B>`, which draws latent codes from the logistic
//! prior and maps them back to data space through the exact inverse.

use burn::prelude::*;
use rand::Rng;

use crate::distribution::StandardLogistic;
use crate::error::FlowError;
use crate::model::bridge::{rows_to_tensor, tensor_to_rows, tensor_to_vec};
use crate::model::flow::NiceFlow;
use crate::training::checkpoint::CheckpointStore;

/// Sampler and density evaluator over a fixed flow.
pub struct FlowSampler<B: Backend> {
    flow: NiceFlow<B>,
    prior: StandardLogistic,
    device: B::Device,
}

impl<B: Backend> FlowSampler<B> {
    pub fn new(flow: NiceFlow<B>, device: B::Device) -> Self {
        let prior = StandardLogistic::new(flow.d_data());
        Self {
            flow,
            prior,
            device,
        }
    }

    /// Rebuild the flow of the latest checkpoint in `store`.
    ///
    /// Returns `None` if the store holds no checkpoint yet.
    pub fn load(store: &CheckpointStore, device: B::Device) -> Result<Option<Self>, FlowError> {
        Ok(store
            .load_model::<B>(&device)?
            .map(|(_, flow)| Self::new(flow, device)))
    }

    pub fn flow(&self) -> &NiceFlow<B> {
        &self.flow
    }

    /// Draw `n` data-space samples as a `(n, d)` tensor.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Tensor<B, 2>, FlowError> {
        if n == 0 {
            return Err(FlowError::Configuration("sample count must be positive".to_string()));
        }
        let z = self.prior.sample::<B, R>(n, rng, &self.device);
        self.flow.decode(z)
    }

    /// Draw `n` samples as rows clipped to `[0, 1]`, ready for rendering.
    pub fn sample_rows<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Vec<f32>>, FlowError> {
        let x = self.sample(n, rng)?.clamp(0.0, 1.0);
        Ok(tensor_to_rows(x))
    }

    /// Log-likelihood in nats of each row under the flow.
    pub fn log_likelihood(&self, rows: &[Vec<f32>]) -> Result<Vec<f64>, FlowError> {
        let x = rows_to_tensor::<B>(rows, self.flow.d_data(), &self.device)?;
        let ll = crate::training::loss::log_likelihood(&self.flow, &self.prior, x)?;
        Ok(tensor_to_vec(ll))
    }
}
