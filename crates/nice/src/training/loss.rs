//! Maximum-likelihood objective via the change-of-variables formula.
//!
//! `log p(x) = log p_Z(f(x)) + log|det J_f|`, where `log|det J_f| = sum(s)`
//! is shared by every row of the batch.

use burn::prelude::*;

use crate::distribution::StandardLogistic;
use crate::error::FlowError;
use crate::model::flow::NiceFlow;

/// Per-example log-likelihood.
///
/// Input shape: `(batch, d)`
/// Output shape: `(batch,)`
pub fn log_likelihood<B: Backend>(
    flow: &NiceFlow<B>,
    prior: &StandardLogistic,
    x: Tensor<B, 2>,
) -> Result<Tensor<B, 1>, FlowError> {
    let (z, log_det) = flow.encode(x)?;
    Ok(prior.log_density(z)? + log_det)
}

/// Batch negative log-likelihood, summed (not averaged) over examples.
///
/// The sum keeps loss values comparable with loss histories recorded by
/// earlier runs; it scales with batch size.
///
/// Returns a scalar tensor of shape `(1,)`.
pub fn negative_log_likelihood<B: Backend>(
    flow: &NiceFlow<B>,
    prior: &StandardLogistic,
    x: Tensor<B, 2>,
) -> Result<Tensor<B, 1>, FlowError> {
    Ok(log_likelihood(flow, prior, x)?.sum().neg())
}
