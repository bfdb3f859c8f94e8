//! Per-epoch training summaries.

use std::fmt;

use serde::Serialize;

/// Convert a per-example negative log-likelihood in nats to bits per
/// dimension.
///
/// For pixels scaled to `[0, 1]`, add 8 to compare against discrete 8-bit
/// bits/dim figures.
pub fn bits_per_dim(nll_per_example: f64, dim: usize) -> f64 {
    nll_per_example / (dim as f64 * std::f64::consts::LN_2)
}

/// Loss statistics for one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub steps: usize,
    /// Mean of the per-step (batch-summed) losses.
    pub mean_loss: f64,
    pub min_loss: f64,
    pub max_loss: f64,
    /// Per-example NLL in bits per dimension.
    pub bits_per_dim: f64,
}

impl EpochSummary {
    /// Summarize the losses of one epoch.
    ///
    /// `examples` is the number of samples seen during the epoch and `dim`
    /// the sample width. Returns `None` for an epoch with no steps.
    pub fn from_losses(epoch: usize, losses: &[f64], examples: usize, dim: usize) -> Option<Self> {
        if losses.is_empty() || examples == 0 || dim == 0 {
            return None;
        }
        let total: f64 = losses.iter().sum();
        let min_loss = losses.iter().copied().fold(f64::INFINITY, f64::min);
        let max_loss = losses.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            epoch,
            steps: losses.len(),
            mean_loss: total / losses.len() as f64,
            min_loss,
            max_loss,
            bits_per_dim: bits_per_dim(total / examples as f64, dim),
        })
    }
}

impl fmt::Display for EpochSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epoch={} steps={} loss={:.2} (min={:.2} max={:.2}) bpd={:.4}",
            self.epoch, self.steps, self.mean_loss, self.min_loss, self.max_loss, self.bits_per_dim
        )
    }
}
