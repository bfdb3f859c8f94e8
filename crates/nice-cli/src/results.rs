//! Result types for checkpoint summaries.

use nice::CheckpointMeta;
use serde::Serialize;

/// Loss statistics of a checkpointed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointSummary {
    /// Last completed epoch.
    pub epoch: usize,
    /// Optimizer steps taken so far.
    pub steps: usize,
    pub first_loss: Option<f64>,
    pub last_loss: Option<f64>,
    /// Lowest per-step loss seen.
    pub best_loss: Option<f64>,
}

impl CheckpointSummary {
    pub fn from_meta(meta: &CheckpointMeta) -> Self {
        let history = &meta.loss_history;
        let best_loss = history
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .reduce(f64::min);
        Self {
            epoch: meta.epoch,
            steps: history.len(),
            first_loss: history.first().copied(),
            last_loss: history.last().copied(),
            best_loss,
        }
    }
}
