use std::path::PathBuf;

/// Errors raised by the flow, its training loop and the checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Invalid dimensions, empty batch source or otherwise unusable setup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A vector or tensor whose width disagrees with `d` or `d/2`.
    #[error("Shape mismatch: expected width {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// A checkpoint exists on disk but cannot be restored in full.
    #[error("Corrupt checkpoint at {}: {reason}", path.display())]
    CheckpointCorruption { path: PathBuf, reason: String },

    /// The training loss left the finite range.
    #[error("Non-finite loss {loss} at epoch {epoch}, step {step}")]
    NumericalInstability { epoch: usize, step: usize, loss: f64 },

    /// Failure while writing a checkpoint.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error from checkpoint persistence.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// Build a `ShapeMismatch` if `actual != expected`.
    pub(crate) fn check_width(expected: usize, actual: usize) -> Result<(), FlowError> {
        if expected == actual {
            Ok(())
        } else {
            Err(FlowError::ShapeMismatch { expected, actual })
        }
    }
}
