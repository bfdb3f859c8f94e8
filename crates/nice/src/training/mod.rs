//! Likelihood training: batch sources, the NLL objective, per-epoch
//! metrics, the training loop and its checkpoint store.

pub mod checkpoint;
pub mod data;
pub mod loss;
pub mod metrics;
pub mod trainer;
