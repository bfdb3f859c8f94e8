//! Flow components: additive coupling layers, the full NICE transform, and
//! the tensor bridge between plain rows and burn tensors.

pub mod bridge;
pub mod coupling;
pub mod flow;
