//! Tensor bridge: conversions between plain `Vec<f32>` rows and burn tensors.
//!
//! Batch sources and renderers work with flat rows; the flow works with
//! `(batch, d)` tensors. Width checks happen here so a malformed row is
//! reported before it reaches the model.

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::FlowError;

/// Convert a batch of rows to a burn 2D tensor of shape `(batch, dim)`.
///
/// Fails with `Configuration` on an empty batch and with `ShapeMismatch`
/// if any row's length differs from `dim`.
pub fn rows_to_tensor<B: Backend>(
    rows: &[Vec<f32>],
    dim: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2>, FlowError> {
    if rows.is_empty() {
        return Err(FlowError::Configuration("batch must not be empty".to_string()));
    }
    for row in rows {
        FlowError::check_width(dim, row.len())?;
    }

    let batch = rows.len();
    let flat: Vec<f32> = rows.iter().flat_map(|v| v.iter().copied()).collect();
    Ok(Tensor::from_data(TensorData::new(flat, [batch, dim]), device))
}

/// Split a `(batch, dim)` tensor back into rows.
pub fn tensor_to_rows<B: Backend>(tensor: Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [_, dim] = tensor.dims();
    let flat: Vec<f32> = tensor.into_data().iter::<f32>().collect();
    if dim == 0 {
        return Vec::new();
    }
    flat.chunks(dim).map(|c| c.to_vec()).collect()
}

/// Extract f64 values from a burn 1D tensor.
pub fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Vec<f64> {
    tensor
        .into_data()
        .iter::<f32>()
        .map(|v| v as f64)
        .collect()
}

/// Extract a single f64 scalar from a burn 1D tensor.
///
/// # Panics
/// Panics if the tensor does not contain exactly one element.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    let val: f32 = tensor.into_scalar().elem();
    val as f64
}
