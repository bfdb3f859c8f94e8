use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;

use crate::error::FlowError;

/// Configuration for one additive coupling layer.
///
/// The shift network is a plain ReLU MLP mapping the conditioning half to a
/// shift for the other half:
///
/// ```text
/// (batch, d_half)
///   → Linear(d_half→d_hidden) → ReLU
///   → Linear(d_hidden→d_hidden) → ReLU   (n_linear - 2 times)
///   → Linear(d_hidden→d_half)
///   → shift: (batch, d_half)
/// ```
#[derive(Config, Debug)]
pub struct CouplingLayerConfig {
    /// Width of each half-vector (`d / 2`).
    pub d_half: usize,
    /// Hidden width of the shift network.
    #[config(default = 1000)]
    pub d_hidden: usize,
    /// Number of linear layers in the shift network.
    #[config(default = 6)]
    pub n_linear: usize,
    /// Zero every weight and bias so the layer starts as the identity.
    #[config(default = false)]
    pub zero_init: bool,
}

/// Additive coupling: `(a, b) -> (a, b + f(a))`.
///
/// `f` itself is not invertible; the additive structure is. The Jacobian is
/// triangular with a unit diagonal, so every layer preserves volume.
#[derive(Module, Debug)]
pub struct CouplingLayer<B: Backend> {
    /// Shift network layers, applied in order with ReLU between them.
    pub(crate) linears: Vec<Linear<B>>,
    /// Expected half-vector width.
    d_half: usize,
}

impl CouplingLayerConfig {
    /// Initialize a CouplingLayer.
    ///
    /// Weights use burn's default Kaiming-uniform init unless `zero_init`.
    /// `n_linear` must be at least 1; `NiceConfig` validates this before
    /// calling here.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CouplingLayer<B> {
        let n_linear = self.n_linear.max(1);
        let mut widths = Vec::with_capacity(n_linear + 1);
        widths.push(self.d_half);
        widths.extend(std::iter::repeat(self.d_hidden).take(n_linear - 1));
        widths.push(self.d_half);

        let linears = widths
            .windows(2)
            .map(|w| {
                let config = LinearConfig::new(w[0], w[1]);
                let config = if self.zero_init {
                    config.with_initializer(Initializer::Zeros)
                } else {
                    config
                };
                config.init(device)
            })
            .collect();

        CouplingLayer {
            linears,
            d_half: self.d_half,
        }
    }
}

impl<B: Backend> CouplingLayer<B> {
    /// Width of the half-vectors this layer accepts.
    pub fn d_half(&self) -> usize {
        self.d_half
    }

    /// Number of linear layers in the shift network.
    pub fn n_linear(&self) -> usize {
        self.linears.len()
    }

    /// Hidden width of the shift network. `None` with a single linear layer.
    pub fn hidden_width(&self) -> Option<usize> {
        if self.linears.len() < 2 {
            return None;
        }
        self.linears.first().map(|l| l.weight.val().dims()[1])
    }

    /// Input width of the first linear layer of the shift network.
    pub fn input_width(&self) -> usize {
        self.linears
            .first()
            .map(|l| l.weight.val().dims()[0])
            .unwrap_or(0)
    }

    /// Output width of the last linear layer of the shift network.
    pub fn output_width(&self) -> usize {
        self.linears
            .last()
            .map(|l| l.weight.val().dims()[1])
            .unwrap_or(0)
    }

    /// The shift network `f`: `(batch, d_half) -> (batch, d_half)`.
    pub fn shift(&self, a: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.linears.len().saturating_sub(1);
        let mut x = a;
        for (i, linear) in self.linears.iter().enumerate() {
            x = linear.forward(x);
            if i < last {
                x = burn::tensor::activation::relu(x);
            }
        }
        x
    }

    /// Forward coupling: returns `(a, b + f(a))`.
    pub fn apply(
        &self,
        a: Tensor<B, 2>,
        b: Tensor<B, 2>,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 2>), FlowError> {
        self.check_halves(&a, &b)?;
        let shifted = b + self.shift(a.clone());
        Ok((a, shifted))
    }

    /// Inverse coupling: returns `(a, b - f(a))`.
    pub fn unapply(
        &self,
        a: Tensor<B, 2>,
        b: Tensor<B, 2>,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 2>), FlowError> {
        self.check_halves(&a, &b)?;
        let restored = b - self.shift(a.clone());
        Ok((a, restored))
    }

    fn check_halves(&self, a: &Tensor<B, 2>, b: &Tensor<B, 2>) -> Result<(), FlowError> {
        FlowError::check_width(self.d_half, a.dims()[1])?;
        FlowError::check_width(self.d_half, b.dims()[1])?;
        FlowError::check_width(a.dims()[0], b.dims()[0])
    }
}
