//! The full invertible map: a stack of additive coupling layers followed by a
//! learnable diagonal rescale.
//!
//! Each stage reads the current vector as two interleaved halves (even and
//! odd positions). Stage parity picks which half conditions the coupling;
//! the conditioning half is always stored back in the even slots and the
//! shifted half in the odd slots. Encode and decode share the same
//! role/slot mapping (`to_roles` / `from_roles`).

use burn::module::Param;
use burn::prelude::*;
use burn::tensor::Distribution;

use crate::error::FlowError;
use crate::model::coupling::{CouplingLayer, CouplingLayerConfig};

/// Configuration for a NICE flow.
///
/// ```text
/// x: (batch, d_data)
///   → n_couplings × [split even/odd → additive coupling → interleave]
///   → z = exp(s) ⊙ x
///   → (z: (batch, d_data), log_det = sum(s): (1,))
/// ```
#[derive(Config, Debug)]
pub struct NiceConfig {
    /// Flattened sample dimension. Must be even.
    #[config(default = 3072)]
    pub d_data: usize,
    /// Hidden width of every coupling shift network.
    #[config(default = 1000)]
    pub d_hidden: usize,
    /// Number of coupling layers.
    #[config(default = 4)]
    pub n_couplings: usize,
    /// Linear layers per shift network.
    #[config(default = 6)]
    pub n_linear: usize,
    /// Std of the normal init for the log-scale vector `s`. 0 gives `s = 0`.
    #[config(default = 1.0)]
    pub scale_init_std: f64,
    /// Start every coupling as the identity.
    #[config(default = false)]
    pub zero_init_couplings: bool,
}

impl NiceConfig {
    /// Check dimensions without allocating any parameters.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.d_data == 0 || self.d_data % 2 != 0 {
            return Err(FlowError::Configuration(format!(
                "d_data must be even and positive, got {}",
                self.d_data
            )));
        }
        if self.d_hidden == 0 {
            return Err(FlowError::Configuration("d_hidden must be positive".to_string()));
        }
        if self.n_couplings == 0 {
            return Err(FlowError::Configuration(
                "flow needs at least one coupling layer".to_string(),
            ));
        }
        if self.n_linear == 0 {
            return Err(FlowError::Configuration(
                "shift network needs at least one linear layer".to_string(),
            ));
        }
        if !(self.scale_init_std >= 0.0 && self.scale_init_std.is_finite()) {
            return Err(FlowError::Configuration(format!(
                "scale_init_std must be finite and non-negative, got {}",
                self.scale_init_std
            )));
        }
        Ok(())
    }

    /// Coupling layer config derived from this flow config.
    pub fn coupling(&self) -> CouplingLayerConfig {
        CouplingLayerConfig::new(self.d_data / 2)
            .with_d_hidden(self.d_hidden)
            .with_n_linear(self.n_linear)
            .with_zero_init(self.zero_init_couplings)
    }

    /// Initialize a NiceFlow with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<NiceFlow<B>, FlowError> {
        self.validate()?;

        let coupling = self.coupling();
        let couplings = (0..self.n_couplings)
            .map(|_| coupling.init(device))
            .collect();

        let log_scale = if self.scale_init_std == 0.0 {
            Tensor::zeros([self.d_data], device)
        } else {
            Tensor::random(
                [self.d_data],
                Distribution::Normal(0.0, self.scale_init_std),
                device,
            )
        };

        NiceFlow::from_parts(couplings, log_scale)
    }
}

/// NICE flow: additive coupling stack plus diagonal rescale.
///
/// Only the rescale changes volume, so the log-determinant of the Jacobian
/// is `sum(s)` for every input.
#[derive(Module, Debug)]
pub struct NiceFlow<B: Backend> {
    /// Coupling layers in encode order.
    couplings: Vec<CouplingLayer<B>>,
    /// Log-scale vector `s`, shape `(d_data,)`.
    log_scale: Param<Tensor<B, 1>>,
    /// Flattened sample dimension.
    d_data: usize,
}

/// Assign the stored halves to (conditioning, shifted) roles for `stage`.
fn to_roles<T>(stage: usize, even: T, odd: T) -> (T, T) {
    if stage % 2 == 0 {
        (even, odd)
    } else {
        (odd, even)
    }
}

/// Inverse of [`to_roles`]: map (conditioning, shifted) back to (even, odd).
fn from_roles<T>(stage: usize, conditioning: T, shifted: T) -> (T, T) {
    if stage % 2 == 0 {
        (conditioning, shifted)
    } else {
        (shifted, conditioning)
    }
}

/// Split `(batch, d)` into its even-position and odd-position halves.
fn deinterleave<B: Backend>(x: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let [batch, d] = x.dims();
    let half = d / 2;
    let pairs = x.reshape([batch, half, 2]);
    let even = pairs
        .clone()
        .slice([0..batch, 0..half, 0..1])
        .reshape([batch, half]);
    let odd = pairs
        .slice([0..batch, 0..half, 1..2])
        .reshape([batch, half]);
    (even, odd)
}

/// Write `even` to the even positions and `odd` to the odd positions.
fn interleave<B: Backend>(even: Tensor<B, 2>, odd: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, half] = even.dims();
    Tensor::stack::<3>(vec![even, odd], 2).reshape([batch, half * 2])
}

impl<B: Backend> NiceFlow<B> {
    /// Assemble a flow from existing layers and a log-scale vector.
    ///
    /// Fails with `Configuration` if `d` is odd or any shift network's
    /// widths disagree with `d / 2`.
    pub fn from_parts(
        couplings: Vec<CouplingLayer<B>>,
        log_scale: Tensor<B, 1>,
    ) -> Result<Self, FlowError> {
        let [d_data] = log_scale.dims();
        if d_data == 0 || d_data % 2 != 0 {
            return Err(FlowError::Configuration(format!(
                "flow dimension must be even and positive, got {d_data}"
            )));
        }
        let half = d_data / 2;
        for (i, coupling) in couplings.iter().enumerate() {
            let widths = [coupling.d_half(), coupling.input_width(), coupling.output_width()];
            if widths.iter().any(|&w| w != half) {
                return Err(FlowError::Configuration(format!(
                    "coupling {i} has widths {widths:?}, expected d/2 = {half}"
                )));
            }
        }

        Ok(Self {
            couplings,
            log_scale: Param::from_tensor(log_scale),
            d_data,
        })
    }

    /// Flattened sample dimension `d`.
    pub fn d_data(&self) -> usize {
        self.d_data
    }

    /// Number of coupling layers.
    pub fn n_couplings(&self) -> usize {
        self.couplings.len()
    }

    /// Coupling layers in encode order.
    pub fn couplings(&self) -> &[CouplingLayer<B>] {
        &self.couplings
    }

    /// Describe where this flow's layer shapes differ from `config`.
    ///
    /// Reads the real parameter shapes, so a flow restored from disk is
    /// checked as loaded. `None` when every architecture field agrees.
    pub fn architecture_mismatch(&self, config: &NiceConfig) -> Option<String> {
        if self.d_data != config.d_data {
            return Some(format!("d_data: flow has {}, config has {}", self.d_data, config.d_data));
        }
        if self.n_couplings() != config.n_couplings {
            return Some(format!(
                "n_couplings: flow has {}, config has {}",
                self.n_couplings(),
                config.n_couplings
            ));
        }
        self.couplings.iter().enumerate().find_map(|(i, coupling)| {
            if coupling.n_linear() != config.n_linear {
                return Some(format!(
                    "coupling {i} n_linear: flow has {}, config has {}",
                    coupling.n_linear(),
                    config.n_linear
                ));
            }
            match coupling.hidden_width() {
                Some(width) if width != config.d_hidden => Some(format!(
                    "coupling {i} d_hidden: flow has {width}, config has {}",
                    config.d_hidden
                )),
                _ => None,
            }
        })
    }

    /// Current log-scale vector `s`.
    pub fn log_scale(&self) -> Tensor<B, 1> {
        self.log_scale.val()
    }

    /// Log-determinant of the Jacobian, `sum(s)`, shape `(1,)`.
    pub fn log_det(&self) -> Tensor<B, 1> {
        self.log_scale.val().sum()
    }

    /// Data → latent. Returns `(z, log_det)`; `log_det` is shared by the
    /// whole batch.
    pub fn encode(&self, x: Tensor<B, 2>) -> Result<(Tensor<B, 2>, Tensor<B, 1>), FlowError> {
        FlowError::check_width(self.d_data, x.dims()[1])?;

        let mut x = x;
        for (stage, coupling) in self.couplings.iter().enumerate() {
            let (even, odd) = deinterleave(x);
            let (conditioning, shifted) = to_roles(stage, even, odd);
            let (conditioning, shifted) = coupling.apply(conditioning, shifted)?;
            x = interleave(conditioning, shifted);
        }

        let scale = self.log_scale.val().exp().unsqueeze_dim::<2>(0);
        Ok((x * scale, self.log_det()))
    }

    /// Latent → data. Exact inverse of [`encode`](Self::encode) up to
    /// floating-point rounding.
    pub fn decode(&self, z: Tensor<B, 2>) -> Result<Tensor<B, 2>, FlowError> {
        FlowError::check_width(self.d_data, z.dims()[1])?;

        let scale = self.log_scale.val().exp().unsqueeze_dim::<2>(0);
        let mut x = z / scale;
        for (stage, coupling) in self.couplings.iter().enumerate().rev() {
            let (conditioning, shifted) = deinterleave(x);
            let (conditioning, shifted) = coupling.unapply(conditioning, shifted)?;
            let (even, odd) = from_roles(stage, conditioning, shifted);
            x = interleave(even, odd);
        }
        Ok(x)
    }
}
