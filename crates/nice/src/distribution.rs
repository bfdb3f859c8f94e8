//! Factorized standard logistic prior over the latent space.

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::distributions::{Distribution as _, Open01};
use rand::Rng;

use crate::error::FlowError;

/// Standard logistic distribution applied independently to each of `dim`
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardLogistic {
    dim: usize,
}

impl StandardLogistic {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    /// Number of latent coordinates.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Log-density of each row of `z`, summed over coordinates.
    ///
    /// Per coordinate `log p(z) = -z - 2·log(1 + e^{-z})`. The density is
    /// symmetric, so it is evaluated at `|z|` where `e^{-|z|} <= 1` and
    /// nothing overflows.
    ///
    /// Input shape: `(batch, dim)`
    /// Output shape: `(batch,)`
    pub fn log_density<B: Backend>(&self, z: Tensor<B, 2>) -> Result<Tensor<B, 1>, FlowError> {
        FlowError::check_width(self.dim, z.dims()[1])?;

        let a = z.abs();
        let per_coord = a.clone().neg() - a.neg().exp().log1p().mul_scalar(2.0);
        Ok(per_coord.sum_dim(1).squeeze::<1>(1))
    }

    /// Draw `n` latent vectors on the host.
    ///
    /// Uniform variates on the open interval (0, 1) go through the logit
    /// `ln(u) - ln(1 - u)`, which is the inverse CDF of the standard
    /// logistic. Reproducible for a seeded `rng`.
    pub fn sample_rows<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Vec<f32>> {
        (0..n)
            .map(|_| {
                (0..self.dim)
                    .map(|_| {
                        let u: f64 = Open01.sample(rng);
                        (u.ln() - (-u).ln_1p()) as f32
                    })
                    .collect()
            })
            .collect()
    }

    /// Draw `n` latent vectors as a `(n, dim)` tensor on `device`.
    pub fn sample<B: Backend, R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
        device: &B::Device,
    ) -> Tensor<B, 2> {
        let flat: Vec<f32> = self.sample_rows(n, rng).into_iter().flatten().collect();
        Tensor::from_data(TensorData::new(flat, [n, self.dim]), device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    fn values(t: Tensor<TestBackend, 1>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_log_density_at_zero() {
        let device = Default::default();
        let prior = StandardLogistic::new(5);
        let z = Tensor::<TestBackend, 2>::zeros([2, 5], &device);

        let expected = -5.0 * 4.0_f32.ln();
        for v in values(prior.log_density(z).unwrap()) {
            assert!((v - expected).abs() < 1e-5, "expected {expected}, got {v}");
        }
    }

    #[test]
    fn test_log_density_matches_closed_form() {
        let device = Default::default();
        let prior = StandardLogistic::new(1);
        let points = [-3.0_f32, -0.5, 0.25, 2.0, 7.5];
        let z = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(points.to_vec(), [points.len(), 1]),
            &device,
        );

        let got = values(prior.log_density(z).unwrap());
        for (&x, g) in points.iter().zip(got) {
            let x = x as f64;
            let want = -x - 2.0 * (1.0 + (-x).exp()).ln();
            assert!((g as f64 - want).abs() < 1e-5, "z={x}: expected {want}, got {g}");
        }
    }

    #[test]
    fn test_log_density_is_stable_for_large_inputs() {
        let device = Default::default();
        let prior = StandardLogistic::new(2);
        let z = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1000.0_f32, -1000.0], [-200.0, 200.0]]),
            &device,
        );

        let got = values(prior.log_density(z).unwrap());
        assert!(got.iter().all(|v| v.is_finite()), "non-finite density: {got:?}");
        assert!((got[0] + 2000.0).abs() < 1e-2);
        assert!((got[1] + 400.0).abs() < 1e-2);
    }

    #[test]
    fn test_log_density_width_mismatch() {
        let device = Default::default();
        let prior = StandardLogistic::new(4);
        let z = Tensor::<TestBackend, 2>::zeros([1, 3], &device);
        assert!(matches!(
            prior.log_density(z),
            Err(FlowError::ShapeMismatch { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_density_integrates_to_one() {
        // Monte-Carlo integral over [-15, 15]^2 with a uniform proposal.
        let device = Default::default();
        let prior = StandardLogistic::new(2);
        let mut rng = StdRng::seed_from_u64(7);
        let n = 100_000;
        let half_width = 15.0_f32;

        let flat: Vec<f32> = (0..n * 2)
            .map(|_| rng.gen_range(-half_width..half_width))
            .collect();
        let z = Tensor::<TestBackend, 2>::from_data(TensorData::new(flat, [n, 2]), &device);

        let mean_density: f32 = prior.log_density(z).unwrap().exp().mean().into_scalar().elem();
        let area = (2.0 * half_width).powi(2);
        let integral = mean_density * area;
        assert!((integral - 1.0).abs() < 0.08, "integral estimate {integral}");
    }

    #[test]
    fn test_sample_is_reproducible() {
        let prior = StandardLogistic::new(6);
        let a = prior.sample_rows(3, &mut StdRng::seed_from_u64(42));
        let b = prior.sample_rows(3, &mut StdRng::seed_from_u64(42));
        let c = prior.sample_rows(3, &mut StdRng::seed_from_u64(43));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sample_moments() {
        let device = Default::default();
        let prior = StandardLogistic::new(4);
        let mut rng = StdRng::seed_from_u64(0);
        let samples = prior.sample::<TestBackend, _>(20_000, &mut rng, &device);
        assert_eq!(samples.dims(), [20_000, 4]);

        let data: Vec<f32> = samples.into_data().to_vec().unwrap();
        assert!(data.iter().all(|v| v.is_finite()));
        let n = data.len() as f64;
        let mean = data.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = data.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;

        // Standard logistic: mean 0, variance pi^2 / 3.
        let expected_var = std::f64::consts::PI.powi(2) / 3.0;
        assert!(mean.abs() < 0.05, "sample mean {mean}");
        assert!((var - expected_var).abs() < 0.15, "sample variance {var}");
    }
}
