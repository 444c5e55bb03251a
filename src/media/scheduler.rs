// SPDX-License-Identifier: MPL-2.0
//! DDIM sampling for the latent-diffusion upscaler.
//!
//! The scheduler walks a descending subset of the training timesteps and, at
//! each one, turns the UNet's noise prediction into the next, less noisy
//! latent. With `eta > 0` every step also injects fresh Gaussian noise.

use crate::config::defaults::{DDIM_BETA_END, DDIM_BETA_START, DDIM_TRAIN_TIMESTEPS};
use ndarray::{Array, ArrayView, Dimension};
use rand::Rng;
use rand_distr::StandardNormal;
use std::fmt;

/// Errors from scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Requested step count is zero or exceeds the training timesteps.
    InvalidStepCount { requested: usize, max: usize },
    /// `step` was called with a timestep outside the schedule.
    TimestepOutOfRange(usize),
    /// Model output and sample shapes differ.
    ShapeMismatch,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::InvalidStepCount { requested, max } => {
                write!(f, "Invalid step count {requested} (expected 1..={max})")
            }
            SchedulerError::TimestepOutOfRange(t) => write!(f, "Timestep {t} out of range"),
            SchedulerError::ShapeMismatch => {
                write!(f, "Model output shape does not match sample shape")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Denoising diffusion implicit models scheduler with a linear beta schedule.
#[derive(Debug, Clone)]
pub struct DdimScheduler {
    alphas_cumprod: Vec<f32>,
    final_alpha_cumprod: f32,
    timesteps: Vec<usize>,
    step_ratio: usize,
}

impl Default for DdimScheduler {
    fn default() -> Self {
        Self::linear(DDIM_BETA_START, DDIM_BETA_END, DDIM_TRAIN_TIMESTEPS)
    }
}

impl DdimScheduler {
    /// Builds a scheduler whose betas are evenly spaced between `beta_start`
    /// and `beta_end` over `train_timesteps` steps.
    ///
    /// # Panics
    ///
    /// Panics if `train_timesteps` is zero.
    #[must_use]
    pub fn linear(beta_start: f32, beta_end: f32, train_timesteps: usize) -> Self {
        assert!(train_timesteps > 0, "need at least one training timestep");

        let span = (train_timesteps.max(2) - 1) as f64;
        let mut cumprod = 1.0_f64;
        let alphas_cumprod = (0..train_timesteps)
            .map(|i| {
                let beta = f64::from(beta_start)
                    + (f64::from(beta_end) - f64::from(beta_start)) * (i as f64 / span);
                cumprod *= 1.0 - beta;
                // Narrowing is intentional: the runtime works in f32
                #[allow(clippy::cast_possible_truncation)]
                let value = cumprod as f32;
                value
            })
            .collect();

        Self {
            alphas_cumprod,
            final_alpha_cumprod: 1.0,
            timesteps: Vec::new(),
            step_ratio: 1,
        }
    }

    /// Number of timesteps the model was trained with.
    #[must_use]
    pub fn train_timesteps(&self) -> usize {
        self.alphas_cumprod.len()
    }

    /// Cumulative alpha product at training timestep `t`.
    #[must_use]
    pub fn alpha_cumprod(&self, t: usize) -> Option<f32> {
        self.alphas_cumprod.get(t).copied()
    }

    /// Standard deviation of the initial noise.
    #[must_use]
    pub const fn init_noise_sigma(&self) -> f32 {
        1.0
    }

    /// Selects `steps` evenly spaced timesteps, highest first.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidStepCount`] if `steps` is zero or larger
    /// than the number of training timesteps.
    pub fn set_timesteps(&mut self, steps: usize) -> Result<(), SchedulerError> {
        let max = self.train_timesteps();
        if steps == 0 || steps > max {
            return Err(SchedulerError::InvalidStepCount {
                requested: steps,
                max,
            });
        }

        self.step_ratio = max / steps;
        self.timesteps = (0..steps).rev().map(|i| i * self.step_ratio).collect();
        Ok(())
    }

    /// The timesteps chosen by [`set_timesteps`](Self::set_timesteps).
    #[must_use]
    pub fn timesteps(&self) -> &[usize] {
        &self.timesteps
    }

    /// Computes the previous (less noisy) sample from the predicted noise.
    ///
    /// # Errors
    ///
    /// Returns an error if `t` is not a training timestep or the arrays differ
    /// in shape.
    pub fn step<D, R>(
        &self,
        model_output: ArrayView<'_, f32, D>,
        t: usize,
        sample: ArrayView<'_, f32, D>,
        eta: f32,
        rng: &mut R,
    ) -> Result<Array<f32, D>, SchedulerError>
    where
        D: Dimension,
        R: Rng,
    {
        if model_output.shape() != sample.shape() {
            return Err(SchedulerError::ShapeMismatch);
        }

        let alpha_prod_t = self
            .alpha_cumprod(t)
            .ok_or(SchedulerError::TimestepOutOfRange(t))?;
        let alpha_prod_prev = t
            .checked_sub(self.step_ratio)
            .and_then(|prev| self.alpha_cumprod(prev))
            .unwrap_or(self.final_alpha_cumprod);

        let beta_prod_t = 1.0 - alpha_prod_t;
        let beta_prod_prev = 1.0 - alpha_prod_prev;

        let variance = (beta_prod_prev / beta_prod_t) * (1.0 - alpha_prod_t / alpha_prod_prev);
        let std_dev = eta * variance.max(0.0).sqrt();

        let sqrt_alpha_t = alpha_prod_t.sqrt();
        let sqrt_beta_t = beta_prod_t.sqrt();
        let sqrt_alpha_prev = alpha_prod_prev.sqrt();
        let direction_coeff = (1.0 - alpha_prod_prev - std_dev * std_dev).max(0.0).sqrt();

        let mut prev = Array::<f32, D>::zeros(sample.raw_dim());
        ndarray::Zip::from(&mut prev)
            .and(&sample)
            .and(&model_output)
            .for_each(|out, &x, &eps| {
                let original = (x - sqrt_beta_t * eps) / sqrt_alpha_t;
                *out = sqrt_alpha_prev * original + direction_coeff * eps;
            });

        if eta > 0.0 && std_dev > 0.0 {
            prev.mapv_inplace(|v| v + std_dev * rng.sample::<f32, _>(StandardNormal));
        }

        Ok(prev)
    }
}

/// Fills an array of the given shape with standard-normal samples.
pub fn randn<D, R>(shape: D, rng: &mut R) -> Array<f32, D>
where
    D: Dimension,
    R: Rng,
{
    Array::from_shape_simple_fn(shape, || rng.sample::<f32, _>(StandardNormal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_relative_eq;
    use ndarray::Array1;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scheduler(steps: usize) -> DdimScheduler {
        let mut s = DdimScheduler::default();
        s.set_timesteps(steps).expect("valid step count");
        s
    }

    #[test]
    fn alphas_cumprod_decrease_from_first_beta() {
        let s = DdimScheduler::default();
        assert_eq!(s.train_timesteps(), 1000);
        let first = s.alpha_cumprod(0).unwrap();
        assert_relative_eq!(first, 1.0 - DDIM_BETA_START, epsilon = 1e-6);
        let last = s.alpha_cumprod(999).unwrap();
        assert!(last < first);
        assert!(last > 0.0);
    }

    #[test]
    fn timesteps_are_descending_and_end_at_zero() {
        let s = scheduler(100);
        let ts = s.timesteps();
        assert_eq!(ts.len(), 100);
        assert_eq!(ts[0], 990);
        assert_eq!(*ts.last().unwrap(), 0);
        assert!(ts.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn uneven_step_counts_use_floor_ratio() {
        let s = scheduler(3);
        assert_eq!(s.timesteps(), &[666, 333, 0]);
    }

    #[test]
    fn invalid_step_counts_are_rejected() {
        let mut s = DdimScheduler::default();
        assert_eq!(
            s.set_timesteps(0),
            Err(SchedulerError::InvalidStepCount {
                requested: 0,
                max: 1000
            })
        );
        assert!(s.set_timesteps(1001).is_err());
        assert!(s.set_timesteps(1000).is_ok());
    }

    #[test]
    fn deterministic_step_recovers_clean_sample_at_last_timestep() {
        // At t=0 the previous alpha is 1, so the step returns the predicted x0.
        let s = scheduler(10);
        let alpha = s.alpha_cumprod(0).unwrap();
        let x0 = Array1::from(vec![0.5_f32, -0.25, 1.0]);
        let eps = Array1::from(vec![0.1_f32, -0.2, 0.3]);
        let noisy = &x0 * alpha.sqrt() + &eps * (1.0 - alpha).sqrt();

        let mut rng = StdRng::seed_from_u64(7);
        let prev = s.step(eps.view(), 0, noisy.view(), 0.0, &mut rng).unwrap();
        for (got, want) in prev.iter().zip(x0.iter()) {
            assert_relative_eq!(*got, *want, epsilon = 1e-4);
        }
    }

    #[test]
    fn stochastic_step_is_reproducible_with_seed() {
        let s = scheduler(50);
        let t = s.timesteps()[0];
        let sample = Array1::from(vec![0.3_f32; 8]);
        let eps = Array1::from(vec![0.1_f32; 8]);

        let a = s
            .step(eps.view(), t, sample.view(), 1.0, &mut StdRng::seed_from_u64(1))
            .unwrap();
        let b = s
            .step(eps.view(), t, sample.view(), 1.0, &mut StdRng::seed_from_u64(1))
            .unwrap();
        let deterministic = s
            .step(eps.view(), t, sample.view(), 0.0, &mut StdRng::seed_from_u64(1))
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, deterministic);
    }

    #[test]
    fn step_rejects_bad_inputs() {
        let s = scheduler(10);
        let mut rng = StdRng::seed_from_u64(0);
        let a = Array1::<f32>::zeros(3);
        let b = Array1::<f32>::zeros(4);
        assert_eq!(
            s.step(a.view(), 0, b.view(), 0.0, &mut rng),
            Err(SchedulerError::ShapeMismatch)
        );
        assert_eq!(
            s.step(a.view(), 5000, a.view(), 0.0, &mut rng),
            Err(SchedulerError::TimestepOutOfRange(5000))
        );
    }

    #[test]
    fn randn_has_requested_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        let noise = randn(ndarray::Ix4(1, 3, 4, 4), &mut rng);
        assert_eq!(noise.shape(), &[1, 3, 4, 4]);
        assert!(noise.iter().any(|&v| v != 0.0));
    }
}
