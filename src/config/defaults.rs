// SPDX-License-Identifier: MPL-2.0
//! Centralized default values for all configuration constants.
//!
//! This module serves as the single source of truth for default values
//! used across the application. Constants are organized by category.
//!
//! # Categories
//!
//! - **Models**: Default model references and hub location
//! - **Background Removal**: RMBG input size and normalization
//! - **Super Resolution**: Diffusion step bounds and input geometry
//! - **Scheduler**: DDIM beta schedule
//! - **Downloads**: Sanity limits for fetched model files

// ==========================================================================
// Model Defaults
// ==========================================================================

/// Default RMBG model reference (a local weights directory).
pub const DEFAULT_RMBG_MODEL: &str = "weights/rmbg";

/// Default super-resolution model reference (a hub id).
pub const DEFAULT_SUPER_RESOLUTION_MODEL: &str = "CompVis/ldm-super-resolution-4x-openimages";

/// Base URL used to resolve hub ids into download URLs.
pub const DEFAULT_HUB_BASE_URL: &str = "https://huggingface.co";

// ==========================================================================
// Background Removal Defaults
// ==========================================================================

/// Square input edge expected by the RMBG network.
pub const RMBG_INPUT_SIZE: usize = 1024;

/// Per-channel mean subtracted after scaling pixels to `[0, 1]`.
pub const RMBG_MEAN: [f32; 3] = [0.5, 0.5, 0.5];

/// Per-channel standard deviation applied after the mean.
pub const RMBG_STD: [f32; 3] = [1.0, 1.0, 1.0];

// ==========================================================================
// Super Resolution Defaults
// ==========================================================================

/// Default number of denoising steps.
pub const DEFAULT_SUPER_RESOLUTION_STEPS: usize = 100;

/// Minimum allowed number of denoising steps.
pub const MIN_SUPER_RESOLUTION_STEPS: usize = 1;

/// Maximum allowed number of denoising steps (one per training timestep).
pub const MAX_SUPER_RESOLUTION_STEPS: usize = DDIM_TRAIN_TIMESTEPS;

/// Edge of the square low-resolution image fed to the upscaler.
pub const SUPER_RESOLUTION_INPUT_SIZE: u32 = 256;

/// Conditioning images are cropped to a multiple of this size.
pub const SUPER_RESOLUTION_SIZE_MULTIPLE: u32 = 32;

/// Output size multiplier of the upscaler.
pub const SUPER_RESOLUTION_SCALE: u32 = 4;

/// Amount of fresh noise injected at each DDIM step.
pub const SUPER_RESOLUTION_ETA: f32 = 1.0;

// ==========================================================================
// Scheduler Defaults
// ==========================================================================

/// Number of diffusion timesteps the upscaler was trained with.
pub const DDIM_TRAIN_TIMESTEPS: usize = 1000;

/// First beta of the linear schedule.
pub const DDIM_BETA_START: f32 = 0.0015;

/// Last beta of the linear schedule.
pub const DDIM_BETA_END: f32 = 0.0155;

// ==========================================================================
// Download Defaults
// ==========================================================================

/// Downloads smaller than this are treated as error pages, not model files.
pub const MIN_MODEL_FILE_BYTES: u64 = 1_000_000;

/// Maximum number of HTTP redirects followed when fetching models.
pub const MAX_DOWNLOAD_REDIRECTS: usize = 10;

// ==========================================================================
// Compile-time Validation
// ==========================================================================

const _: () = {
    assert!(MIN_SUPER_RESOLUTION_STEPS > 0);
    assert!(MAX_SUPER_RESOLUTION_STEPS >= MIN_SUPER_RESOLUTION_STEPS);
    assert!(DEFAULT_SUPER_RESOLUTION_STEPS >= MIN_SUPER_RESOLUTION_STEPS);
    assert!(DEFAULT_SUPER_RESOLUTION_STEPS <= MAX_SUPER_RESOLUTION_STEPS);

    assert!(SUPER_RESOLUTION_INPUT_SIZE % SUPER_RESOLUTION_SIZE_MULTIPLE == 0);
    assert!(SUPER_RESOLUTION_SCALE > 1);
    assert!(RMBG_INPUT_SIZE > 0);

    assert!(DDIM_BETA_START > 0.0);
    assert!(DDIM_BETA_END > DDIM_BETA_START);
    assert!(DDIM_BETA_END < 1.0);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_resolution_step_defaults_are_valid() {
        assert_eq!(DEFAULT_SUPER_RESOLUTION_STEPS, 100);
        assert!(DEFAULT_SUPER_RESOLUTION_STEPS >= MIN_SUPER_RESOLUTION_STEPS);
        assert!(DEFAULT_SUPER_RESOLUTION_STEPS <= MAX_SUPER_RESOLUTION_STEPS);
    }

    #[test]
    fn low_resolution_input_is_aligned() {
        assert_eq!(SUPER_RESOLUTION_INPUT_SIZE % SUPER_RESOLUTION_SIZE_MULTIPLE, 0);
        assert_eq!(SUPER_RESOLUTION_INPUT_SIZE * SUPER_RESOLUTION_SCALE, 1024);
    }

    #[test]
    fn rmbg_normalization_matches_model() {
        assert_eq!(RMBG_INPUT_SIZE, 1024);
        assert_eq!(RMBG_MEAN, [0.5; 3]);
        assert_eq!(RMBG_STD, [1.0; 3]);
    }

    #[test]
    fn default_models_point_at_expected_sources() {
        assert_eq!(DEFAULT_RMBG_MODEL, "weights/rmbg");
        assert!(DEFAULT_SUPER_RESOLUTION_MODEL.contains('/'));
    }
}
