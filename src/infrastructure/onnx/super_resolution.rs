// SPDX-License-Identifier: MPL-2.0
//! 4x upscaling with a latent-diffusion super-resolution model.
//!
//! The model is exported as two ONNX graphs: a UNet that predicts noise from
//! the current latents concatenated with the low-resolution image, and a
//! VQ-VAE decoder that turns the final latents into pixels. Sampling between
//! the two is driven by a [`DdimScheduler`].

use crate::application::port::{ImageModel, ModelCapabilities, ModelError, ModelResult};
use crate::config::defaults::{
    SUPER_RESOLUTION_ETA, SUPER_RESOLUTION_INPUT_SIZE, SUPER_RESOLUTION_SCALE,
    SUPER_RESOLUTION_SIZE_MULTIPLE,
};
use crate::config::StepCount;
use crate::infrastructure::model_store::ModelFile;
use crate::infrastructure::onnx::device::Device;
use crate::infrastructure::onnx::session::{first_output, input_name, LazySession};
use crate::media::scheduler::{randn, DdimScheduler};
use crate::media::tensor;
use image_rs::imageops::FilterType;
use image_rs::DynamicImage;
use ndarray::{concatenate, Array1, Array4, ArrayD, ArrayView4, Axis, Ix4};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

/// Number of latent channels; the UNet sees these plus the RGB condition.
const LATENT_CHANNELS: usize = 3;

/// Files making up a super-resolution model directory.
pub const SUPER_RESOLUTION_FILES: [ModelFile; 2] = [
    ModelFile::new("onnx/unet/model.onnx", "unet.onnx"),
    ModelFile::new("onnx/vqvae_decoder/model.onnx", "vqvae_decoder.onnx"),
];

/// Latent-diffusion upscaler.
#[derive(Debug)]
pub struct SuperResolution {
    unet: LazySession,
    decoder: LazySession,
    steps: StepCount,
    seed: Option<u64>,
}

impl SuperResolution {
    /// Creates an upscaler for the model stored in `model_dir`, sampling
    /// with `steps` denoising steps.
    ///
    /// The step count is checked on every run, before any weights load.
    #[must_use]
    pub fn new(model_dir: &Path, device: Device, steps: impl Into<StepCount>) -> Self {
        let [unet, decoder] = SUPER_RESOLUTION_FILES;
        Self {
            unet: LazySession::onnx(model_dir.join(unet.local_name), device),
            decoder: LazySession::onnx(model_dir.join(decoder.local_name), device),
            steps: steps.into(),
            seed: None,
        }
    }

    /// Makes sampling deterministic by seeding the noise generator.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn predict_noise(&self, model_input: ArrayView4<'_, f32>, t: usize) -> ModelResult<Array4<f32>> {
        let timestep = Array1::from_elem(1, i64::try_from(t).unwrap_or(i64::MAX));

        let prediction = self.unet.with(|session| {
            let sample_name = input_name(session, 0, "sample");
            let timestep_name = input_name(session, 1, "timestep");
            let sample_ref = ort::value::TensorRef::from_array_view(model_input)?;
            let timestep_ref = ort::value::TensorRef::from_array_view(&timestep)?;
            let outputs = session.run(ort::inputs![
                sample_name.as_str() => sample_ref,
                timestep_name.as_str() => timestep_ref
            ])?;
            first_output(&outputs)
        })?;

        into_nchw(prediction)
    }

    fn decode(&self, latents: &Array4<f32>) -> ModelResult<Array4<f32>> {
        let decoded = self.decoder.with(|session| {
            let name = input_name(session, 0, "latent_sample");
            let latents_ref = ort::value::TensorRef::from_array_view(latents)?;
            let outputs = session.run(ort::inputs![name.as_str() => latents_ref])?;
            first_output(&outputs)
        })?;

        into_nchw(decoded)
    }
}

impl ImageModel for SuperResolution {
    fn run(&self, image: &DynamicImage) -> ModelResult<DynamicImage> {
        let steps = self
            .steps
            .get()
            .map_err(|e| ModelError::PreprocessingFailed(e.to_string()))?;
        let mut scheduler = DdimScheduler::default();
        scheduler
            .set_timesteps(steps)
            .map_err(|e| ModelError::PreprocessingFailed(e.to_string()))?;

        let condition = prepare_condition(image)?;
        let mut rng = self.seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

        tracing::debug!(steps, "starting super-resolution sampling");
        let latents = denoise(&scheduler, condition.view(), &mut rng, |input, t| {
            self.predict_noise(input, t)
        })?;

        let decoded = self.decode(&latents)?;
        let rgb = tensor::signed_chw_to_rgb(decoded.index_axis(Axis(0), 0));
        Ok(DynamicImage::ImageRgb8(rgb))
    }

    fn is_loaded(&self) -> bool {
        self.unet.is_loaded() && self.decoder.is_loaded()
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities::upscaler("LDM Super Resolution", SUPER_RESOLUTION_SCALE)
    }
}

/// Builds the conditioning tensor from an arbitrary input image.
///
/// The image is converted to RGB, resized to the model's 256x256 input and
/// mapped to `[-1, 1]` in `NCHW` layout.
///
/// # Errors
///
/// Returns [`ModelError::PreprocessingFailed`] if the image has no pixels.
pub fn prepare_condition(image: &DynamicImage) -> ModelResult<Array4<f32>> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ModelError::PreprocessingFailed("Image is empty".to_string()));
    }

    let resized = DynamicImage::ImageRgb8(image.to_rgb8()).resize_exact(
        SUPER_RESOLUTION_INPUT_SIZE,
        SUPER_RESOLUTION_INPUT_SIZE,
        FilterType::CatmullRom,
    );

    tensor::signed_nchw(&resized, SUPER_RESOLUTION_SIZE_MULTIPLE).ok_or_else(|| {
        ModelError::PreprocessingFailed(format!(
            "Image smaller than {SUPER_RESOLUTION_SIZE_MULTIPLE}px"
        ))
    })
}

/// Runs the DDIM sampling loop.
///
/// Latents start as Gaussian noise shaped like the condition's first
/// [`LATENT_CHANNELS`] channels. At every scheduled timestep `predict` sees
/// the latents concatenated with the condition along the channel axis and
/// returns the predicted noise.
///
/// # Errors
///
/// Returns the first error from `predict` or the scheduler.
pub fn denoise<R>(
    scheduler: &DdimScheduler,
    condition: ArrayView4<'_, f32>,
    rng: &mut R,
    mut predict: impl FnMut(ArrayView4<'_, f32>, usize) -> ModelResult<Array4<f32>>,
) -> ModelResult<Array4<f32>>
where
    R: rand::Rng,
{
    let (batch, _, height, width) = condition.dim();
    let mut latents = randn(Ix4(batch, LATENT_CHANNELS, height, width), rng);
    latents.mapv_inplace(|v| v * scheduler.init_noise_sigma());

    for &t in scheduler.timesteps() {
        let model_input = concatenate(Axis(1), &[latents.view(), condition.view()])
            .map_err(|e| ModelError::InferenceFailed(e.to_string()))?;

        let noise = predict(model_input.view(), t)?;
        let noise = if noise.dim().1 > LATENT_CHANNELS {
            noise
                .slice_axis(Axis(1), (0..LATENT_CHANNELS).into())
                .to_owned()
        } else {
            noise
        };

        latents = scheduler
            .step(noise.view(), t, latents.view(), SUPER_RESOLUTION_ETA, rng)
            .map_err(|e| ModelError::InferenceFailed(e.to_string()))?;
    }

    Ok(latents)
}

fn into_nchw(output: ArrayD<f32>) -> ModelResult<Array4<f32>> {
    output
        .into_dimensionality::<Ix4>()
        .map_err(|e| ModelError::PostprocessingFailed(format!("Expected NCHW output: {e}")))
}
