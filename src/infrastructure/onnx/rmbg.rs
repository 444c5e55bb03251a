// SPDX-License-Identifier: MPL-2.0
//! Background removal with an RMBG segmentation network.
//!
//! The network predicts a foreground probability map at 1024x1024. The map
//! is scaled back to the source size, stretched to the full `0..=1` range
//! and used as the alpha mask when pasting the source onto a transparent
//! canvas.

use crate::application::port::{ImageModel, ModelCapabilities, ModelError, ModelResult};
use crate::config::defaults::{RMBG_INPUT_SIZE, RMBG_MEAN, RMBG_STD};
use crate::infrastructure::model_store::ModelFile;
use crate::infrastructure::onnx::device::Device;
use crate::infrastructure::onnx::session::{first_output, input_name, LazySession};
use crate::media::tensor;
use image_rs::{DynamicImage, GrayImage};
use ndarray::{Array2, Array4, ArrayD, ArrayView2, Axis};
use std::path::Path;

/// Files making up an RMBG model directory.
pub const RMBG_FILES: [ModelFile; 1] = [ModelFile::new("onnx/model.onnx", "model.onnx")];

/// Background remover backed by a lazily loaded ONNX session.
#[derive(Debug)]
pub struct Rmbg {
    session: LazySession,
}

impl Rmbg {
    /// Creates a remover for the model stored in `model_dir`.
    ///
    /// Nothing is read from disk until the first image is processed.
    #[must_use]
    pub fn new(model_dir: &Path, device: Device) -> Self {
        Self {
            session: LazySession::onnx(model_dir.join(RMBG_FILES[0].local_name), device),
        }
    }
}

impl ImageModel for Rmbg {
    fn run(&self, image: &DynamicImage) -> ModelResult<DynamicImage> {
        let input = preprocess(image)?;

        let prediction = self.session.with(|session| {
            let name = input_name(session, 0, "input");
            let input_ref = ort::value::TensorRef::from_array_view(&input)?;
            let outputs = session.run(ort::inputs![name.as_str() => input_ref])?;
            first_output(&outputs)
        })?;

        let map = spatial_map(prediction)?;
        let mask = postprocess(map.view(), image.width(), image.height());
        Ok(DynamicImage::ImageRgba8(tensor::composite_with_mask(
            image, &mask,
        )))
    }

    fn is_loaded(&self) -> bool {
        self.session.is_loaded()
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities::new("RMBG").with_alpha()
    }
}

/// Builds the `[1, 3, 1024, 1024]` network input.
///
/// The image is resized bilinearly, truncated back to 8-bit levels, scaled
/// to `[0, 1]` and normalized with the RMBG mean and standard deviation.
///
/// # Errors
///
/// Returns [`ModelError::PreprocessingFailed`] if the image has no pixels.
pub fn preprocess(image: &DynamicImage) -> ModelResult<Array4<f32>> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ModelError::PreprocessingFailed("Image is empty".to_string()));
    }

    let chw = tensor::image_to_chw(image);
    let mut resized = tensor::resize_bilinear(chw.view(), RMBG_INPUT_SIZE, RMBG_INPUT_SIZE);
    tensor::quantize_u8(&mut resized);
    resized.mapv_inplace(|v| v / 255.0);
    tensor::normalize(&mut resized, RMBG_MEAN, RMBG_STD);
    Ok(resized.insert_axis(Axis(0)))
}

/// Turns a raw prediction map into a mask the size of the source image.
#[must_use]
pub fn postprocess(map: ArrayView2<'_, f32>, width: u32, height: u32) -> GrayImage {
    let resized = tensor::resize_bilinear_2d(map, height as usize, width as usize);
    let stretched = tensor::min_max_rescale(resized.view());
    tensor::unit_map_to_mask(stretched.view())
}

/// Drops the leading batch and channel axes of a `[.., h, w]` prediction.
fn spatial_map(prediction: ArrayD<f32>) -> ModelResult<Array2<f32>> {
    let ndim = prediction.ndim();
    if ndim < 2 {
        return Err(ModelError::PostprocessingFailed(format!(
            "Expected at least a 2D mask, got {ndim}D"
        )));
    }
    let (height, width) = (prediction.shape()[ndim - 2], prediction.shape()[ndim - 1]);
    if prediction.len() != height * width {
        return Err(ModelError::PostprocessingFailed(format!(
            "Expected a single {height}x{width} mask, got shape {:?}",
            prediction.shape()
        )));
    }

    prediction
        .into_shape_with_order((height, width))
        .map_err(|e| ModelError::PostprocessingFailed(e.to_string()))
}
