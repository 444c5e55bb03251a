// SPDX-License-Identifier: MPL-2.0
//! Conversions between images and the `f32` tensors fed to ONNX models.
//!
//! Tensors use planar layouts: `CHW` for a single image and `NCHW` when a
//! batch axis is required by the runtime. Channel order is always RGB.
//!
//! Resizing follows the half-pixel convention (`align_corners = false`) used
//! by the models' training pipelines, so masks and inputs line up with what
//! the networks expect.

use image_rs::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use ndarray::{Array2, Array3, Array4, ArrayView2, ArrayView3, Axis};

/// Converts an image into an RGB `CHW` tensor holding raw `0..=255` values.
///
/// Grayscale and alpha inputs are converted to RGB first, so the result
/// always has three channels.
#[must_use]
pub fn image_to_chw(image: &DynamicImage) -> Array3<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut tensor = Array3::<f32>::zeros((3, height as usize, width as usize));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        tensor[[0, y as usize, x as usize]] = f32::from(r);
        tensor[[1, y as usize, x as usize]] = f32::from(g);
        tensor[[2, y as usize, x as usize]] = f32::from(b);
    }

    tensor
}

/// Precomputed source indices and weights for one resized axis.
struct AxisSampling {
    lower: Vec<usize>,
    upper: Vec<usize>,
    weight: Vec<f32>,
}

impl AxisSampling {
    fn new(in_len: usize, out_len: usize) -> Self {
        let scale = in_len as f32 / out_len as f32;
        let last = in_len.saturating_sub(1);

        let mut lower = Vec::with_capacity(out_len);
        let mut upper = Vec::with_capacity(out_len);
        let mut weight = Vec::with_capacity(out_len);

        for dst in 0..out_len {
            let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
            // Truncation is floor here: src is non-negative
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let i0 = (src as usize).min(last);
            let i1 = if i0 < last { i0 + 1 } else { i0 };
            lower.push(i0);
            upper.push(i1);
            weight.push(src - i0 as f32);
        }

        Self {
            lower,
            upper,
            weight,
        }
    }
}

/// Bilinearly resizes a `CHW` tensor to `out_h x out_w`.
///
/// Uses half-pixel centers with edge clamping. Resizing to the same size
/// returns the input unchanged.
///
/// # Panics
///
/// Panics if the input or output has a zero-sized spatial dimension.
#[must_use]
pub fn resize_bilinear(input: ArrayView3<'_, f32>, out_h: usize, out_w: usize) -> Array3<f32> {
    let (channels, in_h, in_w) = input.dim();
    assert!(
        in_h > 0 && in_w > 0 && out_h > 0 && out_w > 0,
        "cannot resize {in_h}x{in_w} to {out_h}x{out_w}"
    );

    if in_h == out_h && in_w == out_w {
        return input.to_owned();
    }

    let rows = AxisSampling::new(in_h, out_h);
    let cols = AxisSampling::new(in_w, out_w);
    let mut output = Array3::<f32>::zeros((channels, out_h, out_w));

    for c in 0..channels {
        for y in 0..out_h {
            let (y0, y1, wy) = (rows.lower[y], rows.upper[y], rows.weight[y]);
            for x in 0..out_w {
                let (x0, x1, wx) = (cols.lower[x], cols.upper[x], cols.weight[x]);
                let top = input[[c, y0, x0]] * (1.0 - wx) + input[[c, y0, x1]] * wx;
                let bottom = input[[c, y1, x0]] * (1.0 - wx) + input[[c, y1, x1]] * wx;
                output[[c, y, x]] = top * (1.0 - wy) + bottom * wy;
            }
        }
    }

    output
}

/// Bilinearly resizes a single-channel map.
#[must_use]
pub fn resize_bilinear_2d(input: ArrayView2<'_, f32>, out_h: usize, out_w: usize) -> Array2<f32> {
    resize_bilinear(input.insert_axis(Axis(0)), out_h, out_w).index_axis_move(Axis(0), 0)
}

/// Truncates every value to the `u8` range, dropping the fractional part.
pub fn quantize_u8(tensor: &mut Array3<f32>) {
    tensor.mapv_inplace(|v| v.clamp(0.0, 255.0).trunc());
}

/// Applies per-channel `(x - mean) / std`.
///
/// # Panics
///
/// Panics if the tensor does not have exactly three channels.
pub fn normalize(tensor: &mut Array3<f32>, mean: [f32; 3], std: [f32; 3]) {
    assert_eq!(tensor.dim().0, 3, "normalize expects an RGB tensor");
    for (c, mut channel) in tensor.axis_iter_mut(Axis(0)).enumerate() {
        let (m, s) = (mean[c], std[c]);
        channel.mapv_inplace(|v| (v - m) / s);
    }
}

/// Rescales a map so its minimum becomes `0.0` and its maximum `1.0`.
///
/// A constant map has no range to stretch and becomes all zeros.
#[must_use]
pub fn min_max_rescale(map: ArrayView2<'_, f32>) -> Array2<f32> {
    let (min, max) = map
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return Array2::zeros(map.raw_dim());
    }

    map.mapv(|v| (v - min) / range)
}

/// Converts a `[0, 1]` map into an 8-bit mask (`value * 255`, truncated).
///
/// # Panics
///
/// Panics if a dimension exceeds `u32::MAX`.
#[must_use]
pub fn unit_map_to_mask(map: ArrayView2<'_, f32>) -> GrayImage {
    let (height, width) = map.dim();
    let width = u32::try_from(width).expect("mask width fits in u32");
    let height = u32::try_from(height).expect("mask height fits in u32");

    ImageBuffer::from_fn(width, height, |x, y| {
        // Float-to-int `as` saturates, matching the clamp to 0..=255
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = (map[[y as usize, x as usize]] * 255.0) as u8;
        Luma([value])
    })
}

/// Pastes `source` onto a transparent canvas through `mask`.
///
/// Every channel, alpha included, is blended as
/// `source * mask / 255 + canvas * (1 - mask / 255)` with a zeroed canvas,
/// so opaque mask regions keep the source pixel and transparent ones vanish.
///
/// # Panics
///
/// Panics if `mask` and `source` differ in size.
#[must_use]
pub fn composite_with_mask(source: &DynamicImage, mask: &GrayImage) -> RgbaImage {
    let rgba = source.to_rgba8();
    assert_eq!(
        rgba.dimensions(),
        mask.dimensions(),
        "mask must match the source image size"
    );

    ImageBuffer::from_fn(rgba.width(), rgba.height(), |x, y| {
        let m = u32::from(mask.get_pixel(x, y).0[0]);
        let Rgba(px) = *rgba.get_pixel(x, y);
        Rgba(px.map(|channel| blend_over_zero(channel, m)))
    })
}

/// `value * mask / 255` with round-half-up.
fn blend_over_zero(value: u8, mask: u32) -> u8 {
    // Max is 255 * 255 + 127, so the quotient stays within u8
    #[allow(clippy::cast_possible_truncation)]
    let blended = ((u32::from(value) * mask + 127) / 255) as u8;
    blended
}

/// Builds the conditioning tensor for latent-diffusion upscaling.
///
/// Width and height are rounded down to multiples of `multiple`, the image is
/// resized with Lanczos3 and scaled to `[-1, 1]` in `NCHW` layout.
/// Returns `None` if the image is smaller than `multiple` in either dimension.
#[must_use]
pub fn signed_nchw(image: &DynamicImage, multiple: u32) -> Option<Array4<f32>> {
    let width = image.width() - image.width() % multiple;
    let height = image.height() - image.height() % multiple;
    if width == 0 || height == 0 {
        return None;
    }

    let resized = if (width, height) == (image.width(), image.height()) {
        image.to_rgb8()
    } else {
        image
            .resize_exact(width, height, image_rs::imageops::FilterType::Lanczos3)
            .to_rgb8()
    };

    let chw = image_to_chw(&DynamicImage::ImageRgb8(resized)).mapv(|v| v / 255.0 * 2.0 - 1.0);
    Some(chw.insert_axis(Axis(0)))
}

/// Converts a `CHW` tensor in `[-1, 1]` into an RGB image.
///
/// Values are clamped, mapped to `[0, 255]` and rounded.
///
/// # Panics
///
/// Panics if the tensor does not have three channels or a dimension exceeds
/// `u32::MAX`.
#[must_use]
pub fn signed_chw_to_rgb(tensor: ArrayView3<'_, f32>) -> RgbImage {
    let (channels, height, width) = tensor.dim();
    assert_eq!(channels, 3, "expected an RGB tensor, got {channels} channels");
    let width = u32::try_from(width).expect("image width fits in u32");
    let height = u32::try_from(height).expect("image height fits in u32");

    let to_u8 = |v: f32| {
        // Clamped to 0.0..=255.0 before the cast
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let byte = ((v.clamp(-1.0, 1.0) / 2.0 + 0.5) * 255.0).round() as u8;
        byte
    };

    ImageBuffer::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            to_u8(tensor[[0, y, x]]),
            to_u8(tensor[[1, y, x]]),
            to_u8(tensor[[2, y, x]]),
        ])
    })
}
