// SPDX-License-Identifier: MPL-2.0
//! Loading user-supplied images.

use crate::error::ImageError;
use image_rs::DynamicImage;
use std::fs;
use std::path::Path;

/// File extensions accepted for upload (lowercase).
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Returns `true` if the path carries one of [`SUPPORTED_EXTENSIONS`].
#[must_use]
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Loads an image from disk.
///
/// # Errors
///
/// Returns:
/// - [`ImageError::UnsupportedFormat`] for extensions outside [`SUPPORTED_EXTENSIONS`]
///   or bytes that do not decode
/// - [`ImageError::Unreadable`] if the file cannot be read
/// - [`ImageError::Empty`] if the image has no pixels
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage, ImageError> {
    let path = path.as_ref();
    if !has_supported_extension(path) {
        return Err(ImageError::UnsupportedFormat(format!(
            "{} (expected one of: {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    let bytes = fs::read(path)
        .map_err(|e| ImageError::Unreadable(format!("{}: {e}", path.display())))?;
    decode_image(&bytes)
}

/// Decodes an in-memory image, guessing the format from its contents.
///
/// # Errors
///
/// Returns an [`ImageError`] if the bytes do not decode or the image is empty.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    let image = image_rs::load_from_memory(bytes).map_err(|e| ImageError::from_decode(&e))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ImageError::Empty);
    }
    Ok(image)
}
