// SPDX-License-Identifier: MPL-2.0
use crate::application::port::ModelError;
use std::fmt;

#[derive(Debug, Clone)]
pub enum Error {
    Io(String),
    Config(String),
    Image(ImageError),
    Model(ModelError),
}

/// Failures while reading or decoding a user-supplied image.
///
/// These are the only errors the studio swallows: they are reported to the
/// user as a warning instead of aborting the request.
#[derive(Debug, Clone)]
pub enum ImageError {
    /// The file could not be opened or read.
    Unreadable(String),

    /// The bytes are not a supported image format.
    UnsupportedFormat(String),

    /// The image decoded to zero width or height.
    Empty,
}

impl ImageError {
    /// Categorizes an `image` crate error.
    pub fn from_decode(err: &image_rs::ImageError) -> Self {
        match err {
            image_rs::ImageError::IoError(e) => ImageError::Unreadable(e.to_string()),
            other => ImageError::UnsupportedFormat(other.to_string()),
        }
    }
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::Unreadable(msg) => write!(f, "Cannot read image: {}", msg),
            ImageError::UnsupportedFormat(msg) => write!(f, "Unsupported image: {}", msg),
            ImageError::Empty => write!(f, "Image has no pixels"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O Error: {}", e),
            Error::Config(e) => write!(f, "Config Error: {}", e),
            Error::Image(e) => write!(f, "Image Error: {}", e),
            Error::Model(e) => write!(f, "Model Error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<ImageError> for Error {
    fn from(err: ImageError) -> Self {
        Error::Image(err)
    }
}

impl From<ModelError> for Error {
    fn from(err: ModelError) -> Self {
        Error::Model(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<image_rs::ImageError> for Error {
    fn from(err: image_rs::ImageError) -> Self {
        Error::Image(ImageError::from_decode(&err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_io_error() {
        let err = Error::Io("disk failure".to_string());
        assert_eq!(format!("{}", err), "I/O Error: disk failure");
    }

    #[test]
    fn from_io_error_produces_io_variant() {
        let io_error = std::io::Error::other("boom");
        let err: Error = io_error.into();
        match err {
            Error::Io(message) => assert!(message.contains("boom")),
            _ => panic!("expected Io variant"),
        }
    }

    #[test]
    fn config_error_formats_properly() {
        let err = Error::Config("bad field".into());
        assert_eq!(format!("{}", err), "Config Error: bad field");
    }

    #[test]
    fn decode_io_error_is_unreadable() {
        let io_err = std::io::Error::other("truncated");
        let err = ImageError::from_decode(&image_rs::ImageError::IoError(io_err));
        assert!(matches!(err, ImageError::Unreadable(msg) if msg.contains("truncated")));
    }

    #[test]
    fn garbage_bytes_are_unsupported_format() {
        let decode_err = image_rs::load_from_memory(b"definitely not an image")
            .expect_err("garbage should not decode");
        let err: Error = decode_err.into();
        assert!(matches!(err, Error::Image(ImageError::UnsupportedFormat(_))));
    }

    #[test]
    fn model_error_wraps_with_prefix() {
        let err: Error = ModelError::ModelNotFound("weights/rmbg/model.onnx".into()).into();
        let display = format!("{}", err);
        assert!(display.starts_with("Model Error:"));
        assert!(display.contains("weights/rmbg/model.onnx"));
    }

    #[test]
    fn empty_image_error_display() {
        assert_eq!(format!("{}", ImageError::Empty), "Image has no pixels");
    }
}
