// SPDX-License-Identifier: MPL-2.0
//! Image model port definition.
//!
//! This module defines the [`ImageModel`] trait, the single `run(image) -> image`
//! contract shared by every pretrained image-to-image model.
//!
//! # Design Notes
//!
//! - Sessions are built lazily on the first [`ImageModel::run`] call
//! - Model downloading is implementation-specific (see `infrastructure::model_store`)
//! - The trait is `Send + Sync` so a process-wide instance can be shared

use image_rs::DynamicImage;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// ModelError
// =============================================================================

/// Errors that can occur while loading or running a model.
#[derive(Debug, Clone)]
pub enum ModelError {
    /// A required model file is missing on disk.
    ModelNotFound(String),

    /// The runtime rejected the model file.
    ModelLoadFailed(String),

    /// The input image could not be turned into a tensor.
    PreprocessingFailed(String),

    /// Inference failed during processing.
    InferenceFailed(String),

    /// The output tensor could not be turned into an image.
    PostprocessingFailed(String),

    /// Fetching model files failed.
    DownloadFailed(String),

    /// Model checksum verification failed.
    ChecksumMismatch {
        /// Expected BLAKE3 hex digest.
        expected: String,
        /// Digest of the file on disk.
        actual: String,
    },

    /// I/O error while handling model files.
    Io(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::ModelNotFound(path) => write!(f, "Model file not found: {path}"),
            ModelError::ModelLoadFailed(msg) => write!(f, "Failed to load model: {msg}"),
            ModelError::PreprocessingFailed(msg) => write!(f, "Preprocessing failed: {msg}"),
            ModelError::InferenceFailed(msg) => write!(f, "Inference failed: {msg}"),
            ModelError::PostprocessingFailed(msg) => write!(f, "Postprocessing failed: {msg}"),
            ModelError::DownloadFailed(msg) => write!(f, "Download failed: {msg}"),
            ModelError::ChecksumMismatch { expected, actual } => {
                write!(f, "Checksum mismatch: expected {expected}, got {actual}")
            }
            ModelError::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<ort::Error> for ModelError {
    fn from(err: ort::Error) -> Self {
        ModelError::InferenceFailed(err.to_string())
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::Io(err.to_string())
    }
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

// =============================================================================
// ModelKind
// =============================================================================

/// The transformations offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Background removal.
    Rmbg,
    /// 4x super-resolution upscaling.
    SuperResolution,
}

impl ModelKind {
    /// All kinds, in menu order.
    pub const ALL: [ModelKind; 2] = [ModelKind::Rmbg, ModelKind::SuperResolution];

    /// Label shown to users.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ModelKind::Rmbg => "Remove Background",
            ModelKind::SuperResolution => "Super Resolution",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rmbg" | "remove-background" | "remove_background" => Ok(ModelKind::Rmbg),
            "sr" | "super-resolution" | "super_resolution" | "upscale" => {
                Ok(ModelKind::SuperResolution)
            }
            other => Err(format!(
                "unknown model '{other}' (expected 'rmbg' or 'super-resolution')"
            )),
        }
    }
}

// =============================================================================
// ModelCapabilities
// =============================================================================

/// Describes what a model does to its input.
#[derive(Debug, Clone)]
pub struct ModelCapabilities {
    /// Human-readable model name.
    pub name: &'static str,

    /// Output size multiplier, `None` when the output keeps the input size.
    pub scale_factor: Option<u32>,

    /// Whether the output carries a meaningful alpha channel.
    pub produces_alpha: bool,
}

impl ModelCapabilities {
    /// Capabilities of a model that keeps the input size.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            scale_factor: None,
            produces_alpha: false,
        }
    }

    /// Capabilities of an upscaling model.
    #[must_use]
    pub const fn upscaler(name: &'static str, scale_factor: u32) -> Self {
        Self {
            name,
            scale_factor: Some(scale_factor),
            produces_alpha: false,
        }
    }

    /// Marks the output as carrying transparency.
    #[must_use]
    pub const fn with_alpha(mut self) -> Self {
        self.produces_alpha = true;
        self
    }

    /// Returns `true` if this model changes the image size.
    #[must_use]
    pub fn is_upscaler(&self) -> bool {
        self.scale_factor.is_some()
    }
}

// =============================================================================
// ImageModel Trait
// =============================================================================

/// Port for pretrained image-to-image models.
///
/// Implementations own a lazily constructed inference session: the first
/// call to [`run`](ImageModel::run) builds it, later calls reuse it.
///
/// # Example
///
/// ```ignore
/// use pixel_magic::application::port::ImageModel;
///
/// fn apply(model: &dyn ImageModel, image: &image_rs::DynamicImage) {
///     let output = model.run(image)?;
///     assert!(model.is_loaded());
/// }
/// ```
pub trait ImageModel: Send + Sync {
    /// Transforms an image.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] if the session cannot be built or any stage of
    /// preprocessing, inference or postprocessing fails.
    fn run(&self, image: &DynamicImage) -> ModelResult<DynamicImage>;

    /// Whether the underlying session has been constructed.
    fn is_loaded(&self) -> bool;

    /// Returns what this model does.
    fn capabilities(&self) -> ModelCapabilities;
}
