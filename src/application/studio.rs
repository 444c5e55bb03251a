// SPDX-License-Identifier: MPL-2.0
//! Applying a model to an image and keeping the result.
//!
//! The studio owns one instance of every model for the lifetime of the
//! process, so each model's session is built at most once however many
//! images are processed.

use crate::app::storage::{History, ImageStorage, StoredImage};
use crate::application::port::{ImageModel, ModelKind};
use crate::error::Result;
use crate::media::image::load_image;
use image_rs::DynamicImage;
use std::path::Path;

/// Models plus the storage their results are written to.
pub struct Studio {
    rmbg: Box<dyn ImageModel>,
    super_resolution: Box<dyn ImageModel>,
    storage: ImageStorage,
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("rmbg", &self.rmbg.capabilities().name)
            .field("super_resolution", &self.super_resolution.capabilities().name)
            .field("storage", &self.storage)
            .finish()
    }
}

impl Studio {
    #[must_use]
    pub fn new(
        rmbg: Box<dyn ImageModel>,
        super_resolution: Box<dyn ImageModel>,
        storage: ImageStorage,
    ) -> Self {
        Self {
            rmbg,
            super_resolution,
            storage,
        }
    }

    /// The model registered for `kind`.
    #[must_use]
    pub fn model(&self, kind: ModelKind) -> &dyn ImageModel {
        match kind {
            ModelKind::Rmbg => self.rmbg.as_ref(),
            ModelKind::SuperResolution => self.super_resolution.as_ref(),
        }
    }

    #[must_use]
    pub fn storage(&self) -> &ImageStorage {
        &self.storage
    }

    /// Loads a user upload, logging a warning instead of failing when it is
    /// not a usable image.
    #[must_use]
    pub fn load_upload(path: &Path) -> Option<DynamicImage> {
        match load_image(path) {
            Ok(image) => Some(image),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "please upload a valid image first");
                None
            }
        }
    }

    /// Loads the image at `path`, runs the `kind` model on it and stores the
    /// result.
    ///
    /// An image that cannot be loaded is not an error: a warning is logged
    /// and `Ok(None)` is returned without touching storage.
    ///
    /// # Errors
    ///
    /// Returns model and storage errors.
    pub fn process(&self, path: &Path, kind: ModelKind) -> Result<Option<StoredImage>> {
        let Some(image) = Self::load_upload(path) else {
            return Ok(None);
        };

        self.process_image(&image, kind).map(Some)
    }

    /// Runs the `kind` model on an already decoded image and stores the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns model and storage errors.
    pub fn process_image(&self, image: &DynamicImage, kind: ModelKind) -> Result<StoredImage> {
        let model = self.model(kind);
        tracing::info!(
            model = %kind,
            width = image.width(),
            height = image.height(),
            loaded = model.is_loaded(),
            "applying model"
        );

        let output = model.run(image)?;
        self.storage.save(&output)
    }

    /// Stored results grouped by day.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be read.
    pub fn history(&self) -> Result<History> {
        self.storage.history()
    }
}
