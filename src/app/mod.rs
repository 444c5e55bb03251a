// SPDX-License-Identifier: MPL-2.0
//! Application root: wires configuration, devices, model files and storage
//! into a ready-to-use [`Studio`].
//!
//! Models are constructed here once per process. Their sessions stay unbuilt
//! until the first image is processed, so commands that never run a model
//! (`history`, `device`) never touch model weights.

pub mod logging;
pub mod paths;
pub mod storage;

use crate::application::port::ModelKind;
use crate::application::Studio;
use crate::config::Settings;
use crate::error::Result;
use crate::infrastructure::model_store::{ModelFile, ModelSource, ModelStore};
use crate::infrastructure::onnx::{
    Device, Rmbg, SuperResolution, RMBG_FILES, SUPER_RESOLUTION_FILES,
};
use std::path::Path;
use storage::{ImageStorage, StoredImage};

/// Files a model kind needs on disk.
#[must_use]
pub fn model_files(kind: ModelKind) -> &'static [ModelFile] {
    match kind {
        ModelKind::Rmbg => &RMBG_FILES,
        ModelKind::SuperResolution => &SUPER_RESOLUTION_FILES,
    }
}

/// Everything a command needs, resolved once at startup.
#[derive(Debug)]
pub struct App {
    settings: Settings,
    device: Device,
    store: ModelStore,
    studio: Studio,
}

impl App {
    /// Builds the application rooted at `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directories cannot be created.
    pub fn new(settings: Settings, data_dir: &Path) -> Result<Self> {
        let device = Device::from_preference(settings.device);
        let store = ModelStore::new(paths::models_dir_in(data_dir), settings.hub_base_url.clone());
        let storage = ImageStorage::open(data_dir)?;

        let rmbg_dir = store.source(&settings.rmbg_model);
        let sr_dir = store.source(&settings.super_resolution_model);
        tracing::debug!(
            %device,
            rmbg = %rmbg_dir.directory().display(),
            super_resolution = %sr_dir.directory().display(),
            "resolved model directories"
        );

        let studio = Studio::new(
            Box::new(Rmbg::new(rmbg_dir.directory(), device)),
            Box::new(SuperResolution::new(
                sr_dir.directory(),
                device,
                settings.super_resolution_steps.clone(),
            )),
            storage,
        );

        Ok(Self {
            settings,
            device,
            store,
            studio,
        })
    }

    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }

    #[must_use]
    pub fn studio(&self) -> &Studio {
        &self.studio
    }

    /// Where the files of `kind` come from.
    #[must_use]
    pub fn model_source(&self, kind: ModelKind) -> ModelSource {
        let reference = match kind {
            ModelKind::Rmbg => &self.settings.rmbg_model,
            ModelKind::SuperResolution => &self.settings.super_resolution_model,
        };
        self.store.source(reference)
    }

    /// Makes sure the files of `kind` are on disk, downloading them if the
    /// model comes from the hub.
    ///
    /// # Errors
    ///
    /// Returns an error if a local file is missing or a download fails.
    pub async fn fetch(&self, kind: ModelKind, progress: impl FnMut(&str, f32) + Send) -> Result<()> {
        let source = self.model_source(kind);
        self.store
            .ensure_available(&source, model_files(kind), progress)
            .await?;
        Ok(())
    }

    /// Applies the `kind` model to the upload at `image` and stores the
    /// result.
    ///
    /// The upload is loaded before any model file is looked at, so a bad
    /// upload never triggers a download. It is reported as a warning and
    /// yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns model file, model and storage errors.
    pub async fn apply(
        &self,
        image: &Path,
        kind: ModelKind,
        progress: impl FnMut(&str, f32) + Send,
    ) -> Result<Option<StoredImage>> {
        let Some(image) = Studio::load_upload(image) else {
            return Ok(None);
        };

        self.fetch(kind, progress).await?;
        self.studio.process_image(&image, kind).map(Some)
    }
}
