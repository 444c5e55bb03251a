// SPDX-License-Identifier: MPL-2.0
use image_rs::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use pixel_magic::app::storage::{self, ImageStorage};
use pixel_magic::app::{model_files, App};
use pixel_magic::application::port::{
    ImageModel, ModelCapabilities, ModelError, ModelKind, ModelResult,
};
use pixel_magic::application::Studio;
use pixel_magic::config::{self, Config, DevicePreference, Overrides, Settings};
use pixel_magic::error::Error;
use pixel_magic::infrastructure::model_store::ModelSource;
use pixel_magic::media::tensor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

/// Removes nothing but marks the left half transparent, like a tiny RMBG.
struct LeftHalfCutout {
    runs: Arc<AtomicUsize>,
}

impl ImageModel for LeftHalfCutout {
    fn run(&self, image: &DynamicImage) -> ModelResult<DynamicImage> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let (width, height) = (image.width(), image.height());
        let mask = GrayImage::from_fn(width, height, |x, _| {
            Luma([if x < width / 2 { 0 } else { 255 }])
        });
        Ok(DynamicImage::ImageRgba8(tensor::composite_with_mask(
            image, &mask,
        )))
    }

    fn is_loaded(&self) -> bool {
        self.runs.load(Ordering::SeqCst) > 0
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities::new("Left half cutout").with_alpha()
    }
}

struct Unavailable;

impl ImageModel for Unavailable {
    fn run(&self, _image: &DynamicImage) -> ModelResult<DynamicImage> {
        Err(ModelError::ModelNotFound("unet.onnx".to_string()))
    }

    fn is_loaded(&self) -> bool {
        false
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities::upscaler("Unavailable", 4)
    }
}

#[test]
fn settings_file_feeds_resolution() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("settings.toml");

    let config = Config {
        super_resolution_steps: Some(30),
        device: Some(DevicePreference::Cpu),
        ..Config::default()
    };
    config::save_to_path(&config, &path).expect("Failed to write config file");
    let loaded = config::load_from_path(&path).expect("Failed to load config");

    let settings = Settings::resolve_with_env(&loaded, &Overrides::default(), None);
    assert_eq!(settings.super_resolution_steps.get().unwrap(), 30);
    assert_eq!(settings.device, DevicePreference::Cpu);

    let settings = Settings::resolve_with_env(&loaded, &Overrides::default(), Some("12"));
    assert_eq!(settings.super_resolution_steps.get().unwrap(), 12);
}

#[test]
fn studio_processes_uploads_and_records_history() {
    let dir = tempdir().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let studio = Studio::new(
        Box::new(LeftHalfCutout {
            runs: Arc::clone(&runs),
        }),
        Box::new(Unavailable),
        ImageStorage::open(dir.path()).unwrap(),
    );

    let upload = dir.path().join("upload.png");
    RgbaImage::from_pixel(4, 2, Rgba([200, 100, 50, 255]))
        .save(&upload)
        .unwrap();

    let first = studio.process(&upload, ModelKind::Rmbg).unwrap().unwrap();
    let second = studio.process(&upload, ModelKind::Rmbg).unwrap().unwrap();
    assert_ne!(first.path, second.path);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let output = image_rs::open(&first.path).unwrap().to_rgba8();
    assert_eq!(output.dimensions(), (4, 2));
    assert_eq!(output.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    assert_eq!(output.get_pixel(3, 1), &Rgba([200, 100, 50, 255]));

    let history = studio.history().unwrap();
    assert_eq!(history.len(), 1);
    let names: Vec<_> = history.values().flatten().cloned().collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|name| storage::parse_timestamp(name).is_some()));
}

#[test]
fn studio_error_policy() {
    let dir = tempdir().unwrap();
    let studio = Studio::new(
        Box::new(LeftHalfCutout {
            runs: Arc::new(AtomicUsize::new(0)),
        }),
        Box::new(Unavailable),
        ImageStorage::open(dir.path()).unwrap(),
    );

    let not_an_image = dir.path().join("notes.png");
    std::fs::write(&not_an_image, b"definitely not a png").unwrap();
    assert!(studio
        .process(&not_an_image, ModelKind::Rmbg)
        .unwrap()
        .is_none());

    let upload = dir.path().join("upload.png");
    RgbaImage::new(2, 2).save(&upload).unwrap();
    assert!(matches!(
        studio.process(&upload, ModelKind::SuperResolution),
        Err(Error::Model(ModelError::ModelNotFound(_)))
    ));
    assert!(studio.history().unwrap().is_empty());
}

#[test]
fn app_uses_local_model_directories() {
    let data = tempdir().unwrap();
    let models = tempdir().unwrap();
    let rmbg_dir = models.path().join("rmbg");
    std::fs::create_dir_all(&rmbg_dir).unwrap();

    let config = Config {
        rmbg_model: Some(rmbg_dir.to_string_lossy().into_owned()),
        ..Config::default()
    };
    let settings = Settings::resolve_with_env(&config, &Overrides::default(), None);
    let app = App::new(settings, data.path()).unwrap();

    assert_eq!(
        app.model_source(ModelKind::Rmbg),
        ModelSource::Local(rmbg_dir.clone())
    );
    assert!(matches!(
        app.model_source(ModelKind::SuperResolution),
        ModelSource::Hub { .. }
    ));

    let missing = app
        .model_source(ModelKind::Rmbg)
        .missing_files(model_files(ModelKind::Rmbg))
        .len();
    assert_eq!(missing, 1);

    let upload = data.path().join("upload.png");
    RgbaImage::new(2, 2).save(&upload).unwrap();
    let result = app.studio().process(&upload, ModelKind::Rmbg);
    assert!(matches!(
        result,
        Err(Error::Model(ModelError::ModelNotFound(_)))
    ));
}
