// SPDX-License-Identifier: MPL-2.0
//! Locating and fetching pretrained model files.
//!
//! A model reference is either a directory on disk holding the model files
//! or a hub id (`owner/name`). Hub ids are cached below the application's
//! `models/` directory and downloaded on demand from
//! `<hub>/<owner>/<name>/resolve/main/<file>`.
//!
//! Downloads are streamed to a `.part` file and only renamed into place once
//! complete, so an interrupted download never looks like a usable model.

use crate::application::port::{ModelError, ModelResult};
use crate::config::defaults::{MAX_DOWNLOAD_REDIRECTS, MIN_MODEL_FILE_BYTES};
use std::path::{Path, PathBuf};

/// A file a model needs, and where it lives in the hub repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFile {
    /// Path inside the hub repository.
    pub remote_path: &'static str,
    /// File name inside the local model directory.
    pub local_name: &'static str,
    /// Expected BLAKE3 hex digest, when known.
    pub checksum: Option<&'static str>,
}

impl ModelFile {
    /// Describes a file without a pinned checksum.
    #[must_use]
    pub const fn new(remote_path: &'static str, local_name: &'static str) -> Self {
        Self {
            remote_path,
            local_name,
            checksum: None,
        }
    }
}

/// Where a model's files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A directory already on disk.
    Local(PathBuf),
    /// A hub repository cached in `cache_dir`.
    Hub { repo: String, cache_dir: PathBuf },
}

impl ModelSource {
    /// Interprets a model reference.
    ///
    /// Existing directories are used as-is; `owner/name` references that are
    /// not directories become hub sources cached below `models_dir`. Anything
    /// else is treated as a local directory (and will fail to load if absent).
    #[must_use]
    pub fn resolve(reference: &str, models_dir: &Path) -> Self {
        let path = PathBuf::from(reference);
        if path.is_dir() || !is_hub_id(reference) {
            return ModelSource::Local(path);
        }

        ModelSource::Hub {
            repo: reference.to_string(),
            cache_dir: models_dir.join(reference.replace('/', "--")),
        }
    }

    /// Directory holding (or that will hold) the model files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        match self {
            ModelSource::Local(path) => path,
            ModelSource::Hub { cache_dir, .. } => cache_dir,
        }
    }

    /// Local path of one model file.
    #[must_use]
    pub fn file_path(&self, file: &ModelFile) -> PathBuf {
        self.directory().join(file.local_name)
    }

    /// Files from `files` that are not present on disk yet.
    #[must_use]
    pub fn missing_files<'a>(&self, files: &'a [ModelFile]) -> Vec<&'a ModelFile> {
        files
            .iter()
            .filter(|file| !self.file_path(file).is_file())
            .collect()
    }
}

/// Returns `true` for references shaped like `owner/name`.
#[must_use]
pub fn is_hub_id(reference: &str) -> bool {
    let Some((owner, name)) = reference.split_once('/') else {
        return false;
    };
    let valid = |part: &str| {
        !part.is_empty()
            && !part.starts_with('.')
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    valid(owner) && valid(name)
}

/// Download URL of a file in a hub repository.
#[must_use]
pub fn file_url(hub_base_url: &str, repo: &str, remote_path: &str) -> String {
    format!(
        "{}/{repo}/resolve/main/{remote_path}",
        hub_base_url.trim_end_matches('/')
    )
}

/// Resolves model references and fetches missing files.
#[derive(Debug, Clone)]
pub struct ModelStore {
    models_dir: PathBuf,
    hub_base_url: String,
}

impl ModelStore {
    #[must_use]
    pub fn new(models_dir: PathBuf, hub_base_url: impl Into<String>) -> Self {
        Self {
            models_dir,
            hub_base_url: hub_base_url.into(),
        }
    }

    /// Directory where hub models are cached.
    #[must_use]
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Interprets a model reference relative to this store.
    #[must_use]
    pub fn source(&self, reference: &str) -> ModelSource {
        ModelSource::resolve(reference, &self.models_dir)
    }

    /// Makes sure every file in `files` exists, downloading hub files that
    /// are missing and verifying pinned checksums.
    ///
    /// `progress` receives the file name and a `0.0..=1.0` fraction.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ModelNotFound`] for missing files of a local
    /// source, or download and checksum errors for hub sources.
    pub async fn ensure_available(
        &self,
        source: &ModelSource,
        files: &[ModelFile],
        mut progress: impl FnMut(&str, f32) + Send,
    ) -> ModelResult<()> {
        for file in source.missing_files(files) {
            let dest = source.file_path(file);
            match source {
                ModelSource::Local(_) => {
                    return Err(ModelError::ModelNotFound(dest.display().to_string()));
                }
                ModelSource::Hub { repo, .. } => {
                    let url = file_url(&self.hub_base_url, repo, file.remote_path);
                    tracing::info!(%url, dest = %dest.display(), "downloading model file");
                    let bytes =
                        download_file(&url, &dest, |p| progress(file.local_name, p)).await?;
                    tracing::info!(file = file.local_name, bytes, "download complete");
                }
            }
        }

        for file in files {
            if let Some(expected) = file.checksum {
                verify_checksum(&source.file_path(file), expected)?;
            }
        }

        Ok(())
    }
}

/// Downloads `url` to `dest`, returning the number of bytes written.
///
/// # Errors
///
/// Returns an error if the request fails, the response is too small to be a
/// model, or the file cannot be written.
pub async fn download_file(
    url: &str,
    dest: &Path,
    mut progress_callback: impl FnMut(f32) + Send,
) -> ModelResult<u64> {
    use futures_util::StreamExt;
    use std::io::Write;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(MAX_DOWNLOAD_REDIRECTS))
        .user_agent(concat!("PixelMagic/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ModelError::DownloadFailed(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ModelError::DownloadFailed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ModelError::DownloadFailed(format!(
            "HTTP status: {}",
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    if total_size > 0 && total_size < MIN_MODEL_FILE_BYTES {
        return Err(ModelError::DownloadFailed(format!(
            "Response too small ({total_size} bytes) to be a model file. URL may have changed or returned an error page."
        )));
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = partial_path(dest);
    let mut file = std::fs::File::create(&partial)?;

    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                return Err(ModelError::DownloadFailed(e.to_string()));
            }
        };
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;

        if total_size > 0 {
            // Precision loss is irrelevant for a progress fraction
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            let fraction = (downloaded as f64 / total_size as f64) as f32;
            progress_callback(fraction);
        }
    }
    file.flush()?;
    drop(file);

    if downloaded < MIN_MODEL_FILE_BYTES {
        let _ = std::fs::remove_file(&partial);
        return Err(ModelError::DownloadFailed(format!(
            "Downloaded file too small ({downloaded} bytes)"
        )));
    }

    std::fs::rename(&partial, dest)?;
    Ok(downloaded)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Computes the BLAKE3 hex digest of a file.
///
/// # Errors
///
/// Returns an error if the file is missing or cannot be read.
pub fn compute_hash(path: &Path) -> ModelResult<String> {
    if !path.is_file() {
        return Err(ModelError::ModelNotFound(path.display().to_string()));
    }
    let file_data = std::fs::read(path)?;
    Ok(blake3::hash(&file_data).to_hex().to_string())
}

/// Verifies a file against an expected BLAKE3 hex digest.
///
/// # Errors
///
/// Returns [`ModelError::ChecksumMismatch`] if the digests differ.
pub fn verify_checksum(path: &Path, expected_hash: &str) -> ModelResult<()> {
    let actual = compute_hash(path)?;
    if !actual.eq_ignore_ascii_case(expected_hash) {
        return Err(ModelError::ChecksumMismatch {
            expected: expected_hash.to_string(),
            actual,
        });
    }
    Ok(())
}
