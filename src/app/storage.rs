// SPDX-License-Identifier: MPL-2.0
//! Flat on-disk storage for processed images.
//!
//! Every result is written as a PNG named after the local time it was saved
//! (`%Y%m%d_%H%M%S.png`). The history view groups those files by day.

use crate::app::paths;
use crate::error::{Error, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use image_rs::{DynamicImage, ImageFormat};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Timestamp layout used for file names.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const PNG_EXTENSION: &str = "png";

/// Upper bound on same-second collisions before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Stored file names grouped by the day they were created.
///
/// Days iterate oldest first; call `.iter().rev()` for newest first. Names
/// within a day are sorted newest first.
pub type History = BTreeMap<NaiveDate, Vec<String>>;

/// A processed image persisted to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: PathBuf,
    pub file_name: String,
    pub timestamp: NaiveDateTime,
}

/// Directory of timestamp-named PNG files.
#[derive(Debug, Clone)]
pub struct ImageStorage {
    images_dir: PathBuf,
}

impl ImageStorage {
    /// Opens the storage below `data_dir`, creating `storage/images` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn open(data_dir: &Path) -> Result<Self> {
        Self::at(paths::images_dir_in(data_dir))
    }

    /// Opens storage rooted directly at `images_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn at(images_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&images_dir)?;
        Ok(Self { images_dir })
    }

    /// Directory holding the stored images.
    #[must_use]
    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Saves `image` as a PNG named after the current local time.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or encoded.
    pub fn save(&self, image: &DynamicImage) -> Result<StoredImage> {
        self.save_at(image, Local::now().naive_local())
    }

    /// Saves `image` under the name derived from `timestamp`.
    ///
    /// If a file for the same second already exists, `_1`, `_2`, ... is
    /// appended to the stem instead of overwriting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or encoded.
    pub fn save_at(&self, image: &DynamicImage, timestamp: NaiveDateTime) -> Result<StoredImage> {
        let stem = timestamp.format(FILE_TIMESTAMP_FORMAT).to_string();
        let (file_name, path, file) = self.create_unique(&stem)?;

        let mut writer = BufWriter::new(file);
        if let Err(err) = image.write_to(&mut writer, ImageFormat::Png) {
            drop(writer);
            let _ = fs::remove_file(&path);
            return Err(Error::Io(format!(
                "failed to encode {}: {err}",
                path.display()
            )));
        }
        writer.flush()?;

        tracing::info!(path = %path.display(), "saved processed image");
        Ok(StoredImage {
            path,
            file_name,
            timestamp,
        })
    }

    fn create_unique(&self, stem: &str) -> Result<(String, PathBuf, File)> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = if attempt == 0 {
                format!("{stem}.{PNG_EXTENSION}")
            } else {
                format!("{stem}_{attempt}.{PNG_EXTENSION}")
            };
            let path = self.images_dir.join(&file_name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file_name, path, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(Error::Io(format!(
            "no free file name for {stem} in {}",
            self.images_dir.display()
        )))
    }

    /// Lists stored images grouped by day.
    ///
    /// Files whose names do not carry a timestamp are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn history(&self) -> Result<History> {
        let mut history = History::new();

        for entry in fs::read_dir(&self.images_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();

            match parse_timestamp(&file_name) {
                Some(timestamp) => history
                    .entry(timestamp.date())
                    .or_default()
                    .push(file_name),
                None => tracing::warn!(file = %file_name, "unable to parse date from file name"),
            }
        }

        for names in history.values_mut() {
            names.sort_unstable_by_key(|name| {
                Reverse((parse_timestamp(name), collision_index(name)))
            });
        }

        Ok(history)
    }

    /// Full path of a stored file name.
    #[must_use]
    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.images_dir.join(file_name)
    }
}

/// Extracts the save time from a stored file name.
///
/// Accepts `YYYYMMDD_HHMMSS` stems with an optional numeric `_N` suffix.
#[must_use]
pub fn parse_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;
    let mut parts = stem.splitn(3, '_');
    let date = parts.next()?;
    let time = parts.next()?;
    if let Some(suffix) = parts.next() {
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }

    NaiveDateTime::parse_from_str(&format!("{date}_{time}"), FILE_TIMESTAMP_FORMAT).ok()
}

/// Same-second collision counter of a stored file name; `0` without one.
fn collision_index(file_name: &str) -> u32 {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.splitn(3, '_').nth(2))
        .and_then(|suffix| suffix.parse().ok())
        .unwrap_or(0)
}

/// Short label for a history entry: the part after the date.
#[must_use]
pub fn display_name(file_name: &str) -> &str {
    file_name
        .split_once('_')
        .map_or(file_name, |(_, rest)| rest)
}
