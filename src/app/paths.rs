// SPDX-License-Identifier: MPL-2.0
//! Centralized path management for application directories.
//!
//! This module provides a single source of truth for application data paths,
//! ensuring consistent directory usage across all components.
//!
//! # Layout
//!
//! ```text
//! <data dir>/
//! ├── models/            downloaded model files, one directory per hub id
//! └── storage/
//!     └── images/        processed images, named by timestamp
//! ```
//!
//! # Path Resolution Order
//!
//! Paths are resolved in the following priority order:
//! 1. **Explicit override** - parameter to `_with_override()` functions (for tests)
//! 2. **CLI arguments** (`--data-dir`, `--config-dir`) - set via [`init_cli_overrides`]
//! 3. **Environment variables** (`PIXEL_MAGIC_DATA_DIR`, `PIXEL_MAGIC_CONFIG_DIR`)
//! 4. **Platform default** - via `dirs` crate

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Application name used for directory naming.
const APP_NAME: &str = "PixelMagic";

/// Environment variable to override the data directory.
pub const ENV_DATA_DIR: &str = "PIXEL_MAGIC_DATA_DIR";

/// Environment variable to override the config directory.
pub const ENV_CONFIG_DIR: &str = "PIXEL_MAGIC_CONFIG_DIR";

const STORAGE_DIR: &str = "storage";
const IMAGES_DIR: &str = "images";
const MODELS_DIR: &str = "models";

/// Global CLI override for data directory (set once at startup).
static CLI_DATA_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Global CLI override for config directory (set once at startup).
static CLI_CONFIG_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Initializes CLI overrides for data and config directories.
///
/// This should be called once at application startup, before any path
/// resolution functions are called.
///
/// # Panics
///
/// Panics if called more than once (OnceLock can only be set once).
pub fn init_cli_overrides(data_dir: Option<String>, config_dir: Option<String>) {
    CLI_DATA_DIR
        .set(data_dir.map(PathBuf::from))
        .expect("CLI data dir override already initialized");
    CLI_CONFIG_DIR
        .set(config_dir.map(PathBuf::from))
        .expect("CLI config dir override already initialized");
}

fn get_cli_data_dir() -> Option<PathBuf> {
    CLI_DATA_DIR.get().and_then(Clone::clone)
}

fn get_cli_config_dir() -> Option<PathBuf> {
    CLI_CONFIG_DIR.get().and_then(Clone::clone)
}

fn non_empty_env(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Returns the application data directory path.
///
/// Holds downloaded models and processed images. Returns `None` if the
/// platform data directory cannot be determined (rare edge case).
pub fn get_app_data_dir() -> Option<PathBuf> {
    get_app_data_dir_with_override(None)
}

/// Returns the application data directory path with an optional override.
///
/// # Resolution Order
///
/// 1. `override_path` parameter (if `Some`) - most specific, for tests
/// 2. CLI argument `--data-dir` (if set via [`init_cli_overrides`])
/// 3. `PIXEL_MAGIC_DATA_DIR` environment variable (if set and non-empty)
/// 4. Platform-specific data directory (with app name appended)
pub fn get_app_data_dir_with_override(override_path: Option<PathBuf>) -> Option<PathBuf> {
    override_path
        .or_else(get_cli_data_dir)
        .or_else(|| non_empty_env(ENV_DATA_DIR))
        .or_else(|| {
            dirs::data_dir().map(|mut path| {
                path.push(APP_NAME);
                path
            })
        })
}

/// Returns the application config directory path (home of `settings.toml`).
pub fn get_app_config_dir() -> Option<PathBuf> {
    get_app_config_dir_with_override(None)
}

/// Returns the application config directory path with an optional override.
///
/// Same resolution order as [`get_app_data_dir_with_override`], using
/// `--config-dir` and `PIXEL_MAGIC_CONFIG_DIR`.
pub fn get_app_config_dir_with_override(override_path: Option<PathBuf>) -> Option<PathBuf> {
    override_path
        .or_else(get_cli_config_dir)
        .or_else(|| non_empty_env(ENV_CONFIG_DIR))
        .or_else(|| {
            dirs::config_dir().map(|mut path| {
                path.push(APP_NAME);
                path
            })
        })
}

/// Storage root below a data directory.
#[must_use]
pub fn storage_dir_in(data_dir: &Path) -> PathBuf {
    data_dir.join(STORAGE_DIR)
}

/// Processed-images directory below a data directory.
#[must_use]
pub fn images_dir_in(data_dir: &Path) -> PathBuf {
    storage_dir_in(data_dir).join(IMAGES_DIR)
}

/// Downloaded-models directory below a data directory.
#[must_use]
pub fn models_dir_in(data_dir: &Path) -> PathBuf {
    data_dir.join(MODELS_DIR)
}

/// Returns the data directory, falling back to the working directory.
#[must_use]
pub fn data_dir_or_cwd() -> PathBuf {
    get_app_data_dir().unwrap_or_else(|| PathBuf::from("."))
}
