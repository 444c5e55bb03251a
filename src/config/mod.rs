// SPDX-License-Identifier: MPL-2.0
//! This module handles the application's configuration, including loading and saving
//! user preferences to a `settings.toml` file and resolving them against
//! environment variables and command-line overrides.
//!
//! # Examples
//!
//! ```no_run
//! use pixel_magic::config::{self, Config, Overrides, Settings};
//! use std::path::PathBuf;
//!
//! // Load existing configuration
//! let mut config = config::load().unwrap_or_default();
//!
//! // Modify a setting
//! config.super_resolution_steps = Some(50);
//!
//! // Save the modified configuration
//! config::save(&config).expect("Failed to save config");
//!
//! // Resolve effective settings (CLI > environment > file > defaults)
//! let settings = Settings::resolve(&config, &Overrides::default());
//! assert!(settings.super_resolution_steps.get().unwrap() >= 1);
//! ```

pub mod defaults;

use crate::app::paths;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use defaults::{
    DEFAULT_HUB_BASE_URL, DEFAULT_RMBG_MODEL, DEFAULT_SUPER_RESOLUTION_MODEL,
    DEFAULT_SUPER_RESOLUTION_STEPS, MAX_SUPER_RESOLUTION_STEPS, MIN_SUPER_RESOLUTION_STEPS,
};

const CONFIG_FILE: &str = "settings.toml";

/// Environment variable that sets the super-resolution step count.
pub const ENV_SUPER_RESOLUTION_STEPS: &str = "SUPER_RESOLUTION_STEPS";

/// Where inference should run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Use CUDA when available, otherwise the CPU.
    #[default]
    Auto,
    /// Always run on the CPU.
    Cpu,
    /// Prefer CUDA; falls back to the CPU with a warning when unavailable.
    Cuda,
}

impl FromStr for DevicePreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            other => Err(Error::Config(format!(
                "unknown device '{other}' (expected auto, cpu or cuda)"
            ))),
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DevicePreference::Auto => "auto",
            DevicePreference::Cpu => "cpu",
            DevicePreference::Cuda => "cuda",
        })
    }
}

/// User preferences persisted in `settings.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rmbg_model: Option<String>,
    #[serde(default)]
    pub super_resolution_model: Option<String>,
    #[serde(default)]
    pub super_resolution_steps: Option<usize>,
    #[serde(default)]
    pub device: Option<DevicePreference>,
    #[serde(default)]
    pub hub_base_url: Option<String>,
}

/// Values supplied on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub super_resolution_steps: Option<usize>,
    pub device: Option<DevicePreference>,
}

/// Super-resolution step count as configured.
///
/// A bad value is kept instead of raised, so it only fails super-resolution
/// runs and leaves every other command usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCount(std::result::Result<usize, String>);

impl StepCount {
    /// The configured count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the value was unparsable or is outside
    /// `1..=1000`.
    pub fn get(&self) -> Result<usize> {
        let steps = self.0.clone().map_err(Error::Config)?;
        validate_steps(steps)?;
        Ok(steps)
    }
}

impl From<usize> for StepCount {
    fn from(steps: usize) -> Self {
        Self(Ok(steps))
    }
}

/// Effective settings after applying overrides, environment and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub rmbg_model: String,
    pub super_resolution_model: String,
    pub super_resolution_steps: StepCount,
    pub device: DevicePreference,
    pub hub_base_url: String,
}

impl Settings {
    /// Resolves settings, reading `SUPER_RESOLUTION_STEPS` from the process
    /// environment.
    #[must_use]
    pub fn resolve(config: &Config, overrides: &Overrides) -> Self {
        let env_steps = std::env::var(ENV_SUPER_RESOLUTION_STEPS).ok();
        Self::resolve_with_env(config, overrides, env_steps.as_deref())
    }

    /// Resolves settings with an explicit value for `SUPER_RESOLUTION_STEPS`.
    ///
    /// Step precedence: override, environment, config file, default. The
    /// step count is checked by [`StepCount::get`], not here.
    #[must_use]
    pub fn resolve_with_env(
        config: &Config,
        overrides: &Overrides,
        env_steps: Option<&str>,
    ) -> Self {
        let env_steps = env_steps.map(str::trim).filter(|s| !s.is_empty()).map(|raw| {
            raw.parse::<usize>().map_err(|e| {
                format!("{ENV_SUPER_RESOLUTION_STEPS}='{raw}' is not a step count: {e}")
            })
        });

        let steps = match (overrides.super_resolution_steps, env_steps) {
            (Some(steps), _) => Ok(steps),
            (None, Some(env)) => env,
            (None, None) => Ok(config
                .super_resolution_steps
                .unwrap_or(DEFAULT_SUPER_RESOLUTION_STEPS)),
        };

        Self {
            rmbg_model: config
                .rmbg_model
                .clone()
                .unwrap_or_else(|| DEFAULT_RMBG_MODEL.to_string()),
            super_resolution_model: config
                .super_resolution_model
                .clone()
                .unwrap_or_else(|| DEFAULT_SUPER_RESOLUTION_MODEL.to_string()),
            super_resolution_steps: StepCount(steps),
            device: overrides.device.or(config.device).unwrap_or_default(),
            hub_base_url: config
                .hub_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_HUB_BASE_URL.to_string()),
        }
    }
}

fn validate_steps(steps: usize) -> Result<()> {
    if (MIN_SUPER_RESOLUTION_STEPS..=MAX_SUPER_RESOLUTION_STEPS).contains(&steps) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "super-resolution steps must be within {MIN_SUPER_RESOLUTION_STEPS}..={MAX_SUPER_RESOLUTION_STEPS}, got {steps}"
        )))
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    paths::get_app_config_dir().map(|mut path| {
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<Config> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(Config::default())
}

pub fn save(config: &Config) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unparsable settings");
            Ok(Config::default())
        }
    }
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip_preserves_fields() {
        let config = Config {
            rmbg_model: Some("/opt/models/rmbg".to_string()),
            super_resolution_model: None,
            super_resolution_steps: Some(25),
            device: Some(DevicePreference::Cpu),
            hub_base_url: None,
        };
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        save_to_path(&config, &config_path).expect("failed to save config");
        let loaded = load_from_path(&config_path).expect("failed to load config");

        assert_eq!(loaded.rmbg_model, config.rmbg_model);
        assert_eq!(loaded.super_resolution_steps, Some(25));
        assert_eq!(loaded.device, Some(DevicePreference::Cpu));
    }

    #[test]
    fn load_from_path_returns_default_on_invalid_toml() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "not = valid = toml").expect("failed to write invalid toml");

        let loaded = load_from_path(&config_path).expect("load should not error");
        assert!(loaded.rmbg_model.is_none());
    }

    #[test]
    fn device_is_written_in_lowercase() {
        let config = Config {
            device: Some(DevicePreference::Cuda),
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).expect("serializes");
        assert!(text.contains("device = \"cuda\""));
    }

    #[test]
    fn defaults_apply_without_any_source() {
        let settings = Settings::resolve_with_env(&Config::default(), &Overrides::default(), None);
        assert_eq!(
            settings.super_resolution_steps.get().unwrap(),
            DEFAULT_SUPER_RESOLUTION_STEPS
        );
        assert_eq!(settings.rmbg_model, DEFAULT_RMBG_MODEL);
        assert_eq!(settings.super_resolution_model, DEFAULT_SUPER_RESOLUTION_MODEL);
        assert_eq!(settings.device, DevicePreference::Auto);
        assert_eq!(settings.hub_base_url, DEFAULT_HUB_BASE_URL);
    }

    #[test]
    fn environment_beats_config_file() {
        let config = Config {
            super_resolution_steps: Some(10),
            ..Config::default()
        };
        let settings = Settings::resolve_with_env(&config, &Overrides::default(), Some("40"));
        assert_eq!(settings.super_resolution_steps.get().unwrap(), 40);
    }

    #[test]
    fn override_beats_environment() {
        let overrides = Overrides {
            super_resolution_steps: Some(5),
            device: Some(DevicePreference::Cpu),
        };
        let config = Config {
            device: Some(DevicePreference::Cuda),
            ..Config::default()
        };
        let settings = Settings::resolve_with_env(&config, &overrides, Some("many"));
        assert_eq!(settings.super_resolution_steps.get().unwrap(), 5);
        assert_eq!(settings.device, DevicePreference::Cpu);
    }

    #[test]
    fn blank_environment_value_is_ignored() {
        let settings =
            Settings::resolve_with_env(&Config::default(), &Overrides::default(), Some("  "));
        assert_eq!(
            settings.super_resolution_steps.get().unwrap(),
            DEFAULT_SUPER_RESOLUTION_STEPS
        );
    }

    #[test]
    fn invalid_steps_resolve_but_fail_on_use() {
        let none = Overrides::default();
        let config = Config::default();
        let steps = |env: &str| {
            Settings::resolve_with_env(&config, &none, Some(env)).super_resolution_steps
        };

        assert!(matches!(steps("many").get(), Err(Error::Config(msg)) if msg.contains("many")));
        assert!(steps("0").get().is_err());
        assert!(steps("1001").get().is_err());
        assert_eq!(steps("1000").get().unwrap(), 1000);
        assert!(StepCount::from(0).get().is_err());
    }

    #[test]
    fn device_preference_parses() {
        assert_eq!("CPU".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("gpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert!("tpu".parse::<DevicePreference>().is_err());
    }
}
