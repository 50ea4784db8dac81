#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Engine configuration.
//!
//! One TOML file with a section per component. Every key has a default,
//! so an empty file (or no file at all) gives the stock engine.

use std::path::{Path, PathBuf};

use dustwatch_classify::{COMPLIANCE_WINDOW_HOURS, ClassifierConfig};
use dustwatch_cumulative_models::CumulativeConfig;
use dustwatch_interpolate_models::InterpolationConfig;
use dustwatch_store::StorePaths;
use dustwatch_temporal::Cadence;
use dustwatch_temporal_models::TemporalConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DUSTWATCH_CONFIG";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`EngineConfig`].
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

/// Where engine files live and how long raw samples are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Data directory. Defaults to `data/` under the project root.
    pub data_dir: Option<PathBuf>,
    /// Raw grid samples older than this many hours are pruned.
    pub retention_hours: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            retention_hours: dustwatch_store::grid::DEFAULT_RETENTION_HOURS,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub interpolation: InterpolationConfig,
    pub temporal: TemporalConfig,
    pub classification: ClassifierConfig,
    pub cumulative: CumulativeConfig,
    pub store: StoreConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] for malformed input or
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Loads from `cli_path`, else from `$DUSTWATCH_CONFIG`, else returns
    /// the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a named file cannot be read or is invalid.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match cli_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => {
                let config = Self::load(&path)?;
                log::info!("Using configuration {}", path.display());
                Ok(config)
            }
            None => {
                log::debug!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Paths rooted at the configured data directory.
    #[must_use]
    pub fn store_paths(&self) -> StorePaths {
        self.store
            .data_dir
            .as_ref()
            .map_or_else(StorePaths::default, StorePaths::new)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a value cannot be represented.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })
    }

    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Cadence::from_hours(self.temporal.cadence_hours).map_err(|e| invalid(e.to_string()))?;

        let interp = &self.interpolation;
        if interp.k_nearest == 0 {
            return Err(invalid("interpolation.k_nearest must be at least 1"));
        }
        if interp.max_distance_km.is_nan() || interp.max_distance_km <= 0.0 {
            return Err(invalid("interpolation.max_distance_km must be positive"));
        }
        if interp.power.is_nan() || interp.power <= 0.0 {
            return Err(invalid("interpolation.power must be positive"));
        }
        if interp.epsilon_km.is_nan() || interp.epsilon_km <= 0.0 {
            return Err(invalid("interpolation.epsilon_km must be positive"));
        }

        if self.temporal.windows_hours.contains(&0) {
            return Err(invalid("temporal.windows_hours must not contain 0"));
        }
        if !self.temporal.windows_hours.contains(&COMPLIANCE_WINDOW_HOURS) {
            return Err(invalid(format!(
                "temporal.windows_hours must include {COMPLIANCE_WINDOW_HOURS} for compliance"
            )));
        }
        if self.temporal.forecast_horizons_hours.contains(&0) {
            return Err(invalid("temporal.forecast_horizons_hours must not contain 0"));
        }

        let region = &self.cumulative.region;
        if region.min_lat >= region.max_lat || region.min_lon >= region.max_lon {
            return Err(invalid("cumulative.region is empty"));
        }
        if self.cumulative.who_threshold > self.cumulative.extreme_threshold {
            return Err(invalid(
                "cumulative.who_threshold must not exceed cumulative.extreme_threshold",
            ));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}
