//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the
//! tidal-config.toml file. Every section has defaults, so a partial file (or
//! none at all) still produces a runnable configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{error::ForecastError, location::Location};

/// Default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "tidal-config.toml";

/// Application configuration loaded from tidal-config.toml
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener and admin access
    pub server: ServerConfig,
    /// Tide forecast API
    pub provider: ProviderConfig,
    /// Forecast window and cache lifetime
    pub forecast: ForecastSettings,
    /// Cache backend selection
    pub cache: CacheConfig,
    /// Seed records for the in-memory location store
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required by the configuration endpoint, if set
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            admin_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Tide API endpoint
    pub base_url: String,
    pub api_key: String,
    /// Sampling step requested from the provider
    pub step_seconds: u32,
    /// Vertical datum for heights (provider default when unset)
    pub datum: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.worldtides.info/api/v3".to_string(),
            api_key: String::new(),
            step_seconds: 1800,
            datum: None,
            timeout_secs: 15,
        }
    }
}

/// Knobs for the forecast orchestration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ForecastSettings {
    pub default_horizon_hours: u32,
    pub min_horizon_hours: u32,
    pub max_horizon_hours: u32,
    /// History requested before "now"
    pub lookback_seconds: i64,
    pub cache_ttl_minutes: u64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            default_horizon_hours: 72,
            min_horizon_hours: 24,
            max_horizon_hours: 168,
            lookback_seconds: 3600,
            cache_ttl_minutes: 360,
        }
    }
}

impl ForecastSettings {
    /// Requested horizon, defaulted and clamped to the allowed range.
    ///
    /// With inverted bounds the maximum wins; [`Config::validate`] rejects
    /// such a config at startup.
    pub fn clamp_horizon(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_horizon_hours)
            .max(self.min_horizon_hours)
            .min(self.max_horizon_hours)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes * 60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Directory for the file backend
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            dir: PathBuf::from("/tmp/tidal-access-cache"),
        }
    }
}

impl Config {
    /// Reject settings the service cannot run with: inverted horizon bounds
    /// and seed locations that break the tidal config invariants.
    pub fn validate(&self) -> Result<(), ForecastError> {
        let forecast = &self.forecast;
        if forecast.min_horizon_hours > forecast.max_horizon_hours {
            return Err(ForecastError::configuration(format!(
                "forecast.min_horizon_hours ({}) exceeds forecast.max_horizon_hours ({})",
                forecast.min_horizon_hours, forecast.max_horizon_hours
            )));
        }
        for location in &self.locations {
            location.tidal.validate().map_err(|e| {
                ForecastError::configuration(format!("location {:?}: {e}", location.id))
            })?;
        }
        Ok(())
    }

    /// Load configuration from tidal-config.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    tracing::info!(
                        path = %path.display(),
                        locations = config.locations.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "invalid config file format: {e}");
                    tracing::warn!("using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(
                    path = %path.display(),
                    "no config file found, using default configuration"
                );
                Self::default()
            }
        }
    }
}
