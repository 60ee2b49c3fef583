//! # Location Tidal Configuration
//!
//! Each location carries a [`TidalConfig`] owned by an administrator. The
//! forecast path only reads it; writes go through [`TidalConfig::apply_update`]
//! which enforces the invariant that an enabled tidal location has a
//! threshold and GPS coordinates.
//!
//! Storage is abstracted behind [`LocationStore`]. [`InMemoryLocationStore`]
//! is seeded from the application config and is what the binary runs with.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::ForecastError;

/// Tidal settings for one location.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TidalConfig {
    pub is_tidal: bool,
    /// Maximum tide height (m) at which the location is accessible
    pub threshold_meters: Option<f64>,
    /// Safety margin trimmed from both ends of every window
    pub buffer_minutes: u32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub notes: Option<String>,
}

/// Administrator request to change a location's tidal settings.
///
/// `buffer_minutes` is signed so that a negative value is rejected with a
/// configuration error instead of a deserialization failure.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TidalConfigUpdate {
    pub is_tidal: bool,
    pub threshold_meters: Option<f64>,
    pub buffer_minutes: Option<i64>,
    pub notes: Option<String>,
}

/// GPS and threshold required by the forecast path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TidalTarget {
    pub threshold_meters: f64,
    pub buffer_minutes: u32,
    pub latitude: f64,
    pub longitude: f64,
}

impl TidalConfig {
    /// Extract what the forecast needs, failing if an enabled config is
    /// missing any of it.
    pub fn target(&self) -> Result<TidalTarget, ForecastError> {
        let threshold_meters = self
            .threshold_meters
            .ok_or_else(|| ForecastError::configuration("tidal location has no threshold"))?;
        if !threshold_meters.is_finite() {
            return Err(ForecastError::configuration(
                "tidal location threshold is not a finite number",
            ));
        }
        let (latitude, longitude) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                return Err(ForecastError::configuration(
                    "tidal location has no GPS coordinates",
                ))
            }
        };
        Ok(TidalTarget {
            threshold_meters,
            buffer_minutes: self.buffer_minutes,
            latitude,
            longitude,
        })
    }

    /// Check the write-boundary invariants.
    pub fn validate(&self) -> Result<(), ForecastError> {
        if let Some(threshold) = self.threshold_meters {
            if !threshold.is_finite() {
                return Err(ForecastError::configuration(
                    "thresholdMeters must be a finite number",
                ));
            }
        }
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(ForecastError::configuration("latitude out of range"));
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(ForecastError::configuration("longitude out of range"));
            }
        }
        if self.is_tidal {
            if self.latitude.is_none() || self.longitude.is_none() {
                return Err(ForecastError::configuration(
                    "cannot enable tidal mode for a location without GPS coordinates",
                ));
            }
            if self.threshold_meters.is_none() {
                return Err(ForecastError::configuration(
                    "thresholdMeters is required when enabling tidal mode",
                ));
            }
        }
        Ok(())
    }

    /// Merge an update into a copy of this config and validate the result.
    ///
    /// Omitted `thresholdMeters`/`bufferMinutes` keep their current values.
    /// `notes` replaces the stored notes; a blank string clears them. GPS is
    /// owned by the location record and never changed here.
    pub fn apply_update(&self, update: &TidalConfigUpdate) -> Result<TidalConfig, ForecastError> {
        let buffer_minutes = match update.buffer_minutes {
            Some(minutes) => u32::try_from(minutes).map_err(|_| {
                ForecastError::configuration("bufferMinutes must be a non-negative integer")
            })?,
            None => self.buffer_minutes,
        };

        let notes = update
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned);

        let merged = TidalConfig {
            is_tidal: update.is_tidal,
            threshold_meters: update.threshold_meters.or(self.threshold_meters),
            buffer_minutes,
            latitude: self.latitude,
            longitude: self.longitude,
            notes,
        };
        merged.validate()?;
        Ok(merged)
    }
}

/// A location record as far as the tidal subsystem cares.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub tidal: TidalConfig,
}

/// Persisted per-location tidal configuration.
#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Location>, ForecastError>;

    /// Replace the tidal config of an existing location.
    async fn save_tidal_config(&self, id: &str, config: TidalConfig) -> Result<(), ForecastError>;
}

/// Process-local location store.
#[derive(Debug, Default)]
pub struct InMemoryLocationStore {
    locations: RwLock<HashMap<String, Location>>,
}

impl InMemoryLocationStore {
    pub fn new(seed: impl IntoIterator<Item = Location>) -> Self {
        let locations = seed.into_iter().map(|l| (l.id.clone(), l)).collect();
        Self {
            locations: RwLock::new(locations),
        }
    }
}

#[async_trait]
impl LocationStore for InMemoryLocationStore {
    async fn get(&self, id: &str) -> Result<Option<Location>, ForecastError> {
        Ok(self.locations.read().await.get(id).cloned())
    }

    async fn save_tidal_config(&self, id: &str, config: TidalConfig) -> Result<(), ForecastError> {
        let mut locations = self.locations.write().await;
        let location = locations
            .get_mut(id)
            .ok_or_else(|| ForecastError::NotFound(id.to_string()))?;
        location.tidal = config;
        Ok(())
    }
}
