//! # Forecast Orchestration
//!
//! [`ForecastService`] ties the collaborators together: it reads a location's
//! tidal config, serves cached results when fresh, otherwise fetches a
//! forecast and runs [`crate::windows::assess_access`] over it.
//!
//! ## Caching Strategy
//! - **Key**: [`cache_key`] of the location id
//! - **TTL**: `forecast.cache_ttl_minutes` (6 hours by default)
//! - **Invalidation**: every successful config update deletes the entry
//!   before returning
//! - **Corruption**: an entry that fails to deserialize is deleted and treated
//!   as a miss
//!
//! Concurrent misses for the same location may both fetch and both write;
//! the results are equivalent so the last write wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    cache::{cache_key, CacheError, CacheStore},
    config::ForecastSettings,
    error::ForecastError,
    location::{Location, LocationStore, TidalConfig, TidalConfigUpdate},
    provider::{ForecastMetadata, ForecastRequest, TideProvider},
    windows::assess_access,
    TideWindow,
};

/// Coarse status of a location at the time a result was generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TidalStatus {
    NotTidal,
    Accessible,
    Inaccessible,
}

/// Result of a status request; this is also the cached payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub location_id: String,
    pub is_tidal: bool,
    pub threshold_meters: Option<f64>,
    pub buffer_minutes: u32,
    pub notes: Option<String>,
    pub current_height_meters: Option<f64>,
    pub accessible_now: bool,
    pub next_window: Option<TideWindow>,
    pub generated_at: DateTime<Utc>,
    /// Forecast horizon the result was computed for
    pub horizon_hours: Option<u32>,
    pub metadata: Option<ForecastMetadata>,
}

impl ForecastResult {
    fn not_tidal(location: &Location, now: DateTime<Utc>) -> Self {
        Self {
            location_id: location.id.clone(),
            is_tidal: false,
            threshold_meters: None,
            buffer_minutes: 0,
            notes: location.tidal.notes.clone(),
            current_height_meters: None,
            accessible_now: false,
            next_window: None,
            generated_at: now,
            horizon_hours: None,
            metadata: None,
        }
    }

    pub fn status(&self) -> TidalStatus {
        match (self.is_tidal, self.accessible_now) {
            (false, _) => TidalStatus::NotTidal,
            (true, true) => TidalStatus::Accessible,
            (true, false) => TidalStatus::Inaccessible,
        }
    }
}

/// Orchestrates config, cache, provider and window computation.
pub struct ForecastService {
    locations: Arc<dyn LocationStore>,
    provider: Arc<dyn TideProvider>,
    cache: Arc<dyn CacheStore>,
    settings: ForecastSettings,
    step_seconds: u32,
}

impl ForecastService {
    pub fn new(
        locations: Arc<dyn LocationStore>,
        provider: Arc<dyn TideProvider>,
        cache: Arc<dyn CacheStore>,
        settings: ForecastSettings,
        step_seconds: u32,
    ) -> Self {
        Self {
            locations,
            provider,
            cache,
            settings,
            step_seconds,
        }
    }

    async fn load_location(&self, location_id: &str) -> Result<Location, ForecastError> {
        self.locations
            .get(location_id)
            .await?
            .ok_or_else(|| ForecastError::NotFound(location_id.to_string()))
    }

    /// Tidal status for a location.
    ///
    /// `now` defaults to the wall clock; `horizon_hours` is defaulted and
    /// clamped per [`ForecastSettings::clamp_horizon`].
    pub async fn get_status(
        &self,
        location_id: &str,
        now: Option<DateTime<Utc>>,
        horizon_hours: Option<u32>,
    ) -> Result<ForecastResult, ForecastError> {
        let now = now.unwrap_or_else(Utc::now);
        let location = self.load_location(location_id).await?;

        if !location.tidal.is_tidal {
            return Ok(ForecastResult::not_tidal(&location, now));
        }
        let target = location.tidal.target()?;
        let horizon = self.settings.clamp_horizon(horizon_hours);

        let key = cache_key(location_id);
        if let Some(cached) = self.read_cached(&key, location_id, horizon).await {
            tracing::debug!(location_id, "forecast cache hit");
            return Ok(cached);
        }
        tracing::debug!(location_id, horizon, "forecast cache miss");

        let now_secs = now.timestamp();
        let request = ForecastRequest {
            latitude: target.latitude,
            longitude: target.longitude,
            start: now_secs - self.settings.lookback_seconds,
            end: now_secs + i64::from(horizon) * 3600,
            step_seconds: self.step_seconds,
        };
        let forecast = self.provider.fetch(&request).await?;
        if forecast.points.len() < 2 {
            return Err(ForecastError::InsufficientData {
                received: forecast.points.len(),
            });
        }

        let assessment = assess_access(
            &forecast.points,
            target.threshold_meters,
            target.buffer_minutes,
            now_secs,
        );
        tracing::info!(
            location_id,
            samples = forecast.points.len(),
            windows = assessment.windows.len(),
            accessible_now = assessment.accessible_now,
            "computed tidal access"
        );

        let result = ForecastResult {
            location_id: location.id.clone(),
            is_tidal: true,
            threshold_meters: Some(target.threshold_meters),
            buffer_minutes: target.buffer_minutes,
            notes: location.tidal.notes.clone(),
            current_height_meters: assessment.current_height_m,
            accessible_now: assessment.accessible_now,
            next_window: assessment.next_window,
            generated_at: now,
            horizon_hours: Some(horizon),
            metadata: Some(forecast.metadata),
        };

        self.write_cached(&key, &result).await;
        Ok(result)
    }

    /// Apply an administrator's change and drop the cached forecast.
    ///
    /// Nothing is stored if validation fails.
    pub async fn update_config(
        &self,
        location_id: &str,
        update: &TidalConfigUpdate,
    ) -> Result<TidalConfig, ForecastError> {
        let location = self.load_location(location_id).await?;
        let config = location.tidal.apply_update(update)?;

        self.locations
            .save_tidal_config(location_id, config.clone())
            .await?;
        self.invalidate(location_id).await?;

        tracing::info!(
            location_id,
            is_tidal = config.is_tidal,
            threshold_meters = ?config.threshold_meters,
            buffer_minutes = config.buffer_minutes,
            "tidal config updated"
        );
        Ok(config)
    }

    /// Delete any cached forecast for `location_id`.
    pub async fn invalidate(&self, location_id: &str) -> Result<(), ForecastError> {
        self.cache.delete(&cache_key(location_id)).await?;
        tracing::debug!(location_id, "forecast cache invalidated");
        Ok(())
    }

    /// Cached result for `key` if present, intact, and computed for this
    /// location and `horizon`.
    async fn read_cached(
        &self,
        key: &str,
        location_id: &str,
        horizon: u32,
    ) -> Option<ForecastResult> {
        let payload = match self.cache.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(CacheError::Serialization(e)) => {
                tracing::warn!(key, "corrupt cache entry: {e}");
                self.discard(key).await;
                return None;
            }
            Err(e) => {
                tracing::warn!(key, "cache read failed: {e}");
                return None;
            }
        };

        match serde_json::from_str::<ForecastResult>(&payload) {
            Ok(result)
                if result.location_id == location_id && result.horizon_hours == Some(horizon) =>
            {
                Some(result)
            }
            Ok(result) => {
                if result.location_id != location_id {
                    tracing::warn!(
                        key,
                        cached_for = %result.location_id,
                        "cached forecast belongs to another location"
                    );
                }
                None
            }
            Err(e) => {
                tracing::warn!(key, "undecodable cached forecast: {e}");
                self.discard(key).await;
                None
            }
        }
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            tracing::warn!(key, "failed to delete bad cache entry: {e}");
        }
    }

    async fn write_cached(&self, key: &str, result: &ForecastResult) {
        let payload = match serde_json::to_string(result) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key, "cannot serialize forecast: {e}");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, payload, self.settings.cache_ttl()).await {
            tracing::warn!(key, "cache write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::MemoryCache,
        location::InMemoryLocationStore,
        provider::ProviderForecast,
        TidePoint,
    };
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };
    use std::time::Duration;

    /// Provider stub that replays a fixed series relative to the request.
    struct ScriptedProvider {
        calls: AtomicUsize,
        heights: Vec<f64>,
        fail: bool,
        requests: Mutex<Vec<ForecastRequest>>,
    }

    impl ScriptedProvider {
        fn new(heights: Vec<f64>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                heights,
                fail: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TideProvider for ScriptedProvider {
        async fn fetch(&self, request: &ForecastRequest) -> Result<ProviderForecast, ForecastError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ForecastError::upstream("HTTP 503"));
            }
            // Samples hourly from the lookback start (now - 3600)
            let points = self
                .heights
                .iter()
                .enumerate()
                .map(|(i, h)| TidePoint::new(request.start + i as i64 * 3600, *h))
                .collect();
            Ok(ProviderForecast {
                points,
                metadata: ForecastMetadata {
                    station: Some("TEST STATION".to_string()),
                    ..ForecastMetadata::default()
                },
            })
        }
    }

    /// Cache that always returns garbage and records deletes.
    #[derive(Default)]
    struct CorruptCache {
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl CacheStore for CorruptCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Ok(Some("{not a forecast".to_string()))
        }
        async fn set(&self, _: &str, _: String, _: Duration) -> Result<(), CacheError> {
            Ok(())
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn tidal_location(id: &str) -> Location {
        Location {
            id: id.to_string(),
            name: "Sea Stack".to_string(),
            tidal: TidalConfig {
                is_tidal: true,
                threshold_meters: Some(0.5),
                buffer_minutes: 0,
                latitude: Some(50.1),
                longitude: Some(-5.5),
                notes: Some("Abseil approach".to_string()),
            },
        }
    }

    fn service_with(
        locations: Vec<Location>,
        provider: Arc<ScriptedProvider>,
        cache: Arc<dyn CacheStore>,
    ) -> ForecastService {
        ForecastService::new(
            Arc::new(InMemoryLocationStore::new(locations)),
            provider,
            cache,
            ForecastSettings::default(),
            1800,
        )
    }

    /// First sample is an hour before `now`: low, rising past the threshold.
    fn heights() -> Vec<f64> {
        vec![0.2, 0.6, 1.0, 0.6, 0.2]
    }

    #[tokio::test]
    async fn computes_status_from_provider_series() {
        let provider = Arc::new(ScriptedProvider::new(heights()));
        let service = service_with(
            vec![tidal_location("stack")],
            provider.clone(),
            Arc::new(MemoryCache::new()),
        );

        let result = service.get_status("stack", Some(now()), None).await.unwrap();
        let t0 = now().timestamp() - 3600;

        assert!(result.is_tidal);
        assert!(!result.accessible_now);
        assert_eq!(result.status(), TidalStatus::Inaccessible);
        assert!((result.current_height_meters.unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(result.next_window, Some(TideWindow::new(t0 + 11700, t0 + 14400)));
        assert_eq!(result.threshold_meters, Some(0.5));
        assert_eq!(result.horizon_hours, Some(72));
        assert_eq!(
            result.metadata.unwrap().station.as_deref(),
            Some("TEST STATION")
        );

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].start, now().timestamp() - 3600);
        assert_eq!(requests[0].end, now().timestamp() + 72 * 3600);
        assert_eq!(requests[0].step_seconds, 1800);
    }

    #[tokio::test]
    async fn horizon_is_clamped_into_provider_request() {
        let provider = Arc::new(ScriptedProvider::new(heights()));
        let service = service_with(
            vec![tidal_location("stack")],
            provider.clone(),
            Arc::new(MemoryCache::new()),
        );

        let result = service
            .get_status("stack", Some(now()), Some(500))
            .await
            .unwrap();
        assert_eq!(result.horizon_hours, Some(168));
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].end, now().timestamp() + 168 * 3600);
    }

    #[tokio::test]
    async fn non_tidal_location_skips_provider() {
        let provider = Arc::new(ScriptedProvider::new(heights()));
        let mut location = tidal_location("slab");
        location.tidal.is_tidal = false;
        let service = service_with(vec![location], provider.clone(), Arc::new(MemoryCache::new()));

        let result = service.get_status("slab", Some(now()), None).await.unwrap();
        assert_eq!(result.status(), TidalStatus::NotTidal);
        assert_eq!(result.threshold_meters, None);
        assert_eq!(result.next_window, None);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_location_is_not_found() {
        let service = service_with(
            Vec::new(),
            Arc::new(ScriptedProvider::new(heights())),
            Arc::new(MemoryCache::new()),
        );
        assert!(matches!(
            service.get_status("nope", Some(now()), None).await,
            Err(ForecastError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn tidal_location_without_gps_is_configuration_error() {
        let provider = Arc::new(ScriptedProvider::new(heights()));
        let mut location = tidal_location("broken");
        location.tidal.longitude = None;
        let service = service_with(vec![location], provider.clone(), Arc::new(MemoryCache::new()));

        assert!(matches!(
            service.get_status("broken", Some(now()), None).await,
            Err(ForecastError::Configuration(_))
        ));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn provider_failure_is_not_cached() {
        let provider = Arc::new(ScriptedProvider::failing());
        let cache = Arc::new(MemoryCache::new());
        let service = service_with(vec![tidal_location("stack")], provider.clone(), cache.clone());

        for _ in 0..2 {
            let err = service.get_status("stack", Some(now()), None).await.unwrap_err();
            assert!(err.is_retryable());
        }
        assert_eq!(provider.calls(), 2);
        assert_eq!(cache.get(&cache_key("stack")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn single_sample_is_insufficient_data() {
        let provider = Arc::new(ScriptedProvider::new(vec![0.3]));
        let service = service_with(
            vec![tidal_location("stack")],
            provider,
            Arc::new(MemoryCache::new()),
        );
        assert!(matches!(
            service.get_status("stack", Some(now()), None).await,
            Err(ForecastError::InsufficientData { received: 1 })
        ));
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let provider = Arc::new(ScriptedProvider::new(heights()));
        let service = service_with(
            vec![tidal_location("stack")],
            provider.clone(),
            Arc::new(MemoryCache::new()),
        );

        let first = service.get_status("stack", Some(now()), None).await.unwrap();
        let second = service.get_status("stack", None, None).await.unwrap();
        assert_eq!(provider.calls(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn different_horizon_bypasses_cache() {
        let provider = Arc::new(ScriptedProvider::new(heights()));
        let service = service_with(
            vec![tidal_location("stack")],
            provider.clone(),
            Arc::new(MemoryCache::new()),
        );

        service.get_status("stack", Some(now()), Some(24)).await.unwrap();
        service.get_status("stack", Some(now()), Some(48)).await.unwrap();
        service.get_status("stack", Some(now()), Some(48)).await.unwrap();
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn config_update_invalidates_cache() {
        let provider = Arc::new(ScriptedProvider::new(heights()));
        let service = service_with(
            vec![tidal_location("stack")],
            provider.clone(),
            Arc::new(MemoryCache::new()),
        );

        service.get_status("stack", Some(now()), None).await.unwrap();
        let updated = service
            .update_config(
                "stack",
                &TidalConfigUpdate {
                    is_tidal: true,
                    threshold_meters: Some(0.7),
                    buffer_minutes: Some(10),
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.threshold_meters, Some(0.7));

        let result = service.get_status("stack", Some(now()), None).await.unwrap();
        assert_eq!(provider.calls(), 2);
        assert_eq!(result.threshold_meters, Some(0.7));
        assert_eq!(result.buffer_minutes, 10);
    }

    #[tokio::test]
    async fn rejected_update_leaves_config_and_cache_alone() {
        let provider = Arc::new(ScriptedProvider::new(heights()));
        let mut location = tidal_location("no-gps");
        location.tidal = TidalConfig::default();
        let store = Arc::new(InMemoryLocationStore::new(vec![location]));
        let service = ForecastService::new(
            store.clone(),
            provider,
            Arc::new(MemoryCache::new()),
            ForecastSettings::default(),
            1800,
        );

        let err = service
            .update_config(
                "no-gps",
                &TidalConfigUpdate {
                    is_tidal: true,
                    threshold_meters: Some(1.0),
                    ..TidalConfigUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::Configuration(_)));
        assert_eq!(
            store.get("no-gps").await.unwrap().unwrap().tidal,
            TidalConfig::default()
        );
    }

    #[tokio::test]
    async fn cached_result_for_another_location_is_a_miss() {
        let provider = Arc::new(ScriptedProvider::new(heights()));
        let cache = Arc::new(MemoryCache::new());
        let mut other = tidal_location("crag_one");
        other.tidal.threshold_meters = Some(0.9);
        let service = service_with(
            vec![tidal_location("crag.one"), other],
            provider.clone(),
            cache.clone(),
        );

        service.get_status("crag.one", Some(now()), None).await.unwrap();

        // Plant the first location's payload under the second location's key
        let payload = cache.get(&cache_key("crag.one")).await.unwrap().unwrap();
        cache
            .set(&cache_key("crag_one"), payload, Duration::from_secs(3600))
            .await
            .unwrap();

        let result = service.get_status("crag_one", Some(now()), None).await.unwrap();
        assert_eq!(provider.calls(), 2);
        assert_eq!(result.location_id, "crag_one");
        assert_eq!(result.threshold_meters, Some(0.9));
    }

    #[tokio::test]
    async fn corrupt_cache_entry_is_discarded() {
        let provider = Arc::new(ScriptedProvider::new(heights()));
        let cache = Arc::new(CorruptCache::default());
        let service = service_with(vec![tidal_location("stack")], provider.clone(), cache.clone());

        let result = service.get_status("stack", Some(now()), None).await;
        assert!(result.is_ok());
        assert_eq!(provider.calls(), 1);
        assert_eq!(cache.deletes.load(Ordering::SeqCst), 1);
    }
}
