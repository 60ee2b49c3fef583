//! # Tide Forecast Provider
//!
//! Fetches tide-height predictions for a GPS position from a third-party API.
//! The service only depends on the [`TideProvider`] trait; [`HttpTideProvider`]
//! is the production implementation.
//!
//! ## Data Source
//! A WorldTides-style v3 JSON API:
//! ```text
//! GET {base_url}?heights&lat=..&lon=..&start=..&length=..&step=..&key=..
//! ```
//! answering with
//! ```json
//! { "status": 200, "station": "...", "responseDatum": "LAT",
//!   "heights": [ { "dt": 1750000000, "height": 0.42 }, ... ] }
//! ```
//! A body carrying a non-200 `status` or an `error` string is a provider
//! error even when the HTTP status is 200.
//!
//! ## Error Handling
//! Network failures, non-success HTTP statuses, error payloads and bodies
//! that do not parse all become [`ForecastError::UpstreamProvider`]. Samples
//! with non-finite heights are dropped; deciding whether what is left is
//! enough belongs to the caller.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{config::ProviderConfig, error::ForecastError, TidePoint};

/// What to ask the provider for.
#[derive(Clone, Debug, PartialEq)]
pub struct ForecastRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// Inclusive UTC epoch seconds
    pub start: i64,
    pub end: i64,
    pub step_seconds: u32,
}

impl ForecastRequest {
    pub fn length_secs(&self) -> i64 {
        (self.end - self.start).max(0)
    }
}

/// Provider-reported context for a forecast, all optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetadata {
    pub station: Option<String>,
    pub timezone: Option<String>,
    pub datum: Option<String>,
}

/// A fetched forecast: samples plus metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProviderForecast {
    pub points: Vec<TidePoint>,
    pub metadata: ForecastMetadata,
}

/// Source of tide forecasts.
#[async_trait]
pub trait TideProvider: Send + Sync {
    async fn fetch(&self, request: &ForecastRequest) -> Result<ProviderForecast, ForecastError>;
}

/// Raw API response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: Option<u16>,
    error: Option<String>,
    heights: Option<Vec<ApiHeight>>,
    station: Option<String>,
    timezone: Option<String>,
    response_datum: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiHeight {
    dt: i64,
    height: Option<f64>,
}

/// Turn a provider response body into a forecast.
pub fn parse_response(body: &str) -> Result<ProviderForecast, ForecastError> {
    let resp: ApiResponse = serde_json::from_str(body)
        .map_err(|e| ForecastError::upstream(format!("malformed response: {e}")))?;

    if let Some(error) = resp.error {
        return Err(ForecastError::upstream(error));
    }
    if let Some(status) = resp.status {
        if status != 200 {
            return Err(ForecastError::upstream(format!("provider status {status}")));
        }
    }

    let heights = resp
        .heights
        .ok_or_else(|| ForecastError::upstream("response has no heights"))?;

    let points = heights
        .into_iter()
        .filter_map(|h| match h.height {
            Some(height) if height.is_finite() => Some(TidePoint::new(h.dt, height)),
            _ => None,
        })
        .collect();

    Ok(ProviderForecast {
        points,
        metadata: ForecastMetadata {
            station: resp.station,
            timezone: resp.timezone,
            datum: resp.response_datum,
        },
    })
}

/// HTTP client for the tide API.
#[derive(Clone)]
pub struct HttpTideProvider {
    client: Client,
    base_url: String,
    api_key: String,
    datum: Option<String>,
}

impl HttpTideProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ForecastError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ForecastError::upstream(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            datum: config.datum.clone(),
        })
    }
}

#[async_trait]
impl TideProvider for HttpTideProvider {
    async fn fetch(&self, request: &ForecastRequest) -> Result<ProviderForecast, ForecastError> {
        let mut query = vec![
            ("lat", request.latitude.to_string()),
            ("lon", request.longitude.to_string()),
            ("start", request.start.to_string()),
            ("length", request.length_secs().to_string()),
            ("step", request.step_seconds.to_string()),
            ("key", self.api_key.clone()),
        ];
        if let Some(datum) = &self.datum {
            query.push(("datum", datum.clone()));
        }

        tracing::info!(
            lat = request.latitude,
            lon = request.longitude,
            start = request.start,
            length = request.length_secs(),
            "fetching tide forecast"
        );

        let response = self
            .client
            .get(format!("{}?heights", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| ForecastError::upstream(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ForecastError::upstream(format!("reading body failed: {e}")))?;

        if !status.is_success() {
            // The body may still carry a more useful error message
            return match parse_response(&body) {
                Err(e) => Err(e),
                Ok(_) => Err(ForecastError::upstream(format!("HTTP {status}"))),
            };
        }

        parse_response(&body)
    }
}
