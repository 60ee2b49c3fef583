//! HTTP surface: tidal status for clients and tidal config for admins.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{
    error::ForecastError,
    forecast::{ForecastResult, ForecastService, TidalStatus},
    location::{TidalConfig, TidalConfigUpdate},
    TideWindow,
};

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ForecastService>,
    /// Bearer token for the config endpoint; `None` leaves it open
    pub admin_token: Option<Arc<str>>,
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/v1/locations/:id/tides",
            get(get_tidal_status).put(update_tidal_config),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Forecast horizon in hours, clamped server-side
    pub hours: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowView {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WindowView {
    fn from_window(window: TideWindow) -> Option<Self> {
        Some(Self {
            start: DateTime::from_timestamp(window.start, 0)?,
            end: DateTime::from_timestamp(window.end, 0)?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastInfo {
    pub generated_at: DateTime<Utc>,
    pub horizon_hours: Option<u32>,
    pub station: Option<String>,
    pub timezone: Option<String>,
    pub datum: Option<String>,
}

/// Status payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub location_id: String,
    pub is_tidal: bool,
    pub status: TidalStatus,
    pub threshold_meters: Option<f64>,
    pub buffer_minutes: u32,
    pub notes: Option<String>,
    pub current_height_meters: Option<f64>,
    pub accessible_now: bool,
    pub next_window: Option<WindowView>,
    pub forecast: Option<ForecastInfo>,
}

impl From<ForecastResult> for StatusResponse {
    fn from(result: ForecastResult) -> Self {
        let status = result.status();
        let forecast = result.metadata.map(|meta| ForecastInfo {
            generated_at: result.generated_at,
            horizon_hours: result.horizon_hours,
            station: meta.station,
            timezone: meta.timezone,
            datum: meta.datum,
        });
        Self {
            location_id: result.location_id,
            is_tidal: result.is_tidal,
            status,
            threshold_meters: result.threshold_meters,
            buffer_minutes: result.buffer_minutes,
            notes: result.notes,
            current_height_meters: result.current_height_meters,
            accessible_now: result.accessible_now,
            next_window: result.next_window.and_then(WindowView::from_window),
            forecast,
        }
    }
}

/// Stored tidal config as returned to admins
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TidalConfigView {
    pub location_id: String,
    pub is_tidal: bool,
    pub threshold_meters: Option<f64>,
    pub buffer_minutes: u32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub notes: Option<String>,
}

impl TidalConfigView {
    fn new(location_id: String, config: TidalConfig) -> Self {
        Self {
            location_id,
            is_tidal: config.is_tidal,
            threshold_meters: config.threshold_meters,
            buffer_minutes: config.buffer_minutes,
            latitude: config.latitude,
            longitude: config.longitude,
            notes: config.notes,
        }
    }
}

/// Current tidal status for a location
pub async fn get_tidal_status(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<StatusResponse>, ForecastError> {
    let Query(query) = query?;
    let result = state
        .service
        .get_status(&location_id, None, query.hours)
        .await?;
    Ok(Json(result.into()))
}

/// Update a location's tidal config (admin only)
pub async fn update_tidal_config(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
    headers: HeaderMap,
    update: Result<Json<TidalConfigUpdate>, JsonRejection>,
) -> Result<Json<TidalConfigView>, ForecastError> {
    authorize_admin(&state, &headers)?;
    let Json(update) = update?;
    let config = state.service.update_config(&location_id, &update).await?;
    Ok(Json(TidalConfigView::new(location_id, config)))
}

fn authorize_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ForecastError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(ForecastError::Unauthorized),
    }
}
