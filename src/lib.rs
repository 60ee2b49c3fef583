//! # Tidal Access Core Library
//!
//! Some climbing locations can only be reached when the sea is low enough.
//! This library turns a tide-height forecast for such a location into an
//! answer to two questions: *can I get there right now?* and *when is the
//! next time I can?*
//!
//! ## Design Philosophy
//!
//! ### Pure computation at the centre
//! All of the time-series math lives in [`windows`] and works on plain value
//! types ([`TidePoint`], [`TideWindow`]). It performs no I/O, holds no state
//! and never fails: degenerate input produces an empty list or `None`.
//!
//! ### Collaborators behind traits
//! Everything that can block or fail transiently sits behind an async trait:
//! - [`provider::TideProvider`]: the third-party tide forecast API
//! - [`location::LocationStore`]: persisted per-location tidal configuration
//! - [`cache::CacheStore`]: a TTL key-value store for computed results
//!
//! ### Data Flow
//! 1. **Request**: a client asks for the tidal status of a location
//! 2. **Cache**: a fresh cached result is returned as-is
//! 3. **Fetch**: on a miss, the provider is asked for ~1h of history plus the
//!    forecast horizon
//! 4. **Compute**: interpolate "now", sweep for threshold crossings, shrink by
//!    the safety buffer, pick the next window
//! 5. **Store**: the result is cached for the configured TTL
//!
//! An administrator changing a location's tidal configuration invalidates the
//! cached result for that location in the same call.
//!
//! ## Core Types
//! - [`TidePoint`]: a single forecast sample (epoch seconds, metres)
//! - [`TideWindow`]: a half-open interval of epoch seconds

use serde::{Deserialize, Serialize};

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod forecast;
pub mod location;
pub mod provider;
pub mod windows;

/// A single tide forecast sample.
///
/// Timestamps are UTC epoch seconds; heights are metres relative to whatever
/// datum the provider reports.
///
/// # Example
/// ```
/// use tidal_access_lib::TidePoint;
///
/// let low_water = TidePoint { timestamp: 1_700_000_000, height_m: 0.2 };
/// assert!(low_water.height_m < 0.5);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TidePoint {
    /// UTC epoch seconds
    pub timestamp: i64,
    /// Tide height in metres
    pub height_m: f64,
}

impl TidePoint {
    pub fn new(timestamp: i64, height_m: f64) -> Self {
        Self {
            timestamp,
            height_m,
        }
    }
}

/// A half-open interval `[start, end)` of UTC epoch seconds.
///
/// Windows produced by [`windows::compute_raw_access_windows`] and
/// [`windows::apply_window_buffer`] always satisfy `end > start`.
///
/// # Example
/// ```
/// use tidal_access_lib::TideWindow;
///
/// let window = TideWindow { start: 100, end: 700 };
/// assert_eq!(window.duration_secs(), 600);
/// assert!(window.contains(100));
/// assert!(!window.contains(700));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TideWindow {
    /// First accessible second (inclusive)
    pub start: i64,
    /// First inaccessible second (exclusive)
    pub end: i64,
}

impl TideWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn duration_secs(&self) -> i64 {
        self.end - self.start
    }

    /// True if `at` falls inside the half-open interval.
    pub fn contains(&self, at: i64) -> bool {
        self.start <= at && at < self.end
    }
}
