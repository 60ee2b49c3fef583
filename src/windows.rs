//! # Access Window Computation
//!
//! Pure functions that derive access windows from a tide forecast. Nothing in
//! here allocates shared state, performs I/O or returns an error: empty or
//! degenerate input yields `None` or an empty list.
//!
//! ## Pipeline
//! 1. [`interpolate_height`]: height at an arbitrary instant
//! 2. [`compute_raw_access_windows`]: intervals where height ≤ threshold
//! 3. [`apply_window_buffer`]: shrink each interval by the safety margin
//! 4. [`pick_next_window`]: earliest interval that has not fully elapsed
//!
//! ## Interpolation
//! Between two samples the tide is assumed to move linearly:
//! ```text
//! height = h0 + (h1 - h0) * (t - t0) / (t1 - t0)
//! ```
//! Threshold crossings use the same line solved for time:
//! ```text
//! crossing = t0 + (threshold - h0) / (h1 - h0) * (t1 - t0)
//! ```

use crate::{TidePoint, TideWindow};

/// Copy of `points` ordered by timestamp.
fn sorted_by_time(points: &[TidePoint]) -> Vec<TidePoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.timestamp);
    sorted
}

/// Height of the tide at `at`, linearly interpolated between samples.
///
/// `points` need not be sorted. Queries outside the sampled span clamp to the
/// nearest boundary sample; there is no extrapolation. Returns `None` only for
/// an empty series.
///
/// # Example
/// ```
/// use tidal_access_lib::{windows::interpolate_height, TidePoint};
///
/// let series = [TidePoint::new(0, 0.0), TidePoint::new(100, 10.0)];
/// assert_eq!(interpolate_height(&series, 50), Some(5.0));
/// assert_eq!(interpolate_height(&series, 500), Some(10.0));
/// ```
pub fn interpolate_height(points: &[TidePoint], at: i64) -> Option<f64> {
    match points {
        [] => return None,
        [only] => return Some(only.height_m),
        _ => {}
    }

    let sorted = sorted_by_time(points);
    let first = sorted[0];
    let last = sorted[sorted.len() - 1];

    if at <= first.timestamp {
        return Some(first.height_m);
    }
    if at >= last.timestamp {
        return Some(last.height_m);
    }

    // First sample strictly after `at`; the clamps above keep this in 1..len
    let right_idx = sorted.partition_point(|p| p.timestamp <= at);
    let left = sorted[right_idx - 1];
    let right = sorted[right_idx];

    let span = right.timestamp - left.timestamp;
    if span == 0 {
        return Some(left.height_m);
    }

    let alpha = (at - left.timestamp) as f64 / span as f64;
    Some(left.height_m + (right.height_m - left.height_m) * alpha)
}

/// Instant at which the line through `left` and `right` meets `threshold`.
///
/// Callers guarantee the heights differ.
fn crossing_time(left: &TidePoint, right: &TidePoint, threshold: f64) -> i64 {
    let ratio = (threshold - left.height_m) / (right.height_m - left.height_m);
    let span = (right.timestamp - left.timestamp) as f64;
    (left.timestamp as f64 + ratio * span).round() as i64
}

/// Intervals during which the tide is at or below `threshold`.
///
/// The series is sorted and swept once from left to right, so the result is
/// chronological and non-overlapping. A window that is open when the series
/// ends closes at the last sample.
///
/// A single sample at or below the threshold yields the degenerate window
/// `[t, t]`; every other returned window has `end > start`.
///
/// # Example
/// ```
/// use tidal_access_lib::{windows::compute_raw_access_windows, TidePoint, TideWindow};
///
/// let series = [
///     TidePoint::new(0, 1.0),
///     TidePoint::new(100, 0.0),
///     TidePoint::new(200, 1.0),
/// ];
/// assert_eq!(
///     compute_raw_access_windows(&series, 0.5),
///     vec![TideWindow::new(50, 150)]
/// );
/// ```
pub fn compute_raw_access_windows(points: &[TidePoint], threshold: f64) -> Vec<TideWindow> {
    match points {
        [] => return Vec::new(),
        [only] => {
            return if only.height_m <= threshold {
                vec![TideWindow::new(only.timestamp, only.timestamp)]
            } else {
                Vec::new()
            };
        }
        _ => {}
    }

    let sorted = sorted_by_time(points);
    let mut windows = Vec::new();

    // Start of the window currently being tracked, if any
    let mut active_start = if sorted[0].height_m <= threshold {
        Some(sorted[0].timestamp)
    } else {
        None
    };

    for pair in sorted.windows(2) {
        let (left, right) = (&pair[0], &pair[1]);
        if left.height_m == right.height_m {
            continue;
        }

        let left_below = left.height_m <= threshold;
        let right_below = right.height_m <= threshold;

        if left_below && !right_below {
            let crossing = crossing_time(left, right, threshold);
            if let Some(start) = active_start.take() {
                windows.push(TideWindow::new(start, crossing));
            }
        } else if !left_below && right_below && active_start.is_none() {
            active_start = Some(crossing_time(left, right, threshold));
        }
    }

    if let Some(start) = active_start {
        windows.push(TideWindow::new(start, sorted[sorted.len() - 1].timestamp));
    }

    windows.retain(|w| w.end > w.start);
    windows
}

/// Shrink every window by `buffer_minutes` at both ends.
///
/// A zero buffer returns the input untouched. Windows consumed entirely by the
/// margin are dropped.
pub fn apply_window_buffer(windows: Vec<TideWindow>, buffer_minutes: u32) -> Vec<TideWindow> {
    if buffer_minutes == 0 {
        return windows;
    }

    let buffer_secs = i64::from(buffer_minutes) * 60;
    windows
        .into_iter()
        .map(|w| TideWindow::new(w.start + buffer_secs, w.end - buffer_secs))
        .filter(|w| w.end > w.start)
        .collect()
}

/// Earliest-starting window that has not fully elapsed at `now`.
///
/// A window already in progress qualifies. `windows` may be in any order.
pub fn pick_next_window(windows: &[TideWindow], now: i64) -> Option<TideWindow> {
    windows
        .iter()
        .filter(|w| w.end > now)
        .min_by_key(|w| w.start)
        .copied()
}

/// Window containing `now`, if the location is accessible at that instant.
pub fn window_containing(windows: &[TideWindow], now: i64) -> Option<TideWindow> {
    windows.iter().find(|w| w.contains(now)).copied()
}

/// Everything derived from one forecast at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct AccessAssessment {
    pub current_height_m: Option<f64>,
    /// Buffered windows, chronological
    pub windows: Vec<TideWindow>,
    pub accessible_now: bool,
    pub next_window: Option<TideWindow>,
}

/// Run the full pipeline for `now`.
pub fn assess_access(
    points: &[TidePoint],
    threshold: f64,
    buffer_minutes: u32,
    now: i64,
) -> AccessAssessment {
    let raw = compute_raw_access_windows(points, threshold);
    let windows = apply_window_buffer(raw, buffer_minutes);

    AccessAssessment {
        current_height_m: interpolate_height(points, now),
        accessible_now: window_containing(&windows, now).is_some(),
        next_window: pick_next_window(&windows, now),
        windows,
    }
}
