#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Types produced by the rolling and forecast resolver.
//!
//! A [`RollingRecord`] is derived on demand from a district's canonical
//! estimate series and is never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How a value was located in the canonical series.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataSource {
    /// A row exists at the exact canonical timestamp.
    Exact,
    /// The closest row within the tolerance was used.
    Nearest,
    /// The most recent row before the reference was used.
    Past,
    /// Nothing suitable was found.
    None,
}

/// Tunables for the temporal normalizer and resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Canonical cadence in hours. Must divide 24.
    pub cadence_hours: u32,
    /// Maximum distance, in minutes, for a "nearest" lookup.
    pub tolerance_minutes: u32,
    /// Rolling window lengths in hours.
    pub windows_hours: Vec<u32>,
    /// Forecast horizons in hours.
    pub forecast_horizons_hours: Vec<u32>,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            cadence_hours: 3,
            tolerance_minutes: 90,
            windows_hours: vec![6, 12, 24],
            forecast_horizons_hours: (3..=24).step_by(3).collect(),
        }
    }
}

/// The concentration at the reference time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentValue {
    /// Concentration in µg/m³.
    pub value: f64,
    /// Timestamp of the row that supplied `value`.
    pub timestamp: DateTime<Utc>,
    /// How the row was found. Never [`DataSource::None`].
    pub source: DataSource,
}

/// Mean over one trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowMean {
    pub window_hours: u32,
    /// `None` when the window holds no rows.
    pub mean: Option<f64>,
    pub point_count: usize,
    /// Earliest timestamp in the window, when any.
    pub window_start: Option<DateTime<Utc>>,
}

/// Forecast lookup for one horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub horizon_hours: u32,
    /// Canonical target time (`reference + horizon`, normalized).
    pub target_time: DateTime<Utc>,
    pub value: Option<f64>,
    /// Timestamp of the row that supplied `value`.
    pub resolved_time: Option<DateTime<Utc>>,
    pub source: DataSource,
}

/// The value an alert level is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertBasis {
    pub value: f64,
    /// Window the value was averaged over, or `None` for the current value.
    pub window_hours: Option<u32>,
}

impl AlertBasis {
    /// Human-readable label such as `24h_mean` or `current`.
    #[must_use]
    pub fn label(&self) -> String {
        self.window_hours
            .map_or_else(|| "current".to_string(), |h| format!("{h}h_mean"))
    }
}

/// Everything the resolver derives for one district at one reference time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingRecord {
    pub district_id: String,
    /// Normalized reference time.
    pub reference_time: DateTime<Utc>,
    pub current: CurrentValue,
    pub windows: Vec<WindowMean>,
    pub forecasts: Vec<ForecastEntry>,
    pub basis: AlertBasis,
}

impl RollingRecord {
    /// Looks up the window of the given length.
    #[must_use]
    pub fn window(&self, hours: u32) -> Option<&WindowMean> {
        self.windows.iter().find(|w| w.window_hours == hours)
    }
}

/// Calendar granularity for history aggregation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HistoryGranularity {
    /// Label `YYYY-MM-DD`.
    Daily,
    /// ISO week, label `YYYY-Www`.
    Weekly,
    /// Label `YYYY-MM`.
    Monthly,
}

/// Median concentration of one calendar period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub period: String,
    pub median: f64,
    pub count: usize,
}
