#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Alert payload consumed by notification and mapping services.
//!
//! One [`DistrictAlert`] per district, wrapped in an [`AlertReport`] with
//! run metadata. Serialized as JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dustwatch_classify::{AqiCategory, Compliance};
use dustwatch_temporal_models::{DataSource, ForecastEntry, WindowMean};
use serde::{Deserialize, Serialize};

/// Concentration summary for one district.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pm10Summary {
    /// Current concentration in µg/m³.
    pub now: f64,
    /// Timestamp of the row `now` came from.
    pub now_time: DateTime<Utc>,
    pub now_source: DataSource,
    pub windows: Vec<WindowMean>,
}

/// AQI of the current concentration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AqiSummary {
    pub value: u32,
    pub category: AqiCategory,
}

/// Compliance of the 24-hour mean against the regulatory limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub status: Compliance,
    pub limit_24h_ug_m3: f64,
    pub mean_24h: Option<f64>,
}

/// The alert level and what it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertLevel {
    pub level: AqiCategory,
    /// `24h_mean`, `12h_mean`, `6h_mean`, or `current`.
    pub based_on: String,
    /// Concentration the level was computed from.
    pub value: f64,
    pub aqi: u32,
    pub dust_storm: bool,
}

/// Everything reported for one district.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictAlert {
    pub district_id: String,
    pub district_name: String,
    pub province_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub pm10: Pm10Summary,
    pub aqi: AqiSummary,
    pub compliance: ComplianceSummary,
    pub alert: AlertLevel,
    pub forecasts: Vec<ForecastEntry>,
}

/// A district left out of the report and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDistrict {
    pub district_id: String,
    pub reason: String,
}

/// Run metadata written at the top of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    /// Normalized reference time.
    pub reference_time: DateTime<Utc>,
    pub rolling_windows_hours: Vec<u32>,
    pub forecast_windows_hours: Vec<u32>,
    pub data_resolution_hours: u32,
    pub compliance_limit_ug_m3: f64,
    pub aqi_calculation: String,
}

/// The full alert report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertReport {
    pub metadata: ReportMetadata,
    pub districts: Vec<DistrictAlert>,
    #[serde(default)]
    pub skipped: Vec<SkippedDistrict>,
}

impl AlertReport {
    /// Number of districts at each alert level.
    #[must_use]
    pub fn level_counts(&self) -> BTreeMap<AqiCategory, usize> {
        let mut counts = BTreeMap::new();
        for d in &self.districts {
            *counts.entry(d.alert.level).or_insert(0) += 1;
        }
        counts
    }

    /// Number of districts with each compliance verdict.
    #[must_use]
    pub fn compliance_counts(&self) -> BTreeMap<Compliance, usize> {
        let mut counts = BTreeMap::new();
        for d in &self.districts {
            *counts.entry(d.compliance.status).or_insert(0) += 1;
        }
        counts
    }

    /// Districts currently flagged as dust storms.
    pub fn dust_storms(&self) -> impl Iterator<Item = &DistrictAlert> {
        self.districts.iter().filter(|d| d.alert.dust_storm)
    }
}
