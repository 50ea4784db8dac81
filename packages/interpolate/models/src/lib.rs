#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! District estimate and interpolation configuration types.
//!
//! A [`DistrictEstimate`] is one row of the per-district exposure history:
//! the reconciled concentration at a district centroid for one canonical
//! timestamp, tagged with the [`EstimateMethod`] that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which interpolation method(s) produced an estimate.
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
pub enum EstimateMethod {
    /// Only constrained IDW produced a value.
    Idw,
    /// Only barycentric interpolation produced a value.
    Barycentric,
    /// Both methods produced a value; the result is their mean.
    Both,
    /// Neither method produced a value; the concentration is absent.
    Failed,
}

/// The reconciled concentration estimate for one district and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictEstimate {
    /// District identifier.
    pub district_id: String,
    /// Canonical timestamp of the snapshot the estimate came from.
    pub timestamp: DateTime<Utc>,
    /// Reconciled concentration (µg/m³). `None` means "could not compute",
    /// never zero.
    pub concentration: Option<f64>,
    /// Provenance of `concentration`.
    pub method: EstimateMethod,
    /// Disagreement/penalty score in `[0, 1]`.
    pub uncertainty: f64,
    /// Number of distinct grid points that contributed.
    pub points_used: u32,
    /// Mean great-circle distance to the contributing points.
    pub mean_distance_km: Option<f64>,
    /// Raw IDW output, kept for cross-validation.
    pub idw: Option<f64>,
    /// Raw barycentric output, kept for cross-validation.
    pub barycentric: Option<f64>,
}

/// Tunables for the grid interpolator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Number of nearest grid points considered by IDW.
    pub k_nearest: usize,
    /// Neighbors farther than this (great-circle km) are discarded.
    pub max_distance_km: f64,
    /// IDW distance exponent.
    pub power: f64,
    /// Zero distances are clamped to this many km.
    pub epsilon_km: f64,
    /// Triangles with `|denominator|` below this are degenerate.
    pub degenerate_tolerance: f64,
    /// Uncertainty reported when only IDW succeeded.
    pub idw_only_uncertainty: f64,
    /// Uncertainty reported when only barycentric succeeded.
    pub barycentric_only_uncertainty: f64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            k_nearest: 4,
            max_distance_km: 55.0,
            power: 2.0,
            epsilon_km: 0.001,
            degenerate_tolerance: 1e-10,
            idw_only_uncertainty: 0.2,
            barycentric_only_uncertainty: 0.3,
        }
    }
}
