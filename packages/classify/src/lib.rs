#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! PM10 air-quality classification.
//!
//! Maps a concentration (µg/m³) onto the US EPA PM10 AQI scale, the six
//! EPA health categories, a regulatory compliance verdict for the 24-hour
//! mean, and a dust-storm flag used by notification consumers.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// AQI reported for concentrations beyond the top breakpoint or for
/// non-finite input.
pub const AQI_BEYOND_INDEX: u32 = 501;

/// Rolling window (hours) whose mean is checked by
/// [`ClassifierConfig::compliance`].
pub const COMPLIANCE_WINDOW_HOURS: u32 = 24;

/// EPA PM10 breakpoints: `(c_lo, c_hi, i_lo, i_hi)`.
const PM10_BREAKPOINTS: [(f64, f64, f64, f64); 7] = [
    (0.0, 54.0, 0.0, 50.0),
    (55.0, 154.0, 51.0, 100.0),
    (155.0, 254.0, 101.0, 150.0),
    (255.0, 354.0, 151.0, 200.0),
    (355.0, 424.0, 201.0, 300.0),
    (425.0, 504.0, 301.0, 400.0),
    (505.0, 604.0, 401.0, 500.0),
];

/// EPA health category, also used as the alert level.
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
pub enum AqiCategory {
    /// AQI 0-50.
    Good,
    /// AQI 51-100.
    Moderate,
    /// AQI 101-150.
    UnhealthyForSensitiveGroups,
    /// AQI 151-200.
    Unhealthy,
    /// AQI 201-300.
    VeryUnhealthy,
    /// AQI above 300, including the beyond-index sentinel.
    Hazardous,
}

/// Verdict on a 24-hour mean against the regulatory limit.
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
pub enum Compliance {
    NoData,
    WithinLimit,
    ExceedsLimit,
}

/// Classification thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// 24-hour mean limit in µg/m³.
    pub compliance_limit: f64,
    /// Concentration at or above which a dust storm is flagged.
    pub dust_storm_concentration: f64,
    /// AQI at or above which a dust storm is flagged.
    pub dust_storm_aqi: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            compliance_limit: 100.0,
            dust_storm_concentration: 300.0,
            dust_storm_aqi: 200,
        }
    }
}

/// Converts a concentration to an AQI value.
///
/// The concentration is rounded to an integer (ties to even) before the
/// breakpoint lookup. Negative input counts as zero. Anything above the
/// last breakpoint, and any non-finite input, yields [`AQI_BEYOND_INDEX`].
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn aqi(concentration: f64) -> u32 {
    if !concentration.is_finite() {
        log::warn!("Non-finite concentration {concentration}, reporting beyond-index AQI");
        return AQI_BEYOND_INDEX;
    }

    let c = concentration.max(0.0).round_ties_even();
    PM10_BREAKPOINTS
        .iter()
        .find(|(c_lo, c_hi, _, _)| (*c_lo..=*c_hi).contains(&c))
        .map_or(AQI_BEYOND_INDEX, |&(c_lo, c_hi, i_lo, i_hi)| {
            ((i_hi - i_lo) / (c_hi - c_lo))
                .mul_add(c - c_lo, i_lo)
                .round_ties_even() as u32
        })
}

/// Category for an AQI value.
#[must_use]
pub const fn category(aqi: u32) -> AqiCategory {
    match aqi {
        0..=50 => AqiCategory::Good,
        51..=100 => AqiCategory::Moderate,
        101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
        151..=200 => AqiCategory::Unhealthy,
        201..=300 => AqiCategory::VeryUnhealthy,
        _ => AqiCategory::Hazardous,
    }
}

impl ClassifierConfig {
    /// Compares a 24-hour mean against the configured limit.
    #[must_use]
    pub fn compliance(&self, mean_24h: Option<f64>) -> Compliance {
        match mean_24h {
            None => Compliance::NoData,
            Some(mean) if mean > self.compliance_limit => Compliance::ExceedsLimit,
            Some(_) => Compliance::WithinLimit,
        }
    }

    /// Returns `true` when either threshold for a dust storm is reached.
    #[must_use]
    pub fn is_dust_storm(&self, concentration: f64, aqi: u32) -> bool {
        concentration >= self.dust_storm_concentration || aqi >= self.dust_storm_aqi
    }

    /// Whether a subscriber last told `previous` should be notified now.
    ///
    /// Notifies during a dust storm and whenever the category changes. A
    /// missing `previous` counts as a change.
    #[must_use]
    pub fn should_notify(
        &self,
        previous: Option<AqiCategory>,
        current: AqiCategory,
        concentration: f64,
        aqi: u32,
    ) -> bool {
        self.is_dust_storm(concentration, aqi) || previous != Some(current)
    }
}
