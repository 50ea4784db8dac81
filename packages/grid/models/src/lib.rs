#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Grid samples, districts and the geographic helpers they share.
//!
//! Every other dustwatch crate speaks in these types: upstream ingestion
//! produces [`GridSample`]s, the boundary loader produces [`District`]s,
//! and the interpolator and cumulative engine consume both. Coordinates
//! are WGS84 decimal degrees and concentrations are µg/m³.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by [`haversine_km`].
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Largest concentration accepted into storage (`INT32_MAX`).
pub const MAX_CONCENTRATION: f64 = 2_147_483_647.0;

/// Concentrations above this are logged as suspicious during validation.
pub const SUSPICIOUS_CONCENTRATION: f64 = 1_000_000.0;

/// A single dust concentration sample at one grid point and timestamp.
///
/// Uniquely identified by `(timestamp, latitude, longitude, source_id)`;
/// see [`GridSample::identity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSample {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Concentration in µg/m³, integral after [`validate_concentration`].
    pub concentration: f64,
    /// Valid time of the sample.
    pub timestamp: DateTime<Utc>,
    /// Identity of the upstream file the sample was decoded from.
    pub source_id: String,
    /// Hours since forecast initialization, when known.
    #[serde(default)]
    pub forecast_hour: Option<u32>,
    /// Forecast initialization date, when known.
    #[serde(default)]
    pub forecast_init: Option<NaiveDate>,
}

impl GridSample {
    /// Creates a sample without forecast provenance.
    #[must_use]
    pub fn new(
        latitude: f64,
        longitude: f64,
        concentration: f64,
        timestamp: DateTime<Utc>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            concentration,
            timestamp,
            source_id: source_id.into(),
            forecast_hour: None,
            forecast_init: None,
        }
    }

    /// De-duplication key for this sample.
    #[must_use]
    pub fn identity(&self) -> SampleIdentity {
        SampleIdentity {
            timestamp: self.timestamp,
            point: PointKey::from_coords(self.latitude, self.longitude),
            source_id: self.source_id.clone(),
        }
    }

    /// Grid point key (3-decimal rounding) for this sample's location.
    #[must_use]
    pub fn point_key(&self) -> PointKey {
        PointKey::from_coords(self.latitude, self.longitude)
    }
}

/// Totally-ordered identity of a [`GridSample`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleIdentity {
    /// Valid time.
    pub timestamp: DateTime<Utc>,
    /// Location rounded to the grid key resolution.
    pub point: PointKey,
    /// Upstream file identity.
    pub source_id: String,
}

/// A grid location rounded to thousandths of a degree.
///
/// Stored as integers so it can key ordered maps; formats as
/// `"{lat:.3}_{lon:.3}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointKey {
    /// Latitude × 1000, rounded.
    pub lat_milli: i32,
    /// Longitude × 1000, rounded.
    pub lon_milli: i32,
}

impl PointKey {
    /// Rounds a coordinate pair to the key resolution.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_coords(latitude: f64, longitude: f64) -> Self {
        Self {
            lat_milli: (latitude * 1000.0).round() as i32,
            lon_milli: (longitude * 1000.0).round() as i32,
        }
    }

    /// Latitude in decimal degrees.
    #[must_use]
    pub fn latitude(self) -> f64 {
        f64::from(self.lat_milli) / 1000.0
    }

    /// Longitude in decimal degrees.
    #[must_use]
    pub fn longitude(self) -> f64 {
        f64::from(self.lon_milli) / 1000.0
    }
}

impl std::fmt::Display for PointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}_{:.3}", self.latitude(), self.longitude())
    }
}

/// An administrative district with its representative centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    /// Stable district identifier.
    pub id: String,
    /// District name.
    pub name: String,
    /// Identifier of the enclosing province/governorate.
    pub parent_region_id: String,
    /// Name of the enclosing province/governorate.
    pub parent_region_name: String,
    /// Centroid latitude.
    pub centroid_lat: f64,
    /// Centroid longitude.
    pub centroid_lon: f64,
}

/// All samples sharing one valid time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Valid time shared by every sample.
    pub timestamp: DateTime<Utc>,
    /// The samples.
    pub samples: Vec<GridSample>,
}

/// An axis-aligned latitude/longitude bounding box (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lon: f64,
    /// Eastern edge.
    pub max_lon: f64,
}

impl GeoBounds {
    /// Returns `true` if the point lies inside or on the box.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&latitude)
            && (self.min_lon..=self.max_lon).contains(&longitude)
    }

    /// Smallest box covering every point, or `None` for an empty input.
    #[must_use]
    pub fn enclosing(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        points.into_iter().fold(None, |acc, (lat, lon)| {
            Some(acc.map_or(
                Self {
                    min_lat: lat,
                    max_lat: lat,
                    min_lon: lon,
                    max_lon: lon,
                },
                |b: Self| Self {
                    min_lat: b.min_lat.min(lat),
                    max_lat: b.max_lat.max(lat),
                    min_lon: b.min_lon.min(lon),
                    max_lon: b.max_lon.max(lon),
                },
            ))
        })
    }
}

/// Great-circle distance in kilometres between two WGS84 points.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Normalizes a raw concentration for storage.
///
/// Non-finite values are rejected (`None`). Everything else is rounded to
/// an integer with ties going to even, then clipped to
/// `[0, MAX_CONCENTRATION]`.
#[must_use]
pub fn validate_concentration(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round_ties_even().clamp(0.0, MAX_CONCENTRATION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_one_degree_latitude() {
        let d = haversine_km(33.0, 44.0, 34.0, 44.0);
        assert!((d - 111.19).abs() < 0.01, "got {d}");
    }

    #[test]
    fn haversine_zero_distance() {
        assert!(haversine_km(33.3, 44.4, 33.3, 44.4).abs() < 1e-12);
    }

    #[test]
    fn validate_rounds_and_clips() {
        assert_eq!(validate_concentration(12.4), Some(12.0));
        assert_eq!(validate_concentration(12.5), Some(12.0));
        assert_eq!(validate_concentration(13.5), Some(14.0));
        assert_eq!(validate_concentration(-3.0), Some(0.0));
        assert_eq!(validate_concentration(1e12), Some(MAX_CONCENTRATION));
        assert_eq!(validate_concentration(f64::NAN), None);
        assert_eq!(validate_concentration(f64::INFINITY), None);
    }

    #[test]
    fn point_key_formats_three_decimals() {
        let key = PointKey::from_coords(33.12549, 44.0);
        assert_eq!(key.to_string(), "33.125_44.000");
        assert_eq!(key, PointKey::from_coords(33.1251, 43.9999));
    }

    #[test]
    fn enclosing_bounds() {
        let b = GeoBounds::enclosing([(30.0, 45.0), (32.0, 41.0), (31.0, 47.5)]).unwrap();
        assert_eq!(b.min_lat, 30.0);
        assert_eq!(b.max_lat, 32.0);
        assert_eq!(b.min_lon, 41.0);
        assert_eq!(b.max_lon, 47.5);
        assert!(b.contains(31.0, 45.0));
        assert!(!b.contains(29.9, 45.0));
        assert!(GeoBounds::enclosing(std::iter::empty()).is_none());
    }
}
