#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! District concentration estimation from a gridded snapshot.
//!
//! Two independent methods run for every district centroid:
//!
//! - [`idw`]: inverse-distance weighting over the nearest grid points
//!   within a fixed great-circle radius.
//! - [`barycentric`]: linear interpolation inside the triangle of the
//!   three nearest grid points.
//!
//! [`reconcile`] merges the two into a single [`DistrictEstimate`] with an
//! uncertainty score. The spatial index is built once per snapshot and
//! shared read-only across districts, which are processed in parallel.

pub mod barycentric;
pub mod idw;
pub mod reconcile;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dustwatch_grid_models::{District, GridSample, GridSnapshot};
use dustwatch_interpolate_models::{DistrictEstimate, InterpolationConfig};
use dustwatch_spatial::GridIndex;
use rayon::prelude::*;

/// Interpolator bound to one grid snapshot.
pub struct Interpolator<'a> {
    timestamp: DateTime<Utc>,
    samples: &'a [GridSample],
    index: GridIndex,
    config: &'a InterpolationConfig,
}

impl<'a> Interpolator<'a> {
    /// Builds the spatial index for `snapshot`.
    #[must_use]
    pub fn new(snapshot: &'a GridSnapshot, config: &'a InterpolationConfig) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            samples: &snapshot.samples,
            index: GridIndex::build(&snapshot.samples),
            config,
        }
    }

    /// Estimates the concentration at an arbitrary point.
    #[must_use]
    pub fn estimate_at(&self, district_id: &str, lat: f64, lon: f64) -> DistrictEstimate {
        let idw = idw::estimate(&self.index, self.samples, lat, lon, self.config);
        let bary = barycentric::estimate(&self.index, self.samples, lat, lon, self.config);

        let merged = reconcile::reconcile(
            idw.as_ref().map(|o| o.value),
            bary.as_ref().map(|o| o.value),
            self.config,
        );

        let mut used: BTreeSet<usize> = BTreeSet::new();
        if let Some(o) = &idw {
            used.extend(o.indices.iter().copied());
        }
        if let Some(o) = &bary {
            used.extend(o.indices);
        }

        let mean_distance_km = idw
            .as_ref()
            .map(|o| o.mean_distance_km)
            .or_else(|| bary.as_ref().map(|o| o.mean_distance_km));

        DistrictEstimate {
            district_id: district_id.to_string(),
            timestamp: self.timestamp,
            concentration: merged.concentration,
            method: merged.method,
            uncertainty: merged.uncertainty,
            points_used: u32::try_from(used.len()).unwrap_or(u32::MAX),
            mean_distance_km,
            idw: idw.map(|o| o.value),
            barycentric: bary.map(|o| o.value),
        }
    }

    /// Estimates the concentration at a district's centroid.
    #[must_use]
    pub fn estimate_district(&self, district: &District) -> DistrictEstimate {
        self.estimate_at(&district.id, district.centroid_lat, district.centroid_lon)
    }

    /// Estimates every district in parallel, preserving input order.
    #[must_use]
    pub fn estimate_districts(&self, districts: &[District]) -> Vec<DistrictEstimate> {
        let estimates: Vec<DistrictEstimate> = districts
            .par_iter()
            .map(|d| self.estimate_district(d))
            .collect();

        let failed = estimates
            .iter()
            .filter(|e| e.concentration.is_none())
            .count();
        if failed > 0 {
            log::warn!(
                "{failed}/{} districts have no estimate at {}",
                estimates.len(),
                self.timestamp
            );
        }
        log::debug!(
            "Estimated {} districts from {} grid samples at {}",
            estimates.len(),
            self.samples.len(),
            self.timestamp
        );

        estimates
    }
}

/// Convenience wrapper: builds an [`Interpolator`] and estimates every
/// district for one snapshot.
#[must_use]
pub fn estimate_snapshot(
    snapshot: &GridSnapshot,
    districts: &[District],
    config: &InterpolationConfig,
) -> Vec<DistrictEstimate> {
    Interpolator::new(snapshot, config).estimate_districts(districts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dustwatch_interpolate_models::EstimateMethod;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap()
    }

    fn district(id: &str, lat: f64, lon: f64) -> District {
        District {
            id: id.to_string(),
            name: id.to_string(),
            parent_region_id: "r".to_string(),
            parent_region_name: "Region".to_string(),
            centroid_lat: lat,
            centroid_lon: lon,
        }
    }

    fn snapshot(points: &[(f64, f64, f64)]) -> GridSnapshot {
        GridSnapshot {
            timestamp: ts(),
            samples: points
                .iter()
                .map(|&(lat, lon, v)| GridSample::new(lat, lon, v, ts(), "test"))
                .collect(),
        }
    }

    #[test]
    fn uniform_field_is_reproduced_by_both_methods() {
        let snap = snapshot(&[
            (33.0, 44.0, 90.0),
            (33.1, 44.0, 90.0),
            (33.0, 44.1, 90.0),
            (33.1, 44.1, 90.0),
        ]);
        let config = InterpolationConfig::default();
        let estimate = Interpolator::new(&snap, &config).estimate_district(&district("d", 33.04, 44.03));

        assert_eq!(estimate.method, EstimateMethod::Both);
        assert!((estimate.concentration.unwrap() - 90.0).abs() < 1e-9);
        assert!(estimate.uncertainty < 1e-9);
        assert_eq!(estimate.points_used, 4);
        assert!(estimate.mean_distance_km.unwrap() < 15.0);
    }

    #[test]
    fn outside_triangle_falls_back_to_idw() {
        let snap = snapshot(&[(33.0, 44.0, 100.0), (33.1, 44.0, 110.0), (33.0, 44.1, 120.0)]);
        let config = InterpolationConfig::default();
        let estimate = Interpolator::new(&snap, &config).estimate_district(&district("d", 32.95, 43.95));

        assert_eq!(estimate.method, EstimateMethod::Idw);
        assert!(estimate.barycentric.is_none());
        assert!((estimate.uncertainty - 0.2).abs() < f64::EPSILON);
        assert_eq!(estimate.points_used, 3);
    }

    #[test]
    fn far_district_fails_without_zero() {
        let snap = snapshot(&[(33.0, 44.0, 100.0), (33.1, 44.0, 110.0)]);
        let config = InterpolationConfig::default();
        let estimate = Interpolator::new(&snap, &config).estimate_district(&district("far", 37.0, 48.0));

        assert_eq!(estimate.method, EstimateMethod::Failed);
        assert_eq!(estimate.concentration, None);
        assert_eq!(estimate.points_used, 0);
        assert_eq!(estimate.mean_distance_km, None);
    }

    #[test]
    fn batch_preserves_order_and_timestamp() {
        let snap = snapshot(&[(33.0, 44.0, 50.0), (33.1, 44.0, 50.0), (33.0, 44.1, 50.0)]);
        let districts = vec![
            district("a", 33.02, 44.02),
            district("b", 40.0, 40.0),
            district("c", 33.05, 44.01),
        ];
        let estimates = estimate_snapshot(&snap, &districts, &InterpolationConfig::default());

        let ids: Vec<&str> = estimates.iter().map(|e| e.district_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(estimates.iter().all(|e| e.timestamp == ts()));
        assert!(estimates[1].concentration.is_none());
    }

    #[test]
    fn empty_snapshot_fails_every_district() {
        let snap = snapshot(&[]);
        let estimates = estimate_snapshot(&snap, &[district("a", 33.0, 44.0)], &InterpolationConfig::default());
        assert_eq!(estimates[0].method, EstimateMethod::Failed);
    }
}
