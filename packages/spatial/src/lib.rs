#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index for grid neighbor queries.
//!
//! Builds an R-tree over the sample positions of one grid snapshot and
//! answers k-nearest-neighbor queries in the (longitude, latitude) plane.
//! Used by both interpolation methods. Distances returned here are planar
//! degrees; callers convert to great-circle kilometres themselves.

use dustwatch_grid_models::{District, GridSample, haversine_km};
use rstar::{AABB, PointDistance, RTree, RTreeObject};

/// A grid sample position stored in the R-tree with its snapshot index.
struct GridEntry {
    index: usize,
    position: [f64; 2],
}

impl GridEntry {
    fn planar_distance(&self, lon: f64, lat: f64) -> f64 {
        (self.position[0] - lon).hypot(self.position[1] - lat)
    }
}

impl RTreeObject for GridEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for GridEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx * dx + dy * dy
    }
}

/// One result of a nearest-neighbor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the sample in the slice the index was built from.
    pub index: usize,
    /// Planar distance in degrees in the (lon, lat) plane.
    pub planar_distance: f64,
}

/// Pre-built spatial index over one snapshot's sample positions.
///
/// Constructed once per snapshot and shared read-only across all district
/// computations.
pub struct GridIndex {
    tree: RTree<GridEntry>,
}

impl GridIndex {
    /// Builds the index from a snapshot's samples.
    ///
    /// Samples with non-finite coordinates are left out of the index.
    #[must_use]
    pub fn build(samples: &[GridSample]) -> Self {
        let entries: Vec<GridEntry> = samples
            .iter()
            .enumerate()
            .filter_map(|(index, sample)| {
                let (lon, lat) = (sample.longitude, sample.latitude);
                if lon.is_finite() && lat.is_finite() {
                    Some(GridEntry {
                        index,
                        position: [lon, lat],
                    })
                } else {
                    log::warn!("Skipping grid sample {index} with non-finite coordinates");
                    None
                }
            })
            .collect();

        let tree = RTree::bulk_load(entries);
        log::debug!("Built grid index over {} sample positions", tree.size());

        Self { tree }
    }

    /// Number of indexed positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Returns `true` if nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Returns up to `k` indexed samples nearest to `(lat, lon)`, closest
    /// first.
    ///
    /// Samples at the same distance are ordered by index, including ties
    /// at the k-th place.
    #[must_use]
    pub fn nearest(&self, lat: f64, lon: f64, k: usize) -> Vec<Neighbor> {
        if k == 0 || !lat.is_finite() || !lon.is_finite() {
            return Vec::new();
        }

        let mut found: Vec<Neighbor> = Vec::with_capacity(k);
        for entry in self.tree.nearest_neighbor_iter(&[lon, lat]) {
            let planar_distance = entry.planar_distance(lon, lat);
            if found.len() >= k && found.last().is_some_and(|n| planar_distance > n.planar_distance) {
                break;
            }
            found.push(Neighbor {
                index: entry.index,
                planar_distance,
            });
        }

        found.sort_by(|a, b| {
            a.planar_distance
                .total_cmp(&b.planar_distance)
                .then(a.index.cmp(&b.index))
        });
        found.truncate(k);
        found
    }
}

/// Finds the district whose centroid is closest to `(lat, lon)` by
/// great-circle distance.
///
/// Returns the district and its distance in kilometres. Districts with
/// non-finite centroids are ignored.
#[must_use]
pub fn nearest_district(districts: &[District], lat: f64, lon: f64) -> Option<(&District, f64)> {
    districts
        .iter()
        .filter(|d| d.centroid_lat.is_finite() && d.centroid_lon.is_finite())
        .map(|d| (d, haversine_km(lat, lon, d.centroid_lat, d.centroid_lon)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}
