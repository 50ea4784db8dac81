//! Constrained inverse-distance weighting.
//!
//! The `k` nearest grid points are taken from the [`GridIndex`], their
//! planar distances are replaced by great-circle distances, and points
//! beyond the configured radius are dropped before weighting.

use dustwatch_grid_models::{GridSample, haversine_km};
use dustwatch_interpolate_models::InterpolationConfig;
use dustwatch_spatial::GridIndex;

/// Result of a successful IDW estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct IdwOutcome {
    /// Weighted concentration.
    pub value: f64,
    /// Indices (into the snapshot) of the neighbors that were used.
    pub indices: Vec<usize>,
    /// Mean great-circle distance to those neighbors, before clamping.
    pub mean_distance_km: f64,
}

/// Normalized IDW weights for a set of distances.
///
/// Distances are clamped to at least `epsilon_km` so that a grid point
/// coinciding with the target does not divide by zero. Returns an empty
/// vector for empty input; otherwise the weights sum to one.
#[must_use]
pub fn idw_weights(distances_km: &[f64], power: f64, epsilon_km: f64) -> Vec<f64> {
    let raw: Vec<f64> = distances_km
        .iter()
        .map(|&d| 1.0 / d.max(epsilon_km).powf(power))
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Estimates the concentration at `(lat, lon)` by constrained IDW.
///
/// Returns `None` when no neighbor lies within `max_distance_km`.
#[must_use]
pub fn estimate(
    index: &GridIndex,
    samples: &[GridSample],
    lat: f64,
    lon: f64,
    config: &InterpolationConfig,
) -> Option<IdwOutcome> {
    let (indices, distances): (Vec<usize>, Vec<f64>) = index
        .nearest(lat, lon, config.k_nearest)
        .into_iter()
        .map(|n| {
            let s = &samples[n.index];
            (n.index, haversine_km(lat, lon, s.latitude, s.longitude))
        })
        .filter(|&(_, km)| km <= config.max_distance_km)
        .unzip();

    if indices.is_empty() {
        return None;
    }

    let weights = idw_weights(&distances, config.power, config.epsilon_km);
    let value = indices
        .iter()
        .zip(&weights)
        .map(|(&i, w)| samples[i].concentration * w)
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let mean_distance_km = distances.iter().sum::<f64>() / distances.len() as f64;

    Some(IdwOutcome {
        value,
        indices,
        mean_distance_km,
    })
}
