//! Named map surfaces derived from the cumulative state.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use dustwatch_cumulative_models::{
    CumulativeConfig, CumulativeState, MapCatalogEntry, MapCell, MapKind, MapMetadata,
    MapSurface, PeriodBucket,
};
use dustwatch_grid_models::{GeoBounds, PointKey};

use crate::{CumulativeError, fold::exceedance_percent};

const CONCENTRATION_UNIT: &str = "µg/m³";
const PERCENT_UNIT: &str = "%";
const MULTI_YEAR: &str = "multi";

/// Naming for the surface built from an accumulator bucket.
#[must_use]
pub fn bucket_surface(bucket: PeriodBucket) -> (String, MapKind, String) {
    match bucket {
        PeriodBucket::LongTerm => ("long_term_mean".to_string(), MapKind::Mean, MULTI_YEAR.to_string()),
        PeriodBucket::Season(s) => (format!("seasonal_{s}"), MapKind::Seasonal, MULTI_YEAR.to_string()),
        PeriodBucket::Month(m) => (format!("monthly_{m:02}"), MapKind::Monthly, MULTI_YEAR.to_string()),
        PeriodBucket::Year(y) => (format!("annual_{y}"), MapKind::Annual, y.to_string()),
        PeriodBucket::YearSeason(y, s) => (format!("seasonal_{s}_{y}"), MapKind::Seasonal, y.to_string()),
        PeriodBucket::YearMonth(y, m) => (format!("monthly_{m:02}_{y}"), MapKind::Monthly, y.to_string()),
    }
}

struct SurfaceLabel<'a> {
    name: String,
    kind: MapKind,
    unit: &'a str,
    period: String,
}

fn build_surface(
    label: SurfaceLabel<'_>,
    values: impl IntoIterator<Item = (PointKey, f64)>,
    bounds: GeoBounds,
    generated: DateTime<Utc>,
) -> Option<MapSurface> {
    let data: Vec<MapCell> = values
        .into_iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(key, val)| MapCell {
            lat: key.latitude(),
            lon: key.longitude(),
            val,
        })
        .collect();
    if data.is_empty() {
        return None;
    }

    let (min, max) = data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c.val), hi.max(c.val)));

    Some(MapSurface {
        name: label.name,
        kind: label.kind,
        unit: label.unit.to_string(),
        period: label.period,
        generated,
        bounds,
        min,
        max,
        data,
    })
}

/// Per-point exceedance percentages over the given year range.
fn exceedance_values(
    state: &CumulativeState,
    year: Option<i32>,
    threshold: f64,
) -> BTreeMap<PointKey, f64> {
    let mut days_by_point: BTreeMap<PointKey, Vec<f64>> = BTreeMap::new();
    for (y, points) in &state.daily_max {
        if year.is_some_and(|wanted| wanted != *y) {
            continue;
        }
        for (key, days) in points {
            days_by_point.entry(*key).or_default().extend(days.values());
        }
    }

    days_by_point
        .into_iter()
        .filter_map(|(key, maxima)| exceedance_percent(&maxima, threshold).map(|pct| (key, pct)))
        .collect()
}

/// Builds every available surface.
///
/// Mean surfaces come straight from the accumulators; exceedance surfaces
/// come from the daily-maximum map, once across all years and once per
/// year. Buckets with no data produce no surface.
#[must_use]
pub fn build_surfaces(
    state: &CumulativeState,
    config: &CumulativeConfig,
    generated: DateTime<Utc>,
) -> Vec<MapSurface> {
    let bounds = config.region;
    let mut surfaces: Vec<MapSurface> = state
        .accumulators
        .iter()
        .filter_map(|(bucket, points)| {
            let (name, kind, period) = bucket_surface(*bucket);
            build_surface(
                SurfaceLabel {
                    name,
                    kind,
                    unit: CONCENTRATION_UNIT,
                    period,
                },
                points.iter().filter_map(|(k, acc)| acc.mean().map(|m| (*k, m))),
                bounds,
                generated,
            )
        })
        .collect();

    let thresholds = [("who", config.who_threshold), ("extreme", config.extreme_threshold)];
    let years = std::iter::once(None).chain(state.daily_max.keys().map(|y| Some(*y)));
    for year in years {
        for (label, threshold) in thresholds {
            let (name, period) = year.map_or_else(
                || (format!("exceedance_{label}"), MULTI_YEAR.to_string()),
                |y| (format!("exceedance_{label}_{y}"), y.to_string()),
            );
            surfaces.extend(build_surface(
                SurfaceLabel {
                    name,
                    kind: MapKind::Exceedance,
                    unit: PERCENT_UNIT,
                    period,
                },
                exceedance_values(state, year, threshold),
                bounds,
                generated,
            ));
        }
    }

    surfaces
}

/// Catalog describing `surfaces`.
#[must_use]
pub fn build_metadata(
    state: &CumulativeState,
    surfaces: &[MapSurface],
    config: &CumulativeConfig,
    generated: DateTime<Utc>,
) -> MapMetadata {
    MapMetadata {
        generated,
        bounds: config.region,
        processed_years: state.processed_years(),
        total_measurements: state.total_measurements(),
        maps: surfaces
            .iter()
            .map(|s| {
                (
                    s.name.clone(),
                    MapCatalogEntry {
                        kind: s.kind,
                        unit: s.unit.clone(),
                        period: s.period.clone(),
                        points: s.data.len(),
                    },
                )
            })
            .collect(),
    }
}

/// Writes `{name}_compact.json` for each surface and `metadata.json`.
///
/// Returns the number of surfaces written.
///
/// # Errors
///
/// Returns [`CumulativeError::Store`] if any file cannot be written.
pub fn write_maps(
    dir: &Path,
    surfaces: &[MapSurface],
    metadata: &MapMetadata,
) -> Result<usize, CumulativeError> {
    for surface in surfaces {
        let path = dir.join(format!("{}_compact.json", surface.name));
        dustwatch_store::save_json(&path, surface, false)?;
        log::debug!(
            "{}: {} grid points (min={:.1}, max={:.1})",
            surface.name,
            surface.data.len(),
            surface.min,
            surface.max
        );
    }
    dustwatch_store::save_json(&dir.join("metadata.json"), metadata, true)?;
    log::info!("Wrote {} map surfaces to {}", surfaces.len(), dir.display());
    Ok(surfaces.len())
}
