//! Triangulated barycentric interpolation.
//!
//! Uses the triangle formed by the three nearest grid points. Targets
//! outside that triangle, or triangles with near-zero area, produce no
//! estimate; the caller falls back to IDW.

use dustwatch_grid_models::{GridSample, haversine_km};
use dustwatch_interpolate_models::InterpolationConfig;
use dustwatch_spatial::GridIndex;

/// Result of a successful barycentric estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct BarycentricOutcome {
    /// Interpolated concentration.
    pub value: f64,
    /// Snapshot indices of the triangle vertices.
    pub indices: [usize; 3],
    /// Barycentric coordinates `(u, v, w)` of the target.
    pub coordinates: [f64; 3],
    /// Mean great-circle distance from the target to the vertices.
    pub mean_distance_km: f64,
}

/// Barycentric coordinates of `p` relative to triangle `(a, b, c)`.
///
/// Points are `(x, y)` pairs. Returns `None` when the triangle is
/// degenerate, i.e. `|d00·d11 − d01²|` is below `degenerate_tolerance`.
#[must_use]
pub fn coordinates(
    a: (f64, f64),
    b: (f64, f64),
    c: (f64, f64),
    p: (f64, f64),
    degenerate_tolerance: f64,
) -> Option<[f64; 3]> {
    let v0 = (b.0 - a.0, b.1 - a.1);
    let v1 = (c.0 - a.0, c.1 - a.1);
    let v2 = (p.0 - a.0, p.1 - a.1);

    let dot = |l: (f64, f64), r: (f64, f64)| l.0.mul_add(r.0, l.1 * r.1);
    let d00 = dot(v0, v0);
    let d01 = dot(v0, v1);
    let d11 = dot(v1, v1);
    let d20 = dot(v2, v0);
    let d21 = dot(v2, v1);

    let denom = d00.mul_add(d11, -(d01 * d01));
    if denom.abs() < degenerate_tolerance {
        return None;
    }

    let v = d11.mul_add(d20, -(d01 * d21)) / denom;
    let w = d00.mul_add(d21, -(d01 * d20)) / denom;
    let u = 1.0 - v - w;
    Some([u, v, w])
}

/// Returns `true` if every coordinate lies in `[0, 1]`.
#[must_use]
pub fn is_inside(coordinates: [f64; 3]) -> bool {
    coordinates.iter().all(|c| (0.0..=1.0).contains(c))
}

/// Estimates the concentration at `(lat, lon)` from the triangle of the
/// three nearest grid points.
#[must_use]
pub fn estimate(
    index: &GridIndex,
    samples: &[GridSample],
    lat: f64,
    lon: f64,
    config: &InterpolationConfig,
) -> Option<BarycentricOutcome> {
    let nearest = index.nearest(lat, lon, 3);
    let [a, b, c] = nearest.as_slice() else {
        return None;
    };
    let indices = [a.index, b.index, c.index];
    let [sa, sb, sc] = indices.map(|i| &samples[i]);

    let coords = coordinates(
        (sa.longitude, sa.latitude),
        (sb.longitude, sb.latitude),
        (sc.longitude, sc.latitude),
        (lon, lat),
        config.degenerate_tolerance,
    )?;
    if !is_inside(coords) {
        return None;
    }

    let value = coords[0].mul_add(
        sa.concentration,
        coords[1].mul_add(sb.concentration, coords[2] * sc.concentration),
    );
    let mean_distance_km = [sa, sb, sc]
        .iter()
        .map(|s| haversine_km(lat, lon, s.latitude, s.longitude))
        .sum::<f64>()
        / 3.0;

    Some(BarycentricOutcome {
        value,
        indices,
        coordinates: coords,
        mean_distance_km,
    })
}
