//! Resolving a district series at a reference time.

use chrono::{DateTime, TimeDelta, Utc};
use dustwatch_temporal_models::{
    AlertBasis, CurrentValue, DataSource, ForecastEntry, RollingRecord, TemporalConfig, WindowMean,
};

use crate::{TemporalError, cadence::Cadence, series::CanonicalSeries};

/// Resolver parameters, validated from a [`TemporalConfig`].
#[derive(Debug, Clone)]
pub struct Resolver {
    cadence: Cadence,
    tolerance: TimeDelta,
    windows_hours: Vec<u32>,
    forecast_horizons_hours: Vec<u32>,
}

impl Resolver {
    /// # Errors
    ///
    /// Returns [`TemporalError::InvalidCadence`] if the configured cadence
    /// does not divide the day.
    pub fn new(config: &TemporalConfig) -> Result<Self, TemporalError> {
        Ok(Self {
            cadence: Cadence::from_hours(config.cadence_hours)?,
            tolerance: TimeDelta::minutes(i64::from(config.tolerance_minutes)),
            windows_hours: config.windows_hours.clone(),
            forecast_horizons_hours: config.forecast_horizons_hours.clone(),
        })
    }

    #[must_use]
    pub const fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Finds the value at `reference` (already normalized).
    ///
    /// Tries the exact row, then the closest row within the tolerance, then
    /// the most recent earlier row.
    ///
    /// # Errors
    ///
    /// Returns [`TemporalError::NoSuitableData`] if the series has nothing
    /// at or before the reference time and nothing within tolerance.
    pub fn current_value(
        &self,
        series: &CanonicalSeries,
        reference: DateTime<Utc>,
    ) -> Result<CurrentValue, TemporalError> {
        if let Some(value) = series.get(reference) {
            return Ok(CurrentValue {
                value,
                timestamp: reference,
                source: DataSource::Exact,
            });
        }
        if let Some((timestamp, value)) = series.nearest_within(reference, self.tolerance) {
            return Ok(CurrentValue {
                value,
                timestamp,
                source: DataSource::Nearest,
            });
        }
        series
            .latest_at_or_before(reference)
            .map(|(timestamp, value)| CurrentValue {
                value,
                timestamp,
                source: DataSource::Past,
            })
            .ok_or(TemporalError::NoSuitableData { reference })
    }

    /// Forecast lookup `horizon_hours` after `reference`.
    #[must_use]
    pub fn forecast(
        &self,
        series: &CanonicalSeries,
        reference: DateTime<Utc>,
        horizon_hours: u32,
    ) -> ForecastEntry {
        let target_time = self
            .cadence
            .normalize(reference + TimeDelta::hours(i64::from(horizon_hours)));

        let (resolved, source) = series.get(target_time).map_or_else(
            || {
                series
                    .nearest_within(target_time, self.tolerance)
                    .map_or((None, DataSource::None), |hit| (Some(hit), DataSource::Nearest))
            },
            |value| (Some((target_time, value)), DataSource::Exact),
        );

        ForecastEntry {
            horizon_hours,
            target_time,
            value: resolved.map(|(_, v)| v),
            resolved_time: resolved.map(|(t, _)| t),
            source,
        }
    }

    /// Resolves everything for one district.
    ///
    /// `reference` is normalized first; windows and forecasts are measured
    /// from the normalized time.
    ///
    /// # Errors
    ///
    /// Returns [`TemporalError::NoSuitableData`] when no current value can
    /// be found.
    pub fn resolve(
        &self,
        district_id: &str,
        series: &CanonicalSeries,
        reference: DateTime<Utc>,
    ) -> Result<RollingRecord, TemporalError> {
        let reference_time = self.cadence.normalize(reference);
        let current = self.current_value(series, reference_time)?;

        let windows: Vec<WindowMean> = self
            .windows_hours
            .iter()
            .map(|&h| rolling_mean(series, reference_time, h))
            .collect();
        let forecasts = self
            .forecast_horizons_hours
            .iter()
            .map(|&h| self.forecast(series, reference_time, h))
            .collect();
        let basis = alert_basis(&windows, &current);

        Ok(RollingRecord {
            district_id: district_id.to_string(),
            reference_time,
            current,
            windows,
            forecasts,
            basis,
        })
    }
}

/// Mean of rows in `[reference − window, reference]`.
#[must_use]
pub fn rolling_mean(series: &CanonicalSeries, reference: DateTime<Utc>, window_hours: u32) -> WindowMean {
    let start = reference - TimeDelta::hours(i64::from(window_hours));

    let mut sum = 0.0;
    let mut point_count = 0_usize;
    let mut window_start = None;
    for (t, v) in series.range_inclusive(start, reference) {
        window_start.get_or_insert(t);
        sum += v;
        point_count += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = (point_count > 0).then(|| sum / point_count as f64);

    WindowMean {
        window_hours,
        mean,
        point_count,
        window_start,
    }
}

/// Picks the longest non-empty window, falling back to the current value.
#[must_use]
pub fn alert_basis(windows: &[WindowMean], current: &CurrentValue) -> AlertBasis {
    windows
        .iter()
        .filter(|w| w.point_count > 0)
        .max_by_key(|w| w.window_hours)
        .and_then(|w| {
            w.mean.map(|value| AlertBasis {
                value,
                window_hours: Some(w.window_hours),
            })
        })
        .unwrap_or(AlertBasis {
            value: current.value,
            window_hours: None,
        })
}
