//! Per-district canonical series.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::cadence::Cadence;

/// A district's concentrations keyed by canonical timestamp.
///
/// Built from raw estimate rows: every timestamp is normalized, rows that
/// land on the same canonical timestamp are averaged, and rows without a
/// concentration are skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalSeries {
    rows: BTreeMap<DateTime<Utc>, f64>,
}

impl CanonicalSeries {
    /// Builds a series from `(timestamp, concentration)` rows.
    pub fn from_rows(
        rows: impl IntoIterator<Item = (DateTime<Utc>, Option<f64>)>,
        cadence: Cadence,
    ) -> Self {
        let mut sums: BTreeMap<DateTime<Utc>, (f64, u32)> = BTreeMap::new();
        let mut merged = 0_usize;

        for (timestamp, value) in rows {
            let Some(value) = value.filter(|v| v.is_finite()) else {
                continue;
            };
            let entry = sums.entry(cadence.normalize(timestamp)).or_insert((0.0, 0));
            if entry.1 > 0 {
                merged += 1;
            }
            entry.0 += value;
            entry.1 += 1;
        }

        if merged > 0 {
            log::debug!("Averaged {merged} rows sharing a canonical timestamp");
        }

        Self {
            rows: sums
                .into_iter()
                .map(|(t, (sum, n))| (t, sum / f64::from(n)))
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at exactly `t`.
    #[must_use]
    pub fn get(&self, t: DateTime<Utc>) -> Option<f64> {
        self.rows.get(&t).copied()
    }

    /// Rows with `start <= timestamp <= end`, in time order.
    pub fn range_inclusive(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.rows
            .range(start..=end)
            .map(|(t, v)| (*t, *v))
    }

    /// Row closest to `target` within `tolerance` on either side.
    ///
    /// On equal distance the earlier row wins.
    #[must_use]
    pub fn nearest_within(
        &self,
        target: DateTime<Utc>,
        tolerance: TimeDelta,
    ) -> Option<(DateTime<Utc>, f64)> {
        self.range_inclusive(target - tolerance, target + tolerance)
            .min_by_key(|(t, _)| (*t - target).abs())
    }

    /// Most recent row at or before `t`.
    #[must_use]
    pub fn latest_at_or_before(&self, t: DateTime<Utc>) -> Option<(DateTime<Utc>, f64)> {
        self.rows.range(..=t).next_back().map(|(t, v)| (*t, *v))
    }

    /// All rows in time order.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.rows.iter().map(|(t, v)| (*t, *v))
    }
}
