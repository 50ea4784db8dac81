#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cumulative statistics state and map surface types.
//!
//! [`CumulativeState`] is the single durable value the cumulative engine
//! reads at start-up and writes after each batch. It is versioned so an
//! incompatible on-disk layout is detected rather than misread.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use dustwatch_grid_models::{GeoBounds, GridSample, PointKey};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Layout version written into every saved state.
pub const STATE_VERSION: u32 = 1;

/// Meteorological season.
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
pub enum Season {
    /// December, January, February.
    Winter,
    /// March, April, May.
    Spring,
    /// June, July, August.
    Summer,
    /// September, October, November.
    Autumn,
}

impl Season {
    pub const ALL: [Self; 4] = [Self::Winter, Self::Spring, Self::Summer, Self::Autumn];

    /// Season of a calendar month (1-12).
    #[must_use]
    pub const fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Autumn,
            _ => Self::Winter,
        }
    }
}

/// The aggregation period an accumulator belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodBucket {
    LongTerm,
    Season(Season),
    Month(u32),
    Year(i32),
    YearSeason(i32, Season),
    YearMonth(i32, u32),
}

impl PeriodBucket {
    /// Every bucket a sample taken at `timestamp` contributes to.
    #[must_use]
    pub fn for_timestamp(timestamp: DateTime<Utc>) -> [Self; 6] {
        let year = timestamp.year();
        let month = timestamp.month();
        let season = Season::from_month(month);
        [
            Self::LongTerm,
            Self::Season(season),
            Self::Month(month),
            Self::Year(year),
            Self::YearSeason(year, season),
            Self::YearMonth(year, month),
        ]
    }
}

/// Running count and sum for one grid point and period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    pub count: u64,
    pub sum: f64,
}

impl Accumulator {
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    /// `sum / count`, or `None` before the first value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Record of a source file that has been folded into the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Hex MD5 of the file contents.
    pub content_hash: String,
    pub folded_at: DateTime<Utc>,
    /// Samples that passed the region filter.
    pub samples: u64,
}

/// Persisted cumulative statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeState {
    pub version: u32,
    pub last_updated: Option<DateTime<Utc>>,
    /// Folded sources keyed by identity.
    pub sources: BTreeMap<String, SourceRecord>,
    pub accumulators: BTreeMap<PeriodBucket, BTreeMap<PointKey, Accumulator>>,
    /// Year → point → date → daily maximum.
    pub daily_max: BTreeMap<i32, BTreeMap<PointKey, BTreeMap<NaiveDate, f64>>>,
}

impl Default for CumulativeState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_updated: None,
            sources: BTreeMap::new(),
            accumulators: BTreeMap::new(),
            daily_max: BTreeMap::new(),
        }
    }
}

impl CumulativeState {
    /// Returns `true` if any folded source has this content hash.
    #[must_use]
    pub fn has_hash(&self, content_hash: &str) -> bool {
        self.sources.values().any(|s| s.content_hash == content_hash)
    }

    /// Years with at least one folded sample, ascending.
    #[must_use]
    pub fn processed_years(&self) -> Vec<i32> {
        self.accumulators
            .keys()
            .filter_map(|bucket| match bucket {
                PeriodBucket::Year(y) => Some(*y),
                _ => None,
            })
            .collect()
    }

    /// Total number of samples folded so far.
    #[must_use]
    pub fn total_measurements(&self) -> u64 {
        self.accumulators
            .get(&PeriodBucket::LongTerm)
            .map_or(0, |points| points.values().map(|a| a.count).sum())
    }

    /// Accumulators for one bucket, if any sample has reached it.
    #[must_use]
    pub fn bucket(&self, bucket: PeriodBucket) -> Option<&BTreeMap<PointKey, Accumulator>> {
        self.accumulators.get(&bucket)
    }
}

/// One decoded source file, ready to fold.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch {
    /// Stable identity, such as the file name.
    pub identity: String,
    /// Hex MD5 of the file contents.
    pub content_hash: String,
    pub samples: Vec<GridSample>,
}

/// Result of folding one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    /// The source was new and has been applied.
    Folded {
        /// Samples inside the region that were applied.
        applied: u64,
        /// Samples outside the region or with a non-finite value.
        skipped: u64,
        /// New `(point, date)` daily maxima recorded.
        new_days: u64,
    },
    /// A source with the same content hash was already folded.
    AlreadyFolded,
}

/// Thresholds and region filter for the cumulative engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CumulativeConfig {
    /// Samples outside these bounds are ignored.
    pub region: GeoBounds,
    /// Daily maximum above which a day counts toward `exceedance_who`.
    pub who_threshold: f64,
    /// Daily maximum above which a day counts toward `exceedance_extreme`.
    pub extreme_threshold: f64,
}

impl Default for CumulativeConfig {
    fn default() -> Self {
        Self {
            region: GeoBounds {
                min_lat: 27.0,
                max_lat: 38.0,
                min_lon: 37.5,
                max_lon: 51.0,
            },
            who_threshold: 150.0,
            extreme_threshold: 300.0,
        }
    }
}

/// Kind of statistic a map surface shows.
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
pub enum MapKind {
    Mean,
    Seasonal,
    Monthly,
    Annual,
    Exceedance,
}

/// One grid point of a map surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapCell {
    pub lat: f64,
    pub lon: f64,
    pub val: f64,
}

/// A named, sparse surface of per-grid-point values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSurface {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MapKind,
    pub unit: String,
    /// `multi` for multi-year surfaces, otherwise the year.
    pub period: String,
    pub generated: DateTime<Utc>,
    pub bounds: GeoBounds,
    pub min: f64,
    pub max: f64,
    pub data: Vec<MapCell>,
}

/// Catalog entry for one available surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapCatalogEntry {
    #[serde(rename = "type")]
    pub kind: MapKind,
    pub unit: String,
    pub period: String,
    pub points: usize,
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMetadata {
    pub generated: DateTime<Utc>,
    pub bounds: GeoBounds,
    pub processed_years: Vec<i32>,
    pub total_measurements: u64,
    pub maps: BTreeMap<String, MapCatalogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn seasons_from_months() {
        assert_eq!(Season::from_month(12), Season::Winter);
        assert_eq!(Season::from_month(1), Season::Winter);
        assert_eq!(Season::from_month(2), Season::Winter);
        assert_eq!(Season::from_month(3), Season::Spring);
        assert_eq!(Season::from_month(8), Season::Summer);
        assert_eq!(Season::from_month(11), Season::Autumn);
    }

    #[test]
    fn buckets_for_timestamp() {
        let t = Utc.with_ymd_and_hms(2023, 12, 5, 6, 0, 0).unwrap();
        let buckets = PeriodBucket::for_timestamp(t);
        assert!(buckets.contains(&PeriodBucket::LongTerm));
        assert!(buckets.contains(&PeriodBucket::Season(Season::Winter)));
        assert!(buckets.contains(&PeriodBucket::Month(12)));
        assert!(buckets.contains(&PeriodBucket::Year(2023)));
        assert!(buckets.contains(&PeriodBucket::YearSeason(2023, Season::Winter)));
        assert!(buckets.contains(&PeriodBucket::YearMonth(2023, 12)));
    }

    #[test]
    fn accumulator_mean() {
        let mut acc = Accumulator::default();
        assert_eq!(acc.mean(), None);
        acc.add(10.0);
        acc.add(30.0);
        assert_eq!(acc.count, 2);
        assert_eq!(acc.mean(), Some(20.0));
    }

    #[test]
    fn empty_state_summary() {
        let state = CumulativeState::default();
        assert_eq!(state.version, STATE_VERSION);
        assert_eq!(state.total_measurements(), 0);
        assert!(state.processed_years().is_empty());
        assert!(!state.has_hash("abc"));
    }
}
