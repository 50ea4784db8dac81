#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch pipeline behind the `dustwatch` CLI.
//!
//! Each entry point loads its inputs from the data directory named by
//! [`EngineConfig`] and saves its output atomically. Steps are idempotent,
//! so a failed run is retried by running it again.

pub mod cumulative;
pub mod reader;

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dustwatch_alerts::{AlertBuilder, series_from_estimates};
use dustwatch_alerts_models::AlertReport;
use dustwatch_cli_utils::ProgressCallback;
use dustwatch_config::EngineConfig;
use dustwatch_grid_models::District;
use dustwatch_interpolate::estimate_snapshot;
use dustwatch_interpolate_models::{DistrictEstimate, EstimateMethod};
use dustwatch_store::{EstimateStore, GridStore, InsertSummary};
use dustwatch_temporal::{Cadence, history};
use dustwatch_temporal_models::{HistoryGranularity, HistoryPoint};

pub use reader::{read_districts_csv, read_grid_csv};

/// Errors that can occur while running a pipeline step.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// I/O error on an input file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV parsing error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// File that caused the error.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// A required CSV column is missing.
    #[error("{path} is missing required column {column}")]
    MissingColumn {
        /// File that caused the error.
        path: String,
        /// Missing header.
        column: String,
    },

    /// Storage error.
    #[error(transparent)]
    Store(#[from] dustwatch_store::StoreError),

    /// Cumulative engine error.
    #[error(transparent)]
    Cumulative(#[from] dustwatch_cumulative::CumulativeError),

    /// Temporal configuration error.
    #[error(transparent)]
    Temporal(#[from] dustwatch_temporal::TemporalError),
}

/// Counts from [`ingest_grid`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridIngestSummary {
    pub files: usize,
    pub rejected: usize,
    pub stored: InsertSummary,
    /// Samples dropped by the retention horizon.
    pub pruned: usize,
}

/// Loads grid CSV files into the sample store.
///
/// Samples already stored are skipped, and samples older than the
/// configured retention are pruned before saving.
///
/// # Errors
///
/// Returns an error if a file cannot be read or the store cannot be
/// loaded or saved.
pub fn ingest_grid(
    config: &EngineConfig,
    files: &[PathBuf],
    now: DateTime<Utc>,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<GridIngestSummary, IngestError> {
    let paths = config.store_paths();
    let mut store = GridStore::load(&paths.grid_store())?;
    let mut summary = GridIngestSummary::default();

    progress.set_total(files.len() as u64);
    for file in files {
        progress.set_message(reader::source_identity(file));
        let read = read_grid_csv(file)?;
        let inserted = store.insert_many(read.samples);
        log::info!(
            "{}: {} new samples, {} duplicates, {} rejected rows",
            file.display(),
            inserted.inserted,
            inserted.duplicates,
            read.rejected
        );
        summary.files += 1;
        summary.rejected += read.rejected;
        summary.stored.inserted += inserted.inserted;
        summary.stored.duplicates += inserted.duplicates;
        progress.inc(1);
    }

    summary.pruned = store.apply_retention(now, config.store.retention_hours);
    store.save(&paths.grid_store())?;
    progress.finish(format!("{} new samples", summary.stored.inserted));
    Ok(summary)
}

/// Which snapshots [`estimate`] recomputes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateMode {
    /// Only snapshots with no stored estimates yet.
    Pending,
    /// Every stored snapshot at or after `since` (all when `None`).
    Backfill { since: Option<DateTime<Utc>> },
}

/// Counts from [`estimate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EstimateSummary {
    pub snapshots: usize,
    pub estimates: usize,
    pub failed: usize,
}

/// Raw snapshot times grouped under their canonical time, closest first.
fn group_by_slot(
    timestamps: Vec<DateTime<Utc>>,
    cadence: Cadence,
) -> BTreeMap<DateTime<Utc>, Vec<DateTime<Utc>>> {
    let mut slots: BTreeMap<DateTime<Utc>, Vec<DateTime<Utc>>> = BTreeMap::new();
    for t in timestamps {
        slots.entry(cadence.normalize(t)).or_default().push(t);
    }
    for (canonical, raw) in &mut slots {
        raw.sort_by_key(|t| ((*t - *canonical).abs(), *t));
    }
    slots
}

/// Keeps the first usable estimate per district. A failed estimate only
/// stands until a usable one arrives.
fn merge_slot(best: &mut BTreeMap<String, DistrictEstimate>, results: Vec<DistrictEstimate>) {
    for estimate in results {
        match best.entry(estimate.district_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(estimate);
            }
            Entry::Occupied(mut slot) => {
                if slot.get().method == EstimateMethod::Failed && estimate.method != EstimateMethod::Failed {
                    slot.insert(estimate);
                }
            }
        }
    }
}

/// Interpolates stored grid snapshots onto `districts`.
///
/// Estimates are stored under the cadence-normalized snapshot time. When
/// several raw snapshots share a canonical time, each district keeps the
/// estimate from the snapshot closest to it, skipping failed estimates
/// while another snapshot has a value. Re-estimating a canonical time
/// replaces its previous estimates.
///
/// # Errors
///
/// Returns an error for an invalid cadence or if a store cannot be loaded
/// or saved.
pub fn estimate(
    config: &EngineConfig,
    districts: &[District],
    mode: EstimateMode,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<EstimateSummary, IngestError> {
    let cadence = Cadence::from_hours(config.temporal.cadence_hours)?;
    let paths = config.store_paths();
    let grid = GridStore::load(&paths.grid_store())?;
    let mut estimates = EstimateStore::load(&paths.estimate_store())?;

    let mut slots = group_by_slot(grid.timestamps(), cadence);
    slots.retain(|canonical, _| match mode {
        EstimateMode::Pending => !estimates.has_timestamp(*canonical),
        EstimateMode::Backfill { since } => since.is_none_or(|s| *canonical >= s),
    });

    let mut summary = EstimateSummary::default();
    if slots.is_empty() {
        log::info!("No snapshots to estimate");
        return Ok(summary);
    }

    progress.set_total(slots.values().map(Vec::len).sum::<usize>() as u64);
    for (canonical, raw) in slots {
        if raw.len() > 1 {
            log::debug!("{} raw snapshots share {canonical}", raw.len());
        }

        let mut best = BTreeMap::new();
        for timestamp in raw {
            progress.set_message(timestamp.to_rfc3339());
            if let Some(snapshot) = grid.snapshot_at(timestamp) {
                merge_slot(&mut best, estimate_snapshot(&snapshot, districts, &config.interpolation));
                summary.snapshots += 1;
            }
            progress.inc(1);
        }

        summary.estimates += best.len();
        summary.failed += best
            .values()
            .filter(|e| e.method == EstimateMethod::Failed)
            .count();
        estimates.upsert_many(best.into_values().map(|mut e| {
            e.timestamp = canonical;
            e
        }));
    }

    estimates.save(&paths.estimate_store())?;
    progress.finish(format!("{} snapshots estimated", summary.snapshots));
    log::info!(
        "Estimated {} snapshots: {} estimates, {} failed",
        summary.snapshots,
        summary.estimates,
        summary.failed
    );
    Ok(summary)
}

/// Builds the alert report for `districts` at `reference`.
///
/// # Errors
///
/// Returns an error for an invalid cadence or an unreadable estimate
/// store.
pub fn build_alerts(
    config: &EngineConfig,
    districts: &[District],
    reference: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<AlertReport, IngestError> {
    let estimates = EstimateStore::load(&config.store_paths().estimate_store())?;
    let builder = AlertBuilder::new(&config.temporal, &config.classification)?;
    let cadence = builder.cadence();

    Ok(builder.report(
        districts,
        |d| series_from_estimates(estimates.series(&d.id), cadence),
        reference,
        now,
    ))
}

/// Writes `report` as pretty JSON to `output`, or to the default report
/// path. Returns the path written.
///
/// # Errors
///
/// Returns [`IngestError::Store`] if the file cannot be written.
pub fn write_alerts(
    config: &EngineConfig,
    report: &AlertReport,
    output: Option<&Path>,
) -> Result<PathBuf, IngestError> {
    let path = output.map_or_else(|| config.store_paths().alerts_report(), Path::to_path_buf);
    dustwatch_store::save_json(&path, report, true)?;
    log::info!(
        "Wrote alerts for {} districts to {}",
        report.districts.len(),
        path.display()
    );
    Ok(path)
}

/// Median concentration per period for one district.
///
/// # Errors
///
/// Returns an error for an invalid cadence or an unreadable estimate
/// store.
pub fn district_history(
    config: &EngineConfig,
    district_id: &str,
    granularity: HistoryGranularity,
) -> Result<Vec<HistoryPoint>, IngestError> {
    let cadence = Cadence::from_hours(config.temporal.cadence_hours)?;
    let estimates = EstimateStore::load(&config.store_paths().estimate_store())?;
    let series = series_from_estimates(estimates.series(district_id), cadence);
    Ok(history::aggregate(&series, granularity))
}

/// Applies the retention horizon to the sample store. Returns the number
/// of samples removed.
///
/// # Errors
///
/// Returns an error if the store cannot be loaded or saved.
pub fn prune(config: &EngineConfig, now: DateTime<Utc>, retention_hours: u32) -> Result<usize, IngestError> {
    let path = config.store_paths().grid_store();
    let mut store = GridStore::load(&path)?;
    let removed = store.apply_retention(now, retention_hours);
    if removed > 0 {
        store.save(&path)?;
    }
    Ok(removed)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use chrono::TimeZone;
    use dustwatch_classify::{AqiCategory, Compliance};
    use dustwatch_cli_utils::null_progress;
    use dustwatch_temporal_models::DataSource;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, h, m, 0).unwrap()
    }

    #[test]
    fn grid_to_alert_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let grid = write_day_grid(dir.path(), "day.csv");
        let districts = read_districts_csv(&write_districts(dir.path())).unwrap();
        let progress = null_progress();

        let ingested = ingest_grid(&config, &[grid.clone()], at(22, 0), &progress).unwrap();
        assert_eq!(ingested.stored.inserted, 40);
        assert_eq!(ingested.pruned, 0);

        let summary = estimate(&config, &districts, EstimateMode::Pending, &progress).unwrap();
        assert_eq!(summary.snapshots, 8);
        assert_eq!(summary.estimates, 16);
        // The far district has no grid point within range.
        assert_eq!(summary.failed, 8);

        let report = build_alerts(&config, &districts, at(13, 40), at(14, 0)).unwrap();
        assert_eq!(report.metadata.reference_time, at(15, 0));
        assert_eq!(report.districts.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].district_id, "far");

        let alert = &report.districts[0];
        assert!((alert.pm10.now - 140.0).abs() < 1e-6);
        assert_eq!(alert.pm10.now_source, DataSource::Exact);
        assert_eq!(alert.aqi.value, 93);
        assert_eq!(alert.aqi.category, AqiCategory::Moderate);

        let window = |hours: u32| alert.pm10.windows.iter().find(|w| w.window_hours == hours).unwrap();
        for (hours, mean, points) in [(6, 120.0, 3), (12, 100.0, 5), (24, 90.0, 6)] {
            let w = window(hours);
            assert!((w.mean.unwrap() - mean).abs() < 1e-6, "{hours}h mean {:?}", w.mean);
            assert_eq!(w.point_count, points, "{hours}h points");
        }
        assert_eq!(alert.alert.aqi, 68);
        assert_eq!(alert.alert.based_on, "24h_mean");
        assert_eq!(alert.compliance.status, Compliance::WithinLimit);

        let written = write_alerts(&config, &report, None).unwrap();
        let raw = std::fs::read_to_string(written).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["districts"][0]["alert"]["level"], "moderate");

        // Re-running is a no-op.
        let again = ingest_grid(&config, &[grid], at(22, 0), &progress).unwrap();
        assert_eq!(again.stored.inserted, 0);
        assert_eq!(again.stored.duplicates, 40);
        let pending = estimate(&config, &districts, EstimateMode::Pending, &progress).unwrap();
        assert_eq!(pending.snapshots, 0);

        let backfill = estimate(
            &config,
            &districts,
            EstimateMode::Backfill { since: Some(at(18, 0)) },
            &progress,
        )
        .unwrap();
        assert_eq!(backfill.snapshots, 2);
    }

    #[test]
    fn failed_snapshot_does_not_replace_estimate_in_same_slot() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let districts = read_districts_csv(&write_districts(dir.path())).unwrap();
        let progress = null_progress();

        // 01:00 rounds onto 00:00 but only has a point far from d1.
        let grid = dir.path().join("slot.csv");
        std::fs::write(
            &grid,
            "timestamp_utc,latitude,longitude,dust_concentration_ugm3\n\
             2025-06-10T00:00:00Z,33.1,44.1,50\n\
             2025-06-10T00:00:00Z,33.1,43.9,50\n\
             2025-06-10T00:00:00Z,32.9,44.1,50\n\
             2025-06-10T00:00:00Z,32.9,43.9,50\n\
             2025-06-10T01:00:00Z,40.0,50.0,500\n",
        )
        .unwrap();
        ingest_grid(&config, &[grid], at(2, 0), &progress).unwrap();

        let summary = estimate(&config, &districts, EstimateMode::Pending, &progress).unwrap();
        assert_eq!(summary.snapshots, 2);
        assert_eq!(summary.estimates, 2);
        assert_eq!(summary.failed, 1);

        let store = EstimateStore::load(&config.store_paths().estimate_store()).unwrap();
        let series: Vec<&DistrictEstimate> = store.series("d1").collect();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].timestamp, at(0, 0));
        assert_ne!(series[0].method, EstimateMethod::Failed);
        assert!((series[0].concentration.unwrap() - 50.0).abs() < 1e-6);

        // Backfilling the slot keeps the same choice.
        estimate(&config, &districts, EstimateMode::Backfill { since: None }, &progress).unwrap();
        let store = EstimateStore::load(&config.store_paths().estimate_store()).unwrap();
        let d1 = store.series("d1").next().unwrap();
        assert!((d1.concentration.unwrap() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn history_and_prune() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let grid = write_day_grid(dir.path(), "day.csv");
        let districts = read_districts_csv(&write_districts(dir.path())).unwrap();
        let progress = null_progress();

        ingest_grid(&config, &[grid], at(22, 0), &progress).unwrap();
        estimate(&config, &districts, EstimateMode::Pending, &progress).unwrap();

        let daily = district_history(&config, "d1", HistoryGranularity::Daily).unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].period, "2025-06-10");
        assert_eq!(daily[0].count, 8);
        assert!((daily[0].median - 110.0).abs() < 1e-6);
        assert!(district_history(&config, "far", HistoryGranularity::Daily).unwrap().is_empty());

        // 12:00 onward is inside a 10 hour horizon ending at 22:00.
        assert_eq!(prune(&config, at(22, 0), 10).unwrap(), 20);
        assert_eq!(prune(&config, at(22, 0), 10).unwrap(), 0);
    }
}
