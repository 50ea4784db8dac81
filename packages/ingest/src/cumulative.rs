//! Cumulative statistics runs over raw grid files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dustwatch_cli_utils::ProgressCallback;
use dustwatch_config::EngineConfig;
use dustwatch_cumulative::{CumulativeEngine, CumulativeError, persist::hash_file};
use dustwatch_cumulative_models::{FoldOutcome, MapMetadata, SourceBatch};

use crate::{IngestError, reader};

/// Counts from a cumulative update or rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CumulativeRunSummary {
    pub folded: usize,
    pub already_folded: usize,
    pub samples_applied: u64,
    /// Sources refused because their contents changed, with the reason.
    pub rejected: Vec<(String, String)>,
}

impl CumulativeRunSummary {
    fn record(&mut self, outcome: FoldOutcome) {
        match outcome {
            FoldOutcome::Folded { applied, .. } => {
                self.folded += 1;
                self.samples_applied += applied;
            }
            FoldOutcome::AlreadyFolded => self.already_folded += 1,
        }
    }
}

fn file_hash(path: &Path) -> Result<String, IngestError> {
    hash_file(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Hashes and parses one grid file into a foldable batch.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_batch(path: &Path) -> Result<SourceBatch, IngestError> {
    let content_hash = file_hash(path)?;
    let read = reader::read_grid_csv(path)?;
    Ok(SourceBatch {
        identity: reader::source_identity(path),
        content_hash,
        samples: read.samples,
    })
}

/// Folds new grid files into the cumulative state and saves it once at
/// the end.
///
/// Files whose contents are already folded are skipped without parsing.
/// A file whose contents changed since it was folded is reported in
/// [`CumulativeRunSummary::rejected`] and left out; the other files still
/// count.
///
/// # Errors
///
/// Returns an error if the state is corrupt, a file is unreadable, or the
/// state cannot be saved.
pub fn update_cumulative(
    config: &EngineConfig,
    files: &[PathBuf],
    now: DateTime<Utc>,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<CumulativeRunSummary, IngestError> {
    let mut engine = CumulativeEngine::open(config.store_paths().cumulative_state(), config.cumulative.clone())?;
    let mut summary = CumulativeRunSummary::default();

    progress.set_total(files.len() as u64);
    for file in files {
        let identity = reader::source_identity(file);
        progress.set_message(identity.clone());

        let hash = file_hash(file)?;
        if engine.state().has_hash(&hash) {
            log::debug!("{identity} already folded, skipping");
            summary.record(FoldOutcome::AlreadyFolded);
            progress.inc(1);
            continue;
        }

        let batch = SourceBatch {
            identity,
            content_hash: hash,
            samples: reader::read_grid_csv(file)?.samples,
        };
        match engine.fold(&batch, now) {
            Ok(outcome) => summary.record(outcome),
            Err(e @ CumulativeError::SourceChanged { .. }) => {
                log::error!("{e}");
                summary.rejected.push((batch.identity, e.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        progress.inc(1);
    }

    engine.commit()?;
    progress.finish(format!("{} sources folded", summary.folded));
    log::info!(
        "Cumulative update: {} folded, {} already folded, {} rejected",
        summary.folded,
        summary.already_folded,
        summary.rejected.len()
    );
    Ok(summary)
}

/// Rebuilds the cumulative state from scratch by replaying `files` in
/// order, replacing the saved state.
///
/// # Errors
///
/// Returns an error if a file is unreadable, two files share an identity
/// but differ in content, or the state cannot be saved. The previous
/// state file is kept on error.
pub fn rebuild_cumulative(
    config: &EngineConfig,
    files: &[PathBuf],
    now: DateTime<Utc>,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<CumulativeRunSummary, IngestError> {
    let path = config.store_paths().cumulative_state();
    let mut engine = match CumulativeEngine::open(&path, config.cumulative.clone()) {
        Ok(engine) => engine,
        Err(e @ (CumulativeError::CorruptState { .. } | CumulativeError::VersionMismatch { .. })) => {
            log::warn!("Discarding unusable cumulative state: {e}");
            CumulativeEngine::fresh(path, config.cumulative.clone())
        }
        Err(e) => return Err(e.into()),
    };

    progress.set_total(files.len() as u64);
    let mut batches = Vec::with_capacity(files.len());
    for file in files {
        progress.set_message(reader::source_identity(file));
        batches.push(load_batch(file)?);
        progress.inc(1);
    }

    let mut summary = CumulativeRunSummary::default();
    for outcome in engine.rebuild(&batches, now)? {
        summary.record(outcome);
    }
    progress.finish(format!("Rebuilt from {} sources", summary.folded));
    log::info!(
        "Rebuilt cumulative state from {} sources ({} duplicates)",
        summary.folded,
        summary.already_folded
    );
    Ok(summary)
}

/// Writes every map surface plus `metadata.json` to `output`, or to the
/// default maps directory.
///
/// # Errors
///
/// Returns an error if the state cannot be loaded or a file cannot be
/// written.
pub fn write_maps(
    config: &EngineConfig,
    output: Option<&Path>,
    now: DateTime<Utc>,
) -> Result<MapMetadata, IngestError> {
    let paths = config.store_paths();
    let dir = output.map_or_else(|| paths.maps_dir(), Path::to_path_buf);
    let engine = CumulativeEngine::open(paths.cumulative_state(), config.cumulative.clone())?;
    Ok(engine.write_maps(&dir, now)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config_in, write_day_grid};
    use chrono::TimeZone;
    use dustwatch_cli_utils::null_progress;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn update_is_idempotent_and_writes_maps() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let grid = write_day_grid(dir.path(), "2025_06_10.csv");
        let progress = null_progress();

        let first = update_cumulative(&config, &[grid.clone()], now(), &progress).unwrap();
        assert_eq!(first.folded, 1);
        assert_eq!(first.samples_applied, 40);

        let second = update_cumulative(&config, &[grid], now(), &progress).unwrap();
        assert_eq!(second.folded, 0);
        assert_eq!(second.already_folded, 1);

        let metadata = write_maps(&config, None, now()).unwrap();
        assert_eq!(metadata.total_measurements, 40);
        assert_eq!(metadata.processed_years, vec![2025]);
        let maps_dir = config.store_paths().maps_dir();
        assert!(maps_dir.join("metadata.json").exists());
        assert!(maps_dir.join("long_term_mean_compact.json").exists());
        assert!(maps_dir.join("exceedance_who_2025_compact.json").exists());
    }

    #[test]
    fn changed_file_is_rejected_until_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let progress = null_progress();
        let grid = write_day_grid(dir.path(), "day.csv");
        update_cumulative(&config, &[grid.clone()], now(), &progress).unwrap();

        let mut contents = std::fs::read_to_string(&grid).unwrap();
        contents.push_str("2025-06-11T00:00:00Z,33.0,44.0,500\n");
        std::fs::write(&grid, contents).unwrap();

        let refused = update_cumulative(&config, &[grid.clone()], now(), &progress).unwrap();
        assert_eq!(refused.folded, 0);
        assert_eq!(refused.rejected.len(), 1);
        assert_eq!(refused.rejected[0].0, "day.csv");

        let rebuilt = rebuild_cumulative(&config, &[grid], now(), &progress).unwrap();
        assert_eq!(rebuilt.folded, 1);
        assert_eq!(rebuilt.samples_applied, 41);
    }

    #[test]
    fn rebuild_recovers_from_corrupt_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let progress = null_progress();
        let grid = write_day_grid(dir.path(), "day.csv");

        let state_path = config.store_paths().cumulative_state();
        std::fs::create_dir_all(state_path.parent().unwrap()).unwrap();
        std::fs::write(&state_path, b"\xc1not msgpack").unwrap();
        assert!(update_cumulative(&config, &[grid.clone()], now(), &progress).is_err());

        let rebuilt = rebuild_cumulative(&config, &[grid.clone()], now(), &progress).unwrap();
        assert_eq!(rebuilt.folded, 1);
        let after = update_cumulative(&config, &[grid], now(), &progress).unwrap();
        assert_eq!(after.already_folded, 1);
    }
}
