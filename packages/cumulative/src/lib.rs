#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incremental long-horizon statistics over raw grid source files.
//!
//! The engine keeps running `(count, sum)` accumulators per grid point for
//! every [`PeriodBucket`](dustwatch_cumulative_models::PeriodBucket), plus a
//! per-year map of daily maxima used for exceedance-day percentages. New
//! source files are folded in without touching history. A file is
//! recognised by its MD5 content hash and never counted twice, so reruns in
//! any order converge on the same state.
//!
//! [`fold`](fold::fold) is a pure function over [`CumulativeState`].
//! [`CumulativeEngine`] wraps it with load-at-start and atomic
//! save-after-batch.

pub mod fold;
pub mod maps;
pub mod persist;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dustwatch_cumulative_models::{
    CumulativeConfig, CumulativeState, FoldOutcome, MapMetadata, SourceBatch,
};

/// Errors that can occur in the cumulative engine.
#[derive(Debug, thiserror::Error)]
pub enum CumulativeError {
    /// Storage error while reading or writing state or maps.
    #[error("Storage error: {0}")]
    Store(#[from] dustwatch_store::StoreError),

    /// I/O error while hashing a source file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A previously folded source now has different contents.
    #[error("Source {identity} changed since it was folded ({previous} -> {current}); rebuild required")]
    SourceChanged {
        /// Source identity.
        identity: String,
        /// Hash recorded in the state.
        previous: String,
        /// Hash of the incoming contents.
        current: String,
    },

    /// The state file exists but cannot be decoded.
    #[error("Corrupt cumulative state {}: {message}", path.display())]
    CorruptState {
        /// State file path.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },

    /// The state was written by an incompatible layout version.
    #[error("Cumulative state version {found} is not supported (expected {expected})")]
    VersionMismatch {
        /// Version found in the state.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
}

/// Cumulative state bound to its file on disk.
pub struct CumulativeEngine {
    path: PathBuf,
    config: CumulativeConfig,
    state: CumulativeState,
    dirty: bool,
}

impl CumulativeEngine {
    /// Loads state from `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is corrupt or of another version.
    pub fn open(path: impl Into<PathBuf>, config: CumulativeConfig) -> Result<Self, CumulativeError> {
        let path = path.into();
        let state = persist::load_state(&path)?.unwrap_or_else(|| {
            log::info!("No cumulative state at {}, starting fresh", path.display());
            CumulativeState::default()
        });
        Ok(Self {
            path,
            config,
            state,
            dirty: false,
        })
    }

    /// An empty engine bound to `path`, ignoring anything saved there.
    ///
    /// The file is only replaced on the next successful save, so this is
    /// the way back from a corrupt state file.
    #[must_use]
    pub fn fresh(path: impl Into<PathBuf>, config: CumulativeConfig) -> Self {
        Self {
            path: path.into(),
            config,
            state: CumulativeState::default(),
            dirty: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &CumulativeState {
        &self.state
    }

    /// Folds one source into the in-memory state.
    ///
    /// Rejected sources leave the state untouched.
    ///
    /// # Errors
    ///
    /// See [`fold::fold`].
    pub fn fold(&mut self, batch: &SourceBatch, now: DateTime<Utc>) -> Result<FoldOutcome, CumulativeError> {
        if fold::check_source(&self.state, batch)? {
            log::info!("Source {} already folded, skipping", batch.identity);
            return Ok(FoldOutcome::AlreadyFolded);
        }
        let state = std::mem::take(&mut self.state);
        let (state, outcome) = fold::apply_source(state, batch, &self.config, now);
        self.state = state;
        self.dirty = true;
        Ok(outcome)
    }

    /// Saves the state if anything was folded since the last commit.
    ///
    /// Returns `true` if a write happened.
    ///
    /// # Errors
    ///
    /// Returns [`CumulativeError::Store`] if the write fails.
    pub fn commit(&mut self) -> Result<bool, CumulativeError> {
        if !self.dirty {
            log::debug!("Cumulative state unchanged, nothing to save");
            return Ok(false);
        }
        persist::save_state(&self.path, &self.state)?;
        self.dirty = false;
        Ok(true)
    }

    /// Replaces the state with a replay of `sources` and saves it.
    ///
    /// # Errors
    ///
    /// Returns an error if the replay or the save fails; the previous state
    /// file is left in place in either case.
    pub fn rebuild<'a>(
        &mut self,
        sources: impl IntoIterator<Item = &'a SourceBatch>,
        now: DateTime<Utc>,
    ) -> Result<Vec<FoldOutcome>, CumulativeError> {
        let (state, outcomes) = fold::replay(sources, &self.config, now)?;
        persist::save_state(&self.path, &state)?;
        self.state = state;
        self.dirty = false;
        Ok(outcomes)
    }

    /// Builds every map surface and writes them under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CumulativeError::Store`] if a file cannot be written.
    pub fn write_maps(&self, dir: &Path, now: DateTime<Utc>) -> Result<MapMetadata, CumulativeError> {
        let surfaces = maps::build_surfaces(&self.state, &self.config, now);
        let metadata = maps::build_metadata(&self.state, &surfaces, &self.config, now);
        maps::write_maps(dir, &surfaces, &metadata)?;
        Ok(metadata)
    }
}
