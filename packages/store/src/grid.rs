//! De-duplicating grid sample store with a retention horizon.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use dustwatch_grid_models::{GridSample, GridSnapshot, PointKey, SampleIdentity};

use crate::StoreError;

/// Default retention for stored samples.
pub const DEFAULT_RETENTION_HOURS: u32 = 150;

/// Counts from a bulk insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Grid samples keyed by identity, ordered by timestamp.
///
/// A sample is immutable once stored: inserting the same identity again
/// is a no-op.
#[derive(Debug, Clone, Default)]
pub struct GridStore {
    samples: BTreeMap<SampleIdentity, GridSample>,
}

/// Smallest identity with the given timestamp.
fn lower_bound(timestamp: DateTime<Utc>) -> SampleIdentity {
    SampleIdentity {
        timestamp,
        point: PointKey {
            lat_milli: i32::MIN,
            lon_milli: i32::MIN,
        },
        source_id: String::new(),
    }
}

impl GridStore {
    /// Loads the store from `path`; a missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file exists but cannot be read or
    /// decoded.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let samples: Vec<GridSample> = crate::load_msgpack(path)?.unwrap_or_default();
        let mut store = Self::default();
        let summary = store.insert_many(samples);
        log::info!(
            "Loaded {} grid samples from {}",
            summary.inserted,
            path.display()
        );
        Ok(store)
    }

    /// Saves the store to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if encoding or writing fails.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let samples: Vec<&GridSample> = self.samples.values().collect();
        crate::save_msgpack(path, &samples)?;
        log::info!("Saved {} grid samples to {}", samples.len(), path.display());
        Ok(())
    }

    /// Inserts a sample. Returns `false` if its identity was already stored.
    pub fn insert(&mut self, sample: GridSample) -> bool {
        let identity = sample.identity();
        if self.samples.contains_key(&identity) {
            return false;
        }
        self.samples.insert(identity, sample);
        true
    }

    /// Inserts many samples, counting duplicates.
    pub fn insert_many(&mut self, samples: impl IntoIterator<Item = GridSample>) -> InsertSummary {
        let mut summary = InsertSummary::default();
        for sample in samples {
            if self.insert(sample) {
                summary.inserted += 1;
            } else {
                summary.duplicates += 1;
            }
        }
        summary
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Distinct sample timestamps, ascending.
    #[must_use]
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        let mut out: Vec<DateTime<Utc>> = Vec::new();
        for identity in self.samples.keys() {
            if out.last() != Some(&identity.timestamp) {
                out.push(identity.timestamp);
            }
        }
        out
    }

    /// All samples at exactly `timestamp`.
    #[must_use]
    pub fn snapshot_at(&self, timestamp: DateTime<Utc>) -> Option<GridSnapshot> {
        let samples: Vec<GridSample> = self
            .samples
            .range(lower_bound(timestamp)..)
            .take_while(|(id, _)| id.timestamp == timestamp)
            .map(|(_, s)| s.clone())
            .collect();
        (!samples.is_empty()).then_some(GridSnapshot { timestamp, samples })
    }

    /// Drops every sample older than `cutoff`. Returns the number removed.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let kept = self.samples.split_off(&lower_bound(cutoff));
        let removed = self.samples.len();
        self.samples = kept;
        if removed > 0 {
            log::info!("Pruned {removed} grid samples older than {cutoff}");
        }
        removed
    }

    /// Drops samples older than `retention_hours` before `now`.
    pub fn apply_retention(&mut self, now: DateTime<Utc>, retention_hours: u32) -> usize {
        self.prune_before(now - TimeDelta::hours(i64::from(retention_hours)))
    }
}
