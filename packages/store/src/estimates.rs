//! Per-district, per-timestamp estimate series.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use dustwatch_interpolate_models::DistrictEstimate;

use crate::StoreError;

/// District estimates keyed by district then timestamp.
///
/// Writing an estimate for an existing `(district, timestamp)` replaces it,
/// so recomputing a snapshot is idempotent.
#[derive(Debug, Clone, Default)]
pub struct EstimateStore {
    series: BTreeMap<String, BTreeMap<DateTime<Utc>, DistrictEstimate>>,
}

impl EstimateStore {
    /// Loads the store from `path`; a missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file exists but cannot be read or
    /// decoded.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let rows: Vec<DistrictEstimate> = crate::load_msgpack(path)?.unwrap_or_default();
        let count = rows.len();
        let mut store = Self::default();
        store.upsert_many(rows);
        log::info!("Loaded {count} district estimates from {}", path.display());
        Ok(store)
    }

    /// Saves the store to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if encoding or writing fails.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let rows: Vec<&DistrictEstimate> = self.series.values().flat_map(BTreeMap::values).collect();
        crate::save_msgpack(path, &rows)?;
        log::info!("Saved {} district estimates to {}", rows.len(), path.display());
        Ok(())
    }

    /// Inserts or replaces one estimate.
    pub fn upsert(&mut self, estimate: DistrictEstimate) {
        self.series
            .entry(estimate.district_id.clone())
            .or_default()
            .insert(estimate.timestamp, estimate);
    }

    pub fn upsert_many(&mut self, estimates: impl IntoIterator<Item = DistrictEstimate>) {
        for estimate in estimates {
            self.upsert(estimate);
        }
    }

    /// A district's estimates in time order.
    pub fn series(&self, district_id: &str) -> impl Iterator<Item = &DistrictEstimate> {
        self.series
            .get(district_id)
            .into_iter()
            .flat_map(BTreeMap::values)
    }

    /// Returns `true` if any district has an estimate at `timestamp`.
    #[must_use]
    pub fn has_timestamp(&self, timestamp: DateTime<Utc>) -> bool {
        self.series.values().any(|s| s.contains_key(&timestamp))
    }

    /// Total number of stored estimates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dustwatch_interpolate_models::EstimateMethod;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, h, 0, 0).unwrap()
    }

    fn estimate(district: &str, h: u32, value: Option<f64>) -> DistrictEstimate {
        DistrictEstimate {
            district_id: district.to_string(),
            timestamp: at(h),
            concentration: value,
            method: if value.is_some() {
                EstimateMethod::Idw
            } else {
                EstimateMethod::Failed
            },
            uncertainty: if value.is_some() { 0.2 } else { 1.0 },
            points_used: u32::from(value.is_some()),
            mean_distance_km: value.map(|_| 10.0),
            idw: value,
            barycentric: None,
        }
    }

    #[test]
    fn upsert_replaces_same_timestamp() {
        let mut store = EstimateStore::default();
        store.upsert(estimate("d1", 0, Some(10.0)));
        store.upsert(estimate("d1", 0, Some(20.0)));
        store.upsert(estimate("d1", 3, None));

        let series: Vec<_> = store.series("d1").collect();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].concentration, Some(20.0));
        assert_eq!(series[1].concentration, None);
        assert_eq!(store.series("missing").count(), 0);
    }

    #[test]
    fn has_timestamp_and_len() {
        let mut store = EstimateStore::default();
        store.upsert_many([estimate("d2", 6, Some(1.0)), estimate("d1", 3, Some(1.0))]);
        assert!(store.has_timestamp(at(6)));
        assert!(!store.has_timestamp(at(0)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn save_and_load_keeps_absent_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("estimates.msgpack");

        let mut store = EstimateStore::default();
        store.upsert_many([estimate("d1", 0, Some(12.5)), estimate("d1", 3, None)]);
        store.save(&path).unwrap();

        let loaded = EstimateStore::load(&path).unwrap();
        let series: Vec<_> = loaded.series("d1").cloned().collect();
        assert_eq!(series, store.series("d1").cloned().collect::<Vec<_>>());
        assert_eq!(series[1].method, EstimateMethod::Failed);
    }
}
