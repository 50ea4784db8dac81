//! Pure state transitions.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use dustwatch_cumulative_models::{
    CumulativeConfig, CumulativeState, FoldOutcome, PeriodBucket, STATE_VERSION, SourceBatch,
    SourceRecord,
};
use dustwatch_grid_models::PointKey;

use crate::CumulativeError;

/// Folds one source into `state`.
///
/// A source whose content hash is already recorded is a no-op, whatever
/// identity it arrives under. A known identity with a new hash is an
/// error: the state cannot subtract the old contents, so the caller must
/// [`replay`] instead.
///
/// Every in-region sample adds to each of its period buckets. The source's
/// per-`(point, date)` daily maxima are recorded only for dates not already
/// present, so a day split across files keeps the first file's maximum.
///
/// # Errors
///
/// Returns [`CumulativeError::VersionMismatch`] for a state of another
/// layout version, or [`CumulativeError::SourceChanged`] as above.
pub fn fold(
    state: CumulativeState,
    batch: &SourceBatch,
    config: &CumulativeConfig,
    now: DateTime<Utc>,
) -> Result<(CumulativeState, FoldOutcome), CumulativeError> {
    if check_source(&state, batch)? {
        log::info!("Source {} already folded, skipping", batch.identity);
        return Ok((state, FoldOutcome::AlreadyFolded));
    }
    Ok(apply_source(state, batch, config, now))
}

/// Validates `batch` against `state` without changing it.
///
/// Returns `Ok(true)` when the batch's content is already folded.
///
/// # Errors
///
/// See [`fold`].
pub fn check_source(state: &CumulativeState, batch: &SourceBatch) -> Result<bool, CumulativeError> {
    if state.version != STATE_VERSION {
        return Err(CumulativeError::VersionMismatch {
            found: state.version,
            expected: STATE_VERSION,
        });
    }

    if state.has_hash(&batch.content_hash) {
        return Ok(true);
    }

    if let Some(previous) = state.sources.get(&batch.identity) {
        return Err(CumulativeError::SourceChanged {
            identity: batch.identity.clone(),
            previous: previous.content_hash.clone(),
            current: batch.content_hash.clone(),
        });
    }

    Ok(false)
}

/// Applies a batch that [`check_source`] accepted as new.
pub(crate) fn apply_source(
    mut state: CumulativeState,
    batch: &SourceBatch,
    config: &CumulativeConfig,
    now: DateTime<Utc>,
) -> (CumulativeState, FoldOutcome) {
    let mut applied = 0_u64;
    let mut skipped = 0_u64;
    let mut file_max: BTreeMap<(PointKey, NaiveDate), f64> = BTreeMap::new();

    for sample in &batch.samples {
        if !sample.concentration.is_finite()
            || !config.region.contains(sample.latitude, sample.longitude)
        {
            skipped += 1;
            continue;
        }

        let key = sample.point_key();
        for bucket in PeriodBucket::for_timestamp(sample.timestamp) {
            state
                .accumulators
                .entry(bucket)
                .or_default()
                .entry(key)
                .or_default()
                .add(sample.concentration);
        }

        file_max
            .entry((key, sample.timestamp.date_naive()))
            .and_modify(|m| *m = m.max(sample.concentration))
            .or_insert(sample.concentration);
        applied += 1;
    }

    let mut new_days = 0_u64;
    for ((key, date), max) in file_max {
        let days = state
            .daily_max
            .entry(date.year())
            .or_default()
            .entry(key)
            .or_default();
        if let Entry::Vacant(slot) = days.entry(date) {
            slot.insert(max);
            new_days += 1;
        }
    }

    state.sources.insert(
        batch.identity.clone(),
        SourceRecord {
            content_hash: batch.content_hash.clone(),
            folded_at: now,
            samples: applied,
        },
    );
    state.last_updated = Some(now);

    log::info!(
        "Folded {}: {applied} samples, {skipped} skipped, {new_days} new daily maxima",
        batch.identity
    );

    (
        state,
        FoldOutcome::Folded {
            applied,
            skipped,
            new_days,
        },
    )
}

/// Rebuilds state from scratch by folding `sources` in order.
///
/// # Errors
///
/// Returns [`CumulativeError::SourceChanged`] if two sources share an
/// identity but differ in content.
pub fn replay<'a>(
    sources: impl IntoIterator<Item = &'a SourceBatch>,
    config: &CumulativeConfig,
    now: DateTime<Utc>,
) -> Result<(CumulativeState, Vec<FoldOutcome>), CumulativeError> {
    let mut state = CumulativeState::default();
    let mut outcomes = Vec::new();
    for batch in sources {
        let (next, outcome) = fold(state, batch, config, now)?;
        state = next;
        outcomes.push(outcome);
    }
    Ok((state, outcomes))
}

/// Share of days whose maximum exceeds `threshold`, in percent with one
/// decimal. `None` when no days are recorded.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn exceedance_percent<'a>(
    daily_maxima: impl IntoIterator<Item = &'a f64>,
    threshold: f64,
) -> Option<f64> {
    let (days, over) = daily_maxima
        .into_iter()
        .fold((0_usize, 0_usize), |(days, over), &max| {
            (days + 1, over + usize::from(max > threshold))
        });
    (days > 0).then(|| (over as f64 / days as f64 * 1000.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dustwatch_grid_models::GridSample;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn sample(y: i32, mo: u32, d: u32, h: u32, value: f64) -> GridSample {
        let ts = Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap();
        GridSample::new(33.0, 44.0, value, ts, "src")
    }

    fn batch(identity: &str, hash: &str, samples: Vec<GridSample>) -> SourceBatch {
        SourceBatch {
            identity: identity.to_string(),
            content_hash: hash.to_string(),
            samples,
        }
    }

    #[test]
    fn folds_every_bucket() {
        let config = CumulativeConfig::default();
        let b = batch(
            "2023.csv",
            "h1",
            vec![sample(2023, 7, 1, 0, 100.0), sample(2023, 7, 1, 3, 200.0)],
        );
        let (state, outcome) = fold(CumulativeState::default(), &b, &config, now()).unwrap();

        assert_eq!(
            outcome,
            FoldOutcome::Folded {
                applied: 2,
                skipped: 0,
                new_days: 1
            }
        );
        let key = PointKey::from_coords(33.0, 44.0);
        for bucket in PeriodBucket::for_timestamp(Utc.with_ymd_and_hms(2023, 7, 1, 0, 0, 0).unwrap()) {
            let acc = state.bucket(bucket).unwrap()[&key];
            assert_eq!(acc.count, 2);
            assert_eq!(acc.mean(), Some(150.0));
        }
        assert_eq!(state.daily_max[&2023][&key][&NaiveDate::from_ymd_opt(2023, 7, 1).unwrap()], 200.0);
        assert_eq!(state.processed_years(), vec![2023]);
        assert_eq!(state.total_measurements(), 2);
    }

    #[test]
    fn refolding_same_hash_is_noop() {
        let config = CumulativeConfig::default();
        let b = batch("2023.csv", "h1", vec![sample(2023, 7, 1, 0, 100.0)]);
        let (once, _) = fold(CumulativeState::default(), &b, &config, now()).unwrap();

        let renamed = batch("copy_of_2023.csv", "h1", b.samples.clone());
        let (twice, outcome) = fold(once.clone(), &renamed, &config, now()).unwrap();
        assert_eq!(outcome, FoldOutcome::AlreadyFolded);
        assert_eq!(twice, once);
    }

    #[test]
    fn changed_content_under_same_identity_is_rejected() {
        let config = CumulativeConfig::default();
        let (state, _) = fold(
            CumulativeState::default(),
            &batch("2023.csv", "h1", vec![sample(2023, 7, 1, 0, 100.0)]),
            &config,
            now(),
        )
        .unwrap();
        let err = fold(
            state,
            &batch("2023.csv", "h2", vec![sample(2023, 7, 1, 0, 500.0)]),
            &config,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, CumulativeError::SourceChanged { .. }));
    }

    #[test]
    fn order_of_distinct_sources_does_not_matter() {
        let config = CumulativeConfig::default();
        let a = batch("a", "ha", vec![sample(2022, 1, 5, 0, 40.0), sample(2022, 1, 6, 0, 90.0)]);
        let b = batch("b", "hb", vec![sample(2023, 4, 2, 0, 300.0)]);

        let (ab, _) = replay([&a, &b], &config, now()).unwrap();
        let (ba, _) = replay([&b, &a], &config, now()).unwrap();
        assert_eq!(ab.accumulators, ba.accumulators);
        assert_eq!(ab.daily_max, ba.daily_max);
    }

    #[test]
    fn existing_daily_max_is_not_overwritten() {
        let config = CumulativeConfig::default();
        let first = batch("a", "ha", vec![sample(2023, 3, 1, 0, 50.0)]);
        let second = batch("b", "hb", vec![sample(2023, 3, 1, 12, 400.0)]);

        let (state, outcomes) = replay([&first, &second], &config, now()).unwrap();
        let key = PointKey::from_coords(33.0, 44.0);
        let date = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        assert_eq!(state.daily_max[&2023][&key][&date], 50.0);
        assert_eq!(
            outcomes[1],
            FoldOutcome::Folded {
                applied: 1,
                skipped: 0,
                new_days: 0
            }
        );
        // Means still see both samples.
        assert_eq!(state.bucket(PeriodBucket::LongTerm).unwrap()[&key].count, 2);
    }

    #[test]
    fn samples_outside_region_are_skipped() {
        let config = CumulativeConfig::default();
        let mut outside = sample(2023, 3, 1, 0, 50.0);
        outside.latitude = 45.0;
        let mut nan = sample(2023, 3, 1, 0, 50.0);
        nan.concentration = f64::NAN;

        let (state, outcome) = fold(
            CumulativeState::default(),
            &batch("a", "ha", vec![outside, nan, sample(2023, 3, 1, 0, 70.0)]),
            &config,
            now(),
        )
        .unwrap();
        assert_eq!(
            outcome,
            FoldOutcome::Folded {
                applied: 1,
                skipped: 2,
                new_days: 1
            }
        );
        assert_eq!(state.total_measurements(), 1);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let state = CumulativeState {
            version: STATE_VERSION + 1,
            ..CumulativeState::default()
        };
        let err = fold(state, &batch("a", "ha", vec![]), &CumulativeConfig::default(), now()).unwrap_err();
        assert!(matches!(err, CumulativeError::VersionMismatch { .. }));
    }

    #[test]
    fn exceedance_rounds_to_one_decimal() {
        let maxima = [80.0, 120.0, 310.0];
        assert_eq!(exceedance_percent(&maxima, 150.0), Some(33.3));
        assert_eq!(exceedance_percent(&maxima, 300.0), Some(33.3));
        assert_eq!(exceedance_percent(&maxima, 100.0), Some(66.7));
        assert_eq!(exceedance_percent(&[], 100.0), None);
        // Equal to the threshold does not exceed it.
        assert_eq!(exceedance_percent(&[150.0], 150.0), Some(0.0));
    }
}
