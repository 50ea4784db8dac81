//! Calendar-period medians of a canonical series.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use dustwatch_temporal_models::{HistoryGranularity, HistoryPoint};

use crate::series::CanonicalSeries;

/// Period label for `t` at the given granularity.
#[must_use]
pub fn period_label(t: DateTime<Utc>, granularity: HistoryGranularity) -> String {
    match granularity {
        HistoryGranularity::Daily => t.format("%Y-%m-%d").to_string(),
        HistoryGranularity::Weekly => {
            let week = t.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        HistoryGranularity::Monthly => t.format("%Y-%m").to_string(),
    }
}

/// Median of `values`; the mean of the two middle values for even counts.
///
/// Returns `None` for an empty slice.
#[must_use]
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        f64::midpoint(values[mid - 1], values[mid])
    } else {
        values[mid]
    })
}

/// Groups the series by calendar period and takes the median of each.
///
/// Periods are returned in chronological order.
#[must_use]
pub fn aggregate(series: &CanonicalSeries, granularity: HistoryGranularity) -> Vec<HistoryPoint> {
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (t, v) in series.iter() {
        groups.entry(period_label(t, granularity)).or_default().push(v);
    }

    groups
        .into_iter()
        .filter_map(|(period, mut values)| {
            let count = values.len();
            median(&mut values).map(|median| HistoryPoint {
                period,
                median,
                count,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::Cadence;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn labels() {
        let t = at(2025, 1, 1, 6);
        assert_eq!(period_label(t, HistoryGranularity::Daily), "2025-01-01");
        assert_eq!(period_label(t, HistoryGranularity::Weekly), "2025-W01");
        assert_eq!(period_label(t, HistoryGranularity::Monthly), "2025-01");
        // ISO week year differs from the calendar year.
        assert_eq!(
            period_label(at(2024, 12, 30, 0), HistoryGranularity::Weekly),
            "2025-W01"
        );
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn daily_and_monthly_medians() {
        let series = CanonicalSeries::from_rows(
            [
                (at(2025, 3, 1, 0), Some(10.0)),
                (at(2025, 3, 1, 3), Some(30.0)),
                (at(2025, 3, 1, 6), Some(20.0)),
                (at(2025, 3, 2, 0), Some(100.0)),
                (at(2025, 4, 1, 0), Some(5.0)),
            ],
            Cadence::default(),
        );

        let daily = aggregate(&series, HistoryGranularity::Daily);
        assert_eq!(daily.len(), 3);
        assert_eq!(daily[0].period, "2025-03-01");
        assert!((daily[0].median - 20.0).abs() < 1e-9);
        assert_eq!(daily[0].count, 3);

        let monthly = aggregate(&series, HistoryGranularity::Monthly);
        assert_eq!(monthly.len(), 2);
        assert!((monthly[0].median - 25.0).abs() < 1e-9);
        assert_eq!(monthly[1].period, "2025-04");
    }
}
