#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-district alert payloads.
//!
//! Combines the rolling and forecast resolver with the classifier: each
//! district's estimate series is resolved at the reference time, the
//! current value is converted to an AQI, the 24-hour mean is checked for
//! compliance, and the alert level is taken from the longest non-empty
//! rolling window.

use chrono::{DateTime, Utc};
use dustwatch_alerts_models::{
    AlertLevel, AlertReport, AqiSummary, ComplianceSummary, DistrictAlert, Pm10Summary,
    ReportMetadata, SkippedDistrict,
};
use dustwatch_classify::{COMPLIANCE_WINDOW_HOURS, ClassifierConfig, aqi, category};
use dustwatch_grid_models::District;
use dustwatch_interpolate_models::DistrictEstimate;
use dustwatch_temporal::{Cadence, CanonicalSeries, Resolver, TemporalError};
use dustwatch_temporal_models::{RollingRecord, TemporalConfig};

/// Builds a canonical series from stored estimates.
///
/// Failed estimates carry no concentration and are left out.
pub fn series_from_estimates<'a>(
    estimates: impl IntoIterator<Item = &'a DistrictEstimate>,
    cadence: Cadence,
) -> CanonicalSeries {
    CanonicalSeries::from_rows(
        estimates
            .into_iter()
            .map(|e| (e.timestamp, e.concentration)),
        cadence,
    )
}

/// Turns resolved series into alert payloads.
pub struct AlertBuilder {
    resolver: Resolver,
    temporal: TemporalConfig,
    classifier: ClassifierConfig,
}

impl AlertBuilder {
    /// # Errors
    ///
    /// Returns [`TemporalError::InvalidCadence`] for a bad cadence.
    pub fn new(temporal: &TemporalConfig, classifier: &ClassifierConfig) -> Result<Self, TemporalError> {
        Ok(Self {
            resolver: Resolver::new(temporal)?,
            temporal: temporal.clone(),
            classifier: classifier.clone(),
        })
    }

    #[must_use]
    pub const fn cadence(&self) -> Cadence {
        self.resolver.cadence()
    }

    /// Classifies an already-resolved record.
    #[must_use]
    pub fn classify(&self, district: &District, record: RollingRecord) -> DistrictAlert {
        let current_aqi = aqi(record.current.value);
        let mean_24h = record
            .window(COMPLIANCE_WINDOW_HOURS)
            .and_then(|w| w.mean);

        let basis_aqi = aqi(record.basis.value);
        let alert = AlertLevel {
            level: category(basis_aqi),
            based_on: record.basis.label(),
            value: record.basis.value,
            aqi: basis_aqi,
            dust_storm: self
                .classifier
                .is_dust_storm(record.current.value, current_aqi),
        };

        DistrictAlert {
            district_id: district.id.clone(),
            district_name: district.name.clone(),
            province_name: district.parent_region_name.clone(),
            latitude: district.centroid_lat,
            longitude: district.centroid_lon,
            pm10: Pm10Summary {
                now: record.current.value,
                now_time: record.current.timestamp,
                now_source: record.current.source,
                windows: record.windows,
            },
            aqi: AqiSummary {
                value: current_aqi,
                category: category(current_aqi),
            },
            compliance: ComplianceSummary {
                status: self.classifier.compliance(mean_24h),
                limit_24h_ug_m3: self.classifier.compliance_limit,
                mean_24h,
            },
            alert,
            forecasts: record.forecasts,
        }
    }

    /// Resolves and classifies one district.
    ///
    /// # Errors
    ///
    /// Returns [`TemporalError::NoSuitableData`] when the series has nothing
    /// usable at the reference time.
    pub fn district_alert(
        &self,
        district: &District,
        series: &CanonicalSeries,
        reference: DateTime<Utc>,
    ) -> Result<DistrictAlert, TemporalError> {
        let record = self.resolver.resolve(&district.id, series, reference)?;
        Ok(self.classify(district, record))
    }

    /// Builds the report for every district.
    ///
    /// Districts without suitable data are listed under `skipped` rather
    /// than failing the run.
    pub fn report(
        &self,
        districts: &[District],
        series_for: impl Fn(&District) -> CanonicalSeries,
        reference: DateTime<Utc>,
        generated_at: DateTime<Utc>,
    ) -> AlertReport {
        let mut alerts = Vec::with_capacity(districts.len());
        let mut skipped = Vec::new();

        for district in districts {
            match self.district_alert(district, &series_for(district), reference) {
                Ok(alert) => alerts.push(alert),
                Err(e) => {
                    log::warn!("Skipping district {}: {e}", district.id);
                    skipped.push(SkippedDistrict {
                        district_id: district.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Built alerts for {} districts ({} skipped)",
            alerts.len(),
            skipped.len()
        );

        AlertReport {
            metadata: ReportMetadata {
                generated_at,
                reference_time: self.cadence().normalize(reference),
                rolling_windows_hours: self.temporal.windows_hours.clone(),
                forecast_windows_hours: self.temporal.forecast_horizons_hours.clone(),
                data_resolution_hours: self.temporal.cadence_hours,
                compliance_limit_ug_m3: self.classifier.compliance_limit,
                aqi_calculation: "US EPA PM10 breakpoints".to_string(),
            },
            districts: alerts,
            skipped,
        }
    }

    /// Districts in `current` whose subscribers should be told.
    ///
    /// A district is due during a dust storm or when its level differs from
    /// its level in `previous`. Districts missing from `previous` are due.
    #[must_use]
    pub fn to_notify<'a>(
        &self,
        previous: Option<&AlertReport>,
        current: &'a AlertReport,
    ) -> Vec<&'a DistrictAlert> {
        let last_level = |id: &str| {
            previous.and_then(|p| {
                p.districts
                    .iter()
                    .find(|d| d.district_id == id)
                    .map(|d| d.alert.level)
            })
        };

        current
            .districts
            .iter()
            .filter(|d| {
                self.classifier.should_notify(
                    last_level(&d.district_id),
                    d.alert.level,
                    d.pm10.now,
                    d.aqi.value,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dustwatch_classify::{AqiCategory, Compliance};
    use dustwatch_interpolate_models::EstimateMethod;
    use dustwatch_temporal_models::DataSource;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, m, 0).unwrap()
    }

    fn district(id: &str) -> District {
        District {
            id: id.to_string(),
            name: format!("{id} name"),
            parent_region_id: "p1".to_string(),
            parent_region_name: "Province".to_string(),
            centroid_lat: 33.0,
            centroid_lon: 44.0,
        }
    }

    fn estimate(h: u32, value: Option<f64>) -> DistrictEstimate {
        DistrictEstimate {
            district_id: "d1".to_string(),
            timestamp: at(10, h, 0),
            concentration: value,
            method: if value.is_some() {
                EstimateMethod::Both
            } else {
                EstimateMethod::Failed
            },
            uncertainty: 0.0,
            points_used: 4,
            mean_distance_km: Some(12.0),
            idw: value,
            barycentric: value,
        }
    }

    fn day_series() -> CanonicalSeries {
        let estimates: Vec<DistrictEstimate> = [40.0, 60.0, 80.0, 100.0, 120.0, 140.0, 160.0, 180.0]
            .iter()
            .zip((0..24).step_by(3))
            .map(|(&v, h)| estimate(h, Some(v)))
            .collect();
        series_from_estimates(&estimates, Cadence::default())
    }

    fn builder() -> AlertBuilder {
        AlertBuilder::new(&TemporalConfig::default(), &ClassifierConfig::default()).unwrap()
    }

    #[test]
    fn failed_estimates_are_not_zero() {
        let series = series_from_estimates(&[estimate(0, None), estimate(3, Some(50.0))], Cadence::default());
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn district_alert_uses_24h_mean_for_level() {
        let alert = builder()
            .district_alert(&district("d1"), &day_series(), at(10, 13, 40))
            .unwrap();

        assert!((alert.pm10.now - 140.0).abs() < 1e-9);
        assert_eq!(alert.pm10.now_source, DataSource::Exact);
        assert_eq!(alert.aqi.value, 93);
        assert_eq!(alert.aqi.category, AqiCategory::Moderate);

        assert_eq!(alert.alert.based_on, "24h_mean");
        assert!((alert.alert.value - 90.0).abs() < 1e-9);
        assert_eq!(alert.alert.aqi, 68);
        assert_eq!(alert.alert.level, AqiCategory::Moderate);
        assert!(!alert.alert.dust_storm);

        assert_eq!(alert.compliance.status, Compliance::WithinLimit);
        assert_eq!(alert.compliance.mean_24h, Some(90.0));
        assert_eq!(alert.province_name, "Province");
    }

    #[test]
    fn dust_storm_from_current_value() {
        let estimates = vec![estimate(12, Some(20.0)), estimate(15, Some(650.0))];
        let series = series_from_estimates(&estimates, Cadence::default());
        let alert = builder().district_alert(&district("d1"), &series, at(10, 15, 0)).unwrap();

        assert_eq!(alert.aqi.value, dustwatch_classify::AQI_BEYOND_INDEX);
        assert_eq!(alert.aqi.category, AqiCategory::Hazardous);
        assert!(alert.alert.dust_storm);
        // 24h mean of 20 and 650 is 335, AQI 191.
        assert_eq!(alert.compliance.status, Compliance::ExceedsLimit);
        assert_eq!(alert.alert.aqi, 191);
        assert_eq!(alert.alert.level, AqiCategory::Unhealthy);
    }

    #[test]
    fn report_skips_districts_without_data() {
        let districts = vec![district("d1"), district("empty")];
        let report = builder().report(
            &districts,
            |d| {
                if d.id == "d1" {
                    day_series()
                } else {
                    CanonicalSeries::default()
                }
            },
            at(10, 13, 40),
            at(10, 14, 0),
        );

        assert_eq!(report.districts.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].district_id, "empty");
        assert_eq!(report.metadata.reference_time, at(10, 15, 0));
        assert_eq!(report.metadata.data_resolution_hours, 3);
    }

    #[test]
    fn notifies_on_first_alert_and_level_change_only() {
        let districts = vec![district("d1")];
        let b = builder();
        let first = b.report(&districts, |_| day_series(), at(10, 13, 40), at(10, 14, 0));
        assert_eq!(b.to_notify(None, &first).len(), 1);

        let repeat = b.report(&districts, |_| day_series(), at(10, 13, 40), at(10, 14, 0));
        assert!(b.to_notify(Some(&first), &repeat).is_empty());

        let mut changed = repeat.clone();
        changed.districts[0].alert.level = AqiCategory::Unhealthy;
        assert_eq!(b.to_notify(Some(&first), &changed).len(), 1);
    }
}
