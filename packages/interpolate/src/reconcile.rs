//! Combines the two interpolation outputs into one estimate.

use dustwatch_interpolate_models::{EstimateMethod, InterpolationConfig};

/// A reconciled value with its provenance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciled {
    pub concentration: Option<f64>,
    pub method: EstimateMethod,
    pub uncertainty: f64,
}

/// Reconciles an IDW and a barycentric result.
///
/// When both exist the mean is taken and the uncertainty is their absolute
/// difference relative to that mean (floored at one), capped at one.
/// A single method yields its value with a fixed penalty. Neither yields
/// no value with full uncertainty.
#[must_use]
pub fn reconcile(idw: Option<f64>, barycentric: Option<f64>, config: &InterpolationConfig) -> Reconciled {
    match (idw, barycentric) {
        (Some(i), Some(b)) => {
            let mean = (i + b) / 2.0;
            Reconciled {
                concentration: Some(mean),
                method: EstimateMethod::Both,
                uncertainty: ((i - b).abs() / mean.max(1.0)).min(1.0),
            }
        }
        (Some(i), None) => Reconciled {
            concentration: Some(i),
            method: EstimateMethod::Idw,
            uncertainty: config.idw_only_uncertainty,
        },
        (None, Some(b)) => Reconciled {
            concentration: Some(b),
            method: EstimateMethod::Barycentric,
            uncertainty: config.barycentric_only_uncertainty,
        },
        (None, None) => Reconciled {
            concentration: None,
            method: EstimateMethod::Failed,
            uncertainty: 1.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_methods_are_averaged() {
        let r = reconcile(Some(120.0), Some(140.0), &InterpolationConfig::default());
        assert_eq!(r.method, EstimateMethod::Both);
        assert!((r.concentration.unwrap() - 130.0).abs() < 1e-9);
        assert!((r.uncertainty - 20.0 / 130.0).abs() < 1e-9);

        // Disagreement only raises the uncertainty.
        let far = reconcile(Some(10.0), Some(500.0), &InterpolationConfig::default());
        assert_eq!(far.method, EstimateMethod::Both);
        assert!((far.concentration.unwrap() - 255.0).abs() < 1e-9);
        assert!((far.uncertainty - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn low_values_use_unit_floor() {
        let r = reconcile(Some(0.0), Some(0.4), &InterpolationConfig::default());
        assert!((r.uncertainty - 0.4).abs() < 1e-9);
    }

    #[test]
    fn uncertainty_is_capped() {
        let r = reconcile(Some(0.0), Some(10.0), &InterpolationConfig::default());
        assert!((r.uncertainty - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn single_method_penalties() {
        let config = InterpolationConfig::default();
        let idw = reconcile(Some(50.0), None, &config);
        assert_eq!(idw.method, EstimateMethod::Idw);
        assert_eq!(idw.concentration, Some(50.0));
        assert!((idw.uncertainty - 0.2).abs() < f64::EPSILON);

        let bary = reconcile(None, Some(70.0), &config);
        assert_eq!(bary.method, EstimateMethod::Barycentric);
        assert!((bary.uncertainty - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn failure_is_absent_not_zero() {
        let r = reconcile(None, None, &InterpolationConfig::default());
        assert_eq!(r.method, EstimateMethod::Failed);
        assert_eq!(r.concentration, None);
        assert!((r.uncertainty - 1.0).abs() < f64::EPSILON);
    }
}
