//! Exceedance evaluation of a single measurement against resolved thresholds.
//!
//! Two properties do not follow plain bound comparison:
//! - mold-risk level alerts only at level 2, whatever the materials declare
//! - CO₂ falls back to a fixed 600 ppm ceiling when no material bounds it

use crate::models::{ExceededBound, Exceedance, Measurement, Property, Thresholds};

/// Mold-risk level that raises an alert.
pub const MOLD_RISK_HIGH: f64 = 2.0;

/// Threshold reported on mold-risk alerts.
pub const MOLD_RISK_THRESHOLD: f64 = 1.0;

/// CO₂ ceiling (ppm) used when no material declares a CO₂ bound.
pub const CO2_FALLBACK_UPPER: f64 = 600.0;

// ---

/// Return every exceedance in `measurement`, one per violated property.
pub fn find_exceedances(measurement: &Measurement, thresholds: &Thresholds) -> Vec<Exceedance> {
    // ---
    Property::ALL
        .into_iter()
        .filter_map(|property| {
            let value = measurement.value(property)?;
            check_property(property, value, thresholds)
        })
        .collect()
}

fn check_property(property: Property, value: f64, thresholds: &Thresholds) -> Option<Exceedance> {
    // ---
    let bounds = thresholds.get(property);

    match property {
        Property::MoldRiskLevel => (value == MOLD_RISK_HIGH).then_some(Exceedance {
            property,
            direction: ExceededBound::Upper,
            value,
            threshold_value: MOLD_RISK_THRESHOLD,
        }),
        Property::Co2 if bounds.is_unbounded() => (value > CO2_FALLBACK_UPPER).then_some(Exceedance {
            property,
            direction: ExceededBound::Upper,
            value,
            threshold_value: CO2_FALLBACK_UPPER,
        }),
        _ => {
            if let Some(lower) = bounds.lower.filter(|lower| value < *lower) {
                return Some(Exceedance {
                    property,
                    direction: ExceededBound::Lower,
                    value,
                    threshold_value: lower,
                });
            }
            bounds
                .upper
                .filter(|upper| value > *upper)
                .map(|upper| Exceedance {
                    property,
                    direction: ExceededBound::Upper,
                    value,
                    threshold_value: upper,
                })
        }
    }
}
