//! Threshold resolution: the most restrictive bound across an artifact's
//! materials wins.

use std::collections::BTreeMap;

use crate::models::{Artifact, Bounds, Property, Thresholds};

// ---

/// Resolve the effective bounds of every property for `artifact`.
///
/// lower = max of all declared material lowers, upper = min of all declared
/// material uppers. A side no material declares stays `None`. An artifact
/// without materials resolves to fully unbounded thresholds.
pub fn resolve_thresholds(artifact: &Artifact) -> Thresholds {
    // ---
    let mut resolved = BTreeMap::new();

    for property in Property::ALL {
        let bounds = artifact
            .materials
            .iter()
            .map(|m| m.bounds_for(property))
            .fold(Bounds::default(), |acc, b| Bounds {
                lower: stricter(acc.lower, b.lower, f64::max),
                upper: stricter(acc.upper, b.upper, f64::min),
            });
        resolved.insert(property, bounds);
    }

    Thresholds(resolved)
}

fn stricter(a: Option<f64>, b: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    // ---
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}
