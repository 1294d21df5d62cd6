//! Value descriptors
//!
//! Maps a primary value in `[0, 1]` to a discrete, human-readable bucket.
//! Buckets are evaluated low to high; each lower bound is inclusive, and the
//! final bucket also includes 1.0. Values outside `[0, 1]` are clamped first, so
//! every function here is total.

use crate::types::{clamp_unit, Scale};

/// `(upper bound, label)`, ascending. The last entry is the closed tail.
const OVERLAP_BUCKETS: [(f64, &str); 5] = [
    (0.2, "Distant"),
    (0.5, "Separate"),
    (0.75, "Close"),
    (0.95, "Connected"),
    (f64::INFINITY, "Merged"),
];

const PROXIMITY_BUCKETS: [(f64, &str); 6] = [
    (0.15, "Very Distant"),
    (0.35, "Distant"),
    (0.55, "Moderate"),
    (0.75, "Close"),
    (0.95, "Very Close"),
    (f64::INFINITY, "Touching"),
];

// Keyed identically to PROXIMITY_BUCKETS.
const PROXIMITY_DESCRIPTIONS: [&str; 6] = [
    "You feel very far apart from this person.",
    "You feel somewhat distant from this person.",
    "You feel a moderate connection with this person.",
    "You feel close to this person.",
    "You feel very close to this person.",
    "You feel inseparable from this person.",
];

fn bucket_index(buckets: &[(f64, &str)], value: f64) -> usize {
    // NaN fails every comparison; treat it as the lowest bucket.
    if value.is_nan() {
        return 0;
    }
    let value = clamp_unit(value);
    buckets
        .iter()
        .position(|(upper, _)| value < *upper)
        .unwrap_or(buckets.len() - 1)
}

/// Label for a circle-overlap value (Basic/Advanced)
pub fn overlap_label(value: f64) -> &'static str {
    OVERLAP_BUCKETS[bucket_index(&OVERLAP_BUCKETS, value)].1
}

/// Label for a proximity value
pub fn proximity_label(value: f64) -> &'static str {
    PROXIMITY_BUCKETS[bucket_index(&PROXIMITY_BUCKETS, value)].1
}

/// Companion sentence for a proximity value
pub fn proximity_description(value: f64) -> &'static str {
    PROXIMITY_DESCRIPTIONS[bucket_index(&PROXIMITY_BUCKETS, value)]
}

/// Label for a value on the given scale
pub fn label_for(scale: Scale, value: f64) -> &'static str {
    match scale {
        Scale::Overlap => overlap_label(value),
        Scale::Proximity => proximity_label(value),
    }
}

/// All labels of a scale, low to high
pub fn labels(scale: Scale) -> Vec<&'static str> {
    match scale {
        Scale::Overlap => OVERLAP_BUCKETS.iter().map(|(_, l)| *l).collect(),
        Scale::Proximity => PROXIMITY_BUCKETS.iter().map(|(_, l)| *l).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_boundaries() {
        assert_eq!(overlap_label(0.0), "Distant");
        assert_eq!(overlap_label(0.1999), "Distant");
        assert_eq!(overlap_label(0.2), "Separate");
        assert_eq!(overlap_label(0.4999), "Separate");
        assert_eq!(overlap_label(0.5), "Close");
        assert_eq!(overlap_label(0.7499), "Close");
        assert_eq!(overlap_label(0.75), "Connected");
        assert_eq!(overlap_label(0.9499), "Connected");
        assert_eq!(overlap_label(0.95), "Merged");
        assert_eq!(overlap_label(1.0), "Merged");
    }

    #[test]
    fn test_proximity_boundaries() {
        assert_eq!(proximity_label(0.0), "Very Distant");
        assert_eq!(proximity_label(0.1499), "Very Distant");
        assert_eq!(proximity_label(0.15), "Distant");
        assert_eq!(proximity_label(0.35), "Moderate");
        assert_eq!(proximity_label(0.5499), "Moderate");
        assert_eq!(proximity_label(0.55), "Close");
        assert_eq!(proximity_label(0.75), "Very Close");
        assert_eq!(proximity_label(0.95), "Touching");
        assert_eq!(proximity_label(1.0), "Touching");
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(overlap_label(-2.0), "Distant");
        assert_eq!(overlap_label(3.0), "Merged");
        assert_eq!(proximity_label(f64::NAN), "Very Distant");
        assert_eq!(proximity_label(f64::INFINITY), "Touching");
    }

    #[test]
    fn test_descriptions_follow_labels() {
        assert_eq!(
            proximity_description(0.0),
            "You feel very far apart from this person."
        );
        assert_eq!(
            proximity_description(0.6),
            "You feel close to this person."
        );
        assert_eq!(
            proximity_description(0.99),
            "You feel inseparable from this person."
        );
    }

    #[test]
    fn test_label_for_scale() {
        assert_eq!(label_for(Scale::Overlap, 0.6), "Close");
        assert_eq!(label_for(Scale::Proximity, 0.6), "Close");
        assert_eq!(label_for(Scale::Proximity, 0.2), "Distant");
        assert_eq!(labels(Scale::Overlap).len(), 5);
        assert_eq!(labels(Scale::Proximity).len(), 6);
    }
}
