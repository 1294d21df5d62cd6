//! Reset behavior
//!
//! Decides which slider position is shown after each save (and when a
//! measurement screen opens). The active behavior is a single process-wide
//! setting; callers read it at the moment a new position is needed.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::types::{Modality, SliderPosition};

/// Overlap default for Basic/Advanced
pub const DEFAULT_OVERLAP: f64 = 0.5;
/// Proximity default (figures far apart)
pub const DEFAULT_PROXIMITY: f64 = 0.0;
/// Default relative circle size (Advanced)
pub const DEFAULT_SCALE: f64 = 1.0;

/// Random range for the overlap value (Basic/Advanced)
pub const RANDOM_OVERLAP_RANGE: RangeInclusive<f64> = 0.2..=0.8;
/// Random range for the Advanced self/other scales
pub const RANDOM_SCALE_RANGE: RangeInclusive<f64> = 0.7..=1.3;
/// Random range for the proximity value
pub const RANDOM_PROXIMITY_RANGE: RangeInclusive<f64> = 0.0..=0.8;

/// Policy for the next starting slider position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResetBehavior {
    /// Restore the last saved position for the modality
    KeepPosition,
    /// Return to the modality default
    #[default]
    ResetToDefault,
    /// Sample uniformly inside a modality-specific sub-range
    RandomPosition,
}

impl ResetBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetBehavior::KeepPosition => "keepPosition",
            ResetBehavior::ResetToDefault => "resetToDefault",
            ResetBehavior::RandomPosition => "randomPosition",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "keepposition" | "keep_position" | "keep" => Some(ResetBehavior::KeepPosition),
            "resettodefault" | "reset_to_default" | "default" => {
                Some(ResetBehavior::ResetToDefault)
            }
            "randomposition" | "random_position" | "random" => {
                Some(ResetBehavior::RandomPosition)
            }
            _ => None,
        }
    }

    /// Next value for a single field
    pub fn next_value<R: Rng>(
        &self,
        last_value: f64,
        default: f64,
        random_range: RangeInclusive<f64>,
        rng: &mut R,
    ) -> f64 {
        match self {
            ResetBehavior::KeepPosition => last_value,
            ResetBehavior::ResetToDefault => default,
            ResetBehavior::RandomPosition => rng.gen_range(random_range),
        }
    }

    /// Next slider position for a modality.
    ///
    /// `last` is the last saved position for that modality; with no history,
    /// `KeepPosition` falls back to the default. Each field is sampled
    /// independently under `RandomPosition`.
    pub fn next_position<R: Rng>(
        &self,
        modality: Modality,
        last: Option<&SliderPosition>,
        rng: &mut R,
    ) -> SliderPosition {
        let defaults = default_position(modality);
        let last = last.copied().unwrap_or(defaults);

        let value = self.next_value(
            last.value,
            defaults.value,
            random_value_range(modality),
            rng,
        );

        let mut next = match modality {
            Modality::AdvancedIos => SliderPosition::with_scales(
                value,
                self.next_value(last.self_scale, DEFAULT_SCALE, RANDOM_SCALE_RANGE, rng),
                self.next_value(last.other_scale, DEFAULT_SCALE, RANDOM_SCALE_RANGE, rng),
            ),
            Modality::BasicIos | Modality::Proximity => SliderPosition::new(value),
        };

        // Figure positions are owned by the host layout; keep them only when restoring.
        if *self == ResetBehavior::KeepPosition && modality == Modality::Proximity {
            next.self_position = last.self_position;
            next.other_position = last.other_position;
        }

        log::debug!(
            "reset {} for {}: {:.3}",
            self.as_str(),
            modality.as_str(),
            next.value
        );
        next
    }
}

/// Default starting position for a modality
pub fn default_position(modality: Modality) -> SliderPosition {
    match modality {
        Modality::BasicIos | Modality::AdvancedIos => SliderPosition::new(DEFAULT_OVERLAP),
        Modality::Proximity => SliderPosition::new(DEFAULT_PROXIMITY),
    }
}

/// Random sub-range of the primary value for a modality
pub fn random_value_range(modality: Modality) -> RangeInclusive<f64> {
    match modality {
        Modality::BasicIos | Modality::AdvancedIos => RANDOM_OVERLAP_RANGE,
        Modality::Proximity => RANDOM_PROXIMITY_RANGE,
    }
}
