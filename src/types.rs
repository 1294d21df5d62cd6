//! Core types for closeness measurements
//!
//! This module defines the records that flow through the core: modalities,
//! measurements, sessions, and the slider positions shown to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::ValidationError;

/// Secondary key: relative size of the "self" circle (Advanced)
pub const SELF_SCALE: &str = "selfScale";
/// Secondary key: relative size of the "other" circle (Advanced)
pub const OTHER_SCALE: &str = "otherScale";
/// Secondary key: normalized position of the "self" figure (Proximity)
pub const SELF_POSITION: &str = "selfPosition";
/// Secondary key: normalized position of the "other" figure (Proximity)
pub const OTHER_POSITION: &str = "otherPosition";

/// Measurement modality, i.e. which screen captured the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    BasicIos,
    AdvancedIos,
    Proximity,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::BasicIos, Modality::AdvancedIos, Modality::Proximity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::BasicIos => "basic_ios",
            Modality::AdvancedIos => "advanced_ios",
            Modality::Proximity => "proximity",
        }
    }

    /// Parse the wire name (`basic_ios`) or the short form (`basic`)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "basic_ios" | "basic" => Some(Modality::BasicIos),
            "advanced_ios" | "advanced" => Some(Modality::AdvancedIos),
            "proximity" => Some(Modality::Proximity),
            _ => None,
        }
    }

    /// Which label table applies to this modality's primary value
    pub fn scale(&self) -> Scale {
        match self {
            Modality::BasicIos | Modality::AdvancedIos => Scale::Overlap,
            Modality::Proximity => Scale::Proximity,
        }
    }
}

/// Conceptual scale of a primary value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    /// Circle overlap fraction (Basic/Advanced)
    Overlap,
    /// Distance-closeness fraction (Proximity)
    Proximity,
}

/// One saved observation.
///
/// Fields are private so a measurement can only come out of [`Measurement::at`],
/// which enforces the clamp and finiteness rules. Decoding goes through it too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawMeasurement")]
pub struct Measurement {
    value: f64,
    #[serde(default)]
    secondary: BTreeMap<String, f64>,
    created_at: DateTime<Utc>,
}

/// Wire shape of a measurement before validation
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMeasurement {
    value: f64,
    #[serde(default)]
    secondary: BTreeMap<String, f64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RawMeasurement> for Measurement {
    type Error = ValidationError;

    fn try_from(raw: RawMeasurement) -> Result<Self, Self::Error> {
        Measurement::at(raw.value, raw.secondary, raw.created_at)
    }
}

impl Measurement {
    /// Create a measurement stamped with the current time.
    ///
    /// A finite primary value outside `[0, 1]` is clamped to the nearest bound.
    /// NaN or infinite values (primary or secondary) are rejected.
    pub fn new(value: f64, secondary: BTreeMap<String, f64>) -> Result<Self, ValidationError> {
        Self::at(value, secondary, Utc::now())
    }

    /// Create a measurement with an explicit timestamp
    pub fn at(
        value: f64,
        secondary: BTreeMap<String, f64>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite {
                field: "value".to_string(),
            });
        }
        if let Some((key, _)) = secondary.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ValidationError::NonFinite { field: key.clone() });
        }

        Ok(Self {
            value: clamp_unit(value),
            secondary,
            created_at,
        })
    }

    /// Primary value in `[0, 1]`
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn secondary(&self) -> &BTreeMap<String, f64> {
        &self.secondary
    }

    pub fn secondary_value(&self, key: &str) -> Option<f64> {
        self.secondary.get(key).copied()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Clamp a finite value into `[0, 1]`
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Container for the measurements taken on one measurement screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub modality: Modality,
    pub created_at: DateTime<Utc>,
    /// Optional human-readable label (e.g. the name of the "other")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Insertion order is chronological order
    #[serde(default)]
    measurements: Vec<Measurement>,
}

impl Session {
    /// Open an empty session for a modality
    pub fn open(modality: Modality) -> Self {
        Self::open_at(modality, Utc::now())
    }

    pub fn open_at(modality: Modality, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            modality,
            created_at,
            label: None,
            measurements: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Append a measurement. Repeated values are kept; every save is independent.
    pub fn append(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    /// An empty session is transient and may be discarded without persisting
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn last_measurement(&self) -> Option<&Measurement> {
        self.measurements.last()
    }
}

/// Slider state shown to the user before a save.
///
/// `self_scale`/`other_scale` only carry meaning for the Advanced modality.
/// Proximity figure positions are optional and supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliderPosition {
    pub value: f64,
    #[serde(default = "unit_scale")]
    pub self_scale: f64,
    #[serde(default = "unit_scale")]
    pub other_scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_position: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_position: Option<f64>,
}

fn unit_scale() -> f64 {
    1.0
}

impl SliderPosition {
    /// A position with unit scales and no figure positions
    pub fn new(value: f64) -> Self {
        Self {
            value,
            self_scale: 1.0,
            other_scale: 1.0,
            self_position: None,
            other_position: None,
        }
    }

    pub fn with_scales(value: f64, self_scale: f64, other_scale: f64) -> Self {
        Self {
            self_scale,
            other_scale,
            ..Self::new(value)
        }
    }

    /// Secondary values this modality records for the position
    pub fn secondary_for(&self, modality: Modality) -> BTreeMap<String, f64> {
        let mut secondary = BTreeMap::new();
        match modality {
            Modality::BasicIos => {}
            Modality::AdvancedIos => {
                secondary.insert(SELF_SCALE.to_string(), self.self_scale);
                secondary.insert(OTHER_SCALE.to_string(), self.other_scale);
            }
            Modality::Proximity => {
                if let Some(p) = self.self_position {
                    secondary.insert(SELF_POSITION.to_string(), p);
                }
                if let Some(p) = self.other_position {
                    secondary.insert(OTHER_POSITION.to_string(), p);
                }
            }
        }
        secondary
    }

    /// Build the measurement that saving this position would produce
    pub fn to_measurement(&self, modality: Modality) -> Result<Measurement, ValidationError> {
        Measurement::new(self.value, self.secondary_for(modality))
    }

    /// Recover the slider position a saved measurement came from
    pub fn from_measurement(measurement: &Measurement) -> Self {
        Self {
            value: measurement.value(),
            self_scale: measurement.secondary_value(SELF_SCALE).unwrap_or(1.0),
            other_scale: measurement.secondary_value(OTHER_SCALE).unwrap_or(1.0),
            self_position: measurement.secondary_value(SELF_POSITION),
            other_position: measurement.secondary_value(OTHER_POSITION),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decoded_measurement_is_clamped() {
        let json = r#"{"value": 1.4, "secondary": {"selfScale": 1.2}, "createdAt": "2024-03-01T10:00:00Z"}"#;
        let m: Measurement = serde_json::from_str(json).unwrap();
        assert_eq!(m.value(), 1.0);
        assert_eq!(m.secondary_value(SELF_SCALE), Some(1.2));

        let json = r#"{"value": -0.3, "createdAt": "2024-03-01T10:00:00Z"}"#;
        let m: Measurement = serde_json::from_str(json).unwrap();
        assert_eq!(m.value(), 0.0);
    }

    #[test]
    fn test_decoded_session_is_clamped() {
        let json = r#"{
            "id": "6f1c2a9e-1d3b-4c5a-9e8f-0a1b2c3d4e5f",
            "modality": "basic_ios",
            "createdAt": "2024-03-01T10:00:00Z",
            "measurements": [{"value": 1.4, "createdAt": "2024-03-01T10:00:01Z"}]
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.measurements()[0].value(), 1.0);
    }

    #[test]
    fn test_measurement_clamps_out_of_range() {
        let high = Measurement::new(1.4, BTreeMap::new()).unwrap();
        assert_eq!(high.value(), 1.0);

        let low = Measurement::new(-0.3, BTreeMap::new()).unwrap();
        assert_eq!(low.value(), 0.0);

        let inside = Measurement::new(0.42, BTreeMap::new()).unwrap();
        assert_eq!(inside.value(), 0.42);
    }

    #[test]
    fn test_measurement_rejects_non_finite() {
        assert!(Measurement::new(f64::NAN, BTreeMap::new()).is_err());
        assert!(Measurement::new(f64::INFINITY, BTreeMap::new()).is_err());

        let mut secondary = BTreeMap::new();
        secondary.insert(SELF_SCALE.to_string(), f64::NEG_INFINITY);
        let err = Measurement::new(0.5, secondary).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonFinite {
                field: SELF_SCALE.to_string()
            }
        );
    }

    #[test]
    fn test_session_append_keeps_order_and_duplicates() {
        let mut session = Session::open(Modality::BasicIos);
        assert!(session.is_empty());

        for value in [0.3, 0.3, 0.7] {
            session.append(Measurement::new(value, BTreeMap::new()).unwrap());
        }

        let values: Vec<f64> = session.measurements().iter().map(|m| m.value()).collect();
        assert_eq!(values, vec![0.3, 0.3, 0.7]);
        assert_eq!(session.last_measurement().map(|m| m.value()), Some(0.7));
    }

    #[test]
    fn test_secondary_keys_per_modality() {
        let position = SliderPosition {
            value: 0.6,
            self_scale: 1.2,
            other_scale: 0.9,
            self_position: Some(0.1),
            other_position: None,
        };

        assert!(position.secondary_for(Modality::BasicIos).is_empty());

        let advanced = position.secondary_for(Modality::AdvancedIos);
        assert_eq!(advanced.get(SELF_SCALE), Some(&1.2));
        assert_eq!(advanced.get(OTHER_SCALE), Some(&0.9));
        assert_eq!(advanced.len(), 2);

        let proximity = position.secondary_for(Modality::Proximity);
        assert_eq!(proximity.get(SELF_POSITION), Some(&0.1));
        assert_eq!(proximity.len(), 1);
    }

    #[test]
    fn test_position_from_measurement() {
        let position = SliderPosition::with_scales(0.55, 1.1, 0.8);
        let measurement = position.to_measurement(Modality::AdvancedIos).unwrap();
        assert_eq!(SliderPosition::from_measurement(&measurement), position);
    }

    #[test]
    fn test_modality_parse() {
        assert_eq!(Modality::parse("basic"), Some(Modality::BasicIos));
        assert_eq!(Modality::parse("ADVANCED_IOS"), Some(Modality::AdvancedIos));
        assert_eq!(Modality::parse("proximity"), Some(Modality::Proximity));
        assert_eq!(Modality::parse("unknown"), None);
        assert_eq!(Modality::Proximity.scale(), Scale::Proximity);
    }
}
