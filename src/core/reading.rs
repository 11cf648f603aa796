//! Sensor reading records and feature-vector extraction.
//!
//! Readings arrive from the store (or the manual endpoint) with Spanish
//! field names on the wire. Every field is optional in storage; all five
//! sensor values are required before a reading can be classified.

use serde::{Deserialize, Serialize};

/// Number of features the classifier consumes.
pub const FEATURE_COUNT: usize = 5;

/// Wire names of the required sensor fields, in classification order.
pub const REQUIRED_FIELDS: [&str; FEATURE_COUNT] =
    ["gas", "humedad", "luz", "polvo", "temperatura"];

/// One raw sensor sample, as stored under `/lecturas`.
///
/// Read-only to the sync engine: readings are created by the ingestion path
/// and never mutated or deleted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Date/time string attached by the ingestion path; may be absent.
    #[serde(rename = "fecha", default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<f64>,

    #[serde(rename = "humedad", default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,

    #[serde(rename = "luz", default, skip_serializing_if = "Option::is_none")]
    pub light: Option<f64>,

    #[serde(rename = "polvo", default, skip_serializing_if = "Option::is_none")]
    pub dust: Option<f64>,

    #[serde(rename = "temperatura", default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl Reading {
    /// Extract the fixed-order feature vector `[gas, humedad, luz, polvo,
    /// temperatura]`, naming every missing field on failure.
    pub fn feature_vector(&self) -> Result<FeatureVector, ValidationError> {
        let fields = [
            (REQUIRED_FIELDS[0], self.gas),
            (REQUIRED_FIELDS[1], self.humidity),
            (REQUIRED_FIELDS[2], self.light),
            (REQUIRED_FIELDS[3], self.dust),
            (REQUIRED_FIELDS[4], self.temperature),
        ];

        let missing: Vec<&'static str> = fields
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();

        match (self.gas, self.humidity, self.light, self.dust, self.temperature) {
            (Some(gas), Some(humidity), Some(light), Some(dust), Some(temperature)) => {
                Ok(FeatureVector([gas, humidity, light, dust, temperature]))
            }
            _ => Err(ValidationError { missing }),
        }
    }

    /// Whether all five required fields are present.
    pub fn is_complete(&self) -> bool {
        self.feature_vector().is_ok()
    }
}

/// Feature values in classification order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    /// Build a vector directly from ordered values.
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    /// The ordered values.
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }
}

/// A reading cannot be classified because required fields are absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Wire names of the missing fields, in classification order.
    pub missing: Vec<&'static str>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "missing required sensor fields: {}", self.missing.join(", "))
    }
}

impl std::error::Error for ValidationError {}
