//! Classification result records.
//!
//! Predictions are append-only: once written under `/predicciones` they are
//! never updated or deleted. Each record carries a denormalized copy of the
//! input values so a result can be audited without the source reading.

use crate::core::reading::{FeatureVector, Reading};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Denormalized copy of the feature values a prediction was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub gas: f64,
    #[serde(rename = "humedad")]
    pub humidity: f64,
    #[serde(rename = "luz")]
    pub light: f64,
    #[serde(rename = "polvo")]
    pub dust: f64,
    #[serde(rename = "temperatura")]
    pub temperature: f64,
}

impl FeatureSnapshot {
    /// Snapshot an ordered feature vector.
    pub fn from_vector(vector: &FeatureVector) -> Self {
        let [gas, humidity, light, dust, temperature] = *vector.values();
        Self {
            gas,
            humidity,
            light,
            dust,
            temperature,
        }
    }
}

/// One classification result, as stored under `/predicciones`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Id of the source reading; absent for manual classifications.
    #[serde(rename = "lectura_id", default, skip_serializing_if = "Option::is_none")]
    pub reading_id: Option<String>,

    /// Date copied from the source reading, for date-scoped queries.
    #[serde(rename = "fecha", default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Input values the label was computed from.
    #[serde(rename = "entrada")]
    pub input: FeatureSnapshot,

    /// The classifier's label.
    #[serde(rename = "prediccion")]
    pub label: String,

    /// RFC3339 timestamp of classification.
    #[serde(rename = "generado_en")]
    pub generated_at: String,
}

impl Prediction {
    /// Build the prediction for a stored reading.
    pub fn for_reading(id: &str, reading: &Reading, vector: &FeatureVector, label: String) -> Self {
        Self {
            reading_id: Some(id.to_string()),
            date: reading.date.clone(),
            input: FeatureSnapshot::from_vector(vector),
            label,
            generated_at: Utc::now().to_rfc3339(),
        }
    }

    /// Build the prediction for a caller-supplied reading (manual path).
    ///
    /// No `lectura_id` is recorded: the input did not necessarily come from
    /// the store, so it must not mark any stored reading as processed.
    pub fn manual(reading: &Reading, vector: &FeatureVector, label: String) -> Self {
        Self {
            reading_id: None,
            date: reading.date.clone(),
            input: FeatureSnapshot::from_vector(vector),
            label,
            generated_at: Utc::now().to_rfc3339(),
        }
    }
}
