//! Reconciliation between the reading and prediction collections.
//!
//! One pass fetches both collections as point-in-time snapshots, computes
//! which readings have no prediction referencing them, classifies exactly
//! those, and appends one prediction record per classified reading. The pass
//! never mutates or deletes anything that already exists.
//!
//! The set difference is computed from the snapshots, so two passes started
//! close together can both decide the same reading is unprocessed. Callers
//! that can race must serialize passes; the HTTP server holds a
//! single-flight lock around the engine for exactly this reason.

use crate::core::prediction::Prediction;
use crate::core::reading::{FeatureVector, Reading, ValidationError};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Store path of the raw readings collection.
pub const READINGS_PATH: &str = "lecturas";

/// Store path of the predictions collection.
pub const PREDICTIONS_PATH: &str = "predicciones";

/// Snapshot of one collection: store-generated key to raw record.
///
/// Keys are chronologically sortable push ids, so iterating the map visits
/// records in the store's insertion order. The engine does not depend on
/// that order; each reading is classified independently.
pub type RecordMap = BTreeMap<String, Value>;

/// Store-side failure. Any of these aborts the current pass.
#[derive(Debug)]
pub enum StoreError {
    /// The store could not be reached
    Unavailable(String),
    /// The store answered with a non-success status
    Server { status: u16, message: String },
    /// A payload could not be encoded or decoded
    Serialization(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unreachable: {msg}"),
            StoreError::Server { status, message } => {
                write!(f, "store error ({status}): {message}")
            }
            StoreError::Serialization(msg) => write!(f, "store serialization error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Classifier failure.
#[derive(Debug)]
pub enum ClassifyError {
    /// No usable model; fatal for the calling operation
    Unavailable(String),
    /// This particular input cannot be classified; the caller may skip it
    Input(String),
}

impl std::fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifyError::Unavailable(msg) => write!(f, "classifier unavailable: {msg}"),
            ClassifyError::Input(msg) => write!(f, "unclassifiable input: {msg}"),
        }
    }
}

impl std::error::Error for ClassifyError {}

/// Hierarchical key-value store holding the two collections.
///
/// Implementations are handles constructed once at startup and passed in as
/// dependencies, so tests can substitute an in-process store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the full readings collection. An absent collection is an empty
    /// map, not an error.
    async fn fetch_readings(&self) -> Result<RecordMap, StoreError>;

    /// Fetch the full predictions collection.
    async fn fetch_predictions(&self) -> Result<RecordMap, StoreError>;

    /// Append one prediction under a fresh store-generated key and return
    /// that key. The append itself has no read-modify-write window.
    async fn append_prediction(&self, prediction: &Prediction) -> Result<String, StoreError>;
}

/// Pretrained classifier: fixed-order feature vector in, label out.
pub trait Classifier: Send + Sync {
    fn classify(&self, features: &FeatureVector) -> Result<String, ClassifyError>;
}

/// Date filter for a pass, matched as a string prefix against a reading's
/// `fecha` field. `"2024-05-01"` matches `"2024-05-01T10:00:00"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateScope(String);

impl DateScope {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Scope covering the current UTC day.
    pub fn today() -> Self {
        Self(Utc::now().format("%Y-%m-%d").to_string())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    /// A reading with no date is never in scope.
    pub fn matches(&self, date: Option<&str>) -> bool {
        date.is_some_and(|d| d.starts_with(&self.0))
    }
}

/// Why a reading was not classified during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The raw record did not decode as a reading
    Malformed,
    /// One or more required sensor fields were absent
    Incomplete,
    /// The classifier rejected the input values
    ClassificationFailed,
}

/// One skipped reading, kept for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedReading {
    pub id: String,
    pub reason: SkipReason,
}

/// One record written by a pass: the generated key plus the stored
/// prediction.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRecord {
    pub id: String,
    #[serde(flatten)]
    pub prediction: Prediction,
}

/// Outcome of one reconciliation pass.
///
/// Partial success is success: readings that failed individually appear in
/// `skipped`, and `count` reflects only what was written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Number of predictions written this pass
    pub count: usize,
    /// Exactly what was written this pass
    pub records: Vec<SyncRecord>,
    /// Readings skipped this pass; not part of the HTTP contract
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedReading>,
}

/// A pass-level failure.
#[derive(Debug)]
pub enum SyncError {
    Store(StoreError),
    Classifier(ClassifyError),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Store(e) => write!(f, "sync pass failed against the store: {e}"),
            SyncError::Classifier(e) => write!(f, "sync pass failed in the classifier: {e}"),
        }
    }
}

impl std::error::Error for SyncError {}

/// Ids of readings that already have a prediction referencing them.
///
/// Predictions without a `lectura_id` (manual path) mark nothing processed.
pub fn processed_ids(predictions: &RecordMap) -> HashSet<&str> {
    predictions
        .values()
        .filter_map(|record| record.get("lectura_id").and_then(Value::as_str))
        .collect()
}

/// Reconciles the reading collection against the prediction collection.
pub struct SyncEngine<'a> {
    store: &'a dyn RecordStore,
    classifier: &'a dyn Classifier,
}

impl<'a> SyncEngine<'a> {
    pub fn new(store: &'a dyn RecordStore, classifier: &'a dyn Classifier) -> Self {
        Self { store, classifier }
    }

    /// Run one reconciliation pass, optionally scoped to a date.
    ///
    /// A reading is eligible when it carries all five sensor fields, its
    /// date matches the scope (when one is active), and no prediction
    /// references it yet. Per-reading failures are isolated; a store or
    /// classifier outage aborts the pass.
    pub async fn run(&self, scope: Option<&DateScope>) -> Result<SyncReport, SyncError> {
        let readings = self.store.fetch_readings().await.map_err(SyncError::Store)?;
        let predictions = self
            .store
            .fetch_predictions()
            .await
            .map_err(SyncError::Store)?;
        let processed = processed_ids(&predictions);

        let mut records = Vec::new();
        let mut skipped = Vec::new();

        for (id, raw) in &readings {
            let reading: Reading = match serde_json::from_value(raw.clone()) {
                Ok(reading) => reading,
                Err(e) => {
                    tracing::warn!("skipping malformed reading {id}: {e}");
                    skipped.push(SkippedReading {
                        id: id.clone(),
                        reason: SkipReason::Malformed,
                    });
                    continue;
                }
            };

            // Incomplete readings are expected, not errors.
            let vector = match reading.feature_vector() {
                Ok(vector) => vector,
                Err(e) => {
                    tracing::debug!("reading {id} not classifiable yet: {e}");
                    skipped.push(SkippedReading {
                        id: id.clone(),
                        reason: SkipReason::Incomplete,
                    });
                    continue;
                }
            };

            if let Some(scope) = scope {
                if !scope.matches(reading.date.as_deref()) {
                    continue;
                }
            }

            if processed.contains(id.as_str()) {
                continue;
            }

            let label = match self.classifier.classify(&vector) {
                Ok(label) => label,
                Err(ClassifyError::Input(reason)) => {
                    tracing::warn!("classification failed for reading {id}: {reason}");
                    skipped.push(SkippedReading {
                        id: id.clone(),
                        reason: SkipReason::ClassificationFailed,
                    });
                    continue;
                }
                Err(e @ ClassifyError::Unavailable(_)) => return Err(SyncError::Classifier(e)),
            };

            let prediction = Prediction::for_reading(id, &reading, &vector, label);
            let key = self
                .store
                .append_prediction(&prediction)
                .await
                .map_err(SyncError::Store)?;

            tracing::info!("classified reading {id} as '{}' ({key})", prediction.label);
            records.push(SyncRecord {
                id: key,
                prediction,
            });
        }

        Ok(SyncReport {
            count: records.len(),
            records,
            skipped,
        })
    }
}

/// Error from the manual classification path.
#[derive(Debug)]
pub enum ClassifyRequestError {
    /// The input reading is missing required fields
    Validation(ValidationError),
    /// The classifier failed
    Classifier(ClassifyError),
}

impl std::fmt::Display for ClassifyRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifyRequestError::Validation(e) => write!(f, "{e}"),
            ClassifyRequestError::Classifier(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ClassifyRequestError {}

/// Classify one caller-supplied reading synchronously, independent of any
/// stored state.
///
/// Validation failures name every missing field. When a store is supplied
/// the result is persisted best-effort: a failed append is logged and the
/// prediction is still returned to the caller.
pub async fn classify_manual(
    classifier: &dyn Classifier,
    store: Option<&dyn RecordStore>,
    reading: &Reading,
) -> Result<Prediction, ClassifyRequestError> {
    let vector = reading
        .feature_vector()
        .map_err(ClassifyRequestError::Validation)?;
    let label = classifier
        .classify(&vector)
        .map_err(ClassifyRequestError::Classifier)?;

    let prediction = Prediction::manual(reading, &vector, label);

    if let Some(store) = store {
        if let Err(e) = store.append_prediction(&prediction).await {
            tracing::warn!("could not persist manual prediction: {e}");
        }
    }

    Ok(prediction)
}
