//! Core reconciliation logic.
//!
//! This module contains:
//! - Reading records and feature-vector extraction
//! - Prediction records written back to the store
//! - The sync engine computing the reading/prediction set difference

pub mod prediction;
pub mod reading;
pub mod sync;

// Re-export commonly used types
pub use prediction::{FeatureSnapshot, Prediction};
pub use reading::{FeatureVector, Reading, ValidationError, FEATURE_COUNT, REQUIRED_FIELDS};
pub use sync::{
    classify_manual, processed_ids, Classifier, ClassifyError, ClassifyRequestError, DateScope,
    RecordMap, RecordStore, SkipReason, SkippedReading, StoreError, SyncEngine, SyncError,
    SyncRecord, SyncReport, PREDICTIONS_PATH, READINGS_PATH,
};
