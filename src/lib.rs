//! Air-quality classification and reconciliation service.
//!
//! This crate classifies air-quality sensor readings with a pretrained ONNX
//! model and reconciles a shared Realtime Database tree so that every stored
//! reading ends up with exactly one prediction record.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         airq-sync                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │    Store    │──▶│ Sync Engine │──▶│ Classifier  │       │
//! │  │  /lecturas  │   │ (set diff)  │   │   (ONNX)    │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         ▲                 │                                 │
//! │         └─────────────────┘ append to /predicciones         │
//! │                                                             │
//! │  HTTP: GET /  ·  POST /predict  ·  GET /sync-firebase       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A reconciliation pass is additive: it never mutates or deletes a reading
//! or a pre-existing prediction, and a reading is classified at most once
//! across sequential passes.
//!
//! # Example
//!
//! ```no_run
//! use airq_sync::core::sync::SyncEngine;
//! use airq_sync::model::OnnxClassifier;
//! use airq_sync::store::{FirebaseStore, StoreConfig};
//! use std::path::Path;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FirebaseStore::new(StoreConfig::new(
//!     "https://example.firebaseio.com",
//!     None,
//! ));
//! let classifier = OnnxClassifier::load(Path::new("modelo_calidad_aire.onnx"), None)?;
//!
//! let engine = SyncEngine::new(&store, &classifier);
//! let report = engine.run(None).await?;
//! println!("classified {} readings", report.count);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod model;
pub mod server;
pub mod store;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use crate::core::{
    classify_manual, Classifier, ClassifyError, ClassifyRequestError, DateScope, FeatureVector,
    Prediction, Reading, RecordStore, StoreError, SyncEngine, SyncError, SyncReport,
    ValidationError,
};
pub use model::{ModelError, OnnxClassifier};
pub use server::{AppState, ServerConfig};
pub use store::{FirebaseStore, MemoryStore, StoreConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
