//! ONNX classifier adapter.
//!
//! Loads the pretrained air-quality model once at startup and exposes it
//! through the [`Classifier`] port. The model consumes one `[1, 5]` float
//! tensor in the fixed feature order and produces one score per class; the
//! label table comes from a `.labels.json` sidecar next to the artifact, or
//! falls back to the built-in table the model was trained with.

use crate::core::reading::{FeatureVector, FEATURE_COUNT};
use crate::core::sync::{Classifier, ClassifyError};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Labels used when the model ships without a sidecar table.
pub const DEFAULT_LABELS: [&str; 3] = ["Buena", "Moderada", "Mala"];

/// Model loading errors.
#[derive(Debug)]
pub enum ModelError {
    /// The artifact does not exist
    NotFound(PathBuf),
    /// ONNX Runtime rejected the artifact
    Load(String),
    /// The label table is missing or unusable
    Labels(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::NotFound(path) => write!(f, "model not found: {path:?}"),
            ModelError::Load(msg) => write!(f, "could not load model: {msg}"),
            ModelError::Labels(msg) => write!(f, "label table error: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

/// Pretrained classifier backed by an ONNX session.
#[derive(Debug)]
pub struct OnnxClassifier {
    session: Mutex<Session>,
    labels: Vec<String>,
    model_path: PathBuf,
    loaded_at: DateTime<Utc>,
}

impl OnnxClassifier {
    /// Load the model artifact and its label table.
    ///
    /// The labels are read from `labels_path` when given, otherwise from the
    /// `<model>.labels.json` sidecar, otherwise [`DEFAULT_LABELS`].
    pub fn load(model_path: &Path, labels_path: Option<&Path>) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::NotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e| ModelError::Load(format!("session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelError::Load(format!("optimization level: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| ModelError::Load(e.to_string()))?;

        let labels = load_labels(model_path, labels_path)?;
        tracing::info!(
            "loaded model from {:?} with {} labels",
            model_path,
            labels.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            labels,
            model_path: model_path.to_path_buf(),
            loaded_at: Utc::now(),
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

fn load_labels(model_path: &Path, labels_path: Option<&Path>) -> Result<Vec<String>, ModelError> {
    let sidecar = labels_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| model_path.with_extension("labels.json"));

    if sidecar.exists() {
        let content =
            std::fs::read_to_string(&sidecar).map_err(|e| ModelError::Labels(e.to_string()))?;
        let labels: Vec<String> =
            serde_json::from_str(&content).map_err(|e| ModelError::Labels(e.to_string()))?;
        if labels.is_empty() {
            return Err(ModelError::Labels(format!("empty label table: {sidecar:?}")));
        }
        Ok(labels)
    } else if labels_path.is_some() {
        // An explicitly configured table must exist.
        Err(ModelError::Labels(format!("label file not found: {sidecar:?}")))
    } else {
        Ok(DEFAULT_LABELS.iter().map(|s| s.to_string()).collect())
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, features: &FeatureVector) -> Result<String, ClassifyError> {
        let values = features.values();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ClassifyError::Input("non-finite feature value".to_string()));
        }

        let input: Vec<f32> = values.iter().map(|&v| v as f32).collect();
        let input_array = Array2::<f32>::from_shape_vec((1, FEATURE_COUNT), input)
            .map_err(|e| ClassifyError::Input(format!("array error: {e}")))?;
        let input_tensor = Value::from_array(input_array)
            .map_err(|e| ClassifyError::Input(format!("tensor error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifyError::Unavailable("model session poisoned".to_string()))?;

        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| ClassifyError::Unavailable("model defines no output".to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| ClassifyError::Input(format!("inference failed: {e}")))?;

        let output = outputs
            .get(&output_name)
            .ok_or_else(|| ClassifyError::Unavailable("missing model output".to_string()))?;
        let output_tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifyError::Unavailable(format!("unexpected output: {e}")))?;
        let scores = output_tensor.1;

        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
            .ok_or_else(|| ClassifyError::Unavailable("empty score vector".to_string()))?;

        self.labels.get(best).cloned().ok_or_else(|| {
            ClassifyError::Unavailable(format!(
                "score index {best} outside label table of {}",
                self.labels.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact_rejected() {
        let err = OnnxClassifier::load(Path::new("/nonexistent/modelo.onnx"), None).unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
    }

    #[test]
    fn test_garbage_artifact_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelo.onnx");
        std::fs::write(&path, b"not an onnx graph").unwrap();

        let err = OnnxClassifier::load(&path, None).unwrap_err();
        assert!(matches!(err, ModelError::Load(_)));
    }

    #[test]
    fn test_label_fallback_without_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("modelo.onnx");
        std::fs::write(&model, b"").unwrap();

        let labels = load_labels(&model, None).unwrap();
        assert_eq!(labels, DEFAULT_LABELS.to_vec());
    }

    #[test]
    fn test_sidecar_labels_used() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("modelo.onnx");
        let sidecar = dir.path().join("modelo.labels.json");
        std::fs::write(&model, b"").unwrap();
        std::fs::write(&sidecar, r#"["Excelente", "Buena", "Regular", "Mala"]"#).unwrap();

        let labels = load_labels(&model, None).unwrap();
        assert_eq!(labels.len(), 4);
        assert_eq!(labels[0], "Excelente");
    }

    #[test]
    fn test_empty_sidecar_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("modelo.onnx");
        let sidecar = dir.path().join("modelo.labels.json");
        std::fs::write(&model, b"").unwrap();
        std::fs::write(&sidecar, "[]").unwrap();

        let err = load_labels(&model, None).unwrap_err();
        assert!(matches!(err, ModelError::Labels(_)));
    }

    #[test]
    fn test_explicit_labels_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("modelo.onnx");
        std::fs::write(&model, b"").unwrap();

        let err = load_labels(&model, Some(&dir.path().join("missing.json"))).unwrap_err();
        assert!(matches!(err, ModelError::Labels(_)));
    }
}
