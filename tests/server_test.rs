//! Integration tests for the airq-sync HTTP server

use airq_sync::core::reading::FeatureVector;
use airq_sync::core::sync::{Classifier, ClassifyError};
use airq_sync::server::{run, AppState, ServerConfig};
use airq_sync::store::MemoryStore;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Labels readings by gas level, standing in for the ONNX model.
struct GasThresholdClassifier;

impl Classifier for GasThresholdClassifier {
    fn classify(&self, features: &FeatureVector) -> Result<String, ClassifyError> {
        let gas = features.values()[0];
        if !gas.is_finite() {
            return Err(ClassifyError::Input("non-finite gas value".to_string()));
        }
        Ok(if gas > 600.0 { "Mala" } else { "Buena" }.to_string())
    }
}

async fn start_server(
    classifier: Option<Arc<dyn Classifier>>,
    store: Arc<MemoryStore>,
) -> (SocketAddr, oneshot::Sender<()>) {
    let state = Arc::new(AppState::new(classifier, store));
    let (addr, shutdown_tx) = run(ServerConfig::new(0), state)
        .await
        .expect("Failed to start server");

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}

fn complete_reading(gas: f64, fecha: Option<&str>) -> serde_json::Value {
    let mut record = json!({
        "gas": gas,
        "humedad": 45.0,
        "luz": 2.0,
        "polvo": 300.0,
        "temperatura": 28.0,
    });
    if let Some(fecha) = fecha {
        record["fecha"] = json!(fecha);
    }
    record
}

#[tokio::test]
async fn test_home_endpoint() {
    let store = Arc::new(MemoryStore::new());
    let (addr, shutdown_tx) = start_server(Some(Arc::new(GasThresholdClassifier)), store).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/", addr))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "online");
    assert!(body["version"].as_str().is_some());
    assert!(body["instancia"].as_str().unwrap_or("").starts_with("airq-"));

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_predict_names_missing_fields() {
    let store = Arc::new(MemoryStore::new());
    let (addr, shutdown_tx) = start_server(Some(Arc::new(GasThresholdClassifier)), store).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/predict", addr))
        .json(&json!({"gas": 800.0, "humedad": 45.0}))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let missing: Vec<&str> = body["campos_faltantes"]
        .as_array()
        .expect("campos_faltantes missing")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(missing, vec!["luz", "polvo", "temperatura"]);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_predict_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let (addr, shutdown_tx) =
        start_server(Some(Arc::new(GasThresholdClassifier)), store.clone()).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/predict", addr))
        .json(&complete_reading(800.0, None))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["prediccion"], "Mala");
    assert_eq!(body["entrada"]["gas"], 800.0);
    assert_eq!(body["entrada"]["temperatura"], 28.0);
    assert!(body["generado_en"].as_str().is_some());

    // The manual result was persisted, without a reading linkage.
    let predictions = store.predictions_snapshot().await;
    assert_eq!(predictions.len(), 1);
    assert!(predictions.values().next().unwrap().get("lectura_id").is_none());

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_predict_without_model() {
    let store = Arc::new(MemoryStore::new());
    let (addr, shutdown_tx) = start_server(None, store).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/predict", addr))
        .json(&complete_reading(800.0, None))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "MODEL_ERROR");
    assert_eq!(body["error"], "Modelo no cargado");

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_sync_pass_over_http() {
    let store = Arc::new(MemoryStore::new());
    store.insert_reading(complete_reading(100.0, None)).await;
    store.insert_reading(complete_reading(800.0, None)).await;
    store.insert_reading(json!({"gas": 1.0})).await; // incomplete, ignored

    let (addr, shutdown_tx) =
        start_server(Some(Arc::new(GasThresholdClassifier)), store.clone()).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/sync-firebase", addr))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["mensaje"], "2 lecturas clasificadas");
    assert_eq!(body["registros"].as_array().map(Vec::len), Some(2));
    assert_eq!(store.predictions_snapshot().await.len(), 2);

    // A second pass finds nothing new to do.
    let second: serde_json::Value = client
        .get(format!("http://{}/procesar", addr))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");

    assert_eq!(second["mensaje"], "0 lecturas clasificadas");
    assert_eq!(second["registros"].as_array().map(Vec::len), Some(0));
    assert_eq!(store.predictions_snapshot().await.len(), 2);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_sync_date_scope_over_http() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_reading(complete_reading(100.0, Some("2024-05-01T10:00:00")))
        .await;
    store
        .insert_reading(complete_reading(800.0, Some("2024-05-02T00:00:00")))
        .await;

    let (addr, shutdown_tx) =
        start_server(Some(Arc::new(GasThresholdClassifier)), store.clone()).await;

    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .get(format!("http://{}/sync-firebase?fecha=2024-05-01", addr))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");

    assert_eq!(body["mensaje"], "1 lecturas clasificadas");
    assert_eq!(body["registros"][0]["fecha"], "2024-05-01T10:00:00");

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_sync_without_model() {
    let store = Arc::new(MemoryStore::new());
    store.insert_reading(complete_reading(100.0, None)).await;

    let (addr, shutdown_tx) = start_server(None, store.clone()).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/sync-firebase", addr))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "MODEL_ERROR");
    assert!(store.predictions_snapshot().await.is_empty());

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_cors_headers() {
    let store = Arc::new(MemoryStore::new());
    let (addr, shutdown_tx) = start_server(Some(Arc::new(GasThresholdClassifier)), store).await;

    // Send OPTIONS request to check CORS
    let client = reqwest::Client::new();
    let response = client
        .request(reqwest::Method::OPTIONS, format!("http://{}/predict", addr))
        .header("Origin", "http://localhost")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .expect("Failed to send request");

    // CORS preflight should succeed
    assert!(
        response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
        "CORS preflight failed: {}",
        response.status()
    );

    let _ = shutdown_tx.send(());
}
