//! HTTP surface for manual classification and store reconciliation.
//!
//! This module provides the service's three endpoints:
//! - `GET /`: liveness/info payload
//! - `POST /predict`: classify one caller-supplied reading
//! - `GET /sync-firebase` (alias `GET /procesar`): run one sync pass
//!
//! # Architecture
//!
//! ```text
//! Caller ──→ POST /predict ──────→ classifier ──→ best-effort append
//! Scheduler ─→ GET /sync-firebase ─→ [single-flight lock] ─→ SyncEngine
//! ```
//!
//! Handlers are thin: validation, classification and reconciliation all
//! live in [`crate::core`]; this module only maps their outcomes onto
//! status codes and the Spanish wire payloads.

use crate::core::prediction::Prediction;
use crate::core::reading::Reading;
use crate::core::sync::{
    classify_manual, Classifier, ClassifyError, ClassifyRequestError, DateScope, RecordStore,
    SyncEngine, SyncError, SyncRecord,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct AppState {
    /// Classifier handle; absent when the model failed to load at startup
    classifier: Option<Arc<dyn Classifier>>,
    /// Store handle
    store: Arc<dyn RecordStore>,
    /// Single-flight lock serializing sync passes
    sync_lock: Mutex<()>,
    /// Per-process instance identifier
    instance_id: String,
}

impl AppState {
    /// Create new server state
    pub fn new(classifier: Option<Arc<dyn Classifier>>, store: Arc<dyn RecordStore>) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let instance_id = format!(
            "airq-{}-{}",
            host,
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        Self {
            classifier,
            store,
            sync_lock: Mutex::new(()),
            instance_id,
        }
    }
}

/// Service liveness payload
#[derive(Serialize)]
pub struct InfoResponse {
    pub status: String,
    pub mensaje: String,
    pub version: String,
    pub instancia: String,
}

/// Error payload
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campos_faltantes: Option<Vec<&'static str>>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
            campos_faltantes: None,
        }
    }
}

/// Sync result payload
#[derive(Serialize)]
pub struct SyncResponse {
    pub mensaje: String,
    pub registros: Vec<SyncRecord>,
}

/// Query parameters of the sync endpoint
#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    /// Optional date token, matched as a prefix against `fecha`
    pub fecha: Option<String>,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn model_unavailable() -> HandlerError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Modelo no cargado", "MODEL_ERROR")),
    )
}

/// GET /
async fn home(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        status: "online".to_string(),
        mensaje: "Servicio de calidad del aire operativo".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instancia: state.instance_id.clone(),
    })
}

/// POST /predict
///
/// Classifies one caller-supplied reading. The result is returned even when
/// the best-effort persistence behind it fails.
async fn predict(
    State(state): State<Arc<AppState>>,
    Json(reading): Json<Reading>,
) -> Result<Json<Prediction>, HandlerError> {
    let Some(classifier) = state.classifier.as_deref() else {
        return Err(model_unavailable());
    };

    match classify_manual(classifier, Some(&*state.store), &reading).await {
        Ok(prediction) => Ok(Json(prediction)),
        Err(ClassifyRequestError::Validation(e)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Faltan campos requeridos: {}", e.missing.join(", ")),
                code: "VALIDATION_ERROR".to_string(),
                campos_faltantes: Some(e.missing),
            }),
        )),
        Err(ClassifyRequestError::Classifier(ClassifyError::Input(reason))) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                format!("Lectura no clasificable: {reason}"),
                "CLASSIFY_ERROR",
            )),
        )),
        Err(ClassifyRequestError::Classifier(ClassifyError::Unavailable(_))) => {
            Err(model_unavailable())
        }
    }
}

/// GET /sync-firebase
///
/// Runs one reconciliation pass. Passes are serialized behind a
/// single-flight lock; without it, concurrent triggers would both see the
/// same snapshot and double-classify readings.
async fn sync(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SyncParams>,
) -> Result<Json<SyncResponse>, HandlerError> {
    let Some(classifier) = state.classifier.as_deref() else {
        return Err(model_unavailable());
    };

    let scope = params.fecha.map(DateScope::new);

    let _guard = state.sync_lock.lock().await;

    let engine = SyncEngine::new(&*state.store, classifier);
    match engine.run(scope.as_ref()).await {
        Ok(report) => {
            if !report.skipped.is_empty() {
                tracing::warn!(
                    "sync pass skipped {} of {} readings",
                    report.skipped.len(),
                    report.skipped.len() + report.count
                );
            }
            Ok(Json(SyncResponse {
                mensaje: format!("{} lecturas clasificadas", report.count),
                registros: report.records,
            }))
        }
        Err(SyncError::Store(e)) => {
            tracing::error!("sync pass aborted: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string(), "STORE_ERROR")),
            ))
        }
        Err(SyncError::Classifier(e)) => {
            tracing::error!("sync pass aborted: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string(), "MODEL_ERROR")),
            ))
        }
    }
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: Arc<AppState>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = Router::new()
        .route("/", get(home))
        .route("/predict", post(predict))
        .route("/sync-firebase", get(sync))
        .route("/procesar", get(sync))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("airq-sync listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
