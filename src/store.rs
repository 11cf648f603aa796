//! Store clients for the reading and prediction collections.
//!
//! [`FirebaseStore`] speaks the Realtime Database REST dialect: a collection
//! is read in one `GET <base>/<path>.json`, and an append is a `POST` that
//! answers with the generated key. [`MemoryStore`] is the in-process
//! substitute with the same contract, used wherever a remote tree is not
//! wanted.

use crate::core::prediction::Prediction;
use crate::core::sync::{RecordMap, RecordStore, StoreError, PREDICTIONS_PATH, READINGS_PATH};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Connection settings for the Realtime Database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base database URL, e.g. `https://<project>.firebaseio.com`
    pub base_url: String,
    /// Optional REST `auth` parameter (database secret or ID token)
    pub auth_token: Option<String>,
}

impl StoreConfig {
    /// Create a new store configuration.
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    /// Get the URL of one collection, e.g. `<base>/lecturas.json`.
    pub fn collection_url(&self, path: &str) -> String {
        format!("{}/{path}.json", self.base_url)
    }
}

/// Key assigned by a push append: `{"name": "-Nxyz..."}`.
#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

/// Realtime Database client.
pub struct FirebaseStore {
    config: StoreConfig,
    client: reqwest::Client,
}

impl FirebaseStore {
    /// Create a new store client.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }

    async fn fetch_collection(&self, path: &str) -> Result<RecordMap, StoreError> {
        let request = self.with_auth(self.client.get(self.config.collection_url(path)));
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StoreError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        collection_from_value(value)
    }
}

/// Decode one collection payload.
///
/// The database answers `null` for an absent collection; that means "no
/// records yet", not an error.
fn collection_from_value(value: Value) -> Result<RecordMap, StoreError> {
    match value {
        Value::Null => Ok(RecordMap::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(StoreError::Serialization(format!(
            "expected an object of records, got: {other}"
        ))),
    }
}

#[async_trait]
impl RecordStore for FirebaseStore {
    async fn fetch_readings(&self) -> Result<RecordMap, StoreError> {
        self.fetch_collection(READINGS_PATH).await
    }

    async fn fetch_predictions(&self) -> Result<RecordMap, StoreError> {
        self.fetch_collection(PREDICTIONS_PATH).await
    }

    async fn append_prediction(&self, prediction: &Prediction) -> Result<String, StoreError> {
        let request = self.with_auth(
            self.client
                .post(self.config.collection_url(PREDICTIONS_PATH))
                .json(prediction),
        );
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StoreError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let push: PushResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(push.name)
    }
}

/// In-process store with the same contract as the remote one.
///
/// Generated keys are zero-padded counters, so like the remote push ids they
/// sort in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    readings: RwLock<RecordMap>,
    predictions: RwLock<RecordMap>,
    next_key: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_key(&self) -> String {
        format!("-K{:010}", self.next_key.fetch_add(1, Ordering::SeqCst))
    }

    /// Insert a raw reading record, returning its generated key.
    pub async fn insert_reading(&self, record: Value) -> String {
        let key = self.generate_key();
        self.readings.write().await.insert(key.clone(), record);
        key
    }

    /// Insert a raw prediction record, returning its generated key.
    pub async fn insert_raw_prediction(&self, record: Value) -> String {
        let key = self.generate_key();
        self.predictions.write().await.insert(key.clone(), record);
        key
    }

    /// Snapshot of the predictions collection, for assertions.
    pub async fn predictions_snapshot(&self) -> RecordMap {
        self.predictions.read().await.clone()
    }

    /// Snapshot of the readings collection.
    pub async fn readings_snapshot(&self) -> RecordMap {
        self.readings.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_readings(&self) -> Result<RecordMap, StoreError> {
        Ok(self.readings.read().await.clone())
    }

    async fn fetch_predictions(&self) -> Result<RecordMap, StoreError> {
        Ok(self.predictions.read().await.clone())
    }

    async fn append_prediction(&self, prediction: &Prediction) -> Result<String, StoreError> {
        let record =
            serde_json::to_value(prediction).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(self.insert_raw_prediction(record).await)
    }
}
