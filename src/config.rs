//! Configuration for the airq-sync service.
//!
//! Every setting comes from the environment, matching the hosted deployment
//! where no files can be shipped next to the binary.

use std::path::PathBuf;

/// Default path of the classifier artifact.
pub const DEFAULT_MODEL_PATH: &str = "modelo_calidad_aire.onnx";

/// Default HTTP port for serve mode.
pub const DEFAULT_PORT: u16 = 8080;

/// Resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Realtime Database
    pub database_url: String,

    /// Optional REST `auth` parameter (database secret or ID token)
    pub auth_token: Option<String>,

    /// Path of the ONNX classifier artifact
    pub model_path: PathBuf,

    /// Explicit label table path; defaults to the model's sidecar file
    pub labels_path: Option<PathBuf>,

    /// HTTP port for serve mode
    pub port: u16,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary key lookup.
    ///
    /// Environment variables are process-global; tests go through this seam
    /// instead of mutating them.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingVar("DATABASE_URL"))?;

        let auth_token = lookup("FIREBASE_AUTH_TOKEN").filter(|v| !v.trim().is_empty());

        let model_path = lookup("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));

        let labels_path = lookup("MODEL_LABELS_PATH").map(PathBuf::from);

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
                name: "PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            database_url,
            auth_token,
            model_path,
            labels_path,
            port,
        })
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar { name: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVar(name) => {
                write!(f, "missing required environment variable {name}")
            }
            ConfigError::InvalidVar { name, value } => {
                write!(f, "invalid value '{value}' for {name}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
