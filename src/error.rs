use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::ingest::IngestError;
use crate::store::VectorStoreError;

/// Main error type for the knowledge base
#[derive(Error, Debug)]
pub enum KbError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Required connection credential is absent from the environment
    #[error("Missing env {0}")]
    MissingCredential(String),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Embedding backend failures
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index failures
    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    /// Ingestion failures
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// A search exceeded the caller-imposed deadline
    #[error("Search timed out after {}ms", .limit.as_millis())]
    Timeout { limit: std::time::Duration },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for knowledge base operations
pub type Result<T> = std::result::Result<T, KbError>;
