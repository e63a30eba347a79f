//! Crate-level error type
//!
//! Each module keeps its own thiserror enum (`EmbeddingError`,
//! `BackendError`, `StoreError`, `GenerationError`); this type collects
//! them at the binary and config seams.

use std::path::PathBuf;
use thiserror::Error;

use crate::backend::BackendError;
use crate::embedding::EmbeddingError;
use crate::generation::GenerationError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum MnemoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One failed check from config validation; the validator collects
/// these instead of stopping at the first problem
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Dotted path of the offending key, e.g. `retrieval.limit`
    pub path: String,
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

pub type Result<T> = std::result::Result<T, MnemoError>;
