//! Configuration management for mnemo
//!
//! One TOML file describes the whole pipeline: storage backend,
//! embedding provider, generation backend, retrieval defaults, and the
//! question-answering knobs. Values can be overridden per-run through
//! `MNEMO_SECTION__KEY` environment variables.

use crate::error::{MnemoError, Result};
use crate::rag::{GenerationOptions, RagOptions};
use crate::retrieval::{ExpansionTables, Strategy};
use crate::store::StoreOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub rag: RagConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Vector backend: "sqlite" or "memory"
    pub backend: String,
    pub data_dir: PathBuf,
    /// Document bodies above this many bytes are compressed at rest
    pub compression_threshold: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: "hashing" or "fastembed"
    pub provider: String,
    /// Model name, used by the fastembed provider
    pub model: String,
    /// Vector width, used by the hashing provider
    pub dimensions: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub enabled: bool,
    /// OpenAI-compatible endpoint root, e.g. an Ollama server
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key; empty for keyless
    /// endpoints
    #[serde(default)]
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// Retrieval defaults and tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default strategy: semantic, hybrid, mmr, contextual, multi-query
    pub strategy: String,
    pub limit: usize,
    pub score_threshold: f32,
    pub cache_capacity: usize,
    pub rerank_boost: f32,
    pub diversify_threshold: f32,
    pub query_timeout_secs: u64,
    /// Extra domain terms appended by the contextual strategy; replaces
    /// the built-in table when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expansions: Option<HashMap<String, Vec<String>>>,
    /// Word substitutions used by the multi-query strategy; replaces
    /// the built-in table when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synonyms: Option<HashMap<String, Vec<String>>>,
}

/// Question-answering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_context_chars: usize,
    pub use_history: bool,
    pub history_max_entries: usize,
    pub history_trim_to: usize,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MnemoError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| MnemoError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MnemoError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| MnemoError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: MNEMO_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("MNEMO_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        let parse_bool = |value: &str| {
            value.parse::<bool>().map_err(|_| MnemoError::InvalidConfigValue {
                path: path.to_string(),
                message: format!("Cannot parse '{}' as boolean", value),
            })
        };
        let parse_usize = |value: &str| {
            value.parse::<usize>().map_err(|_| MnemoError::InvalidConfigValue {
                path: path.to_string(),
                message: format!("Cannot parse '{}' as integer", value),
            })
        };

        match path {
            "STORAGE__BACKEND" => self.storage.backend = value.to_string(),
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__DIMENSIONS" => self.embedding.dimensions = parse_usize(value)?,
            "GENERATION__ENABLED" => self.generation.enabled = parse_bool(value)?,
            "GENERATION__BASE_URL" => self.generation.base_url = value.to_string(),
            "GENERATION__MODEL" => self.generation.model = value.to_string(),
            "GENERATION__API_KEY_ENV" => self.generation.api_key_env = value.to_string(),
            "RETRIEVAL__STRATEGY" => self.retrieval.strategy = value.to_string(),
            "RAG__CHUNK_SIZE" => self.rag.chunk_size = parse_usize(value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| MnemoError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("mnemo").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| MnemoError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".mnemo"))
    }

    /// Store tunables derived from this configuration
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            batch_size: self.embedding.batch_size,
            embed_timeout: Duration::from_secs(self.embedding.timeout_secs),
            query_timeout: Duration::from_secs(self.retrieval.query_timeout_secs),
        }
    }

    /// Pipeline options derived from this configuration
    pub fn rag_options(&self) -> RagOptions {
        RagOptions {
            chunk_size: self.rag.chunk_size,
            chunk_overlap: self.rag.chunk_overlap,
            max_context_chars: self.rag.max_context_chars,
            use_history: self.rag.use_history,
            history_max_entries: self.rag.history_max_entries,
            history_trim_to: self.rag.history_trim_to,
            generation: GenerationOptions {
                temperature: self.generation.temperature,
                max_tokens: self.generation.max_tokens,
                timeout: Duration::from_secs(self.generation.timeout_secs),
            },
        }
    }

    /// The configured default retrieval strategy
    pub fn default_strategy(&self) -> Strategy {
        Strategy::from_name(&self.retrieval.strategy).unwrap_or_default()
    }

    /// Expansion and synonym tables, with config overrides applied
    pub fn expansion_tables(&self) -> ExpansionTables {
        let to_entries = |table: &Option<HashMap<String, Vec<String>>>| {
            table
                .as_ref()
                .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        };
        ExpansionTables::with_overrides(
            to_entries(&self.retrieval.expansions),
            to_entries(&self.retrieval.synonyms),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                backend: "sqlite".to_string(),
                data_dir: PathBuf::from("~/.mnemo"),
                compression_threshold: 4096,
            },
            embedding: EmbeddingConfig {
                provider: "hashing".to_string(),
                model: "all-MiniLM-L6-v2".to_string(),
                dimensions: 384,
                batch_size: 32,
                timeout_secs: 30,
            },
            generation: GenerationConfig {
                enabled: false,
                base_url: "http://localhost:11434/v1".to_string(),
                model: "llama3.2".to_string(),
                api_key_env: String::new(),
                temperature: 0.2,
                max_tokens: 512,
                timeout_secs: 60,
            },
            retrieval: RetrievalConfig {
                strategy: "semantic".to_string(),
                limit: 5,
                score_threshold: 0.0,
                cache_capacity: 128,
                rerank_boost: 0.1,
                diversify_threshold: 0.8,
                query_timeout_secs: 30,
                expansions: None,
                synonyms: None,
            },
            rag: RagConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
                max_context_chars: 4000,
                use_history: true,
                history_max_entries: 20,
                history_trim_to: 10,
            },
        }
    }
}
