use crate::config::Config;
use crate::error::{MnemoError, Result, ValidationError};
use crate::retrieval::Strategy;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_generation(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_rag(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MnemoError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        let backend = &config.storage.backend;
        if backend != "sqlite" && backend != "memory" {
            errors.push(ValidationError::new(
                "storage.backend",
                format!("Backend must be 'sqlite' or 'memory', got '{}'", backend),
            ));
        }

        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        match provider.as_str() {
            "hashing" => {
                if config.embedding.dimensions == 0 {
                    errors.push(ValidationError::new(
                        "embedding.dimensions",
                        "Dimensions must be greater than 0",
                    ));
                }
            }
            "fastembed" => {
                if config.embedding.model.is_empty() {
                    errors.push(ValidationError::new(
                        "embedding.model",
                        "Model name cannot be empty",
                    ));
                }
            }
            _ => {
                errors.push(ValidationError::new(
                    "embedding.provider",
                    format!("Provider must be 'hashing' or 'fastembed', got '{}'", provider),
                ));
            }
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "embedding.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_generation(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.generation.enabled {
            let url = &config.generation.base_url;
            if !url.starts_with("http://") && !url.starts_with("https://") {
                errors.push(ValidationError::new(
                    "generation.base_url",
                    format!("Base URL must start with http:// or https://, got '{}'", url),
                ));
            }

            if config.generation.model.is_empty() {
                errors.push(ValidationError::new(
                    "generation.model",
                    "Model name cannot be empty",
                ));
            }

            // An empty api_key_env means a keyless endpoint; a named
            // variable has to resolve to something usable
            let env_var = &config.generation.api_key_env;
            if !env_var.is_empty() {
                match std::env::var(env_var) {
                    Ok(key) if key.is_empty() => {
                        errors.push(ValidationError::new(
                            "generation.api_key_env",
                            format!("Environment variable {} is empty", env_var),
                        ));
                    }
                    Err(_) => {
                        errors.push(ValidationError::new(
                            "generation.api_key_env",
                            format!("Environment variable {} is not set", env_var),
                        ));
                    }
                    Ok(_) => {}
                }
            }
        }

        let temp = config.generation.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "generation.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        if config.generation.max_tokens == 0 {
            errors.push(ValidationError::new(
                "generation.max_tokens",
                "Max tokens must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if Strategy::from_name(&config.retrieval.strategy).is_none() {
            errors.push(ValidationError::new(
                "retrieval.strategy",
                format!(
                    "Strategy must be one of semantic, hybrid, mmr, contextual, multi-query; got '{}'",
                    config.retrieval.strategy
                ),
            ));
        }

        if config.retrieval.limit == 0 {
            errors.push(ValidationError::new(
                "retrieval.limit",
                "Limit must be greater than 0",
            ));
        }

        let threshold = config.retrieval.score_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "retrieval.score_threshold",
                format!("Score threshold must be between 0.0 and 1.0, got {}", threshold),
            ));
        }

        if config.retrieval.cache_capacity == 0 {
            errors.push(ValidationError::new(
                "retrieval.cache_capacity",
                "Cache capacity must be greater than 0",
            ));
        }

        let boost = config.retrieval.rerank_boost;
        if !(0.0..=1.0).contains(&boost) {
            errors.push(ValidationError::new(
                "retrieval.rerank_boost",
                format!("Rerank boost must be between 0.0 and 1.0, got {}", boost),
            ));
        }

        let diversify = config.retrieval.diversify_threshold;
        if !(diversify > 0.0 && diversify <= 1.0) {
            errors.push(ValidationError::new(
                "retrieval.diversify_threshold",
                format!(
                    "Diversify threshold must be in (0.0, 1.0], got {}",
                    diversify
                ),
            ));
        }
    }

    fn validate_rag(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.rag.chunk_size == 0 {
            errors.push(ValidationError::new(
                "rag.chunk_size",
                "Chunk size must be greater than 0",
            ));
        } else if config.rag.chunk_overlap >= config.rag.chunk_size {
            errors.push(ValidationError::new(
                "rag.chunk_overlap",
                format!(
                    "Chunk overlap ({}) must be smaller than chunk size ({})",
                    config.rag.chunk_overlap, config.rag.chunk_size
                ),
            ));
        }

        if config.rag.max_context_chars == 0 {
            errors.push(ValidationError::new(
                "rag.max_context_chars",
                "Max context chars must be greater than 0",
            ));
        }

        if config.rag.history_max_entries == 0 {
            errors.push(ValidationError::new(
                "rag.history_max_entries",
                "History max entries must be greater than 0",
            ));
        } else if config.rag.history_trim_to > config.rag.history_max_entries {
            errors.push(ValidationError::new(
                "rag.history_trim_to",
                format!(
                    "History trim target ({}) cannot exceed max entries ({})",
                    config.rag.history_trim_to, config.rag.history_max_entries
                ),
            ));
        }
    }
}
