use crate::config::{Config, StoreBackend, SCHEMA_VERSION};
use crate::error::{KbError, Result, ValidationError};
use regex::Regex;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_store(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_filters(config, &mut errors);
        Self::validate_ingest(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(KbError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.trim().is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_store(config: &Config, errors: &mut Vec<ValidationError>) {
        match config.store.backend {
            StoreBackend::Chroma => {
                let host = config.chroma.host.trim();
                if !(host.starts_with("http://") || host.starts_with("https://")) {
                    errors.push(ValidationError::new(
                        "chroma.host",
                        format!("Host must be an http(s) URL: {}", host),
                    ));
                }
                if config.chroma.api_key_env.trim().is_empty() {
                    errors.push(ValidationError::new(
                        "chroma.api_key_env",
                        "API key variable name cannot be empty",
                    ));
                }
                if config.chroma.timeout_secs == 0 {
                    errors.push(ValidationError::new(
                        "chroma.timeout_secs",
                        "Timeout must be greater than 0",
                    ));
                }
            }
            StoreBackend::Local => {
                if config.store.data_dir.as_os_str().is_empty() {
                    errors.push(ValidationError::new(
                        "store.data_dir",
                        "Data directory cannot be empty",
                    ));
                }
            }
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        let index = &config.index;
        if index.hnsw_m == 0 || index.hnsw_m > 256 {
            errors.push(ValidationError::new(
                "index.hnsw_m",
                format!("hnsw_m must be between 1 and 256, got {}", index.hnsw_m),
            ));
        }
        if index.hnsw_ef_construction == 0 || index.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "index",
                "HNSW ef parameters must be greater than 0",
            ));
        }
        if index.max_elements == 0 {
            errors.push(ValidationError::new(
                "index.max_elements",
                "max_elements must be greater than 0",
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;
        for (path, value) in [
            ("search.final_n", search.final_n),
            ("search.fetch_k", search.fetch_k),
            ("search.max_per_source", search.max_per_source),
            ("search.max_queries", search.max_queries),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Must be greater than 0"));
            }
        }

        if search.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "search.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_filters(config: &Config, errors: &mut Vec<ValidationError>) {
        for (i, pattern) in config.filters.junk_patterns.iter().enumerate() {
            if let Err(e) = Regex::new(pattern) {
                errors.push(ValidationError::new(
                    format!("filters.junk_patterns[{}]", i),
                    format!("Invalid regex '{}': {}", pattern, e),
                ));
            }
        }
    }

    fn validate_ingest(config: &Config, errors: &mut Vec<ValidationError>) {
        let ingest = &config.ingest;
        if ingest.chunk_size == 0 {
            errors.push(ValidationError::new(
                "ingest.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }
        if ingest.upload_batch_size == 0 {
            errors.push(ValidationError::new(
                "ingest.upload_batch_size",
                "Upload batch size must be greater than 0",
            ));
        }
        if ingest.extensions.is_empty() {
            errors.push(ValidationError::new(
                "ingest.extensions",
                "At least one file extension is required",
            ));
        }
    }
}
