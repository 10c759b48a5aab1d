//! Configuration management for fshdkb
//!
//! Configuration is a TOML file with one table per concern. Every section has
//! defaults, so a partial file (or none at all) is valid. Environment variables
//! override selected keys after the file is read; connection secrets are only
//! ever read from the environment.

use crate::error::{KbError, Result};
use crate::retrieval::DuplicatePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Current configuration schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chroma: ChromaConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            created_at: current_timestamp(),
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Texts per model call during ingestion
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            batch_size: 32,
        }
    }
}

/// Which vector collection backs the search engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Remote Chroma collection over HTTP
    Chroma,
    /// SQLite-persisted collection with an in-memory HNSW index
    Local,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chroma" => Ok(Self::Chroma),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory holding the local collection database
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Chroma,
            data_dir: PathBuf::from("~/.fshdkb"),
        }
    }
}

/// Remote Chroma connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaConfig {
    pub host: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub tenant: String,
    pub database: String,
    pub collection: String,
    pub timeout_secs: u64,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            host: "https://api.trychroma.com".to_string(),
            api_key_env: "CHROMA_API_KEY".to_string(),
            tenant: String::new(),
            database: "FSHD".to_string(),
            collection: "fshd_knowledge_base".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ChromaConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| KbError::MissingCredential(self.api_key_env.clone()))
    }

    /// Fail fast when the remote collection cannot possibly be reached
    pub fn require_credentials(&self) -> Result<String> {
        let key = self.api_key()?;
        if self.tenant.trim().is_empty() {
            return Err(KbError::MissingCredential("CHROMA_TENANT_ID".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(KbError::MissingCredential("CHROMA_DATABASE".to_string()));
        }
        if self.collection.trim().is_empty() {
            return Err(KbError::MissingCredential("CHROMA_COLLECTION".to_string()));
        }
        Ok(key)
    }
}

/// HNSW settings for the local collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    pub max_elements: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 128,
            max_elements: 100_000,
        }
    }
}

/// Search defaults, overridable per request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub final_n: usize,
    pub fetch_k: usize,
    pub max_per_source: usize,
    pub max_queries: usize,
    pub timeout_secs: u64,
    pub duplicate_policy: DuplicatePolicy,
    /// Optional TOML file replacing the built-in expansion rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansions_file: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            final_n: 8,
            fetch_k: 80,
            max_per_source: 4,
            max_queries: 6,
            timeout_secs: 60,
            duplicate_policy: DuplicatePolicy::FirstSeen,
            expansions_file: None,
        }
    }
}

/// Junk passage filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    pub min_chars: usize,
    pub junk_patterns: Vec<String>,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            min_chars: 30,
            junk_patterns: [
                "目录",
                "上一篇",
                "下一篇",
                "连载",
                "撰文",
                "排版",
                "责任编辑",
                "点击阅读",
                "更多内容",
                r"病友故事\s*·\s*目录",
                "社区简介",
                "我们在路上",
                "不是一个人",
                "康复医师网络",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

/// HTTP service binding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5010,
        }
    }
}

/// Batch loader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Records per upsert call
    pub upload_batch_size: usize,
    /// Pause between upserts, to stay under remote rate limits
    pub upload_delay_ms: u64,
    /// Documents with less text than this are skipped
    pub min_document_chars: usize,
    /// Chunks must be longer than this to be stored
    pub min_chunk_chars: usize,
    /// File extensions read as plain text
    pub extensions: Vec<String>,
    pub progress_file: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            upload_batch_size: 30,
            upload_delay_ms: 200,
            min_document_chars: 50,
            min_chunk_chars: 30,
            extensions: vec!["txt".to_string(), "md".to_string()],
            progress_file: PathBuf::from("upload_progress.json"),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(KbError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| KbError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load from `path` if present, otherwise defaults (still env-overridden and validated)
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if path.exists() {
            return Self::load(&path);
        }

        tracing::debug!("Config file {:?} not found, using defaults", path);
        let mut config = Config::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| KbError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply overrides from arbitrary key/value pairs
    ///
    /// Recognises the service's historical variable names (`KB_FINAL_N`,
    /// `CHROMA_TENANT_ID`, ...) and `FSHDKB_SECTION__KEY` for the rest.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            if let Err(e) = self.set_value_from_env(key, value) {
                tracing::warn!("Failed to apply env override {}: {}", key, e);
            }
        }
    }

    fn set_value_from_env(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "KB_FINAL_N" | "FSHDKB_SEARCH__FINAL_N" => {
                self.search.final_n = parse_value(key, value)?;
            }
            "KB_FETCH_K" | "FSHDKB_SEARCH__FETCH_K" => {
                self.search.fetch_k = parse_value(key, value)?;
            }
            "KB_MAX_PER_SOURCE" | "FSHDKB_SEARCH__MAX_PER_SOURCE" => {
                self.search.max_per_source = parse_value(key, value)?;
            }
            "KB_SERVICE_HOST" | "FSHDKB_SERVICE__HOST" => {
                self.service.host = value.to_string();
            }
            "KB_SERVICE_PORT" | "FSHDKB_SERVICE__PORT" => {
                self.service.port = parse_value(key, value)?;
            }
            "CHROMA_TENANT_ID" | "FSHDKB_CHROMA__TENANT" => {
                if !value.is_empty() {
                    self.chroma.tenant = value.to_string();
                }
            }
            "CHROMA_TENANT" => {
                // Legacy spelling, only used when the _ID form left it unset
                if self.chroma.tenant.is_empty() {
                    self.chroma.tenant = value.to_string();
                }
            }
            "CHROMA_DATABASE" | "FSHDKB_CHROMA__DATABASE" => {
                self.chroma.database = value.to_string();
            }
            "CHROMA_COLLECTION" | "FSHDKB_CHROMA__COLLECTION" => {
                self.chroma.collection = value.to_string();
            }
            "CHROMA_HOST" | "FSHDKB_CHROMA__HOST" => {
                self.chroma.host = value.to_string();
            }
            "FSHDKB_STORE__BACKEND" => {
                self.store.backend =
                    value
                        .parse()
                        .map_err(|message| KbError::InvalidConfigValue {
                            path: key.to_string(),
                            message,
                        })?;
            }
            "FSHDKB_STORE__DATA_DIR" => {
                self.store.data_dir = PathBuf::from(value);
            }
            "FSHDKB_EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            other if other.starts_with("FSHDKB_") => {
                tracing::debug!("Unknown env config key: {}", other);
            }
            _ => {}
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| KbError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("fshdkb").join("config.toml"))
    }

    /// Local collection database file, with `~/` expanded
    pub fn local_db_path(&self) -> Result<PathBuf> {
        Ok(expand_path(&self.store.data_dir)?.join("collection.sqlite"))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| KbError::InvalidConfigValue {
        path: key.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| KbError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| KbError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_defaults() {
        let config = Config::default();
        assert_eq!(config.search.final_n, 8);
        assert_eq!(config.search.fetch_k, 80);
        assert_eq!(config.search.max_per_source, 4);
        assert_eq!(config.filters.min_chars, 30);
        assert_eq!(config.service.port, 5010);
        assert_eq!(config.chroma.collection, "fshd_knowledge_base");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [search]
            final_n = 5

            [store]
            backend = "local"
            "#,
        )
        .unwrap();

        assert_eq!(config.search.final_n, 5);
        assert_eq!(config.search.fetch_k, 80);
        assert_eq!(config.store.backend, StoreBackend::Local);
        assert_eq!(config.meta.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config.apply_overrides([
            ("KB_FINAL_N", "3"),
            ("KB_SERVICE_PORT", "6000"),
            ("CHROMA_TENANT", "legacy"),
            ("CHROMA_TENANT_ID", "tenant-1"),
            ("FSHDKB_STORE__BACKEND", "local"),
            ("PATH", "/usr/bin"),
        ]);

        assert_eq!(config.search.final_n, 3);
        assert_eq!(config.service.port, 6000);
        assert_eq!(config.chroma.tenant, "tenant-1");
        assert_eq!(config.store.backend, StoreBackend::Local);
    }

    #[test]
    fn bad_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides([("KB_FETCH_K", "lots")]);
        assert_eq!(config.search.fetch_k, 80);
    }

    #[test]
    fn missing_api_key_is_a_credential_error() {
        let chroma = ChromaConfig {
            api_key_env: "FSHDKB_TEST_UNSET_KEY_VAR".to_string(),
            tenant: "tenant-1".to_string(),
            ..ChromaConfig::default()
        };
        match chroma.require_credentials() {
            Err(KbError::MissingCredential(name)) => assert_eq!(name, "FSHDKB_TEST_UNSET_KEY_VAR"),
            other => panic!("expected missing key, got {:?}", other),
        }
    }

    #[test]
    fn missing_tenant_is_a_credential_error() {
        std::env::set_var("FSHDKB_TEST_TENANT_KEY_VAR", "secret");
        let mut chroma = ChromaConfig {
            api_key_env: "FSHDKB_TEST_TENANT_KEY_VAR".to_string(),
            tenant: "  ".to_string(),
            ..ChromaConfig::default()
        };
        match chroma.require_credentials() {
            Err(KbError::MissingCredential(name)) => assert_eq!(name, "CHROMA_TENANT_ID"),
            other => panic!("expected missing tenant, got {:?}", other),
        }

        chroma.tenant = "tenant-1".to_string();
        assert_eq!(chroma.require_credentials().unwrap(), "secret");
    }

    #[test]
    fn roundtrip_save_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.search.max_queries = 4;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.search.max_queries, 4);
    }
}
