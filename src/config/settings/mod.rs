
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::database::lancedb::Distance;
use crate::documents::TextEncoding;
use crate::embeddings::chunking::ChunkingConfig;

pub const DEFAULT_PROVIDER_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimension: usize,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            api_key: String::new(),
            model: "openai/text-embedding-3-large".to_string(),
            dimension: 3072,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
    /// Sent as `HTTP-Referer` to the provider
    pub site_url: String,
    /// Sent as `X-Title` to the provider
    pub app_name: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            api_key: String::new(),
            model: "openai/gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout_seconds: 60,
            site_url: "http://localhost".to_string(),
            app_name: "rag-app".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// LanceDB connection URI; empty means `<base_dir>/vectors`
    pub uri: String,
    pub collection: String,
    pub distance: Distance,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            collection: "docs".to_string(),
            distance: Distance::Cosine,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentsConfig {
    pub encodings: Vec<TextEncoding>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            encodings: TextEncoding::DEFAULT_CHAIN.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkflowConfig {
    pub throttle_limit: usize,
    pub throttle_period_seconds: u64,
    pub rate_limit_per_source: usize,
    pub rate_limit_period_seconds: u64,
    pub step_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// How long finished event runs stay pollable
    pub run_retention_seconds: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            throttle_limit: 2,
            throttle_period_seconds: 60,
            rate_limit_per_source: 1,
            rate_limit_period_seconds: 4 * 60 * 60,
            step_max_attempts: 3,
            retry_base_delay_ms: 1000,
            run_retention_seconds: 60 * 60,
        }
    }
}

impl WorkflowConfig {
    #[inline]
    pub fn throttle_period(&self) -> Duration {
        Duration::from_secs(self.throttle_period_seconds)
    }

    #[inline]
    pub fn rate_limit_period(&self) -> Duration {
        Duration::from_secs(self.rate_limit_period_seconds)
    }

    #[inline]
    pub fn run_retention(&self) -> Duration {
        Duration::from_secs(self.run_retention_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueryConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

impl ServerConfig {
    #[inline]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL for {0}: {1}")]
    InvalidUrl(&'static str, String),
    #[error("Invalid model name for {0} (cannot be empty)")]
    InvalidModel(&'static str),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 8192)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid max tokens: {0} (must be greater than 0)")]
    InvalidMaxTokens(u32),
    #[error("Invalid timeout for {0}: must be greater than 0 seconds")]
    InvalidTimeout(&'static str),
    #[error("Invalid collection name: {0:?}")]
    InvalidCollection(String),
    #[error("Invalid max chunk size: {0} (must be greater than 0)")]
    InvalidMaxChunkSize(usize),
    #[error("Overlap size ({0}) must be smaller than max chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("At least one text encoding must be configured")]
    NoEncodings,
    #[error("Invalid {0}: must be greater than 0")]
    InvalidLimit(&'static str),
    #[error("Default top_k ({0}) must be between 1 and max top_k ({1})")]
    InvalidTopK(usize, usize),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid value for environment variable {0}: {1:?}")]
    InvalidEnvValue(&'static str, String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            vector_store: VectorStoreConfig::default(),
            chunking: ChunkingConfig::default(),
            documents: DocumentsConfig::default(),
            workflow: WorkflowConfig::default(),
            query: QueryConfig::default(),
            server: ServerConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

impl Config {
    /// Default base directory, `~/.rag-app`
    #[inline]
    pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".rag-app"))
            .or_else(|| dirs::data_dir().map(|data| data.join("rag-app")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `base_dir`, falling back to defaults when it is absent.
    ///
    /// Environment overrides are not applied here; see [`Config::apply_env_overrides`].
    #[inline]
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let config_path = base_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: base_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = base_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load from `base_dir`, then layer the process environment on top
    #[inline]
    pub fn load_with_env<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let mut config = Self::load(base_dir)?;
        config
            .apply_env_overrides(|key| std::env::var(key).ok())
            .context("Failed to apply environment overrides")?;
        config
            .validate()
            .context("Configuration validation failed after environment overrides")?;
        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Override settings from environment-style variables.
    ///
    /// `lookup` returns the value of a variable, if set. Empty values are ignored.
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("OPENROUTER_API_KEY") {
            self.embedding.api_key.clone_from(&key);
            self.llm.api_key = key;
        }
        if let Some(site_url) = get("OPENROUTER_SITE_URL") {
            self.llm.site_url = site_url;
        }
        if let Some(app_name) = get("OPENROUTER_APP_NAME") {
            self.llm.app_name = app_name;
        }

        if let Some(value) = get("RAG_EMBEDDING_BASE_URL") {
            self.embedding.base_url = value;
        }
        if let Some(value) = get("RAG_EMBEDDING_API_KEY") {
            self.embedding.api_key = value;
        }
        if let Some(value) = get("RAG_EMBEDDING_MODEL") {
            self.embedding.model = value;
        }
        if let Some(value) = get("RAG_EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse_env("RAG_EMBEDDING_DIMENSION", &value)?;
        }

        if let Some(value) = get("RAG_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = get("RAG_LLM_API_KEY") {
            self.llm.api_key = value;
        }
        if let Some(value) = get("RAG_LLM_MODEL") {
            self.llm.model = value;
        }

        if let Some(value) = get("RAG_VECTOR_STORE_URI") {
            self.vector_store.uri = value;
        }
        if let Some(value) = get("RAG_COLLECTION") {
            self.vector_store.collection = value;
        }

        if let Some(value) = get("RAG_CHUNK_SIZE") {
            self.chunking.max_chunk_size = parse_env("RAG_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = get("RAG_CHUNK_OVERLAP") {
            self.chunking.overlap_size = parse_env("RAG_CHUNK_OVERLAP", &value)?;
        }

        if let Some(value) = get("RAG_THROTTLE_LIMIT") {
            self.workflow.throttle_limit = parse_env("RAG_THROTTLE_LIMIT", &value)?;
        }
        if let Some(value) = get("RAG_THROTTLE_PERIOD_SECONDS") {
            self.workflow.throttle_period_seconds =
                parse_env("RAG_THROTTLE_PERIOD_SECONDS", &value)?;
        }
        if let Some(value) = get("RAG_RATE_LIMIT_PER_SOURCE") {
            self.workflow.rate_limit_per_source = parse_env("RAG_RATE_LIMIT_PER_SOURCE", &value)?;
        }
        if let Some(value) = get("RAG_RATE_LIMIT_PERIOD_SECONDS") {
            self.workflow.rate_limit_period_seconds =
                parse_env("RAG_RATE_LIMIT_PERIOD_SECONDS", &value)?;
        }
        if let Some(value) = get("RAG_RUN_RETENTION_SECONDS") {
            self.workflow.run_retention_seconds = parse_env("RAG_RUN_RETENTION_SECONDS", &value)?;
        }

        if let Some(value) = get("RAG_SERVER_HOST") {
            self.server.host = value;
        }
        if let Some(value) = get("RAG_SERVER_PORT") {
            self.server.port = parse_env("RAG_SERVER_PORT", &value)?;
        }

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.llm.validate()?;
        self.validate_store_config()?;
        self.validate_chunking_config()?;
        self.validate_workflow_config()?;

        if self.documents.encodings.is_empty() {
            return Err(ConfigError::NoEncodings);
        }

        if self.query.default_top_k == 0 || self.query.default_top_k > self.query.max_top_k {
            return Err(ConfigError::InvalidTopK(
                self.query.default_top_k,
                self.query.max_top_k,
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }

        Ok(())
    }

    fn validate_store_config(&self) -> Result<(), ConfigError> {
        let collection = &self.vector_store.collection;
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ConfigError::InvalidCollection(collection.clone()));
        }
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if config.max_chunk_size == 0 {
            return Err(ConfigError::InvalidMaxChunkSize(config.max_chunk_size));
        }

        if config.overlap_size >= config.max_chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap_size,
                config.max_chunk_size,
            ));
        }

        Ok(())
    }

    fn validate_workflow_config(&self) -> Result<(), ConfigError> {
        let config = &self.workflow;

        if config.throttle_limit == 0 {
            return Err(ConfigError::InvalidLimit("throttle_limit"));
        }
        if config.throttle_period_seconds == 0 {
            return Err(ConfigError::InvalidLimit("throttle_period_seconds"));
        }
        if config.rate_limit_per_source == 0 {
            return Err(ConfigError::InvalidLimit("rate_limit_per_source"));
        }
        if config.rate_limit_period_seconds == 0 {
            return Err(ConfigError::InvalidLimit("rate_limit_period_seconds"));
        }
        if config.step_max_attempts == 0 {
            return Err(ConfigError::InvalidLimit("step_max_attempts"));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the URI of the LanceDB database
    #[inline]
    pub fn vector_store_uri(&self) -> String {
        if self.vector_store.uri.is_empty() {
            self.get_base_dir().join("vectors").display().to_string()
        } else {
            self.vector_store.uri.clone()
        }
    }

    /// Directory where uploaded documents are staged before ingestion
    #[inline]
    pub fn uploads_dir(&self) -> PathBuf {
        self.get_base_dir().join("uploads")
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("embedding.base_url", &self.base_url)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel("embedding"));
        }

        if !(1..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if self.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout("embedding"));
        }

        Ok(())
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("llm.base_url", &self.base_url)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel("llm"));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens(self.max_tokens));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if self.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout("llm"));
        }

        Ok(())
    }
}

fn validate_http_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl(field, value.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(field, value.to_string()));
    }
    Ok(url)
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue(key, value.to_string()))
}
