use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported file type: {extension}. Supported types: .pdf, .txt")]
    UnsupportedFileType { extension: String },

    #[error("Failed to read document {path}: {message}")]
    Document { path: String, message: String },

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Language model error: {0}")]
    LanguageModel(String),

    #[error("Timed out after {waited:?} waiting for run output (last status: {last_status:?})")]
    Timeout {
        waited: Duration,
        last_status: Option<String>,
    },

    #[error("Function run {status}")]
    RunFailed { status: String },

    #[error("Rate limit exceeded for {key}")]
    RateLimited { key: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Whether a workflow step that failed with this error may be attempted again.
    ///
    /// Provider, store and IO failures are transient. A `Timeout` only comes
    /// from a client that gave up polling, so it is final.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingProvider(_)
                | Self::StoreUnavailable(_)
                | Self::LanguageModel(_)
                | Self::Io(_)
        )
    }
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub mod client;
pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
pub mod http;
pub mod llm;
pub mod server;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod workflow;
