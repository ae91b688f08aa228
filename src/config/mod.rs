// Configuration management module
// TOML settings file, environment overrides, and display helpers

pub mod display;
pub mod settings;

pub use display::show_config;
pub use settings::{
    Config, ConfigError, DocumentsConfig, EmbeddingConfig, LlmConfig, QueryConfig, ServerConfig,
    VectorStoreConfig, WorkflowConfig,
};
