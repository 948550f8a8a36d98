//! Configuration for the Hyperdrive agent runtime
//!
//! This crate provides:
//! - Multiple config formats (TOML, YAML, JSON)
//! - Environment variable overrides under the `HYPERDRIVE_AGENTS` prefix
//! - Range validation of every section

mod config;
mod loader;
mod validation;

pub use config::*;
pub use loader::*;
pub use validation::*;

/// Prefix for environment overrides, e.g. `HYPERDRIVE_AGENTS_CHAIN__RPC_URL`
pub const ENV_PREFIX: &str = "HYPERDRIVE_AGENTS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Config validation failed: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config library error: {0}")]
    ConfigLibError(#[from] ::config::ConfigError),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
