//! Configuration loading from multiple sources

use crate::{AppConfig, ConfigError, Result, ENV_PREFIX};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

/// Configuration loader with support for multiple formats and sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    ///
    /// Supports TOML, YAML, and JSON formats based on file extension
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading config file");

        match extension {
            "toml" => Self::from_toml(&content),
            "yaml" | "yml" => Self::from_yaml(&content),
            "json" => Self::from_json(&content),
            _ => Err(ConfigError::LoadError(format!(
                "Unsupported file extension: {}",
                extension
            ))),
        }
    }

    pub fn from_toml(content: &str) -> Result<AppConfig> {
        toml::from_str(content).map_err(ConfigError::from)
    }

    pub fn from_yaml(content: &str) -> Result<AppConfig> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    pub fn from_json(content: &str) -> Result<AppConfig> {
        serde_json::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from `HYPERDRIVE_AGENTS_*` environment variables
    pub fn from_env() -> Result<AppConfig> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Environment variables take the form `PREFIX_SECTION__KEY`, for
    /// example `HYPERDRIVE_AGENTS_LOGGING__LEVEL=debug`. Unset keys keep
    /// their defaults.
    pub fn from_env_with_prefix(prefix: &str) -> Result<AppConfig> {
        Self::builder().add_env(prefix).build()
    }

    /// Section-wise merge: every overlay section that differs from its
    /// default replaces the base section
    pub fn merge(base: AppConfig, overlay: AppConfig) -> AppConfig {
        fn pick<T: PartialEq + Default>(base: T, overlay: T) -> T {
            if overlay == T::default() {
                base
            } else {
                overlay
            }
        }

        AppConfig {
            chain: pick(base.chain, overlay.chain),
            executor: pick(base.executor, overlay.executor),
            crash_report: pick(base.crash_report, overlay.crash_report),
            snapshot: pick(base.snapshot, overlay.snapshot),
            database: pick(base.database, overlay.database),
            logging: pick(base.logging, overlay.logging),
            metrics: pick(base.metrics, overlay.metrics),
        }
    }

    /// Load a file and apply environment overrides key by key
    pub fn from_file_with_env(path: &Path, env_prefix: &str) -> Result<AppConfig> {
        if !path.exists() {
            return Err(ConfigError::LoadError(format!("{} does not exist", path.display())));
        }
        Self::builder().add_file(path, true).add_env(env_prefix).build()
    }

    /// Build configuration using the config crate's builder pattern
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder {
            builder: Config::builder(),
        }
    }
}

/// Builder for layered configuration; later sources win
pub struct ConfigLoaderBuilder {
    builder: ConfigBuilder<config::builder::DefaultState>,
}

impl ConfigLoaderBuilder {
    /// Add a configuration file source
    pub fn add_file(mut self, path: &Path, required: bool) -> Self {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        };

        self.builder = self
            .builder
            .add_source(File::from(path).format(format).required(required));
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env(mut self, prefix: &str) -> Self {
        self.builder = self.builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        self
    }

    /// Set a default value for a dotted key such as `logging.level`
    pub fn set_default(mut self, key: &str, value: &str) -> Result<Self> {
        self.builder = self.builder.set_default(key, value)?;
        Ok(self)
    }

    /// Set a value that overrides every source
    pub fn set_override(mut self, key: &str, value: &str) -> Result<Self> {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    pub fn build(self) -> Result<AppConfig> {
        let config = self.builder.build()?;
        config.try_deserialize().map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChainBackend, DatabaseBackend, LoggingConfig};
    use std::io::Write;

    #[test]
    fn test_load_from_toml() {
        let toml = r#"
            [chain]
            backend = "rpc"
            rpc_url = "http://localhost:8545"
            chain_id = 42069

            [executor]
            receipt_timeout_ms = 5000
            default_gas_limit = 2000000
            default_slippage_tolerance = 0.01

            [logging]
            level = "debug"
        "#;

        let config = ConfigLoader::from_toml(toml).unwrap();
        assert_eq!(config.chain.backend, ChainBackend::Rpc);
        assert_eq!(config.chain.chain_id, 42069);
        assert_eq!(config.executor.receipt_timeout_ms, 5000);
        assert_eq!(config.executor.poll_interval_ms, 50);
        assert_eq!(config.executor.default_gas_limit, 2_000_000);
        assert_eq!(config.executor.default_slippage_tolerance, Some(0.01));
        assert_eq!(config.logging.level, "debug");
        assert!(config.snapshot.restore_rng);
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
database:
  backend: sqlite
  dir: /tmp/agents-db
  background_sync: true
crash_report:
  ignored_causes:
    - SLIPPAGE
    - TIMEOUT
        "#;

        let config = ConfigLoader::from_yaml(yaml).unwrap();
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert!(config.database.background_sync);
        assert_eq!(config.crash_report.ignored_causes.len(), 2);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{ "snapshot": { "dir": "/tmp/snap", "restore_rng": false }, "metrics": { "enabled": false } }"#;

        let config = ConfigLoader::from_json(json).unwrap();
        assert_eq!(config.snapshot.dir, std::path::PathBuf::from("/tmp/snap"));
        assert!(!config.snapshot.restore_rng);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"[logging]\nlevel = \"warn\"\njson = true\n").unwrap();

        let config = ConfigLoader::from_file(file.path()).unwrap();
        assert_eq!(
            config.logging,
            LoggingConfig {
                level: "warn".to_string(),
                json: true,
            }
        );
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            ConfigLoader::from_file(file.path()),
            Err(ConfigError::LoadError(_))
        ));
    }

    #[test]
    fn test_merge_configs() {
        let mut base = AppConfig::default();
        base.logging.level = "debug".to_string();
        base.chain.chain_id = 1;

        let mut overlay = AppConfig::default();
        overlay.chain.chain_id = 5;

        let merged = ConfigLoader::merge(base, overlay);
        assert_eq!(merged.logging.level, "debug");
        assert_eq!(merged.chain.chain_id, 5);
    }

    #[test]
    fn test_builder_defaults_and_overrides() {
        let config = ConfigLoader::builder()
            .set_default("logging.level", "trace")
            .unwrap()
            .set_override("chain.chain_id", "7")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.chain.chain_id, 7);
    }
}
