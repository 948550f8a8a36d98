//! Configuration validation

use crate::{AppConfig, ChainBackend, ChainConfig, ConfigError, DatabaseBackend, ExecutorSettings, Result};

/// Failure cause names accepted by `crash_report.ignored_causes`
pub const FAILURE_CAUSES: [&str; 9] = [
    "LOCAL_VALIDATION",
    "INSUFFICIENT_ALLOWANCE",
    "INVALID_BALANCE",
    "SLIPPAGE",
    "MIN_TXN_AMOUNT",
    "OUT_OF_GAS",
    "UNKNOWN_CHAIN_ERROR",
    "TIMEOUT",
    "UNKNOWN",
];

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the entire application configuration, reporting every problem
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let mut errors = Vec::new();

    if let Err(e) = validate_chain_config(&config.chain) {
        errors.push(ValidationError::new("chain", e));
    }

    errors.extend(validate_executor(&config.executor));

    for cause in &config.crash_report.ignored_causes {
        if !FAILURE_CAUSES.contains(&cause.as_str()) {
            errors.push(ValidationError::new(
                "crash_report.ignored_causes",
                format!("unknown failure cause '{cause}'"),
            ));
        }
    }
    if config
        .crash_report
        .log_file
        .as_ref()
        .is_some_and(|path| path.as_os_str().is_empty())
    {
        errors.push(ValidationError::new("crash_report.log_file", "path cannot be empty"));
    }

    if config.snapshot.dir.as_os_str().is_empty() {
        errors.push(ValidationError::new("snapshot.dir", "snapshot directory is required"));
    }

    if config.database.backend == DatabaseBackend::Sqlite && config.database.dir.as_os_str().is_empty() {
        errors.push(ValidationError::new(
            "database.dir",
            "sqlite backend needs a database directory",
        ));
    }

    if let Err(e) = validate_log_level(&config.logging.level) {
        errors.push(e);
    }

    if !errors.is_empty() {
        let error_msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ConfigError::ValidationError(error_msg));
    }

    Ok(())
}

/// Validate a chain configuration
pub fn validate_chain_config(chain: &ChainConfig) -> std::result::Result<(), String> {
    if chain.chain_id == 0 {
        return Err("chain_id must be greater than 0".to_string());
    }

    if chain.request_timeout_ms == 0 {
        return Err("request_timeout_ms must be greater than 0".to_string());
    }

    if chain.backend == ChainBackend::Rpc {
        validate_url(&chain.rpc_url)?;
    }

    Ok(())
}

fn validate_executor(executor: &ExecutorSettings) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if executor.receipt_timeout_ms == 0 {
        errors.push(ValidationError::new("executor.receipt_timeout_ms", "must be greater than 0"));
    }

    if executor.poll_interval_ms == 0 {
        errors.push(ValidationError::new("executor.poll_interval_ms", "must be greater than 0"));
    }

    if executor.max_poll_interval_ms < executor.poll_interval_ms {
        errors.push(ValidationError::new(
            "executor.max_poll_interval_ms",
            "must be >= poll_interval_ms",
        ));
    }

    if executor.nonce_read_attempts == 0 {
        errors.push(ValidationError::new("executor.nonce_read_attempts", "must be greater than 0"));
    }

    if executor.default_gas_limit < 21_000 {
        errors.push(ValidationError::new("executor.default_gas_limit", "must be at least 21000"));
    }

    if let Some(tolerance) = executor.default_slippage_tolerance {
        if !(0.0..1.0).contains(&tolerance) {
            errors.push(ValidationError::new(
                "executor.default_slippage_tolerance",
                format!("{tolerance} is outside [0, 1)"),
            ));
        }
    }

    errors
}

/// Validate a URL
pub fn validate_url(url: &str) -> std::result::Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    // Basic URL validation - check for scheme
    if !url.starts_with("http://")
        && !url.starts_with("https://")
        && !url.starts_with("ws://")
        && !url.starts_with("wss://")
    {
        return Err("URL must start with http://, https://, ws://, or wss://".to_string());
    }

    Ok(())
}

/// Validate log level
fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new(
            "logging.level",
            format!(
                "invalid log level '{level}', must be one of: trace, debug, info, warn, error"
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "invalid".to_string();

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("logging.level"));
    }

    #[test]
    fn test_validate_executor_ranges() {
        let mut config = AppConfig::default();
        config.executor.receipt_timeout_ms = 0;
        config.executor.default_slippage_tolerance = Some(1.0);
        config.executor.default_gas_limit = 0;

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("executor.receipt_timeout_ms"));
        assert!(err.contains("executor.default_slippage_tolerance"));
        assert!(err.contains("executor.default_gas_limit"));

        config.executor.receipt_timeout_ms = 1;
        config.executor.default_slippage_tolerance = Some(0.0);
        config.executor.default_gas_limit = 21_000;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_chain_config() {
        let mut chain = ChainConfig::default();
        assert!(validate_chain_config(&chain).is_ok());

        // The url only matters for the rpc backend
        chain.rpc_url = "localhost:8545".to_string();
        assert!(validate_chain_config(&chain).is_ok());
        chain.backend = ChainBackend::Rpc;
        assert!(validate_chain_config(&chain).is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://localhost:8545").is_ok());
        assert!(validate_url("ws://localhost:8545").is_ok());

        assert!(validate_url("").is_err());
        assert!(validate_url("not-a-url").is_err());
        assert!(validate_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_snapshot_and_causes() {
        let mut config = AppConfig::default();
        config.snapshot.dir = PathBuf::new();
        config.crash_report.ignored_causes = vec!["SLIPPAGE".to_string(), "BOGUS".to_string()];

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("snapshot.dir"));
        assert!(err.contains("BOGUS"));
        assert!(!err.contains("'SLIPPAGE'"));
    }
}
