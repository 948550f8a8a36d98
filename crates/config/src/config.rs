//! Configuration sections for the agent runtime

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration. Every section falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub executor: ExecutorSettings,
    pub crash_report: CrashReportSettings,
    pub snapshot: SnapshotConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Which chain client to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainBackend {
    /// In-process simulated chain
    #[default]
    Simulated,
    /// JSON-RPC dev node
    Rpc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub backend: ChainBackend,

    /// Dev node endpoint, used by the `rpc` backend
    pub rpc_url: String,

    pub chain_id: u64,

    /// Genesis block time of the simulated chain
    pub genesis_timestamp: u64,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

/// Submission timing, mapped onto the executor's own config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    pub receipt_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub nonce_read_attempts: u32,

    /// Gas limit sent with trades that set none
    pub default_gas_limit: u64,

    /// Slippage applied to intents that carry none, e.g. 0.01 for 1%
    pub default_slippage_tolerance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashReportSettings {
    /// JSON-lines file reports are appended to
    pub log_file: Option<PathBuf>,

    /// Failure causes never reported, e.g. `["SLIPPAGE"]`
    pub ignored_causes: Vec<String>,

    /// Attach the pool's full database to every report
    pub include_chain_state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Directory snapshot files are written into
    pub dir: PathBuf,

    /// Restore agent RNG state on load
    pub restore_rng: bool,
}

/// Where pool databases live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Memory,
    /// One SQLite file per pool under `database.dir`
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub dir: PathBuf,

    /// Ingest on a background task instead of after each trade
    pub background_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins
    pub level: String,

    /// JSON lines instead of pretty output
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            backend: ChainBackend::Simulated,
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 31337,
            genesis_timestamp: 1_700_000_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            receipt_timeout_ms: 60_000,
            poll_interval_ms: 50,
            max_poll_interval_ms: 2_000,
            nonce_read_attempts: 5,
            default_gas_limit: 1_000_000,
            default_slippage_tolerance: None,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".hyperdrive-agents/snapshot"),
            restore_rng: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Memory,
            dir: PathBuf::from(".hyperdrive-agents/db"),
            background_sync: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
