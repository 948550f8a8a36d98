use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cosmwasm_std::Uint128;
use hyperdrive_agents_chain::{ChainClient, ChainError, SimulatedChain};
use hyperdrive_agents_config::{AppConfig, DatabaseBackend};
use hyperdrive_agents_executor::{CrashReportConfig, ExecutorConfig};
use hyperdrive_agents_metrics::{init_tracing, MetricsCollector, TracingConfig};
use hyperdrive_agents_types::FailureCause;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::error::{InteractiveError, Result};

/// First agent account; later agents count up from here
const AGENT_ADDRESS_BASE: u64 = 0xa6e7_0000_0000;

/// Mints base tokens to fresh agent accounts
#[async_trait]
pub trait Faucet: Send + Sync {
    async fn fund(&self, token: &str, account: &str, amount: Uint128) -> std::result::Result<(), ChainError>;
}

#[async_trait]
impl Faucet for SimulatedChain {
    async fn fund(&self, token: &str, account: &str, amount: Uint128) -> std::result::Result<(), ChainError> {
        self.mint_base(token, account, amount)
    }
}

/// Backing database for each pool
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    /// One SQLite file per pool under `dir`
    Sqlite { dir: PathBuf },
}

/// Runtime settings shared by every pool and agent on one chain
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub executor: ExecutorConfig,
    pub crash_report: CrashReportConfig,
    pub snapshot_dir: PathBuf,
    /// Restore agent RNG state on snapshot load
    pub restore_rng: bool,
    pub store: StoreBackend,
    /// Ingest on a background task instead of inline after each trade
    pub background_sync: bool,
    /// Applied to intents that carry no slippage tolerance of their own
    pub default_slippage_tolerance: Option<Decimal>,
    /// Agent RNGs are seeded from this and the agent's index
    pub seed: u64,
    pub metrics_enabled: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            crash_report: CrashReportConfig::default(),
            snapshot_dir: PathBuf::from(".hyperdrive-agents/snapshot"),
            restore_rng: true,
            store: StoreBackend::Memory,
            background_sync: false,
            default_slippage_tolerance: None,
            seed: 0,
            metrics_enabled: true,
        }
    }
}

impl ContextConfig {
    /// Translate the file/env configuration into runtime settings
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let executor = ExecutorConfig::default()
            .with_receipt_timeout(Duration::from_millis(config.executor.receipt_timeout_ms))
            .with_poll_interval(
                Duration::from_millis(config.executor.poll_interval_ms),
                Duration::from_millis(config.executor.max_poll_interval_ms),
            )
            .with_nonce_read_attempts(config.executor.nonce_read_attempts)
            .with_default_gas_limit(config.executor.default_gas_limit);

        let mut crash_report = CrashReportConfig::default().with_chain_state(config.crash_report.include_chain_state);
        if let Some(path) = &config.crash_report.log_file {
            crash_report = crash_report.with_log_file(path);
        }
        for name in &config.crash_report.ignored_causes {
            let cause: FailureCause = serde_json::from_value(serde_json::Value::String(name.clone()))
                .map_err(|_| InteractiveError::Config(format!("unknown failure cause '{name}'")))?;
            crash_report = crash_report.ignore(cause);
        }

        let default_slippage_tolerance = match config.executor.default_slippage_tolerance {
            Some(value) => Some(Decimal::from_f64(value).ok_or_else(|| {
                InteractiveError::Config(format!("slippage tolerance {value} is not representable"))
            })?),
            None => None,
        };

        let store = match config.database.backend {
            DatabaseBackend::Memory => StoreBackend::Memory,
            DatabaseBackend::Sqlite => StoreBackend::Sqlite {
                dir: config.database.dir.clone(),
            },
        };

        Ok(Self {
            executor,
            crash_report,
            snapshot_dir: config.snapshot.dir.clone(),
            restore_rng: config.snapshot.restore_rng,
            store,
            background_sync: config.database.background_sync,
            default_slippage_tolerance,
            seed: 0,
            metrics_enabled: config.metrics.enabled,
        })
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    pub fn with_restore_rng(mut self, restore: bool) -> Self {
        self.restore_rng = restore;
        self
    }

    pub fn with_store(mut self, store: StoreBackend) -> Self {
        self.store = store;
        self
    }

    pub fn with_background_sync(mut self, enabled: bool) -> Self {
        self.background_sync = enabled;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_crash_report(mut self, crash_report: CrashReportConfig) -> Self {
        self.crash_report = crash_report;
        self
    }

    pub fn with_default_slippage_tolerance(mut self, tolerance: Decimal) -> Self {
        self.default_slippage_tolerance = Some(tolerance);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Chain handle plus everything pools and agents share. Passed around
/// explicitly; there is no global chain.
pub struct ChainContext {
    chain: Arc<dyn ChainClient>,
    faucet: Option<Arc<dyn Faucet>>,
    chain_id: u64,
    config: ContextConfig,
    metrics: MetricsCollector,
    next_account: AtomicU64,
    active_agents: AtomicI64,
}

impl ChainContext {
    pub async fn new(chain: Arc<dyn ChainClient>, config: ContextConfig) -> Result<Self> {
        let chain_id = chain.chain_id().await?;
        let metrics = if config.metrics_enabled {
            MetricsCollector::new()
        } else {
            MetricsCollector::disabled()
        };
        Ok(Self {
            chain,
            faucet: None,
            chain_id,
            config,
            metrics,
            next_account: AtomicU64::new(0),
            active_agents: AtomicI64::new(0),
        })
    }

    pub fn with_faucet(mut self, faucet: Arc<dyn Faucet>) -> Self {
        self.faucet = Some(faucet);
        self
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    pub fn faucet(&self) -> Option<&Arc<dyn Faucet>> {
        self.faucet.as_ref()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Fresh account address and the RNG seeded for it
    pub(crate) fn next_account(&self) -> (String, ChaCha8Rng) {
        let index = self.next_account.fetch_add(1, Ordering::Relaxed);
        let address = format!("0x{:040x}", AGENT_ADDRESS_BASE + index);
        let rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(index));
        (address, rng)
    }

    pub(crate) fn track_agents(&self, delta: i64) {
        let active = self.active_agents.fetch_add(delta, Ordering::Relaxed) + delta;
        self.metrics.set_active_agents(active.max(0) as usize);
    }
}

/// Install the global tracing subscriber from the `[logging]` section.
/// Errors if a subscriber is already installed.
pub fn init_logging(config: &AppConfig) -> Result<()> {
    let tracing = TracingConfig {
        level: config.logging.level.clone(),
        json: config.logging.json,
    };
    init_tracing(&tracing).map_err(|e| InteractiveError::Config(e.to_string()))
}
