use std::sync::Arc;

use chrono::{DateTime, Utc};
use hyperdrive_agents_chain::{BlockTag, ContractCaller};
use hyperdrive_agents_metrics::MetricsCollector;
use hyperdrive_agents_store::{ChainDataStore, PoolDump};
use hyperdrive_agents_types::{
    checkpoint_id, Checkpoint, FailureCause, PoolConfig, PoolInfo, TradeIntent, TradeResult, Wallet,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{error, warn};
use uuid::Uuid;

use crate::config::CrashReportConfig;
use crate::error::{ExecutionError, Result};

/// Everything known about a failed trade at the time it failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
    pub report_id: String,
    pub timestamp: DateTime<Utc>,
    pub account: String,
    pub intent: TradeIntent,
    pub cause: FailureCause,
    pub exception: String,
    pub revert_reason: Option<String>,
    pub annotations: Vec<String>,
    pub nonce: Option<u64>,
    pub transaction_hash: Option<String>,
    pub pre_trade_wallet: Option<Wallet>,
    pub pool_config: Option<PoolConfig>,
    pub pool_info: Option<PoolInfo>,
    pub checkpoint: Option<Checkpoint>,
    /// Full pool database, when configured
    pub chain_state: Option<PoolDump>,
}

/// Renders crash reports and hands them to the log and file sinks
pub struct CrashReporter {
    contract: Arc<dyn ContractCaller>,
    store: Option<Arc<dyn ChainDataStore>>,
    config: CrashReportConfig,
    metrics: MetricsCollector,
}

impl CrashReporter {
    pub fn new(contract: Arc<dyn ContractCaller>, config: CrashReportConfig) -> Self {
        Self {
            contract,
            store: None,
            config,
            metrics: MetricsCollector::new(),
        }
    }

    /// Source for the optional chain state dump
    pub fn with_store(mut self, store: Arc<dyn ChainDataStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &CrashReportConfig {
        &self.config
    }

    /// Report a FAIL result. Returns the report id, or `None` when the
    /// result succeeded or its cause is opted out. Sink errors are logged
    /// and swallowed.
    pub async fn report(&self, result: &TradeResult, wallet: Option<&Wallet>) -> Option<String> {
        let failure = result.failure.as_ref()?;
        if failure.cause == FailureCause::LocalValidation || self.config.ignored_causes.contains(&failure.cause) {
            return None;
        }

        let report = self.build(result, wallet).await;
        self.metrics.record_crash_report(report.cause);
        error!(
            target: "crash_report",
            report_id = %report.report_id,
            account = %report.account,
            action = ?report.intent.action.action_type(),
            cause = %report.cause,
            exception = %report.exception,
            annotations = ?report.annotations,
            "trade failed"
        );

        if let Some(path) = &self.config.log_file {
            if let Err(e) = self.append(path, &report).await {
                warn!(report_id = %report.report_id, path = %path.display(), error = %e, "crash report file sink failed");
            }
        }
        Some(report.report_id)
    }

    /// Assemble a report; context reads that fail are left empty
    pub async fn build(&self, result: &TradeResult, wallet: Option<&Wallet>) -> CrashReport {
        let (cause, exception, revert_reason, annotations) = match &result.failure {
            Some(f) => (f.cause, f.exception.clone(), f.revert_reason.clone(), f.annotations.clone()),
            None => (FailureCause::Unknown, String::new(), None, Vec::new()),
        };

        let pool_config = self.contract.pool_config().await.map_err(|e| note("pool config", &e)).ok();
        let pool_info = self
            .contract
            .pool_info(BlockTag::Latest)
            .await
            .map_err(|e| note("pool info", &e))
            .ok();
        let checkpoint = match (&pool_config, &pool_info) {
            (Some(config), Some(info)) => self
                .contract
                .checkpoint(checkpoint_id(info.timestamp, config.checkpoint_duration))
                .await
                .map_err(|e| note("checkpoint", &e))
                .ok(),
            _ => None,
        };
        let chain_state = match (&self.store, self.config.include_chain_state) {
            (Some(store), true) => store.export().await.map_err(|e| note("chain state", &e)).ok(),
            _ => None,
        };

        CrashReport {
            report_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            account: result.account.clone(),
            intent: result.intent.clone(),
            cause,
            exception,
            revert_reason,
            annotations,
            nonce: result.nonce,
            transaction_hash: result.transaction_hash.clone(),
            pre_trade_wallet: wallet.cloned(),
            pool_config,
            pool_info,
            checkpoint,
            chain_state,
        }
    }

    async fn append(&self, path: &std::path::Path, report: &CrashReport) -> Result<()> {
        let mut line = serde_json::to_string(report).map_err(|e| ExecutionError::Report(e.to_string()))?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| ExecutionError::Report(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ExecutionError::Report(e.to_string()))?;
        file.flush().await.map_err(|e| ExecutionError::Report(e.to_string()))
    }
}

fn note(what: &str, err: &dyn std::fmt::Display) {
    warn!(target: "crash_report", error = %err, "could not read {what} for crash report");
}
