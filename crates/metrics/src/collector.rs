use std::time::Duration;

use hyperdrive_agents_types::{ActionType, FailureCause};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::*;

/// Facade over the process-wide prometheus registry
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    enabled: bool,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// A collector whose `record_*` calls do nothing
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRADE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_trade_submitted(&self, action: ActionType) {
        if !self.enabled {
            return;
        }
        TRADES_SUBMITTED.with_label_values(&[action.as_str()]).inc();
    }

    /// Record the terminal outcome of one trade. `cause` is `None` on success.
    pub fn record_trade_result(&self, action: ActionType, cause: Option<FailureCause>, latency: Duration) {
        if !self.enabled {
            return;
        }
        match cause {
            None => TRADES_SUCCEEDED.with_label_values(&[action.as_str()]).inc(),
            Some(cause) => TRADES_FAILED
                .with_label_values(&[action.as_str(), cause.as_str()])
                .inc(),
        }
        TRADE_LATENCY
            .with_label_values(&[action.as_str()])
            .observe(latency.as_secs_f64() * 1000.0);
    }

    pub fn record_crash_report(&self, cause: FailureCause) {
        if !self.enabled {
            return;
        }
        CRASH_REPORTS.with_label_values(&[cause.as_str()]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CHAIN CONTROL METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_checkpoint_created(&self) {
        if !self.enabled {
            return;
        }
        CHECKPOINTS_CREATED.inc();
    }

    pub fn record_time_advanced(&self, seconds: u64) {
        if !self.enabled {
            return;
        }
        CHAIN_SECONDS_ADVANCED.inc_by(seconds);
    }

    pub fn record_snapshot_saved(&self) {
        if !self.enabled {
            return;
        }
        SNAPSHOTS_SAVED.inc();
    }

    pub fn record_snapshot_loaded(&self) {
        if !self.enabled {
            return;
        }
        SNAPSHOTS_LOADED.inc();
    }

    pub fn record_events_ingested(&self, rows: usize) {
        if !self.enabled {
            return;
        }
        EVENTS_INGESTED.inc_by(rows as u64);
    }

    pub fn set_active_agents(&self, count: usize) {
        if !self.enabled {
            return;
        }
        ACTIVE_AGENTS.set(count as i64);
    }

    /// Render every registered metric in the prometheus text format
    pub fn gather(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

/// Metrics error types
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("encoding error: {0}")]
    EncodingError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_succeeds() {
        let collector = MetricsCollector::new();
        assert!(collector.gather().is_ok());
    }

    #[test]
    fn test_record_trade_metrics() {
        let collector = MetricsCollector::new();

        collector.record_trade_submitted(ActionType::OpenLong);
        collector.record_trade_result(ActionType::OpenLong, None, Duration::from_millis(40));
        collector.record_trade_submitted(ActionType::AddLiquidity);
        collector.record_trade_result(
            ActionType::AddLiquidity,
            Some(FailureCause::InsufficientAllowance),
            Duration::from_millis(12),
        );

        let metrics = collector.gather().unwrap();
        assert!(metrics.contains("hyperdrive_agents_trades_submitted_total"));
        assert!(metrics.contains("hyperdrive_agents_trades_succeeded_total"));
        assert!(metrics.contains("hyperdrive_agents_trades_failed_total"));
        assert!(metrics.contains("INSUFFICIENT_ALLOWANCE"));
        assert!(metrics.contains("hyperdrive_agents_trade_latency_ms"));
    }

    #[test]
    fn test_record_crash_reports() {
        let collector = MetricsCollector::new();
        let before = CRASH_REPORTS.with_label_values(&["TIMEOUT"]).get();

        collector.record_crash_report(FailureCause::Timeout);
        collector.record_crash_report(FailureCause::Timeout);

        assert!(CRASH_REPORTS.with_label_values(&["TIMEOUT"]).get() >= before + 2);
        assert!(collector.gather().unwrap().contains("hyperdrive_agents_crash_reports_total"));
    }

    #[test]
    fn test_record_chain_control_metrics() {
        let collector = MetricsCollector::new();

        collector.record_checkpoint_created();
        collector.record_time_advanced(3600);
        collector.record_snapshot_saved();
        collector.record_snapshot_loaded();
        collector.record_events_ingested(7);
        collector.set_active_agents(3);

        let metrics = collector.gather().unwrap();
        assert!(metrics.contains("hyperdrive_agents_checkpoints_created_total"));
        assert!(metrics.contains("hyperdrive_agents_chain_seconds_advanced_total"));
        assert!(metrics.contains("hyperdrive_agents_snapshots_saved_total"));
        assert!(metrics.contains("hyperdrive_agents_snapshots_loaded_total"));
        assert!(metrics.contains("hyperdrive_agents_events_ingested_total"));
        assert!(metrics.contains("hyperdrive_agents_agents_active"));
    }

    #[test]
    fn test_disabled_collector_records_nothing() {
        let collector = MetricsCollector::disabled();
        let before = CRASH_REPORTS.with_label_values(&["OUT_OF_GAS"]).get();

        collector.record_crash_report(FailureCause::OutOfGas);

        assert!(!collector.is_enabled());
        assert_eq!(CRASH_REPORTS.with_label_values(&["OUT_OF_GAS"]).get(), before);
        assert!(collector.gather().is_ok());
    }
}
