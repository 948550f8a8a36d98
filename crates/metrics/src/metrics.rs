use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // ═══════════════════════════════════════════════════════════════════════════
    // TRADE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Trades handed to the chain, by action
    pub static ref TRADES_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "hyperdrive_agents_trades_submitted_total",
        "Total number of trades submitted",
        &["action"]
    )
    .unwrap();

    /// Trades that settled successfully, by action
    pub static ref TRADES_SUCCEEDED: IntCounterVec = register_int_counter_vec!(
        "hyperdrive_agents_trades_succeeded_total",
        "Total number of trades that settled",
        &["action"]
    )
    .unwrap();

    /// Failed trades by action and classified cause
    pub static ref TRADES_FAILED: IntCounterVec = register_int_counter_vec!(
        "hyperdrive_agents_trades_failed_total",
        "Total number of failed trades",
        &["action", "cause"]
    )
    .unwrap();

    /// Submit-to-receipt latency in milliseconds
    pub static ref TRADE_LATENCY: HistogramVec = register_histogram_vec!(
        "hyperdrive_agents_trade_latency_ms",
        "Trade latency from preview to decoded receipt in milliseconds",
        &["action"],
        vec![5.0, 25.0, 100.0, 500.0, 1000.0, 5000.0, 15000.0, 60000.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // CRASH REPORT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Crash reports emitted, by cause
    pub static ref CRASH_REPORTS: IntCounterVec = register_int_counter_vec!(
        "hyperdrive_agents_crash_reports_total",
        "Total number of crash reports emitted",
        &["cause"]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // CHAIN CONTROL METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub static ref CHECKPOINTS_CREATED: IntCounter = register_int_counter!(
        "hyperdrive_agents_checkpoints_created_total",
        "Total number of pool checkpoints created"
    )
    .unwrap();

    pub static ref CHAIN_SECONDS_ADVANCED: IntCounter = register_int_counter!(
        "hyperdrive_agents_chain_seconds_advanced_total",
        "Total block time advanced on the local chain in seconds"
    )
    .unwrap();

    pub static ref SNAPSHOTS_SAVED: IntCounter = register_int_counter!(
        "hyperdrive_agents_snapshots_saved_total",
        "Total number of snapshots saved"
    )
    .unwrap();

    pub static ref SNAPSHOTS_LOADED: IntCounter = register_int_counter!(
        "hyperdrive_agents_snapshots_loaded_total",
        "Total number of snapshots loaded"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // INGESTION METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Trade event rows written to pool databases
    pub static ref EVENTS_INGESTED: IntCounter = register_int_counter!(
        "hyperdrive_agents_events_ingested_total",
        "Total number of trade event rows ingested"
    )
    .unwrap();

    /// Agents that are live (not invalidated by a snapshot load)
    pub static ref ACTIVE_AGENTS: IntGauge = register_int_gauge!(
        "hyperdrive_agents_agents_active",
        "Current number of live agents"
    )
    .unwrap();
}
