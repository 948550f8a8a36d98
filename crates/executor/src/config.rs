use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use hyperdrive_agents_chain::ExponentialBackoff;
use hyperdrive_agents_types::FailureCause;

/// Timing knobs for submission and receipt polling
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How long to wait for a receipt before the trade is a `Timeout`
    pub receipt_timeout: Duration,
    /// First receipt poll delay; doubles up to `max_poll_interval`
    pub poll_interval: Duration,
    pub max_poll_interval: Duration,
    /// Attempts for the pending nonce read on transport errors
    pub nonce_read_attempts: u32,
    /// Gas limit for intents that carry none. Sending with an explicit
    /// limit keeps nodes from rejecting a reverting call at estimation.
    pub default_gas_limit: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            receipt_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(50),
            max_poll_interval: Duration::from_secs(2),
            nonce_read_attempts: 5,
            default_gas_limit: 1_000_000,
        }
    }
}

impl ExecutorConfig {
    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.poll_interval = initial;
        self.max_poll_interval = max;
        self
    }

    pub fn with_nonce_read_attempts(mut self, attempts: u32) -> Self {
        self.nonce_read_attempts = attempts.max(1);
        self
    }

    pub fn with_default_gas_limit(mut self, gas_limit: u64) -> Self {
        self.default_gas_limit = gas_limit.max(1);
        self
    }

    pub(crate) fn poll_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.poll_interval, self.max_poll_interval)
    }
}

/// Where crash reports go and which causes are skipped
#[derive(Debug, Clone, Default)]
pub struct CrashReportConfig {
    /// Append one JSON report per line to this file
    pub log_file: Option<PathBuf>,
    /// Causes that are never reported
    pub ignored_causes: HashSet<FailureCause>,
    /// Attach the pool's full database dump to each report
    pub include_chain_state: bool,
}

impl CrashReportConfig {
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn ignore(mut self, cause: FailureCause) -> Self {
        self.ignored_causes.insert(cause);
        self
    }

    pub fn with_chain_state(mut self, include: bool) -> Self {
        self.include_chain_state = include;
        self
    }
}
