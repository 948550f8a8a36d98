use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit one JSON object per line instead of human readable output
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| TracingError::InitError(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true).json())
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true).pretty()).try_init()
    };
    result.map_err(|e| TracingError::InitError(e.to_string()))
}

/// Correlation ID tying together the log lines of one executor batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Span context for one `execute` call
#[derive(Debug, Clone)]
pub struct TradeBatchSpan {
    pub correlation_id: CorrelationId,
    pub account: String,
    pub intents: usize,
}

impl TradeBatchSpan {
    pub fn new(account: impl Into<String>, intents: usize) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            account: account.into(),
            intents,
        }
    }

    /// A span to instrument the batch's futures with
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "trade_batch",
            correlation_id = %self.correlation_id,
            account = %self.account,
            intents = self.intents,
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("tracing initialization error: {0}")]
    InitError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_generation() {
        let id1 = CorrelationId::new();
        let id2 = CorrelationId::new();

        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 36);
    }

    #[test]
    fn test_trade_batch_span_creation() {
        let batch = TradeBatchSpan::new("0xabc", 3);

        assert_eq!(batch.account, "0xabc");
        assert_eq!(batch.intents, 3);
        let _entered = batch.span().entered();
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = TracingConfig {
            level: "hyperdrive=notalevel".to_string(),
            json: true,
        };
        assert!(matches!(init_tracing(&config), Err(TracingError::InitError(_))));
    }
}
