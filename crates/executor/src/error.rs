use hyperdrive_agents_chain::ChainError;
use hyperdrive_agents_store::StoreError;
use thiserror::Error;

use crate::validator::ValidationError;

/// Errors that abort a call before or outside per-intent results
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// An intent failed local validation; nothing was sent
    #[error("local validation failed for intent {index}: {source}")]
    LocalValidation {
        index: usize,
        #[source]
        source: ValidationError,
    },

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("transaction {transaction_hash} reverted: {reason}")]
    Reverted {
        transaction_hash: String,
        reason: String,
    },

    #[error("no receipt for {transaction_hash} after {waited_ms}ms")]
    ReceiptTimeout {
        transaction_hash: String,
        waited_ms: u64,
    },

    #[error("crash report sink failed: {0}")]
    Report(String),
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
