use cosmwasm_std::Uint128;
use hyperdrive_agents_chain::ChainError;
use hyperdrive_agents_types::PositionKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One token whose balance differs between two wallet views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMismatch {
    pub kind: PositionKind,
    pub maturity_time: Option<u64>,
    pub expected: Uint128,
    pub actual: Uint128,
}

impl fmt::Display for TokenMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.maturity_time {
            Some(m) => write!(f, "{}@{}: {} != {}", self.kind.as_str(), m, self.expected, self.actual),
            None => write!(f, "{}: {} != {}", self.kind.as_str(), self.expected, self.actual),
        }
    }
}

fn join(mismatches: &[TokenMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{kind:?} balance {balance} cannot drop by {delta}")]
    Underflow {
        kind: PositionKind,
        maturity_time: Option<u64>,
        balance: Uint128,
        delta: Uint128,
    },

    #[error("wallet {address} disagrees with {source_name}: {}", join(.mismatches))]
    Mismatch {
        address: String,
        source_name: String,
        mismatches: Vec<TokenMismatch>,
    },

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
