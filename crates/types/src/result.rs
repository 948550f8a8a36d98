use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ReceiptBreakdown, TradeIntent};

/// Why a trade failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCause {
    /// Rejected before any network call
    LocalValidation,
    InsufficientAllowance,
    InvalidBalance,
    Slippage,
    MinTxnAmount,
    OutOfGas,
    /// Reverted without a decodable reason
    UnknownChainError,
    /// Receipt did not arrive in time
    Timeout,
    Unknown,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::LocalValidation => "LOCAL_VALIDATION",
            FailureCause::InsufficientAllowance => "INSUFFICIENT_ALLOWANCE",
            FailureCause::InvalidBalance => "INVALID_BALANCE",
            FailureCause::Slippage => "SLIPPAGE",
            FailureCause::MinTxnAmount => "MIN_TXN_AMOUNT",
            FailureCause::OutOfGas => "OUT_OF_GAS",
            FailureCause::UnknownChainError => "UNKNOWN_CHAIN_ERROR",
            FailureCause::Timeout => "TIMEOUT",
            FailureCause::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Success,
    Fail,
}

/// Failure details carried by a FAIL result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFailure {
    pub cause: FailureCause,
    /// Raw error text from the failing call
    pub exception: String,
    /// Revert reason decoded from the chain, if any
    pub revert_reason: Option<String>,
    /// Notes added by classification, most recent first
    pub annotations: Vec<String>,
}

impl TradeFailure {
    pub fn new(cause: FailureCause, exception: impl Into<String>) -> Self {
        Self {
            cause,
            exception: exception.into(),
            revert_reason: None,
            annotations: Vec::new(),
        }
    }

    pub fn with_revert_reason(mut self, reason: Option<String>) -> Self {
        self.revert_reason = reason;
        self
    }

    pub fn annotate(&mut self, note: impl Into<String>) {
        self.annotations.insert(0, note.into());
    }
}

/// Terminal outcome of one intent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeResult {
    pub status: TradeStatus,
    pub intent: TradeIntent,
    pub account: String,
    pub nonce: Option<u64>,
    pub transaction_hash: Option<String>,
    pub block_number: Option<u64>,
    pub receipt: Option<ReceiptBreakdown>,
    pub failure: Option<TradeFailure>,
    /// Id of the crash report written for this failure
    pub crash_report_id: Option<String>,
}

impl TradeResult {
    pub fn success(
        intent: TradeIntent,
        account: impl Into<String>,
        nonce: u64,
        transaction_hash: impl Into<String>,
        block_number: u64,
        receipt: ReceiptBreakdown,
    ) -> Self {
        Self {
            status: TradeStatus::Success,
            intent,
            account: account.into(),
            nonce: Some(nonce),
            transaction_hash: Some(transaction_hash.into()),
            block_number: Some(block_number),
            receipt: Some(receipt),
            failure: None,
            crash_report_id: None,
        }
    }

    pub fn failed(intent: TradeIntent, account: impl Into<String>, failure: TradeFailure) -> Self {
        Self {
            status: TradeStatus::Fail,
            intent,
            account: account.into(),
            nonce: None,
            transaction_hash: None,
            block_number: None,
            receipt: None,
            failure: Some(failure),
            crash_report_id: None,
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_transaction_hash(mut self, hash: Option<String>) -> Self {
        self.transaction_hash = hash;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TradeStatus::Success
    }

    pub fn cause(&self) -> Option<FailureCause> {
        self.failure.as_ref().map(|f| f.cause)
    }
}
