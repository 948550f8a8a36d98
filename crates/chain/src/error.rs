/// Chain error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("nonce too low for {account}: expected {expected}, got {got}")]
    NonceTooLow {
        account: String,
        expected: u64,
        got: u64,
    },

    #[error("transaction failed: {0}")]
    TxFailed(String),

    /// A call reverted; carries the decoded reason
    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unknown snapshot: {0}")]
    UnknownSnapshot(String),

    #[error("timestamp {requested} is before latest block timestamp {latest}")]
    InvalidTimestamp { latest: u64, requested: u64 },

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ChainError {
    /// Errors worth retrying for idempotent reads
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::ConnectionFailed(_) | ChainError::Timeout(_))
    }

    /// Revert reason, if this error is a revert
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            ChainError::Reverted(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::ParseError(err.to_string())
    }
}
