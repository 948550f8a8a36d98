use hyperdrive_agents_chain::ChainError;
use hyperdrive_agents_executor::ExecutionError;
use hyperdrive_agents_reconciler::ReconcileError;
use hyperdrive_agents_store::StoreError;
use hyperdrive_agents_types::TradeResult;
use thiserror::Error;

fn describe_failure(result: &TradeResult) -> String {
    match &result.failure {
        Some(failure) => format!(
            "{} from {} failed with {}: {}",
            result.intent.action_type().as_str(),
            result.account,
            failure.cause.as_str(),
            failure.exception
        ),
        None => format!("{} from {} failed", result.intent.action_type().as_str(), result.account),
    }
}

#[derive(Debug, Error)]
pub enum InteractiveError {
    /// The pool or agent was created after the snapshot that was just loaded
    #[error("{kind} {id} was invalidated by a snapshot load")]
    Invalidated { kind: &'static str, id: String },

    #[error("no snapshot has been saved")]
    NoSnapshot,

    #[error("snapshot does not match: {0}")]
    SnapshotMismatch(String),

    #[error("pools must share one checkpoint duration, found {durations:?}")]
    CheckpointDurationMismatch { durations: Vec<u64> },

    #[error("{}", describe_failure(.0))]
    TradeFailed(Box<TradeResult>),

    #[error("no trade result returned for {0}")]
    MissingResult(String),

    #[error("agent {0} has no policy")]
    NoPolicy(String),

    #[error("policy state error: {0}")]
    PolicyState(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data sync failed: {0}")]
    DataSync(String),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),
}

impl InteractiveError {
    pub(crate) fn pool_invalidated(address: &str) -> Self {
        InteractiveError::Invalidated {
            kind: "pool",
            id: address.to_string(),
        }
    }

    pub(crate) fn agent_invalidated(address: &str) -> Self {
        InteractiveError::Invalidated {
            kind: "agent",
            id: address.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InteractiveError>;
