use async_trait::async_trait;
use cosmwasm_std::Uint128;
use hyperdrive_agents_types::{
    ActionType, Checkpoint, EventLog, PoolConfig, PoolEvent, PoolInfo, ReceiptBreakdown,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BlockTag, ChainError, RawLog, TransactionRequest, TxReceipt};

/// A typed pool or base token method call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ContractCall {
    OpenLong {
        base_amount: Uint128,
        min_output: Uint128,
        min_vault_share_price: Decimal,
    },
    CloseLong {
        maturity_time: u64,
        bond_amount: Uint128,
        min_output: Uint128,
    },
    OpenShort {
        bond_amount: Uint128,
        max_deposit: Uint128,
        min_vault_share_price: Decimal,
    },
    CloseShort {
        maturity_time: u64,
        bond_amount: Uint128,
        min_output: Uint128,
    },
    AddLiquidity {
        contribution: Uint128,
        min_lp_share_price: Decimal,
        min_apr: Decimal,
        max_apr: Decimal,
    },
    RemoveLiquidity {
        lp_shares: Uint128,
        min_output_per_share: Decimal,
    },
    RedeemWithdrawalShares {
        withdrawal_shares: Uint128,
        min_output_per_share: Decimal,
    },
    /// Mint the checkpoint starting at `checkpoint_time`
    Checkpoint { checkpoint_time: u64 },
    /// Base token approval for the pool
    Approve { spender: String, amount: Uint128 },
}

impl ContractCall {
    /// Trade action this call performs, if any
    pub fn action_type(&self) -> Option<ActionType> {
        match self {
            ContractCall::OpenLong { .. } => Some(ActionType::OpenLong),
            ContractCall::CloseLong { .. } => Some(ActionType::CloseLong),
            ContractCall::OpenShort { .. } => Some(ActionType::OpenShort),
            ContractCall::CloseShort { .. } => Some(ActionType::CloseShort),
            ContractCall::AddLiquidity { .. } => Some(ActionType::AddLiquidity),
            ContractCall::RemoveLiquidity { .. } => Some(ActionType::RemoveLiquidity),
            ContractCall::RedeemWithdrawalShares { .. } => Some(ActionType::RedeemWithdrawShare),
            ContractCall::Checkpoint { .. } | ContractCall::Approve { .. } => None,
        }
    }
}

/// ABI-level access to one pool and its base token
#[async_trait]
pub trait ContractCaller: Send + Sync {
    /// Pool contract address
    fn address(&self) -> &str;

    fn base_token(&self) -> &str;

    async fn pool_config(&self) -> Result<PoolConfig, ChainError>;

    async fn pool_info(&self, tag: BlockTag) -> Result<PoolInfo, ChainError>;

    async fn checkpoint(&self, checkpoint_time: u64) -> Result<Checkpoint, ChainError>;

    /// Base token allowance granted by `owner` to the pool
    async fn allowance(&self, owner: &str, tag: BlockTag) -> Result<Uint128, ChainError>;

    /// Run `call` without committing. Reverts come back as `ChainError::Reverted`.
    async fn preview(&self, call: &ContractCall, from: &str) -> Result<ReceiptBreakdown, ChainError>;

    fn encode(&self, call: &ContractCall, from: &str) -> Result<TransactionRequest, ChainError>;

    /// Decode every log emitted by the pool or its base token; others are skipped
    fn decode_events(&self, logs: &[RawLog]) -> Result<Vec<EventLog>, ChainError>;

    /// Pull the trade event for `action` out of a receipt
    fn decode_receipt(&self, action: ActionType, receipt: &TxReceipt) -> Result<ReceiptBreakdown, ChainError> {
        self.decode_events(&receipt.logs)?
            .into_iter()
            .find_map(|log| match log.event {
                PoolEvent::Trade { action: a, breakdown } if a == action => Some(breakdown),
                _ => None,
            })
            .ok_or_else(|| {
                ChainError::InvalidResponse(format!(
                    "receipt {} has no {} event",
                    receipt.transaction_hash,
                    action.event_name()
                ))
            })
    }

    /// Pull a `CreateCheckpoint` event out of a receipt
    fn decode_checkpoint(&self, receipt: &TxReceipt) -> Result<Option<Checkpoint>, ChainError> {
        Ok(self
            .decode_events(&receipt.logs)?
            .into_iter()
            .find_map(|log| match log.event {
                PoolEvent::CreateCheckpoint { checkpoint, .. } => Some(checkpoint),
                _ => None,
            }))
    }
}
