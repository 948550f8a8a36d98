use cosmwasm_std::Uint128;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Immutable pool parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub hyperdrive_address: String,
    pub base_token: String,
    /// Seconds per checkpoint
    pub checkpoint_duration: u64,
    /// Seconds from open to maturity
    pub position_duration: u64,
    pub minimum_transaction_amount: Uint128,
    pub initial_vault_share_price: Decimal,
}

impl PoolConfig {
    /// Start of the checkpoint containing `timestamp`
    pub fn checkpoint_id(&self, timestamp: u64) -> u64 {
        checkpoint_id(timestamp, self.checkpoint_duration)
    }
}

pub fn checkpoint_id(timestamp: u64, checkpoint_duration: u64) -> u64 {
    if checkpoint_duration == 0 {
        return timestamp;
    }
    timestamp - timestamp % checkpoint_duration
}

/// Pool reserves and prices at one block
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub block_number: u64,
    pub timestamp: u64,
    pub share_reserves: Uint128,
    pub bond_reserves: Uint128,
    pub lp_total_supply: Uint128,
    pub vault_share_price: Decimal,
    pub lp_share_price: Decimal,
    pub longs_outstanding: Uint128,
    pub shorts_outstanding: Uint128,
    pub withdrawal_shares_outstanding: Uint128,
    pub withdrawal_shares_ready_to_withdraw: Uint128,
    pub spot_price: Decimal,
    pub fixed_rate: Decimal,
}

/// Settled accounting at a checkpoint boundary
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_time: u64,
    pub vault_share_price: Decimal,
    pub matured_longs: Uint128,
    pub matured_shorts: Uint128,
}

impl Checkpoint {
    /// A checkpoint is minted once its share price is set
    pub fn exists(&self) -> bool {
        !self.vault_share_price.is_zero()
    }
}

/// Everything a policy reads about a pool at one block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub config: PoolConfig,
    pub info: PoolInfo,
    pub checkpoint: Checkpoint,
}
