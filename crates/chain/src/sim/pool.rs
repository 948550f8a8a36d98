use async_trait::async_trait;
use cosmwasm_std::Uint128;
use hyperdrive_agents_types::{Checkpoint, EventLog, PoolConfig, PoolEvent, PoolInfo, ReceiptBreakdown};

use super::chain::SimulatedChain;
use crate::{BlockTag, ChainError, ContractCall, ContractCaller, RawLog, TransactionRequest};

/// Handle to one pool deployed on a [`SimulatedChain`].
///
/// Calldata and log payloads are JSON encodings of [`ContractCall`] and
/// [`PoolEvent`].
#[derive(Clone)]
pub struct SimulatedPool {
    chain: SimulatedChain,
    address: String,
    base_token: String,
}

impl SimulatedPool {
    pub(crate) fn new(chain: SimulatedChain, address: String, base_token: String) -> Self {
        Self {
            chain,
            address,
            base_token,
        }
    }

    pub fn chain(&self) -> &SimulatedChain {
        &self.chain
    }
}

#[async_trait]
impl ContractCaller for SimulatedPool {
    fn address(&self) -> &str {
        &self.address
    }

    fn base_token(&self) -> &str {
        &self.base_token
    }

    async fn pool_config(&self) -> Result<PoolConfig, ChainError> {
        self.chain.pool_config(&self.address)
    }

    // Historic state is not retained; every tag reads the latest block
    async fn pool_info(&self, _tag: BlockTag) -> Result<PoolInfo, ChainError> {
        self.chain.pool_info(&self.address)
    }

    async fn checkpoint(&self, checkpoint_time: u64) -> Result<Checkpoint, ChainError> {
        self.chain.checkpoint(&self.address, checkpoint_time)
    }

    async fn allowance(&self, owner: &str, tag: BlockTag) -> Result<Uint128, ChainError> {
        self.chain.allowance(&self.base_token, owner, &self.address, tag)
    }

    async fn preview(&self, call: &ContractCall, from: &str) -> Result<ReceiptBreakdown, ChainError> {
        self.chain.preview(&self.address, call, from)
    }

    fn encode(&self, call: &ContractCall, from: &str) -> Result<TransactionRequest, ChainError> {
        let to = match call {
            ContractCall::Approve { .. } => &self.base_token,
            _ => &self.address,
        };
        let data = serde_json::to_vec(call).map_err(|e| ChainError::EncodingError(e.to_string()))?;
        Ok(TransactionRequest::new(from, to.clone(), data))
    }

    fn decode_events(&self, logs: &[RawLog]) -> Result<Vec<EventLog>, ChainError> {
        logs.iter()
            .filter(|log| {
                log.address.eq_ignore_ascii_case(&self.address) || log.address.eq_ignore_ascii_case(&self.base_token)
            })
            .map(|log| {
                let event: PoolEvent = serde_json::from_slice(&log.data)?;
                Ok(EventLog {
                    block_number: log.block_number,
                    transaction_hash: log.transaction_hash.clone(),
                    log_index: log.log_index,
                    event,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimPoolParams;
    use crate::ChainClient;
    use hyperdrive_agents_types::{fixed::units, ActionType};
    use rust_decimal::Decimal;

    const TRADER: &str = "0x0000000000000000000000000000000000007777";

    #[tokio::test]
    async fn test_preview_matches_execution() {
        let chain = SimulatedChain::new(31337, 1_700_000_000);
        let pool = chain.deploy_pool(TRADER, SimPoolParams::default());
        chain.mint_base(pool.base_token(), TRADER, units(100)).unwrap();
        let approve = ContractCall::Approve {
            spender: pool.address().to_string(),
            amount: Uint128::MAX,
        };
        chain.send_transaction(pool.encode(&approve, TRADER).unwrap()).await.unwrap();

        let call = ContractCall::OpenLong {
            base_amount: units(10),
            min_output: Uint128::zero(),
            min_vault_share_price: Decimal::ZERO,
        };
        let preview = pool.preview(&call, TRADER).await.unwrap();
        let hash = chain.send_transaction(pool.encode(&call, TRADER).unwrap()).await.unwrap();
        let receipt = chain.get_transaction_receipt(&hash).await.unwrap().unwrap();
        let breakdown = pool.decode_receipt(ActionType::OpenLong, &receipt).unwrap();

        assert_eq!(preview.bond_amount, breakdown.bond_amount);
        assert_eq!(breakdown.base_amount, units(10));
        assert!(pool.decode_checkpoint(&receipt).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_preview_surfaces_revert_reason() {
        let chain = SimulatedChain::new(31337, 1_700_000_000);
        let pool = chain.deploy_pool(TRADER, SimPoolParams::default());

        let call = ContractCall::OpenLong {
            base_amount: units(10),
            min_output: Uint128::zero(),
            min_vault_share_price: Decimal::ZERO,
        };
        let err = pool.preview(&call, TRADER).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("ERC20: insufficient allowance"));
    }

    #[tokio::test]
    async fn test_decode_events_skips_foreign_logs() {
        let chain = SimulatedChain::new(31337, 1_700_000_000);
        let pool = chain.deploy_pool(TRADER, SimPoolParams::default());
        let other = chain.deploy_pool(TRADER, SimPoolParams::default());

        let logs = chain
            .get_logs(&crate::LogFilter {
                addresses: vec![pool.address().to_string(), other.address().to_string()],
                from_block: 0,
                to_block: None,
            })
            .await
            .unwrap();
        let ours = pool.decode_events(&logs).unwrap();

        assert!(!ours.is_empty());
        assert!(ours.len() < logs.len());
    }
}
