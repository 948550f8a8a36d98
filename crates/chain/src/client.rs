use async_trait::async_trait;
use cosmwasm_std::Uint128;
use hyperdrive_agents_types::AssetId;
use serde::{Deserialize, Serialize};

use crate::ChainError;

/// Which block a query refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockTag {
    Latest,
    /// Latest plus transactions waiting in the mempool
    Pending,
    Number(u64),
}

impl BlockTag {
    /// JSON-RPC representation
    pub fn to_rpc(&self) -> String {
        match self {
            BlockTag::Latest => "latest".to_string(),
            BlockTag::Pending => "pending".to_string(),
            BlockTag::Number(n) => format!("0x{:x}", n),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub timestamp: u64,
    pub hash: String,
}

/// Token a balance query refers to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Token {
    /// The chain's gas token
    Native,
    /// An ERC-20 contract
    Erc20(String),
    /// One id of a multi-token contract
    MultiToken { contract: String, id: AssetId },
}

/// Unsigned transaction handed to a dev node with unlocked accounts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: String,
    pub to: String,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub nonce: Option<u64>,
    pub gas_limit: Option<u64>,
}

impl TransactionRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            data,
            nonce: None,
            gas_limit: None,
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: Option<u64>) -> Self {
        self.gas_limit = gas_limit;
        self
    }
}

/// Undecoded event log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub block_number: u64,
    pub transaction_hash: String,
    pub log_index: u64,
}

/// Mined transaction outcome
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub from: String,
    pub to: String,
    /// `true` when the transaction did not revert
    pub status: bool,
    pub gas_used: u64,
    pub logs: Vec<RawLog>,
    /// Decoded revert reason, when the backend exposes it
    pub revert_reason: Option<String>,
}

impl TxReceipt {
    pub fn is_success(&self) -> bool {
        self.status
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub addresses: Vec<String>,
    pub from_block: u64,
    /// Inclusive; `None` means latest
    pub to_block: Option<u64>,
}

/// Block queries, raw submission and dev-node time control
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn get_block(&self, tag: BlockTag) -> Result<Block, ChainError>;

    async fn get_transaction_count(&self, address: &str, tag: BlockTag) -> Result<u64, ChainError>;

    /// Submit and return the transaction hash
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<String, ChainError>;

    /// `None` while the transaction is not mined
    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, ChainError>;

    async fn get_balance(&self, address: &str, token: &Token, tag: BlockTag) -> Result<Uint128, ChainError>;

    /// Take a revertible snapshot and return its id
    async fn snapshot(&self) -> Result<String, ChainError>;

    /// Revert to `id`. Consumes the snapshot and every later one.
    async fn revert(&self, id: &str) -> Result<bool, ChainError>;

    /// Mine one block at `timestamp`
    async fn mine(&self, timestamp: u64) -> Result<Block, ChainError>;

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, ChainError>;
}

/// `0x`-prefixed hex for byte payloads
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_tag_rpc() {
        assert_eq!(BlockTag::Latest.to_rpc(), "latest");
        assert_eq!(BlockTag::Pending.to_rpc(), "pending");
        assert_eq!(BlockTag::Number(255).to_rpc(), "0xff");
    }

    #[test]
    fn test_transaction_data_is_hex() {
        let tx = TransactionRequest::new("0xa", "0xb", vec![0xde, 0xad]).with_nonce(3);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["data"], "0xdead");

        let back: TransactionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }
}
