use async_trait::async_trait;
use cosmwasm_std::Uint128;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::{
    Block, BlockTag, ChainClient, ChainError, LogFilter, RawLog, Token, TransactionRequest, TxReceipt,
};

/// `balanceOf(address)`
const ERC20_BALANCE_OF: &str = "70a08231";
/// `balanceOf(address,uint256)`
const ERC1155_BALANCE_OF: &str = "00fdd58e";

/// JSON-RPC client for a local dev node (anvil-style) with unlocked accounts
pub struct RpcChainClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcChainClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, Duration::from_secs(30))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, id = body.id, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChainError::Timeout(e.to_string())
                } else {
                    ChainError::ConnectionFailed(e.to_string())
                }
            })?;

        let response: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        response.into_result()
    }

    async fn eth_call(&self, to: &str, data: String, tag: BlockTag) -> Result<Value, ChainError> {
        self.request("eth_call", json!([{ "to": to, "data": data }, tag.to_rpc()]))
            .await
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl RpcResponse {
    fn into_result(self) -> Result<Value, ChainError> {
        if let Some(err) = self.error {
            // Dev nodes report reverts as rpc errors
            if let Some(reason) = err.message.strip_prefix("execution reverted: ") {
                return Err(ChainError::Reverted(reason.to_string()));
            }
            if err.message.to_lowercase().contains("nonce too low") {
                return Err(ChainError::TxFailed(err.message));
            }
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

pub(crate) fn parse_quantity(value: &Value) -> Result<u64, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse(format!("expected hex quantity, got {}", value)))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::ParseError(format!("{}: {}", s, e)))
}

pub(crate) fn parse_uint(value: &Value) -> Result<Uint128, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse(format!("expected hex word, got {}", value)))?;
    let digits = s.trim_start_matches("0x").trim_start_matches('0');
    if digits.is_empty() {
        return Ok(Uint128::zero());
    }
    if digits.len() > 32 {
        return Err(ChainError::ParseError(format!("value overflows 128 bits: {}", s)));
    }
    u128::from_str_radix(digits, 16)
        .map(Uint128::new)
        .map_err(|e| ChainError::ParseError(format!("{}: {}", s, e)))
}

fn field<'a>(value: &'a Value, name: &str) -> Result<&'a Value, ChainError> {
    value
        .get(name)
        .ok_or_else(|| ChainError::InvalidResponse(format!("missing field {}", name)))
}

fn string_field(value: &Value, name: &str) -> Result<String, ChainError> {
    Ok(field(value, name)?.as_str().unwrap_or_default().to_string())
}

fn pad_address(address: &str) -> String {
    format!("{:0>64}", address.trim_start_matches("0x").to_lowercase())
}

/// Call data for a token balance read
pub(crate) fn balance_call_data(address: &str, token: &Token) -> Option<(String, String)> {
    match token {
        Token::Native => None,
        Token::Erc20(contract) => Some((
            contract.clone(),
            format!("0x{}{}", ERC20_BALANCE_OF, pad_address(address)),
        )),
        Token::MultiToken { contract, id } => Some((
            contract.clone(),
            format!(
                "0x{}{}{}",
                ERC1155_BALANCE_OF,
                pad_address(address),
                hex::encode(id.as_bytes())
            ),
        )),
    }
}

pub(crate) fn parse_block(value: &Value) -> Result<Block, ChainError> {
    Ok(Block {
        number: parse_quantity(field(value, "number")?)?,
        timestamp: parse_quantity(field(value, "timestamp")?)?,
        hash: string_field(value, "hash")?,
    })
}

pub(crate) fn parse_log(value: &Value) -> Result<RawLog, ChainError> {
    let topics = field(value, "topics")?
        .as_array()
        .map(|t| t.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let data = string_field(value, "data")?;
    Ok(RawLog {
        address: string_field(value, "address")?,
        topics,
        data: hex::decode(data.trim_start_matches("0x")).map_err(|e| ChainError::ParseError(e.to_string()))?,
        block_number: parse_quantity(field(value, "blockNumber")?)?,
        transaction_hash: string_field(value, "transactionHash")?,
        log_index: parse_quantity(field(value, "logIndex")?)?,
    })
}

pub(crate) fn parse_receipt(value: &Value) -> Result<TxReceipt, ChainError> {
    let logs = field(value, "logs")?
        .as_array()
        .map(|logs| logs.iter().map(parse_log).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();
    Ok(TxReceipt {
        transaction_hash: string_field(value, "transactionHash")?,
        block_number: parse_quantity(field(value, "blockNumber")?)?,
        from: string_field(value, "from")?,
        to: value.get("to").and_then(Value::as_str).unwrap_or_default().to_string(),
        status: parse_quantity(field(value, "status")?)? == 1,
        gas_used: parse_quantity(field(value, "gasUsed")?)?,
        logs,
        revert_reason: value.get("revertReason").and_then(Value::as_str).map(str::to_string),
    })
}

pub(crate) fn transaction_params(tx: &TransactionRequest) -> Value {
    let mut params = json!({
        "from": tx.from,
        "to": tx.to,
        "data": format!("0x{}", hex::encode(&tx.data)),
    });
    if let Some(nonce) = tx.nonce {
        params["nonce"] = json!(format!("0x{:x}", nonce));
    }
    if let Some(gas) = tx.gas_limit {
        params["gas"] = json!(format!("0x{:x}", gas));
    }
    params
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        parse_quantity(&self.request("eth_chainId", json!([])).await?)
    }

    async fn get_block(&self, tag: BlockTag) -> Result<Block, ChainError> {
        let value = self
            .request("eth_getBlockByNumber", json!([tag.to_rpc(), false]))
            .await?;
        if value.is_null() {
            return Err(ChainError::QueryFailed(format!("block {} not found", tag.to_rpc())));
        }
        parse_block(&value)
    }

    async fn get_transaction_count(&self, address: &str, tag: BlockTag) -> Result<u64, ChainError> {
        parse_quantity(
            &self
                .request("eth_getTransactionCount", json!([address, tag.to_rpc()]))
                .await?,
        )
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<String, ChainError> {
        let value = self
            .request("eth_sendTransaction", json!([transaction_params(&tx)]))
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse(format!("expected tx hash, got {}", value)))
    }

    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, ChainError> {
        let value = self.request("eth_getTransactionReceipt", json!([hash])).await?;
        if value.is_null() {
            return Ok(None);
        }
        parse_receipt(&value).map(Some)
    }

    async fn get_balance(&self, address: &str, token: &Token, tag: BlockTag) -> Result<Uint128, ChainError> {
        match balance_call_data(address, token) {
            None => parse_uint(&self.request("eth_getBalance", json!([address, tag.to_rpc()])).await?),
            Some((contract, data)) => parse_uint(&self.eth_call(&contract, data, tag).await?),
        }
    }

    async fn snapshot(&self) -> Result<String, ChainError> {
        let value = self.request("evm_snapshot", json!([])).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse(format!("expected snapshot id, got {}", value)))
    }

    async fn revert(&self, id: &str) -> Result<bool, ChainError> {
        Ok(self
            .request("evm_revert", json!([id]))
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn mine(&self, timestamp: u64) -> Result<Block, ChainError> {
        self.request("evm_mine", json!([timestamp])).await?;
        self.get_block(BlockTag::Latest).await
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, ChainError> {
        let to_block = filter
            .to_block
            .map(|n| BlockTag::Number(n).to_rpc())
            .unwrap_or_else(|| "latest".to_string());
        let value = self
            .request(
                "eth_getLogs",
                json!([{
                    "address": filter.addresses,
                    "fromBlock": BlockTag::Number(filter.from_block).to_rpc(),
                    "toBlock": to_block,
                }]),
            )
            .await?;
        value
            .as_array()
            .map(|logs| logs.iter().map(parse_log).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
