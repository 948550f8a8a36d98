use async_trait::async_trait;
use cosmwasm_std::Uint128;
use hyperdrive_agents_types::{Checkpoint, PoolConfig, PoolEvent, PoolInfo, ReceiptBreakdown};
use rand::Rng;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::market::{Exec, SimMarket, SimPoolParams};
use super::pool::SimulatedPool;
use super::token::SimToken;
use crate::{
    Block, BlockTag, ChainClient, ChainError, ContractCall, LogFilter, RawLog, Token, TransactionRequest,
    TxReceipt,
};

const TRADE_GAS: u64 = 150_000;
const CHECKPOINT_GAS: u64 = 60_000;
const APPROVE_GAS: u64 = 46_000;
/// Blocks whose end state stays readable by number
const HISTORY_BLOCKS: usize = 256;

#[derive(Clone, Debug)]
struct Ledgers {
    block: u64,
    tokens: HashMap<String, SimToken>,
    markets: HashMap<String, SimMarket>,
}

#[derive(Clone, Debug)]
struct SimState {
    blocks: Vec<Block>,
    nonces: HashMap<String, u64>,
    mempool: Vec<(String, TransactionRequest)>,
    queued: BTreeMap<(String, u64), (String, TransactionRequest)>,
    receipts: HashMap<String, TxReceipt>,
    logs: Vec<RawLog>,
    tokens: HashMap<String, SimToken>,
    markets: HashMap<String, SimMarket>,
    history: VecDeque<Ledgers>,
    next_address: u64,
    system_txs: u64,
}

struct Inner {
    chain_id: u64,
    block_interval: u64,
    automine: bool,
    state: SimState,
    snapshots: BTreeMap<u64, SimState>,
    next_snapshot: u64,
}

/// In-process dev chain: per-account nonces, a mempool, auto-mining,
/// snapshots, and any number of simulated pools.
#[derive(Clone)]
pub struct SimulatedChain {
    inner: Arc<Mutex<Inner>>,
    latency: Option<(Duration, Duration)>,
}

fn block_hash(number: u64, timestamp: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(number.to_be_bytes());
    hasher.update(timestamp.to_be_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

fn tx_hash(chain_id: u64, from: &str, nonce: u64, data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chain_id.to_be_bytes());
    hasher.update(from.as_bytes());
    hasher.update(nonce.to_be_bytes());
    hasher.update(data);
    format!("0x{}", hex::encode(hasher.finalize()))
}

impl SimState {
    fn latest(&self) -> &Block {
        // Genesis is created in `SimulatedChain::new`
        &self.blocks[self.blocks.len() - 1]
    }

    fn confirmed_nonce(&self, account: &str) -> u64 {
        self.nonces.get(account).copied().unwrap_or_default()
    }

    fn pending_nonce(&self, account: &str) -> u64 {
        self.confirmed_nonce(account)
            + self.mempool.iter().filter(|(_, tx)| tx.from == account).count() as u64
    }

    fn allocate_address(&mut self) -> String {
        self.next_address += 1;
        format!("0x{:040x}", self.next_address)
    }

    /// Move queued transactions of `account` that became contiguous into the mempool
    fn promote(&mut self, account: &str) {
        loop {
            let next = self.pending_nonce(account);
            match self.queued.remove(&(account.to_string(), next)) {
                Some(entry) => self.mempool.push(entry),
                None => break,
            }
        }
    }

    fn to_logs(&self, events: Vec<(String, PoolEvent)>, block_number: u64, tx: &str, log_index: &mut u64) -> Vec<RawLog> {
        events
            .into_iter()
            .map(|(address, event)| {
                let log = RawLog {
                    address,
                    topics: vec![event.name().to_string()],
                    data: serde_json::to_vec(&event).unwrap_or_default(),
                    block_number,
                    transaction_hash: tx.to_string(),
                    log_index: *log_index,
                };
                *log_index += 1;
                log
            })
            .collect()
    }

    fn new_block(&mut self, timestamp: u64) -> Block {
        let previous = self.latest().timestamp;
        let number = self.latest().number + 1;
        let block = Block {
            number,
            timestamp,
            hash: block_hash(number, timestamp),
        };
        for market in self.markets.values_mut() {
            market.accrue(timestamp.saturating_sub(previous));
        }
        self.blocks.push(block.clone());
        block
    }

    fn mine(&mut self, timestamp: u64, txs: Vec<(String, TransactionRequest)>) -> Block {
        let block = self.new_block(timestamp);
        let mut log_index = 0;
        for (hash, tx) in txs {
            let receipt = self.execute(&hash, &tx, &block, &mut log_index);
            debug!(tx = %hash, block = block.number, status = receipt.status, "mined transaction");
            self.logs.extend(receipt.logs.iter().cloned());
            self.receipts.insert(hash, receipt);
        }
        self.record_history(block.number);
        block
    }

    fn record_history(&mut self, block: u64) {
        if self.history.len() == HISTORY_BLOCKS {
            self.history.pop_front();
        }
        self.history.push_back(Ledgers {
            block,
            tokens: self.tokens.clone(),
            markets: self.markets.clone(),
        });
    }

    /// Token and market ledgers as of the end of `tag`
    fn ledgers_at(&self, tag: BlockTag) -> Result<(&HashMap<String, SimToken>, &HashMap<String, SimMarket>), ChainError> {
        match tag {
            BlockTag::Number(n) if n < self.latest().number => self
                .history
                .iter()
                .find(|ledgers| ledgers.block == n)
                .map(|ledgers| (&ledgers.tokens, &ledgers.markets))
                .ok_or_else(|| ChainError::QueryFailed(format!("state of block {} is not retained", n))),
            _ => Ok((&self.tokens, &self.markets)),
        }
    }

    fn execute(&mut self, hash: &str, tx: &TransactionRequest, block: &Block, log_index: &mut u64) -> TxReceipt {
        *self.nonces.entry(tx.from.clone()).or_default() += 1;

        let mut receipt = TxReceipt {
            transaction_hash: hash.to_string(),
            block_number: block.number,
            from: tx.from.clone(),
            to: tx.to.clone(),
            status: false,
            gas_used: 21_000,
            logs: vec![],
            revert_reason: None,
        };

        let call: ContractCall = match serde_json::from_slice(&tx.data) {
            Ok(call) => call,
            // Undecodable calldata reverts without a reason
            Err(_) => return receipt,
        };
        let gas = match call {
            ContractCall::Checkpoint { .. } => CHECKPOINT_GAS,
            ContractCall::Approve { .. } => APPROVE_GAS,
            _ => TRADE_GAS,
        };
        if let Some(limit) = tx.gas_limit {
            if limit < gas {
                receipt.gas_used = limit;
                receipt.revert_reason = Some("out of gas".to_string());
                return receipt;
            }
        }
        receipt.gas_used = gas;

        match self.run_call(&call, &tx.from, &tx.to, block.timestamp) {
            Ok((events, _)) => {
                receipt.status = true;
                receipt.logs = self.to_logs(events, block.number, hash, log_index);
            }
            Err(reason) => receipt.revert_reason = reason,
        }
        receipt
    }

    /// Apply a call on copies of the touched ledgers and commit only on success
    #[allow(clippy::type_complexity)]
    fn run_call(
        &mut self,
        call: &ContractCall,
        from: &str,
        to: &str,
        now: u64,
    ) -> Result<(Vec<(String, PoolEvent)>, Option<ReceiptBreakdown>), Option<String>> {
        let to = to.to_lowercase();
        if let ContractCall::Approve { spender, amount } = call {
            let token = self.tokens.get_mut(&to).ok_or(None::<String>)?;
            let event = token.approve(from, spender, *amount);
            return Ok((vec![(to, event)], None));
        }

        let mut market = self.markets.get(&to).cloned().ok_or(None::<String>)?;
        let token_address = market.config.base_token.clone();
        let mut token = self.tokens.get(&token_address).cloned().ok_or(None::<String>)?;

        let mut ex = Exec {
            now,
            trader: from,
            token: &mut token,
            events: vec![],
        };
        let settled = market.apply(call, &mut ex).map_err(Some)?;
        let events = ex
            .events
            .into_iter()
            .map(|event| {
                let address = match event {
                    PoolEvent::Transfer { .. } | PoolEvent::Approval { .. } => token_address.clone(),
                    _ => to.clone(),
                };
                (address, event)
            })
            .collect();

        self.markets.insert(to, market);
        self.tokens.insert(token_address, token);
        Ok((events, settled.map(|(_, breakdown)| breakdown)))
    }

    /// A block holding one privileged transaction, used for deployments and faucet mints
    fn mine_system(&mut self, interval: u64, chain_id: u64, from: &str, to: &str, events: Vec<(String, PoolEvent)>) {
        self.system_txs += 1;
        let hash = tx_hash(chain_id, "system", self.system_txs, to.as_bytes());
        let timestamp = self.latest().timestamp + interval;
        let block = self.new_block(timestamp);
        let mut log_index = 0;
        let logs = self.to_logs(events, block.number, &hash, &mut log_index);
        self.logs.extend(logs.iter().cloned());
        self.receipts.insert(
            hash.clone(),
            TxReceipt {
                transaction_hash: hash,
                block_number: block.number,
                from: from.to_string(),
                to: to.to_string(),
                status: true,
                gas_used: 0,
                logs,
                revert_reason: None,
            },
        );
        self.record_history(block.number);
    }
}

impl SimulatedChain {
    pub fn new(chain_id: u64, genesis_timestamp: u64) -> Self {
        let state = SimState {
            blocks: vec![Block {
                number: 0,
                timestamp: genesis_timestamp,
                hash: block_hash(0, genesis_timestamp),
            }],
            nonces: HashMap::new(),
            mempool: Vec::new(),
            queued: BTreeMap::new(),
            receipts: HashMap::new(),
            logs: Vec::new(),
            tokens: HashMap::new(),
            markets: HashMap::new(),
            history: VecDeque::new(),
            next_address: 0x1000,
            system_txs: 0,
        };
        Self {
            inner: Arc::new(Mutex::new(Inner {
                chain_id,
                block_interval: 1,
                automine: true,
                state,
                snapshots: BTreeMap::new(),
                next_snapshot: 1,
            })),
            latency: None,
        }
    }

    /// Delay every submission by a random duration in `[min, max]`, so that
    /// concurrent submissions arrive out of order
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.latency = Some((min, max.max(min)));
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deploy a base token and a pool seeded with `params.initial_liquidity`
    pub fn deploy_pool(&self, deployer: &str, params: SimPoolParams) -> SimulatedPool {
        let deployer = deployer.to_lowercase();
        let mut inner = self.lock();
        let interval = inner.block_interval;
        let chain_id = inner.chain_id;
        let state = &mut inner.state;

        let token_address = state.allocate_address();
        let pool_address = state.allocate_address();
        let config = PoolConfig {
            hyperdrive_address: pool_address.clone(),
            base_token: token_address.clone(),
            checkpoint_duration: params.checkpoint_duration,
            position_duration: params.position_duration,
            minimum_transaction_amount: params.minimum_transaction_amount,
            initial_vault_share_price: Decimal::ONE,
        };

        let mut token = SimToken::new(token_address.clone());
        let now = state.latest().timestamp + interval;
        let mut ex = Exec {
            now,
            trader: &deployer,
            token: &mut token,
            events: vec![],
        };
        let market = SimMarket::deploy(config, &params, &deployer, &mut ex);
        let events: Vec<(String, PoolEvent)> = ex
            .events
            .into_iter()
            .map(|event| match event {
                PoolEvent::Transfer { .. } => (token_address.clone(), event),
                _ => (pool_address.clone(), event),
            })
            .collect();

        state.tokens.insert(token_address.clone(), token);
        state.markets.insert(pool_address.clone(), market);
        state.mine_system(interval, chain_id, &deployer, &pool_address, events);
        info!(pool = %pool_address, base_token = %token_address, "deployed simulated pool");

        SimulatedPool::new(self.clone(), pool_address, token_address)
    }

    /// Faucet: mint base tokens to `to` in a new block
    pub fn mint_base(&self, token: &str, to: &str, amount: Uint128) -> Result<(), ChainError> {
        let mut inner = self.lock();
        let interval = inner.block_interval;
        let chain_id = inner.chain_id;
        let state = &mut inner.state;
        let token_address = token.to_lowercase();
        let ledger = state
            .tokens
            .get_mut(&token_address)
            .ok_or_else(|| ChainError::QueryFailed(format!("unknown token {}", token)))?;
        let event = ledger.mint(&to.to_lowercase(), amount);
        state.mine_system(interval, chain_id, to, &token_address, vec![(token_address.clone(), event)]);
        Ok(())
    }

    /// Turn auto-mining on or off. Turning it on mines everything pending.
    pub fn set_automine(&self, enabled: bool) {
        let mut inner = self.lock();
        inner.automine = enabled;
        if enabled {
            Self::mine_each_pending(&mut inner);
        }
    }

    /// Mine every mempool transaction, one block each
    pub fn mine_pending(&self) {
        let mut inner = self.lock();
        Self::mine_each_pending(&mut inner);
    }

    pub fn pending_transactions(&self) -> usize {
        self.lock().state.mempool.len()
    }

    fn mine_each_pending(inner: &mut Inner) {
        let interval = inner.block_interval;
        while !inner.state.mempool.is_empty() {
            let entry = inner.state.mempool.remove(0);
            let timestamp = inner.state.latest().timestamp + interval;
            inner.state.mine(timestamp, vec![entry]);
        }
    }

    pub(crate) fn pool_config(&self, pool: &str) -> Result<PoolConfig, ChainError> {
        let inner = self.lock();
        inner
            .state
            .markets
            .get(&pool.to_lowercase())
            .map(|m| m.config.clone())
            .ok_or_else(|| ChainError::QueryFailed(format!("unknown pool {}", pool)))
    }

    pub(crate) fn pool_info(&self, pool: &str) -> Result<PoolInfo, ChainError> {
        let inner = self.lock();
        let latest = inner.state.latest();
        inner
            .state
            .markets
            .get(&pool.to_lowercase())
            .map(|m| m.info(latest.number, latest.timestamp))
            .ok_or_else(|| ChainError::QueryFailed(format!("unknown pool {}", pool)))
    }

    pub(crate) fn checkpoint(&self, pool: &str, checkpoint_time: u64) -> Result<Checkpoint, ChainError> {
        let inner = self.lock();
        inner
            .state
            .markets
            .get(&pool.to_lowercase())
            .map(|m| m.checkpoint(checkpoint_time))
            .ok_or_else(|| ChainError::QueryFailed(format!("unknown pool {}", pool)))
    }

    pub(crate) fn allowance(&self, token: &str, owner: &str, spender: &str, tag: BlockTag) -> Result<Uint128, ChainError> {
        let inner = self.lock();
        let (tokens, _) = inner.state.ledgers_at(tag)?;
        tokens
            .get(&token.to_lowercase())
            .map(|t| t.allowance(owner, spender))
            .ok_or_else(|| ChainError::QueryFailed(format!("unknown token {}", token)))
    }

    /// Execute `call` against the next block's state without committing
    pub(crate) fn preview(&self, pool: &str, call: &ContractCall, from: &str) -> Result<ReceiptBreakdown, ChainError> {
        let inner = self.lock();
        let interval = inner.block_interval;
        let now = inner.state.latest().timestamp + interval;
        let mut scratch = inner.state.clone();
        drop(inner);

        for market in scratch.markets.values_mut() {
            market.accrue(interval);
        }

        match scratch.run_call(call, &from.to_lowercase(), pool, now) {
            Ok((_, Some(breakdown))) => Ok(breakdown),
            Ok((_, None)) => Err(ChainError::Unsupported("preview of a non-trade call".to_string())),
            Err(Some(reason)) => Err(ChainError::Reverted(reason)),
            Err(None) => Err(ChainError::Reverted("unknown".to_string())),
        }
    }
}

#[async_trait]
impl ChainClient for SimulatedChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.lock().chain_id)
    }

    async fn get_block(&self, tag: BlockTag) -> Result<Block, ChainError> {
        let inner = self.lock();
        match tag {
            BlockTag::Latest | BlockTag::Pending => Ok(inner.state.latest().clone()),
            BlockTag::Number(n) => inner
                .state
                .blocks
                .get(n as usize)
                .cloned()
                .ok_or_else(|| ChainError::QueryFailed(format!("block {} not found", n))),
        }
    }

    async fn get_transaction_count(&self, address: &str, tag: BlockTag) -> Result<u64, ChainError> {
        let inner = self.lock();
        let address = address.to_lowercase();
        Ok(match tag {
            BlockTag::Pending => inner.state.pending_nonce(&address),
            _ => inner.state.confirmed_nonce(&address),
        })
    }

    async fn send_transaction(&self, mut tx: TransactionRequest) -> Result<String, ChainError> {
        if let Some((min, max)) = self.latency {
            let delay = {
                let mut rng = rand::thread_rng();
                rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64)
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let mut inner = self.lock();
        tx.from = tx.from.to_lowercase();
        tx.to = tx.to.to_lowercase();
        let expected = inner.state.pending_nonce(&tx.from);
        let nonce = tx.nonce.unwrap_or(expected);
        if nonce < expected {
            return Err(ChainError::NonceTooLow {
                account: tx.from.clone(),
                expected,
                got: nonce,
            });
        }
        tx.nonce = Some(nonce);
        let hash = tx_hash(inner.chain_id, &tx.from, nonce, &tx.data);
        let from = tx.from.clone();

        if nonce > expected {
            debug!(account = %from, nonce, expected, "queued transaction behind a nonce gap");
            inner.state.queued.insert((from, nonce), (hash.clone(), tx));
            return Ok(hash);
        }

        inner.state.mempool.push((hash.clone(), tx));
        inner.state.promote(&from);
        if inner.automine {
            Self::mine_each_pending(&mut inner);
        }
        Ok(hash)
    }

    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, ChainError> {
        Ok(self.lock().state.receipts.get(hash).cloned())
    }

    async fn get_balance(&self, address: &str, token: &Token, tag: BlockTag) -> Result<Uint128, ChainError> {
        let inner = self.lock();
        let (tokens, markets) = inner.state.ledgers_at(tag)?;
        match token {
            // Gas is free on the simulated chain
            Token::Native => Ok(Uint128::zero()),
            Token::Erc20(contract) => tokens
                .get(&contract.to_lowercase())
                .map(|t| t.balance_of(address))
                .ok_or_else(|| ChainError::QueryFailed(format!("unknown token {}", contract))),
            Token::MultiToken { contract, id } => markets
                .get(&contract.to_lowercase())
                .map(|m| m.balance_of(address, id))
                .ok_or_else(|| ChainError::QueryFailed(format!("unknown pool {}", contract))),
        }
    }

    async fn snapshot(&self) -> Result<String, ChainError> {
        let mut inner = self.lock();
        let id = inner.next_snapshot;
        inner.next_snapshot += 1;
        let state = inner.state.clone();
        inner.snapshots.insert(id, state);
        Ok(format!("0x{:x}", id))
    }

    async fn revert(&self, id: &str) -> Result<bool, ChainError> {
        let id = u64::from_str_radix(id.trim_start_matches("0x"), 16)
            .map_err(|_| ChainError::UnknownSnapshot(id.to_string()))?;
        let mut inner = self.lock();
        let Some(state) = inner.snapshots.remove(&id) else {
            return Ok(false);
        };
        inner.state = state;
        // Later snapshots no longer describe a reachable history
        inner.snapshots.retain(|k, _| *k < id);
        Ok(true)
    }

    async fn mine(&self, timestamp: u64) -> Result<Block, ChainError> {
        let mut inner = self.lock();
        let latest = inner.state.latest().timestamp;
        if timestamp < latest {
            return Err(ChainError::InvalidTimestamp {
                latest,
                requested: timestamp,
            });
        }
        let txs = std::mem::take(&mut inner.state.mempool);
        Ok(inner.state.mine(timestamp, txs))
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, ChainError> {
        let inner = self.lock();
        let to_block = filter.to_block.unwrap_or(inner.state.latest().number);
        Ok(inner
            .state
            .logs
            .iter()
            .filter(|log| log.block_number >= filter.from_block && log.block_number <= to_block)
            .filter(|log| filter.addresses.iter().any(|a| a.eq_ignore_ascii_case(&log.address)))
            .cloned()
            .collect())
    }
}
