use async_trait::async_trait;
use hyperdrive_agents_chain::ChainError;
use hyperdrive_agents_types::{AssetId, Checkpoint, PoolConfig, PoolInfo, PositionKind, WalletDelta};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════
// CORE TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Net holding of one token, summed from trade event rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub kind: PositionKind,
    pub token_id: Option<AssetId>,
    pub maturity_time: Option<u64>,
    pub balance: i128,
}

/// Everything one pool's database holds, used for snapshots and crash reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolDump {
    pub pool_config: Option<PoolConfig>,
    pub trade_events: Vec<WalletDelta>,
    pub pool_info: Vec<PoolInfo>,
    pub checkpoints: Vec<Checkpoint>,
    pub ingested_block: Option<u64>,
}

/// Idempotency key of a trade event row
pub(crate) type RowKey = (String, u64, String, Option<AssetId>);

pub(crate) fn row_key(row: &WalletDelta) -> RowKey {
    (
        row.transaction_hash.clone(),
        row.log_index,
        row.wallet_address.to_lowercase(),
        row.token_id,
    )
}

/// Fold rows into net per-token balances. Base is keyed by `None`.
pub(crate) fn summarize<'a>(rows: impl IntoIterator<Item = &'a WalletDelta>) -> Vec<PositionSummary> {
    let mut totals: BTreeMap<Option<AssetId>, PositionSummary> = BTreeMap::new();
    for row in rows {
        if row.base_delta != 0 {
            totals
                .entry(None)
                .or_insert_with(|| PositionSummary {
                    kind: PositionKind::Base,
                    token_id: None,
                    maturity_time: None,
                    balance: 0,
                })
                .balance += row.base_delta;
        }
        if let (Some(token_id), true) = (row.token_id, row.token_delta != 0) {
            totals
                .entry(Some(token_id))
                .or_insert_with(|| PositionSummary {
                    kind: row.kind,
                    token_id: Some(token_id),
                    maturity_time: row.maturity_time,
                    balance: 0,
                })
                .balance += row.token_delta;
        }
    }
    totals.into_values().filter(|p| p.balance != 0).collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TYPES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("pool mismatch: store holds {expected}, got {got}")]
    PoolMismatch { expected: String, got: String },

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(err.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Event-sourced database of one pool
#[async_trait]
pub trait ChainDataStore: Send + Sync {
    /// Record the pool's immutable configuration
    async fn add_pool_config(&self, config: &PoolConfig) -> Result<(), StoreError>;

    async fn get_pool_config(&self) -> Result<Option<PoolConfig>, StoreError>;

    /// Append trade event rows; rows already present are skipped.
    /// Returns the number of rows inserted.
    async fn add_trade_events(&self, rows: &[WalletDelta]) -> Result<usize, StoreError>;

    /// Rows ordered by (block, log index), optionally for one wallet
    async fn get_trade_events(
        &self,
        wallet: Option<&str>,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<WalletDelta>, StoreError>;

    /// Insert or replace the pool info snapshot at `info.block_number`
    async fn add_pool_info(&self, info: &PoolInfo) -> Result<(), StoreError>;

    async fn get_pool_info(&self, from_block: u64, to_block: Option<u64>) -> Result<Vec<PoolInfo>, StoreError>;

    async fn add_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    async fn get_checkpoints(&self, from_time: u64, to_time: Option<u64>) -> Result<Vec<Checkpoint>, StoreError>;

    /// Last block the ingestion pipeline fully processed
    async fn ingested_block(&self) -> Result<Option<u64>, StoreError>;

    async fn set_ingested_block(&self, block: u64) -> Result<(), StoreError>;

    /// Net holdings of `wallet` from all rows up to `as_of_block`
    async fn current_positions(
        &self,
        wallet: &str,
        as_of_block: Option<u64>,
    ) -> Result<Vec<PositionSummary>, StoreError> {
        let rows = self.get_trade_events(Some(wallet), 0, as_of_block).await?;
        Ok(summarize(&rows))
    }

    async fn export(&self) -> Result<PoolDump, StoreError> {
        Ok(PoolDump {
            pool_config: self.get_pool_config().await?,
            trade_events: self.get_trade_events(None, 0, None).await?,
            pool_info: self.get_pool_info(0, None).await?,
            checkpoints: self.get_checkpoints(0, None).await?,
            ingested_block: self.ingested_block().await?,
        })
    }

    /// Load a dump. With `drop_existing` the store is emptied first.
    async fn import(&self, dump: &PoolDump, drop_existing: bool) -> Result<(), StoreError>;

    /// Flush pending writes, if the backend buffers any
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE (for testing)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct MemoryTables {
    pool_config: Option<PoolConfig>,
    trade_events: Vec<WalletDelta>,
    keys: HashSet<RowKey>,
    pool_info: BTreeMap<u64, PoolInfo>,
    checkpoints: BTreeMap<u64, Checkpoint>,
    ingested_block: Option<u64>,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<MemoryTables>>,
}

fn in_range(value: u64, from: u64, to: Option<u64>) -> bool {
    value >= from && to.map_or(true, |to| value <= to)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trade event rows (for testing)
    pub fn len(&self) -> usize {
        self.tables.read().unwrap().trade_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_rows(tables: &mut MemoryTables, rows: &[WalletDelta]) -> usize {
        let mut inserted = 0;
        for row in rows {
            if tables.keys.insert(row_key(row)) {
                tables.trade_events.push(row.clone());
                inserted += 1;
            }
        }
        tables
            .trade_events
            .sort_by_key(|r| (r.block_number, r.log_index));
        inserted
    }
}

#[async_trait]
impl ChainDataStore for InMemoryStore {
    async fn add_pool_config(&self, config: &PoolConfig) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        if let Some(existing) = &tables.pool_config {
            if !existing.hyperdrive_address.eq_ignore_ascii_case(&config.hyperdrive_address) {
                return Err(StoreError::PoolMismatch {
                    expected: existing.hyperdrive_address.clone(),
                    got: config.hyperdrive_address.clone(),
                });
            }
        }
        tables.pool_config = Some(config.clone());
        Ok(())
    }

    async fn get_pool_config(&self) -> Result<Option<PoolConfig>, StoreError> {
        Ok(self.tables.read().unwrap().pool_config.clone())
    }

    async fn add_trade_events(&self, rows: &[WalletDelta]) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().unwrap();
        Ok(Self::insert_rows(&mut tables, rows))
    }

    async fn get_trade_events(
        &self,
        wallet: Option<&str>,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<WalletDelta>, StoreError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .trade_events
            .iter()
            .filter(|r| in_range(r.block_number, from_block, to_block))
            .filter(|r| wallet.map_or(true, |w| r.wallet_address.eq_ignore_ascii_case(w)))
            .cloned()
            .collect())
    }

    async fn add_pool_info(&self, info: &PoolInfo) -> Result<(), StoreError> {
        self.tables
            .write()
            .unwrap()
            .pool_info
            .insert(info.block_number, info.clone());
        Ok(())
    }

    async fn get_pool_info(&self, from_block: u64, to_block: Option<u64>) -> Result<Vec<PoolInfo>, StoreError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .pool_info
            .values()
            .filter(|info| in_range(info.block_number, from_block, to_block))
            .cloned()
            .collect())
    }

    async fn add_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.tables
            .write()
            .unwrap()
            .checkpoints
            .insert(checkpoint.checkpoint_time, checkpoint.clone());
        Ok(())
    }

    async fn get_checkpoints(&self, from_time: u64, to_time: Option<u64>) -> Result<Vec<Checkpoint>, StoreError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .checkpoints
            .values()
            .filter(|c| in_range(c.checkpoint_time, from_time, to_time))
            .cloned()
            .collect())
    }

    async fn ingested_block(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.tables.read().unwrap().ingested_block)
    }

    async fn set_ingested_block(&self, block: u64) -> Result<(), StoreError> {
        self.tables.write().unwrap().ingested_block = Some(block);
        Ok(())
    }

    async fn import(&self, dump: &PoolDump, drop_existing: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        if drop_existing {
            *tables = MemoryTables::default();
        }
        if dump.pool_config.is_some() {
            tables.pool_config = dump.pool_config.clone();
        }
        Self::insert_rows(&mut tables, &dump.trade_events);
        for info in &dump.pool_info {
            tables.pool_info.insert(info.block_number, info.clone());
        }
        for checkpoint in &dump.checkpoints {
            tables.checkpoints.insert(checkpoint.checkpoint_time, checkpoint.clone());
        }
        tables.ingested_block = tables.ingested_block.max(dump.ingested_block);
        Ok(())
    }
}
