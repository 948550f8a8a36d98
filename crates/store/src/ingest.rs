use hyperdrive_agents_chain::{BlockTag, ChainClient, ContractCaller, LogFilter};
use hyperdrive_agents_types::{wallet_deltas, PoolEvent};
use std::sync::Arc;
use tracing::{debug, info};

use crate::store::{ChainDataStore, StoreError};

/// Outcome of one ingestion pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub from_block: u64,
    pub to_block: u64,
    pub events: usize,
    pub rows_inserted: usize,
    pub checkpoints: usize,
}

/// Pulls pool and base token logs off the chain into a pool's store
pub struct ChainIngestor {
    chain: Arc<dyn ChainClient>,
    contract: Arc<dyn ContractCaller>,
    store: Arc<dyn ChainDataStore>,
}

impl ChainIngestor {
    pub fn new(chain: Arc<dyn ChainClient>, contract: Arc<dyn ContractCaller>, store: Arc<dyn ChainDataStore>) -> Self {
        Self { chain, contract, store }
    }

    pub fn store(&self) -> &Arc<dyn ChainDataStore> {
        &self.store
    }

    /// Ingest every block after the stored cursor up to `target`
    /// (latest when `None`)
    pub async fn ingest_to(&self, target: Option<u64>) -> Result<IngestStats, StoreError> {
        let target = match target {
            Some(block) => block,
            None => self.chain.get_block(BlockTag::Latest).await?.number,
        };
        let from = self.store.ingested_block().await?.map_or(0, |b| b + 1);
        if from > target {
            return Ok(IngestStats {
                from_block: from,
                to_block: target,
                ..Default::default()
            });
        }
        self.ingest_range(from, target).await
    }

    /// Ingest `[from, to]` regardless of the cursor. Rows already stored are
    /// not inserted again.
    pub async fn ingest_range(&self, from: u64, to: u64) -> Result<IngestStats, StoreError> {
        if self.store.get_pool_config().await?.is_none() {
            let config = self.contract.pool_config().await?;
            self.store.add_pool_config(&config).await?;
        }

        let filter = LogFilter {
            addresses: vec![self.contract.address().to_string(), self.contract.base_token().to_string()],
            from_block: from,
            to_block: Some(to),
        };
        let logs = self.chain.get_logs(&filter).await?;
        let events = self.contract.decode_events(&logs)?;

        let rows = wallet_deltas(&events);
        let rows_inserted = self.store.add_trade_events(&rows).await?;

        let mut checkpoints = 0;
        for log in &events {
            if let PoolEvent::CreateCheckpoint { checkpoint, .. } = &log.event {
                self.store.add_checkpoint(checkpoint).await?;
                checkpoints += 1;
            }
        }

        let info = self.contract.pool_info(BlockTag::Number(to)).await?;
        self.store.add_pool_info(&info).await?;

        let cursor = self.store.ingested_block().await?;
        if cursor.map_or(true, |c| c < to) {
            self.store.set_ingested_block(to).await?;
        }

        let stats = IngestStats {
            from_block: from,
            to_block: to,
            events: events.len(),
            rows_inserted,
            checkpoints,
        };
        if rows_inserted > 0 {
            info!(
                pool = %self.contract.address(),
                from_block = from,
                to_block = to,
                events = stats.events,
                rows = rows_inserted,
                "ingested pool events"
            );
        } else {
            debug!(pool = %self.contract.address(), from_block = from, to_block = to, "no new pool events");
        }
        Ok(stats)
    }
}
