use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use cosmwasm_std::Uint128;
use hyperdrive_agents_chain::{BlockTag, ContractCall, ContractCaller, Token};
use hyperdrive_agents_executor::{CrashReporter, TradeExecutor};
use hyperdrive_agents_store::{ChainDataStore, ChainIngestor, InMemoryStore, SqliteStore};
use hyperdrive_agents_types::{Checkpoint, PoolConfig, PoolState, Wallet};
use tracing::{debug, info};

use crate::agent::Agent;
use crate::context::{ChainContext, StoreBackend};
use crate::error::{InteractiveError, Result};
use crate::policy::Policy;
use crate::snapshot::AgentRecord;
use crate::sync::{BackgroundSync, BlockingSync, DataSync};

/// Everything agents of one pool share
pub(crate) struct PoolCore {
    pub(crate) context: Arc<ChainContext>,
    pub(crate) contract: Arc<dyn ContractCaller>,
    pub(crate) store: Arc<dyn ChainDataStore>,
    pub(crate) executor: TradeExecutor,
    pub(crate) sync: Arc<dyn DataSync>,
    pub(crate) config: PoolConfig,
    admin: String,
    valid: AtomicBool,
}

impl PoolCore {
    pub(crate) fn ensure_valid(&self) -> Result<()> {
        if self.valid.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(InteractiveError::pool_invalidated(self.contract.address()))
        }
    }

    pub(crate) async fn pool_state(&self) -> Result<PoolState> {
        self.ensure_valid()?;
        let info = self.contract.pool_info(BlockTag::Latest).await?;
        let checkpoint = self
            .contract
            .checkpoint(self.config.checkpoint_id(info.timestamp))
            .await?;
        Ok(PoolState {
            config: self.config.clone(),
            info,
            checkpoint,
        })
    }
}

/// Settings for a new agent
pub struct AgentConfig {
    pub name: Option<String>,
    /// Base minted to the agent on creation
    pub base: Uint128,
    pub policy: Option<Box<dyn Policy>>,
    /// Approve the pool for the agent's whole base balance
    pub approve: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self {
            name: None,
            base: Uint128::zero(),
            policy: None,
            approve: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_base(mut self, base: Uint128) -> Self {
        self.base = base;
        self
    }

    pub fn with_policy(mut self, policy: impl Policy + 'static) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    pub fn without_approval(mut self) -> Self {
        self.approve = false;
        self
    }
}

/// One registered pool with its database, executor and agents.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct Pool {
    core: Arc<PoolCore>,
    agents: Arc<Mutex<Vec<Agent>>>,
}

impl Pool {
    /// Wire a store, ingestor, executor and data-sync strategy around
    /// `contract`. `admin` signs checkpoint transactions.
    pub(crate) async fn open(
        context: Arc<ChainContext>,
        contract: Arc<dyn ContractCaller>,
        admin: impl Into<String>,
    ) -> Result<Self> {
        let config = contract.pool_config().await?;
        let store: Arc<dyn ChainDataStore> = match &context.config().store {
            StoreBackend::Memory => Arc::new(InMemoryStore::new()),
            StoreBackend::Sqlite { dir } => {
                tokio::fs::create_dir_all(dir).await?;
                Arc::new(SqliteStore::new(dir.join(format!("{}.db", contract.address()))).await?)
            }
        };

        let chain = context.chain().clone();
        let ingestor = Arc::new(ChainIngestor::new(chain.clone(), contract.clone(), store.clone()));
        let metrics = *context.metrics();
        let reporter = CrashReporter::new(contract.clone(), context.config().crash_report.clone())
            .with_store(store.clone())
            .with_metrics(metrics);
        let executor = TradeExecutor::new(chain, contract.clone())
            .with_config(context.config().executor.clone())
            .with_reporter(reporter)
            .with_metrics(metrics);
        let sync: Arc<dyn DataSync> = if context.config().background_sync {
            Arc::new(BackgroundSync::spawn(ingestor, metrics))
        } else {
            Arc::new(BlockingSync::new(ingestor).with_metrics(metrics))
        };

        info!(
            pool = %contract.address(),
            checkpoint_duration = config.checkpoint_duration,
            sync = sync.name(),
            "registered pool"
        );
        let pool = Self {
            core: Arc::new(PoolCore {
                context,
                contract,
                store,
                executor,
                sync,
                config,
                admin: admin.into(),
                valid: AtomicBool::new(true),
            }),
            agents: Arc::new(Mutex::new(Vec::new())),
        };
        pool.run_data_pipeline().await?;
        Ok(pool)
    }

    pub fn address(&self) -> &str {
        self.core.contract.address()
    }

    pub fn is_valid(&self) -> bool {
        self.core.ensure_valid().is_ok()
    }

    /// Configuration read at registration
    pub fn config(&self) -> &PoolConfig {
        &self.core.config
    }

    pub fn pool_config(&self) -> Result<PoolConfig> {
        self.core.ensure_valid()?;
        Ok(self.core.config.clone())
    }

    /// Config, latest info and the current checkpoint
    pub async fn pool_state(&self) -> Result<PoolState> {
        self.core.pool_state().await
    }

    pub fn store(&self) -> &Arc<dyn ChainDataStore> {
        &self.core.store
    }

    pub fn executor(&self) -> &TradeExecutor {
        &self.core.executor
    }

    pub fn data_sync(&self) -> &Arc<dyn DataSync> {
        &self.core.sync
    }

    /// Mint the checkpoint for the current block time. With
    /// `check_if_exists`, returns `None` without sending anything when it
    /// is already minted. Also `None` when the chain reports it existed.
    pub async fn create_checkpoint(&self, check_if_exists: bool) -> Result<Option<Checkpoint>> {
        self.core.ensure_valid()?;
        let chain = self.core.context.chain();
        let block = chain.get_block(BlockTag::Latest).await?;
        let checkpoint_time = self.core.config.checkpoint_id(block.timestamp);

        if check_if_exists && self.core.contract.checkpoint(checkpoint_time).await?.exists() {
            debug!(pool = %self.address(), checkpoint_time, "checkpoint already exists");
            return Ok(None);
        }

        let receipt = self
            .core
            .executor
            .submit_and_wait(&ContractCall::Checkpoint { checkpoint_time }, &self.core.admin)
            .await?;
        let checkpoint = self.core.contract.decode_checkpoint(&receipt)?;
        if let Some(created) = &checkpoint {
            self.core.context.metrics().record_checkpoint_created();
            info!(
                pool = %self.address(),
                checkpoint_time = created.checkpoint_time,
                block = receipt.block_number,
                "created checkpoint"
            );
        }
        Ok(checkpoint)
    }

    /// Ingest up to the latest block and wait for it to land
    pub async fn run_data_pipeline(&self) -> Result<()> {
        self.core.ensure_valid()?;
        self.core.sync.sync(None).await?;
        self.core.sync.flush().await
    }

    /// Create a fresh account, fund it and optionally approve the pool
    pub async fn init_agent(&self, config: AgentConfig) -> Result<Agent> {
        self.core.ensure_valid()?;
        let context = &self.core.context;
        let (address, rng) = context.next_account();

        if !config.base.is_zero() {
            let faucet = context
                .faucet()
                .ok_or_else(|| InteractiveError::Unsupported("funding agents needs a faucet".to_string()))?;
            faucet.fund(&self.core.config.base_token, &address, config.base).await?;
        }
        let base = context
            .chain()
            .get_balance(&address, &Token::Erc20(self.core.config.base_token.clone()), BlockTag::Latest)
            .await?;
        let wallet = Wallet::new(address.clone()).with_base(base);

        let name = config.name.unwrap_or_else(|| address.clone());
        let agent = Agent::new(self.core.clone(), name, wallet, config.policy, rng);
        if config.approve {
            agent.set_max_approval().await?;
        }
        self.core.sync.sync(None).await?;

        self.lock_agents().push(agent.clone());
        context.track_agents(1);
        info!(pool = %self.address(), account = %address, agent = %agent.name(), base = %base, "initialized agent");
        Ok(agent)
    }

    /// Agents still valid on this pool, in creation order
    pub fn agents(&self) -> Result<Vec<Agent>> {
        self.core.ensure_valid()?;
        Ok(self.lock_agents().clone())
    }

    fn lock_agents(&self) -> MutexGuard<'_, Vec<Agent>> {
        self.agents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark this pool and all its agents unusable
    pub(crate) fn invalidate(&self) {
        self.core.valid.store(false, Ordering::Release);
        let agents = std::mem::take(&mut *self.lock_agents());
        for agent in &agents {
            agent.invalidate();
        }
        self.core.context.track_agents(-(agents.len() as i64));
        info!(pool = %self.address(), agents = agents.len(), "invalidated pool");
    }

    /// Keep the agents that have a record, invalidate the rest, then
    /// restore each kept agent from its record
    pub(crate) async fn restore_agents(&self, records: &[AgentRecord], restore_rng: bool) -> Result<()> {
        let by_address: HashMap<&str, &AgentRecord> = records.iter().map(|r| (r.address.as_str(), r)).collect();
        let kept = {
            let mut agents = self.lock_agents();
            let (kept, dropped): (Vec<Agent>, Vec<Agent>) = agents
                .drain(..)
                .partition(|agent| by_address.contains_key(agent.address()));
            for agent in &dropped {
                agent.invalidate();
            }
            self.core.context.track_agents(-(dropped.len() as i64));
            *agents = kept.clone();
            kept
        };

        for agent in kept {
            if let Some(record) = by_address.get(agent.address()) {
                agent.restore(record, restore_rng).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfig;
    use hyperdrive_agents_chain::{ChainClient, SimPoolParams, SimulatedChain};
    use hyperdrive_agents_types::fixed::units;

    const DEPLOYER: &str = "0x00000000000000000000000000000000000de910";

    async fn make_test_pool(config: ContextConfig) -> (SimulatedChain, Pool) {
        let chain = SimulatedChain::new(31337, 1_700_000_000);
        let contract = chain.deploy_pool(DEPLOYER, SimPoolParams::default());
        let context = ChainContext::new(Arc::new(chain.clone()), config)
            .await
            .unwrap()
            .with_faucet(Arc::new(chain.clone()));
        let pool = Pool::open(Arc::new(context), Arc::new(contract), DEPLOYER).await.unwrap();
        (chain, pool)
    }

    #[tokio::test]
    async fn test_open_ingests_deployment() {
        let (_chain, pool) = make_test_pool(ContextConfig::default()).await;

        assert!(pool.store().ingested_block().await.unwrap().is_some());
        assert_eq!(pool.store().get_checkpoints(0, None).await.unwrap().len(), 1);
        assert_eq!(pool.pool_config().unwrap().checkpoint_duration, 3600);
    }

    #[tokio::test]
    async fn test_create_checkpoint_if_missing() {
        let (chain, pool) = make_test_pool(ContextConfig::default()).await;

        // The deployment already minted the current checkpoint
        assert!(pool.create_checkpoint(true).await.unwrap().is_none());

        let now = chain.get_block(BlockTag::Latest).await.unwrap().timestamp;
        chain.mine(now + 3600).await.unwrap();
        let checkpoint = pool.create_checkpoint(true).await.unwrap().unwrap();
        assert_eq!(checkpoint.checkpoint_time % 3600, 0);
        assert!(checkpoint.exists());

        let state = pool.pool_state().await.unwrap();
        assert_eq!(state.checkpoint.checkpoint_time, checkpoint.checkpoint_time);
    }

    #[tokio::test]
    async fn test_init_agent_funds_and_approves() {
        let (_chain, pool) = make_test_pool(ContextConfig::default()).await;

        let agent = pool
            .init_agent(AgentConfig::new().with_name("alice").with_base(units(1_000)))
            .await
            .unwrap();
        assert_eq!(agent.name(), "alice");
        assert_eq!(agent.get_wallet().await.unwrap().base, units(1_000));
        assert_eq!(pool.executor().contract().allowance(agent.address(), BlockTag::Latest).await.unwrap(), Uint128::MAX);
        assert_eq!(pool.agents().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalidated_pool_rejects_calls() {
        let (_chain, pool) = make_test_pool(ContextConfig::default()).await;
        let agent = pool.init_agent(AgentConfig::new()).await.unwrap();

        pool.invalidate();
        assert!(!pool.is_valid());
        assert!(matches!(pool.pool_state().await, Err(InteractiveError::Invalidated { .. })));
        assert!(matches!(agent.get_wallet().await, Err(InteractiveError::Invalidated { .. })));
    }

    #[tokio::test]
    async fn test_sqlite_backend_one_file_per_pool() {
        let dir = tempfile::tempdir().unwrap();
        let config = ContextConfig::default().with_store(StoreBackend::Sqlite {
            dir: dir.path().to_path_buf(),
        });
        let (_chain, pool) = make_test_pool(config).await;

        assert!(dir.path().join(format!("{}.db", pool.address())).exists());
        assert!(pool.store().get_pool_config().await.unwrap().is_some());
    }
}
