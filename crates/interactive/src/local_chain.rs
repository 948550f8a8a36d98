use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use hyperdrive_agents_chain::{BlockTag, ChainClient, ChainError, ContractCaller, RpcChainClient, SimPoolParams, SimulatedChain};
use hyperdrive_agents_config::{validate_config, AppConfig, ChainBackend};
use hyperdrive_agents_types::Checkpoint;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::context::{ChainContext, ContextConfig};
use crate::error::{InteractiveError, Result};
use crate::pool::Pool;
use crate::snapshot::{ChainMarker, PoolSnapshot, SnapshotRecord};

/// Account that deploys simulated pools and signs their checkpoints
pub const DEFAULT_DEPLOYER: &str = "0x00000000000000000000000000000000000de910";

/// A dev chain with its registered pools, able to move time forward and
/// to save and restore the whole agent world.
pub struct LocalChain {
    context: Arc<ChainContext>,
    sim: Option<SimulatedChain>,
    pools: RwLock<Vec<Pool>>,
    /// Chain snapshot id of the last save. Also serializes time travel.
    saved: Mutex<Option<String>>,
}

impl LocalChain {
    /// In-process chain that can deploy pools and fund agents
    pub async fn simulated(chain_id: u64, genesis_timestamp: u64, config: ContextConfig) -> Result<Self> {
        let sim = SimulatedChain::new(chain_id, genesis_timestamp);
        let context = ChainContext::new(Arc::new(sim.clone()), config)
            .await?
            .with_faucet(Arc::new(sim.clone()));
        Ok(Self::with_context(context, Some(sim)))
    }

    /// Any chain client. Agents can only be funded if a faucet is attached
    /// to `context`.
    pub fn connect(context: ChainContext) -> Self {
        Self::with_context(context, None)
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        validate_config(config).map_err(|e| InteractiveError::Config(e.to_string()))?;
        let context_config = ContextConfig::from_app_config(config)?;
        match config.chain.backend {
            ChainBackend::Simulated => {
                Self::simulated(config.chain.chain_id, config.chain.genesis_timestamp, context_config).await
            }
            ChainBackend::Rpc => {
                let client = RpcChainClient::with_timeout(
                    config.chain.rpc_url.clone(),
                    Duration::from_millis(config.chain.request_timeout_ms),
                );
                let context = ChainContext::new(Arc::new(client), context_config).await?;
                Ok(Self::connect(context))
            }
        }
    }

    fn with_context(context: ChainContext, sim: Option<SimulatedChain>) -> Self {
        info!(chain_id = context.chain_id(), simulated = sim.is_some(), "connected local chain");
        Self {
            context: Arc::new(context),
            sim,
            pools: RwLock::new(Vec::new()),
            saved: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<ChainContext> {
        &self.context
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        self.context.chain()
    }

    /// The simulated chain behind this handle, if any
    pub fn simulation(&self) -> Option<&SimulatedChain> {
        self.sim.as_ref()
    }

    pub async fn block_time(&self) -> Result<u64> {
        Ok(self.chain().get_block(BlockTag::Latest).await?.timestamp)
    }

    pub async fn block_number(&self) -> Result<u64> {
        Ok(self.chain().get_block(BlockTag::Latest).await?.number)
    }

    /// Registered pools that are still valid
    pub fn pools(&self) -> Vec<Pool> {
        self.pools
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // POOLS
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn deploy_pool(&self, params: SimPoolParams) -> Result<Pool> {
        let sim = self
            .sim
            .as_ref()
            .ok_or_else(|| InteractiveError::Unsupported("deploying pools needs the simulated chain".to_string()))?;
        let contract = sim.deploy_pool(DEFAULT_DEPLOYER, params);
        self.add_pool(Arc::new(contract), DEFAULT_DEPLOYER).await
    }

    /// Register an already deployed pool. `admin` signs its checkpoints.
    pub async fn add_pool(&self, contract: Arc<dyn ContractCaller>, admin: &str) -> Result<Pool> {
        let _ops = self.saved.lock().await;
        let pool = Pool::open(self.context.clone(), contract, admin).await?;
        self.pools
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(pool.clone());
        Ok(pool)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TIME
    // ═══════════════════════════════════════════════════════════════════════

    /// Move chain time forward by `delta`. With `create_checkpoints`,
    /// every checkpoint boundary crossed gets minted on every pool; the
    /// transactions doing so are counted against the elapsed time, so the
    /// total drift stays within a few seconds. Returns the checkpoints
    /// created per pool address.
    pub async fn advance_time(&self, delta: Duration, create_checkpoints: bool) -> Result<HashMap<String, Vec<Checkpoint>>> {
        let _ops = self.saved.lock().await;
        let seconds = delta.as_secs();
        if seconds == 0 {
            return Err(InteractiveError::Unsupported("cannot advance time by zero seconds".to_string()));
        }
        let pools = self.pools();
        let mut created: HashMap<String, Vec<Checkpoint>> =
            pools.iter().map(|p| (p.address().to_string(), Vec::new())).collect();

        if !create_checkpoints || pools.is_empty() {
            let now = self.block_time().await?;
            self.chain().mine(now + seconds).await?;
        } else {
            let durations: BTreeSet<u64> = pools.iter().map(|p| p.config().checkpoint_duration).collect();
            if durations.len() > 1 {
                return Err(InteractiveError::CheckpointDurationMismatch {
                    durations: durations.into_iter().collect(),
                });
            }
            let checkpoint_duration = durations.into_iter().next().unwrap_or(seconds).max(1);

            mint_checkpoints(&pools, &mut created).await?;
            let mut offset = 0;
            for _ in 0..seconds / checkpoint_duration {
                let now = self.block_time().await?;
                self.chain().mine(now + checkpoint_duration.saturating_sub(offset)).await?;
                let before = self.block_time().await?;
                mint_checkpoints(&pools, &mut created).await?;
                offset = self.block_time().await? - before;
            }
            let remainder = seconds % checkpoint_duration;
            if remainder > offset {
                let now = self.block_time().await?;
                self.chain().mine(now + remainder - offset).await?;
            }
        }

        for pool in &pools {
            pool.run_data_pipeline().await?;
        }
        self.context.metrics().record_time_advanced(seconds);
        info!(
            seconds,
            checkpoints = created.values().map(Vec::len).sum::<usize>(),
            "advanced chain time"
        );
        Ok(created)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SNAPSHOTS
    // ═══════════════════════════════════════════════════════════════════════

    /// Snapshot the chain and write every pool's database and agents to the
    /// configured directory
    pub async fn save_snapshot(&self) -> Result<()> {
        let mut saved = self.saved.lock().await;
        let pools = self.pools();
        for pool in &pools {
            pool.run_data_pipeline().await?;
        }

        let snapshot_id = self.chain().snapshot().await?;
        let block = self.chain().get_block(BlockTag::Latest).await?;
        let mut snapshots = Vec::with_capacity(pools.len());
        for pool in &pools {
            let mut agents = Vec::new();
            for agent in pool.agents()? {
                agents.push(agent.snapshot_record().await);
            }
            snapshots.push(PoolSnapshot {
                address: pool.address().to_string(),
                dump: pool.store().export().await?,
                agents,
            });
        }
        let record = SnapshotRecord {
            marker: ChainMarker {
                chain_id: self.context.chain_id(),
                snapshot_id: snapshot_id.clone(),
                block_number: block.number,
                block_timestamp: block.timestamp,
                saved_at: Utc::now(),
            },
            pools: snapshots,
        };
        record.write(&self.context.config().snapshot_dir).await?;

        *saved = Some(snapshot_id.clone());
        self.context.metrics().record_snapshot_saved();
        info!(snapshot = %snapshot_id, block = block.number, pools = pools.len(), "saved snapshot");
        Ok(())
    }

    /// Revert the chain to the last save and restore pools and agents.
    /// Pools and agents created since then are invalidated. Loading again
    /// returns to the same state, also after a load that failed part way.
    pub async fn load_snapshot(&self) -> Result<()> {
        let mut saved = self.saved.lock().await;
        let snapshot_id = saved.clone().ok_or(InteractiveError::NoSnapshot)?;
        let dir = &self.context.config().snapshot_dir;
        let record = SnapshotRecord::read(dir, self.context.chain_id()).await?;

        let pools = self.pools();
        for pool in &pools {
            if let Err(e) = pool.data_sync().flush().await {
                warn!(pool = %pool.address(), error = %e, "pending sync failed before snapshot load");
            }
        }
        if !self.chain().revert(&snapshot_id).await? {
            return Err(ChainError::UnknownSnapshot(snapshot_id).into());
        }

        // Reverting consumes the chain snapshot. Replace it before restoring
        // anything so a failed restore can be retried.
        *saved = None;
        let snapshot_id = self.chain().snapshot().await?;
        *saved = Some(snapshot_id.clone());
        let marker = ChainMarker {
            snapshot_id: snapshot_id.clone(),
            saved_at: Utc::now(),
            ..record.marker.clone()
        };
        SnapshotRecord::write_marker(dir, &marker).await?;

        let (kept, dropped): (Vec<Pool>, Vec<Pool>) =
            pools.into_iter().partition(|pool| record.pool(pool.address()).is_some());
        for pool in &dropped {
            pool.invalidate();
        }
        *self.pools.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = kept.clone();

        let restore_rng = self.context.config().restore_rng;
        for pool in &kept {
            if let Some(snapshot) = record.pool(pool.address()) {
                pool.store().import(&snapshot.dump, true).await?;
                pool.restore_agents(&snapshot.agents, restore_rng).await?;
            }
        }

        self.context.metrics().record_snapshot_loaded();
        info!(
            snapshot = %snapshot_id,
            block = marker.block_number,
            pools = kept.len(),
            invalidated = dropped.len(),
            "loaded snapshot"
        );
        Ok(())
    }
}

async fn mint_checkpoints(pools: &[Pool], created: &mut HashMap<String, Vec<Checkpoint>>) -> Result<()> {
    for pool in pools {
        if let Some(checkpoint) = pool.create_checkpoint(true).await? {
            created.entry(pool.address().to_string()).or_default().push(checkpoint);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::policy::{Policy, RandomPolicy};
    use crate::pool::AgentConfig;
    use hyperdrive_agents_types::fixed::units;
    use hyperdrive_agents_types::{ActionType, PoolState, TradeIntent, Wallet};
    use rand::RngCore;
    use tempfile::TempDir;

    const HOUR: u64 = 3600;

    /// Idle policy whose state load fails while `failures` is non-zero
    struct FlakyLoadPolicy {
        failures: Arc<AtomicUsize>,
    }

    impl Policy for FlakyLoadPolicy {
        fn name(&self) -> &str {
            "flaky_load"
        }

        fn action(&mut self, _: &PoolState, _: &Wallet, _: &mut dyn RngCore) -> (Vec<TradeIntent>, bool) {
            (Vec::new(), false)
        }

        fn load_state(&mut self, _state: serde_json::Value) -> Result<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(InteractiveError::PolicyState("state store unavailable".to_string()));
            }
            Ok(())
        }
    }

    async fn make_test_chain() -> (TempDir, LocalChain) {
        let dir = tempfile::tempdir().unwrap();
        let config = ContextConfig::default()
            .with_snapshot_dir(dir.path().join("snapshot"))
            .with_seed(7);
        let chain = LocalChain::simulated(31337, 1_700_000_000, config).await.unwrap();
        (dir, chain)
    }

    #[tokio::test]
    async fn test_advance_time_mints_checkpoints() {
        let (_dir, chain) = make_test_chain().await;
        let pool = chain.deploy_pool(SimPoolParams::default()).await.unwrap();
        let start = chain.block_time().await.unwrap();

        let created = chain.advance_time(Duration::from_secs(3 * HOUR), true).await.unwrap();

        let elapsed = chain.block_time().await.unwrap() - start;
        assert!(elapsed >= 3 * HOUR && elapsed <= 3 * HOUR + 10, "elapsed {elapsed}");
        let checkpoints = &created[pool.address()];
        assert!((3..=4).contains(&checkpoints.len()), "{} checkpoints", checkpoints.len());
        for checkpoint in checkpoints {
            assert_eq!(checkpoint.checkpoint_time % HOUR, 0);
        }
        let stored = pool.store().get_checkpoints(0, None).await.unwrap();
        assert!(stored.len() >= checkpoints.len());
    }

    #[tokio::test]
    async fn test_advance_time_without_checkpoints() {
        let (_dir, chain) = make_test_chain().await;
        let pool = chain.deploy_pool(SimPoolParams::default()).await.unwrap();
        let start = chain.block_time().await.unwrap();

        let created = chain.advance_time(Duration::from_secs(2 * HOUR), false).await.unwrap();
        assert!(created[pool.address()].is_empty());
        assert_eq!(chain.block_time().await.unwrap() - start, 2 * HOUR);
    }

    #[tokio::test]
    async fn test_mismatched_durations_fail_before_time_moves() {
        let (_dir, chain) = make_test_chain().await;
        chain.deploy_pool(SimPoolParams::default()).await.unwrap();
        chain
            .deploy_pool(SimPoolParams {
                checkpoint_duration: 2 * HOUR,
                ..SimPoolParams::default()
            })
            .await
            .unwrap();
        let start = chain.block_time().await.unwrap();

        let err = chain.advance_time(Duration::from_secs(HOUR), true).await.unwrap_err();
        assert!(matches!(err, InteractiveError::CheckpointDurationMismatch { .. }));
        assert_eq!(chain.block_time().await.unwrap(), start);
    }

    #[tokio::test]
    async fn test_load_without_save() {
        let (_dir, chain) = make_test_chain().await;
        assert!(matches!(chain.load_snapshot().await, Err(InteractiveError::NoSnapshot)));
    }

    #[tokio::test]
    async fn test_save_load_restores_state() {
        let (_dir, chain) = make_test_chain().await;
        let pool = chain.deploy_pool(SimPoolParams::default()).await.unwrap();
        let agent = pool.init_agent(AgentConfig::new().with_base(units(100_000))).await.unwrap();
        agent.open_long(units(1_000)).await.unwrap();

        chain.save_snapshot().await.unwrap();
        let wallet = agent.get_wallet().await.unwrap();
        let info = pool.pool_state().await.unwrap().info;
        let block = chain.block_number().await.unwrap();

        agent.open_short(units(500)).await.unwrap();
        chain.advance_time(Duration::from_secs(HOUR), true).await.unwrap();
        assert_ne!(agent.get_wallet().await.unwrap(), wallet);

        chain.load_snapshot().await.unwrap();
        assert_eq!(agent.get_wallet().await.unwrap(), wallet);
        assert_eq!(pool.pool_state().await.unwrap().info, info);
        assert_eq!(chain.block_number().await.unwrap(), block);
        assert_eq!(pool.store().ingested_block().await.unwrap(), Some(block));

        // A second load lands on the same state
        agent.open_long(units(10)).await.unwrap();
        chain.load_snapshot().await.unwrap();
        assert_eq!(agent.get_wallet().await.unwrap(), wallet);
        assert_eq!(chain.block_number().await.unwrap(), block);
    }

    #[tokio::test]
    async fn test_load_can_be_retried_after_failed_restore() {
        let (_dir, chain) = make_test_chain().await;
        let pool = chain.deploy_pool(SimPoolParams::default()).await.unwrap();
        let failures = Arc::new(AtomicUsize::new(0));
        let agent = pool
            .init_agent(AgentConfig::new().with_base(units(100_000)).with_policy(FlakyLoadPolicy {
                failures: failures.clone(),
            }))
            .await
            .unwrap();
        agent.open_long(units(1_000)).await.unwrap();

        chain.save_snapshot().await.unwrap();
        let wallet = agent.get_wallet().await.unwrap();
        let block = chain.block_number().await.unwrap();
        agent.open_short(units(500)).await.unwrap();

        failures.store(1, Ordering::SeqCst);
        let err = chain.load_snapshot().await.unwrap_err();
        assert!(matches!(err, InteractiveError::PolicyState(_)));
        assert_eq!(chain.block_number().await.unwrap(), block);

        chain.load_snapshot().await.unwrap();
        assert_eq!(agent.get_wallet().await.unwrap(), wallet);
        assert_eq!(chain.block_number().await.unwrap(), block);
        assert_eq!(pool.store().ingested_block().await.unwrap(), Some(block));
        assert!(agent.verify_wallet().await.is_ok());
    }

    #[tokio::test]
    async fn test_load_invalidates_later_pools_and_agents() {
        let (_dir, chain) = make_test_chain().await;
        let pool = chain.deploy_pool(SimPoolParams::default()).await.unwrap();
        let kept = pool.init_agent(AgentConfig::new().with_base(units(1_000))).await.unwrap();
        chain.save_snapshot().await.unwrap();

        let late_agent = pool.init_agent(AgentConfig::new().with_base(units(1_000))).await.unwrap();
        let late_pool = chain.deploy_pool(SimPoolParams::default()).await.unwrap();
        chain.load_snapshot().await.unwrap();

        assert!(matches!(
            late_agent.open_long(units(10)).await,
            Err(InteractiveError::Invalidated { kind: "agent", .. })
        ));
        assert!(matches!(
            late_pool.pool_state().await,
            Err(InteractiveError::Invalidated { kind: "pool", .. })
        ));
        assert!(!late_pool.is_valid());
        assert_eq!(chain.pools().len(), 1);
        assert_eq!(pool.agents().unwrap().len(), 1);
        assert!(kept.get_wallet().await.is_ok());
    }

    #[tokio::test]
    async fn test_rng_restore_replays_policy() {
        let (_dir, chain) = make_test_chain().await;
        let pool = chain.deploy_pool(SimPoolParams::default()).await.unwrap();
        let policy = RandomPolicy::new()
            .with_trade_chance(1.0)
            .with_allowed_actions([ActionType::OpenLong, ActionType::OpenShort]);
        let agent = pool
            .init_agent(AgentConfig::new().with_base(units(100_000)).with_policy(policy))
            .await
            .unwrap();
        chain.save_snapshot().await.unwrap();

        let first: Vec<_> = agent
            .execute_policy_action()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.intent)
            .collect();
        let first_wallet = agent.get_wallet().await.unwrap();

        chain.load_snapshot().await.unwrap();
        let second: Vec<_> = agent
            .execute_policy_action()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.intent)
            .collect();

        assert_eq!(first, second);
        assert_eq!(agent.get_wallet().await.unwrap(), first_wallet);
    }

    #[tokio::test]
    async fn test_rpc_chain_cannot_deploy() {
        let sim = SimulatedChain::new(1337, 1_700_000_000);
        let context = ChainContext::new(Arc::new(sim), ContextConfig::default()).await.unwrap();
        let chain = LocalChain::connect(context);
        assert!(matches!(
            chain.deploy_pool(SimPoolParams::default()).await,
            Err(InteractiveError::Unsupported(_))
        ));
    }
}
