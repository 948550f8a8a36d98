use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cosmwasm_std::Uint128;
use hyperdrive_agents_reconciler::{apply_receipt, WalletReconciler};
use hyperdrive_agents_types::{ReceiptBreakdown, TradeIntent, TradeResult, Wallet};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{InteractiveError, Result};
use crate::policy::Policy;
use crate::pool::PoolCore;
use crate::snapshot::AgentRecord;

struct AgentState {
    wallet: Wallet,
    policy: Option<Box<dyn Policy>>,
    rng: ChaCha8Rng,
    done: bool,
}

/// A funded account trading on one pool.
///
/// Calls on one handle (and its clones) are serialized by an internal
/// lock. Two handles for the same account are not coordinated.
#[derive(Clone)]
pub struct Agent {
    core: Arc<PoolCore>,
    address: String,
    name: String,
    state: Arc<Mutex<AgentState>>,
    valid: Arc<AtomicBool>,
}

impl Agent {
    pub(crate) fn new(
        core: Arc<PoolCore>,
        name: String,
        wallet: Wallet,
        policy: Option<Box<dyn Policy>>,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            core,
            address: wallet.address.clone(),
            name,
            state: Arc::new(Mutex::new(AgentState {
                wallet,
                policy,
                rng,
                done: false,
            })),
            valid: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool_address(&self) -> &str {
        self.core.contract.address()
    }

    fn ensure_valid(&self) -> Result<()> {
        self.core.ensure_valid()?;
        if self.valid.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(InteractiveError::agent_invalidated(&self.address))
        }
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TRADING
    // ═══════════════════════════════════════════════════════════════════════

    /// Submit `intents` as one batch. Failed trades come back as FAIL
    /// results; only local validation and infrastructure errors are `Err`.
    pub async fn execute(&self, intents: Vec<TradeIntent>) -> Result<Vec<TradeResult>> {
        self.ensure_valid()?;
        let mut state = self.state.lock().await;
        self.execute_locked(&mut state, intents).await
    }

    async fn execute_locked(&self, state: &mut AgentState, intents: Vec<TradeIntent>) -> Result<Vec<TradeResult>> {
        let default_slippage = self.core.context.config().default_slippage_tolerance;
        let intents = intents
            .into_iter()
            .map(|intent| with_default_slippage(intent, default_slippage))
            .collect();
        let results = self.core.executor.execute_for(intents, &state.wallet).await?;
        self.settle(state, &results).await?;
        Ok(results)
    }

    /// Fold settled receipts into the wallet, then sync the pool database
    async fn settle(&self, state: &mut AgentState, results: &[TradeResult]) -> Result<()> {
        for result in results {
            match (&result.receipt, result.is_success()) {
                (Some(breakdown), true) => apply_receipt(&mut state.wallet, result.intent.action_type(), breakdown)?,
                _ => debug!(
                    account = %self.address,
                    action = ?result.intent.action_type(),
                    cause = ?result.cause(),
                    "trade did not settle"
                ),
            }
        }
        if let Some(block) = results.iter().filter_map(|r| r.block_number).max() {
            self.core.sync.sync(Some(block)).await?;
        }
        Ok(())
    }

    /// Close every position. With `randomize` the closes are shuffled with
    /// the agent's RNG; withdrawal share redemption always comes last.
    pub async fn liquidate(&self, randomize: bool) -> Result<Vec<TradeResult>> {
        self.ensure_valid()?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let rng = if randomize { Some(&mut state.rng) } else { None };
        let results = self.core.executor.liquidate(&state.wallet, rng).await?;
        self.settle(state, &results).await?;
        info!(
            account = %self.address,
            trades = results.len(),
            failed = results.iter().filter(|r| !r.is_success()).count(),
            "liquidated"
        );
        Ok(results)
    }

    pub async fn get_wallet(&self) -> Result<Wallet> {
        self.ensure_valid()?;
        Ok(self.state.lock().await.wallet.clone())
    }

    /// Run one step of the agent's policy and execute what it returns
    pub async fn execute_policy_action(&self) -> Result<Vec<TradeResult>> {
        self.ensure_valid()?;
        let pool_state = self.core.pool_state().await?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let policy = state
            .policy
            .as_mut()
            .ok_or_else(|| InteractiveError::NoPolicy(self.name.clone()))?;
        let (intents, done) = policy.action(&pool_state, &state.wallet, &mut state.rng);
        state.done = done;
        debug!(account = %self.address, policy = policy.name(), trades = intents.len(), done, "policy action");

        let results = self.execute_locked(state, intents).await?;
        if let Some(policy) = state.policy.as_mut() {
            policy.post_action(&results);
        }
        Ok(results)
    }

    /// Whether the policy has reported it is done trading
    pub async fn is_done(&self) -> bool {
        self.state.lock().await.done
    }

    pub async fn set_max_approval(&self) -> Result<()> {
        self.ensure_valid()?;
        let receipt = self.core.executor.approve_max(&self.address).await?;
        debug!(account = %self.address, block = receipt.block_number, "approved pool for max base");
        Ok(())
    }

    /// Check the tracked wallet against an event replay and on-chain
    /// balances. Returns the on-chain view.
    pub async fn verify_wallet(&self) -> Result<Wallet> {
        self.ensure_valid()?;
        let state = self.state.lock().await;
        let reconciler = WalletReconciler::new(self.core.context.chain().clone(), self.core.contract.clone());
        Ok(reconciler.verify(&state.wallet).await?)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SINGLE TRADES (fail on any FAIL result)
    // ═══════════════════════════════════════════════════════════════════════

    async fn execute_one(&self, intent: TradeIntent) -> Result<ReceiptBreakdown> {
        let mut result = self
            .execute(vec![intent])
            .await?
            .pop()
            .ok_or_else(|| InteractiveError::MissingResult(self.address.clone()))?;
        match result.receipt.take() {
            Some(receipt) if result.is_success() => Ok(receipt),
            _ => {
                warn!(account = %self.address, cause = ?result.cause(), "single trade failed");
                Err(InteractiveError::TradeFailed(Box::new(result)))
            }
        }
    }

    pub async fn open_long(&self, base: Uint128) -> Result<ReceiptBreakdown> {
        self.execute_one(TradeIntent::open_long(base)).await
    }

    pub async fn close_long(&self, maturity_time: u64, bonds: Uint128) -> Result<ReceiptBreakdown> {
        self.execute_one(TradeIntent::close_long(bonds, maturity_time)).await
    }

    pub async fn open_short(&self, bonds: Uint128) -> Result<ReceiptBreakdown> {
        self.execute_one(TradeIntent::open_short(bonds)).await
    }

    pub async fn close_short(&self, maturity_time: u64, bonds: Uint128) -> Result<ReceiptBreakdown> {
        self.execute_one(TradeIntent::close_short(bonds, maturity_time)).await
    }

    /// Add liquidity accepting any pool apr
    pub async fn add_liquidity(&self, base: Uint128) -> Result<ReceiptBreakdown> {
        self.execute_one(TradeIntent::add_liquidity(base, Decimal::ZERO, Decimal::MAX))
            .await
    }

    pub async fn remove_liquidity(&self, lp_shares: Uint128) -> Result<ReceiptBreakdown> {
        self.execute_one(TradeIntent::remove_liquidity(lp_shares)).await
    }

    pub async fn redeem_withdrawal_shares(&self, withdrawal_shares: Uint128) -> Result<ReceiptBreakdown> {
        self.execute_one(TradeIntent::redeem_withdrawal_shares(withdrawal_shares))
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SNAPSHOTS
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) async fn snapshot_record(&self) -> AgentRecord {
        let state = self.state.lock().await;
        AgentRecord {
            address: self.address.clone(),
            name: self.name.clone(),
            policy: state.policy.as_ref().map(|p| p.name().to_string()),
            policy_state: state
                .policy
                .as_ref()
                .map_or(serde_json::Value::Null, |p| p.save_state()),
            rng: state.rng.clone(),
            wallet: state.wallet.clone(),
            done: state.done,
        }
    }

    /// Restore into the existing policy object so that callers holding
    /// this handle see the restored state. Either everything is restored
    /// or nothing changes.
    pub(crate) async fn restore(&self, record: &AgentRecord, restore_rng: bool) -> Result<()> {
        let wallet = record.wallet.clone();
        let rng = restore_rng.then(|| record.rng.clone());
        if wallet.address != self.address {
            return Err(InteractiveError::SnapshotMismatch(format!(
                "snapshot wallet {} does not belong to agent {}",
                wallet.address, self.address
            )));
        }

        let mut state = self.state.lock().await;
        // The only fallible step, and it leaves the policy untouched on error
        if let Some(policy) = state.policy.as_mut() {
            policy.load_state(record.policy_state.clone())?;
        }
        state.wallet = wallet;
        state.done = record.done;
        if let Some(rng) = rng {
            state.rng = rng;
        }
        debug!(account = %self.address, restore_rng, "restored agent");
        Ok(())
    }
}

fn with_default_slippage(intent: TradeIntent, default: Option<Decimal>) -> TradeIntent {
    match (intent.slippage_tolerance, default) {
        (None, Some(tolerance)) => intent.with_slippage_tolerance(tolerance),
        _ => intent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChainContext, ContextConfig};
    use crate::policy::ScriptedPolicy;
    use crate::pool::{AgentConfig, Pool};
    use hyperdrive_agents_chain::{SimPoolParams, SimulatedChain};
    use hyperdrive_agents_types::fixed::units;
    use hyperdrive_agents_types::FailureCause;

    const DEPLOYER: &str = "0x00000000000000000000000000000000000de910";

    async fn make_test_pool() -> Pool {
        let chain = SimulatedChain::new(31337, 1_700_000_000);
        let contract = chain.deploy_pool(DEPLOYER, SimPoolParams::default());
        let context = ChainContext::new(Arc::new(chain.clone()), ContextConfig::default())
            .await
            .unwrap()
            .with_faucet(Arc::new(chain));
        Pool::open(Arc::new(context), Arc::new(contract), DEPLOYER).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_and_close_long_updates_wallet() {
        let pool = make_test_pool().await;
        let agent = pool
            .init_agent(AgentConfig::new().with_base(units(100_000)))
            .await
            .unwrap();

        let opened = agent.open_long(units(22_222)).await.unwrap();
        let wallet = agent.get_wallet().await.unwrap();
        assert_eq!(wallet.longs[&opened.maturity_time].balance, opened.bond_amount);
        assert_eq!(wallet.base, units(100_000) - units(22_222));

        let closed = agent.close_long(opened.maturity_time, opened.bond_amount).await.unwrap();
        let wallet = agent.get_wallet().await.unwrap();
        assert!(wallet.longs.is_empty());
        assert_eq!(wallet.base, units(100_000) - units(22_222) + closed.base_amount);

        agent.verify_wallet().await.unwrap();
    }

    #[tokio::test]
    async fn test_single_trade_raises_on_failure() {
        let pool = make_test_pool().await;
        let agent = pool.init_agent(AgentConfig::new().with_base(units(10))).await.unwrap();

        let err = agent.open_long(units(1_000)).await.unwrap_err();
        match err {
            InteractiveError::TradeFailed(result) => assert_eq!(result.cause(), Some(FailureCause::InvalidBalance)),
            other => panic!("unexpected error {other}"),
        }
        // Nothing settled
        assert_eq!(agent.get_wallet().await.unwrap().base, units(10));
    }

    #[tokio::test]
    async fn test_policy_action_runs_script() {
        let pool = make_test_pool().await;
        let script = ScriptedPolicy::new([
            vec![TradeIntent::open_long(units(10))],
            vec![TradeIntent::open_short(units(10))],
        ]);
        let agent = pool
            .init_agent(AgentConfig::new().with_base(units(1_000)).with_policy(script))
            .await
            .unwrap();

        let first = agent.execute_policy_action().await.unwrap();
        assert!(first[0].is_success());
        assert!(!agent.is_done().await);

        let second = agent.execute_policy_action().await.unwrap();
        assert!(second[0].is_success());
        assert!(agent.is_done().await);

        let wallet = agent.verify_wallet().await.unwrap();
        assert_eq!(wallet.longs.len(), 1);
        assert_eq!(wallet.shorts.len(), 1);
    }

    #[tokio::test]
    async fn test_policy_action_without_policy() {
        let pool = make_test_pool().await;
        let agent = pool.init_agent(AgentConfig::new()).await.unwrap();

        assert!(matches!(
            agent.execute_policy_action().await,
            Err(InteractiveError::NoPolicy(_))
        ));
    }

    #[tokio::test]
    async fn test_liquidate_clears_positions() {
        let pool = make_test_pool().await;
        let agent = pool.init_agent(AgentConfig::new().with_base(units(10_000))).await.unwrap();
        agent.open_long(units(100)).await.unwrap();
        agent.open_short(units(100)).await.unwrap();
        agent.add_liquidity(units(100)).await.unwrap();

        let results = agent.liquidate(true).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_success()));

        let wallet = agent.verify_wallet().await.unwrap();
        assert!(wallet.longs.is_empty() && wallet.shorts.is_empty());
        assert!(wallet.lp_tokens.is_zero());
    }

    #[tokio::test]
    async fn test_failed_restore_changes_nothing() {
        let pool = make_test_pool().await;
        let script = ScriptedPolicy::new([vec![TradeIntent::open_long(units(10))]]);
        let agent = pool
            .init_agent(AgentConfig::new().with_base(units(1_000)).with_policy(script))
            .await
            .unwrap();
        let other = pool.init_agent(AgentConfig::new().with_base(units(5))).await.unwrap();
        let before = agent.snapshot_record().await;

        let mut corrupt = before.clone();
        corrupt.wallet.base = units(1);
        corrupt.policy_state = serde_json::json!(42);
        assert!(matches!(
            agent.restore(&corrupt, true).await,
            Err(InteractiveError::PolicyState(_))
        ));

        let foreign = other.snapshot_record().await;
        assert!(matches!(
            agent.restore(&foreign, true).await,
            Err(InteractiveError::SnapshotMismatch(_))
        ));
        assert_eq!(agent.snapshot_record().await, before);
    }

    #[test]
    fn test_default_slippage_only_fills_gaps() {
        let tolerance = Decimal::new(1, 2);
        let explicit = TradeIntent::open_long(units(1)).with_slippage_tolerance(Decimal::new(5, 2));

        assert_eq!(
            with_default_slippage(explicit, Some(tolerance)).slippage_tolerance,
            Some(Decimal::new(5, 2))
        );
        assert_eq!(
            with_default_slippage(TradeIntent::open_long(units(1)), Some(tolerance)).slippage_tolerance,
            Some(tolerance)
        );
        assert_eq!(with_default_slippage(TradeIntent::open_long(units(1)), None).slippage_tolerance, None);
    }
}
