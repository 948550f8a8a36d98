//! Trading policies.
//!
//! A [`Policy`] turns the current pool state and the agent's wallet into
//! trade intents. Policies own whatever state they need between calls and
//! round-trip it through JSON for snapshots; randomness always comes from
//! the agent's RNG so that a snapshot can restore the stream.

use std::collections::VecDeque;

use cosmwasm_std::Uint128;
use hyperdrive_agents_types::fixed::{from_decimal, to_decimal};
use hyperdrive_agents_types::{ActionType, PoolState, TradeIntent, TradeResult, Wallet};
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InteractiveError, Result};

pub trait Policy: Send {
    fn name(&self) -> &str;

    /// Intents for this step and whether the policy is done trading
    fn action(&mut self, pool_state: &PoolState, wallet: &Wallet, rng: &mut dyn RngCore) -> (Vec<TradeIntent>, bool);

    /// Called with the results of the intents returned by `action`
    fn post_action(&mut self, _results: &[TradeResult]) {}

    fn save_state(&self) -> Value {
        Value::Null
    }

    /// Must leave the policy unchanged when it returns an error
    fn load_state(&mut self, _state: Value) -> Result<()> {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RANDOM POLICY
// ═══════════════════════════════════════════════════════════════════════════

/// Mean and standard deviation of a trade, as fractions of the base budget
const TRADE_SIZE_MEAN: f64 = 0.1;
const TRADE_SIZE_STD: f64 = 0.01;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RandomPolicyState {
    steps: u64,
    trades_settled: u64,
    trades_failed: u64,
}

/// Picks one available action at random each step and sizes it around a
/// tenth of the wallet's base
pub struct RandomPolicy {
    trade_chance: f64,
    allowed: Vec<ActionType>,
    slippage_tolerance: Option<Decimal>,
    state: RandomPolicyState,
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomPolicy {
    pub fn new() -> Self {
        Self {
            trade_chance: 1.0,
            allowed: ActionType::ALL.to_vec(),
            slippage_tolerance: None,
            state: RandomPolicyState::default(),
        }
    }

    /// Probability in `[0, 1]` of trading on a given step. Non-finite
    /// values mean never.
    pub fn with_trade_chance(mut self, chance: f64) -> Self {
        self.trade_chance = if chance.is_finite() { chance.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    pub fn with_allowed_actions(mut self, allowed: impl IntoIterator<Item = ActionType>) -> Self {
        self.allowed = allowed.into_iter().collect();
        self
    }

    pub fn with_slippage_tolerance(mut self, tolerance: Decimal) -> Self {
        self.slippage_tolerance = Some(tolerance);
        self
    }

    pub fn trades_settled(&self) -> u64 {
        self.state.trades_settled
    }

    /// Actions the wallet can currently take, restricted to the allowed set
    pub fn available_actions(&self, pool_state: &PoolState, wallet: &Wallet) -> Vec<ActionType> {
        let mut actions = Vec::new();
        if wallet.base > pool_state.config.minimum_transaction_amount {
            actions.extend([ActionType::OpenLong, ActionType::OpenShort, ActionType::AddLiquidity]);
        }
        if !wallet.longs.is_empty() {
            actions.push(ActionType::CloseLong);
        }
        if !wallet.shorts.is_empty() {
            actions.push(ActionType::CloseShort);
        }
        if !wallet.lp_tokens.is_zero() {
            actions.push(ActionType::RemoveLiquidity);
        }
        if !wallet.withdrawal_shares.is_zero() && !pool_state.info.withdrawal_shares_ready_to_withdraw.is_zero() {
            actions.push(ActionType::RedeemWithdrawShare);
        }
        actions.retain(|a| self.allowed.contains(a));
        actions
    }

    /// N(0.1, 0.01) x budget, never below the pool minimum
    fn trade_size(&self, budget: Uint128, minimum: Uint128, rng: &mut dyn RngCore) -> Uint128 {
        let fraction = Normal::new(TRADE_SIZE_MEAN, TRADE_SIZE_STD)
            .map(|normal| normal.sample(rng))
            .unwrap_or(TRADE_SIZE_MEAN);
        let fraction = Decimal::from_f64(fraction.max(0.0)).unwrap_or_default();
        from_decimal(to_decimal(budget) * fraction).max(minimum)
    }

    fn protect(&self, intent: TradeIntent) -> TradeIntent {
        match self.slippage_tolerance {
            Some(tolerance) => intent.with_slippage_tolerance(tolerance),
            None => intent,
        }
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> &str {
        "random"
    }

    fn action(&mut self, pool_state: &PoolState, wallet: &Wallet, rng: &mut dyn RngCore) -> (Vec<TradeIntent>, bool) {
        self.state.steps += 1;
        if !rng.gen_bool(self.trade_chance) {
            return (vec![], false);
        }
        let actions = self.available_actions(pool_state, wallet);
        if actions.is_empty() {
            return (vec![], false);
        }

        let minimum = pool_state.config.minimum_transaction_amount;
        let action = actions[rng.gen_range(0..actions.len())];
        let intent = match action {
            ActionType::OpenLong => {
                TradeIntent::open_long(self.trade_size(wallet.base, minimum, rng).min(wallet.base))
            }
            ActionType::OpenShort => TradeIntent::open_short(self.trade_size(wallet.base, minimum, rng)),
            ActionType::AddLiquidity => TradeIntent::add_liquidity(
                self.trade_size(wallet.base, minimum, rng).min(wallet.base),
                Decimal::ZERO,
                Decimal::MAX,
            ),
            ActionType::CloseLong => {
                let maturities: Vec<_> = wallet.longs.values().collect();
                let long = maturities[rng.gen_range(0..maturities.len())];
                TradeIntent::close_long(long.balance, long.maturity_time)
            }
            ActionType::CloseShort => {
                let maturities: Vec<_> = wallet.shorts.values().collect();
                let short = maturities[rng.gen_range(0..maturities.len())];
                TradeIntent::close_short(short.balance, short.maturity_time)
            }
            ActionType::RemoveLiquidity => {
                TradeIntent::remove_liquidity(self.trade_size(wallet.base, minimum, rng).min(wallet.lp_tokens))
            }
            ActionType::RedeemWithdrawShare => TradeIntent::redeem_withdrawal_shares(
                self.trade_size(wallet.base, minimum, rng).min(wallet.withdrawal_shares),
            ),
        };
        (vec![self.protect(intent)], false)
    }

    fn post_action(&mut self, results: &[TradeResult]) {
        for result in results {
            if result.is_success() {
                self.state.trades_settled += 1;
            } else {
                self.state.trades_failed += 1;
            }
        }
    }

    fn save_state(&self) -> Value {
        serde_json::to_value(&self.state).unwrap_or(Value::Null)
    }

    fn load_state(&mut self, state: Value) -> Result<()> {
        self.state = serde_json::from_value(state).map_err(|e| InteractiveError::PolicyState(e.to_string()))?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SCRIPTED POLICY
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ScriptedPolicyState {
    steps: VecDeque<Vec<TradeIntent>>,
    executed: Vec<TradeResult>,
}

/// Replays a fixed queue of steps, one step per call. Done once the queue
/// is empty.
pub struct ScriptedPolicy {
    state: ScriptedPolicyState,
}

impl ScriptedPolicy {
    pub fn new(steps: impl IntoIterator<Item = Vec<TradeIntent>>) -> Self {
        Self {
            state: ScriptedPolicyState {
                steps: steps.into_iter().collect(),
                executed: Vec::new(),
            },
        }
    }

    pub fn remaining(&self) -> usize {
        self.state.steps.len()
    }

    /// Results of every step taken so far
    pub fn executed(&self) -> &[TradeResult] {
        &self.state.executed
    }
}

impl Policy for ScriptedPolicy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn action(&mut self, _pool_state: &PoolState, _wallet: &Wallet, _rng: &mut dyn RngCore) -> (Vec<TradeIntent>, bool) {
        let intents = self.state.steps.pop_front().unwrap_or_default();
        (intents, self.state.steps.is_empty())
    }

    fn post_action(&mut self, results: &[TradeResult]) {
        self.state.executed.extend_from_slice(results);
    }

    fn save_state(&self) -> Value {
        serde_json::to_value(&self.state).unwrap_or(Value::Null)
    }

    fn load_state(&mut self, state: Value) -> Result<()> {
        self.state = serde_json::from_value(state).map_err(|e| InteractiveError::PolicyState(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperdrive_agents_types::fixed::units;
    use hyperdrive_agents_types::{BondPosition, Checkpoint, PoolConfig, PoolInfo};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn make_test_pool_state() -> PoolState {
        PoolState {
            config: PoolConfig {
                hyperdrive_address: "0xpool".to_string(),
                base_token: "0xbase".to_string(),
                checkpoint_duration: 3600,
                position_duration: 604_800,
                minimum_transaction_amount: units(1) / Uint128::new(1000),
                initial_vault_share_price: Decimal::ONE,
            },
            info: PoolInfo::default(),
            checkpoint: Checkpoint::default(),
        }
    }

    #[test]
    fn test_available_actions_follow_wallet() {
        let policy = RandomPolicy::new();
        let state = make_test_pool_state();

        let empty = Wallet::new("0xabc");
        assert!(policy.available_actions(&state, &empty).is_empty());

        let mut wallet = Wallet::new("0xabc").with_base(units(100));
        wallet.longs.insert(
            10,
            BondPosition {
                balance: units(1),
                maturity_time: 10,
                open_share_price: Decimal::ONE,
            },
        );
        wallet.withdrawal_shares = units(1);
        let actions = policy.available_actions(&state, &wallet);
        assert!(actions.contains(&ActionType::CloseLong));
        assert!(!actions.contains(&ActionType::CloseShort));
        // Nothing is ready to withdraw yet
        assert!(!actions.contains(&ActionType::RedeemWithdrawShare));

        let longs_only = RandomPolicy::new().with_allowed_actions([ActionType::OpenLong]);
        assert_eq!(longs_only.available_actions(&state, &wallet), vec![ActionType::OpenLong]);
    }

    #[test]
    fn test_random_trade_size_near_a_tenth_of_budget() {
        let mut policy = RandomPolicy::new()
            .with_allowed_actions([ActionType::OpenLong])
            .with_slippage_tolerance(Decimal::new(1, 2));
        let state = make_test_pool_state();
        let wallet = Wallet::new("0xabc").with_base(units(1000));
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..20 {
            let (intents, done) = policy.action(&state, &wallet, &mut rng);
            assert!(!done);
            assert_eq!(intents.len(), 1);
            let amount = intents[0].action.trade_amount();
            assert!(amount > units(50) && amount < units(150), "amount {amount}");
            assert_eq!(intents[0].slippage_tolerance, Some(Decimal::new(1, 2)));
        }
    }

    #[test]
    fn test_zero_trade_chance_never_trades() {
        let mut policy = RandomPolicy::new().with_trade_chance(0.0);
        let wallet = Wallet::new("0xabc").with_base(units(1000));
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let (intents, done) = policy.action(&make_test_pool_state(), &wallet, &mut rng);
        assert!(intents.is_empty());
        assert!(!done);
    }

    #[test]
    fn test_non_finite_trade_chance_never_trades() {
        let state = make_test_pool_state();
        let wallet = Wallet::new("0xabc").with_base(units(1000));
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for chance in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut policy = RandomPolicy::new().with_trade_chance(chance);
            let (intents, _) = policy.action(&state, &wallet, &mut rng);
            assert!(intents.is_empty());
        }
        assert_eq!(RandomPolicy::new().with_trade_chance(7.5).trade_chance, 1.0);
    }

    #[test]
    fn test_same_seed_same_actions() {
        let state = make_test_pool_state();
        let wallet = Wallet::new("0xabc").with_base(units(1000));
        let run = |seed| {
            let mut policy = RandomPolicy::new();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..10)
                .flat_map(|_| policy.action(&state, &wallet, &mut rng).0)
                .collect::<Vec<_>>()
        };

        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_random_state_roundtrip() {
        let mut policy = RandomPolicy::new();
        policy.state.trades_settled = 3;
        let saved = policy.save_state();

        let mut restored = RandomPolicy::new();
        restored.load_state(saved).unwrap();
        assert_eq!(restored.trades_settled(), 3);
        assert!(restored.load_state(Value::String("bad".into())).is_err());
    }

    #[test]
    fn test_scripted_policy_runs_queue() {
        let mut policy = ScriptedPolicy::new([
            vec![TradeIntent::open_long(units(10))],
            vec![TradeIntent::open_short(units(5)), TradeIntent::open_long(units(1))],
        ]);
        let state = make_test_pool_state();
        let wallet = Wallet::new("0xabc");
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let (first, done) = policy.action(&state, &wallet, &mut rng);
        assert_eq!(first.len(), 1);
        assert!(!done);

        let saved = policy.save_state();
        let (second, done) = policy.action(&state, &wallet, &mut rng);
        assert_eq!(second.len(), 2);
        assert!(done);

        policy.load_state(saved).unwrap();
        assert_eq!(policy.remaining(), 1);
    }
}
