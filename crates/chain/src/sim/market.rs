//! Constant-product pool model backing the simulated chain. This is a test
//! double with the protocol's interface and revert reasons, not its math.

use cosmwasm_std::Uint128;
use hyperdrive_agents_types::fixed::{mul_decimal, to_decimal};
use hyperdrive_agents_types::{
    ActionType, AssetId, Checkpoint, PoolConfig, PoolEvent, PoolInfo, ReceiptBreakdown, SECONDS_PER_YEAR,
    ZERO_ADDRESS,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::token::SimToken;
use crate::ContractCall;

pub(crate) const MIN_TXN_AMOUNT: &str = "MinimumTransactionAmount()";
pub(crate) const OUTPUT_LIMIT: &str = "OutputLimit()";
pub(crate) const INSUFFICIENT_BALANCE: &str = "InsufficientBalance()";
pub(crate) const INSUFFICIENT_LIQUIDITY: &str = "InsufficientLiquidity()";
pub(crate) const INVALID_APR: &str = "InvalidApr()";
pub(crate) const INVALID_CHECKPOINT_TIME: &str = "InvalidCheckpointTime()";
pub(crate) const MINIMUM_SHARE_PRICE: &str = "MinimumSharePrice()";

/// Parameters for deploying a simulated pool
#[derive(Clone, Debug)]
pub struct SimPoolParams {
    pub initial_liquidity: Uint128,
    pub initial_fixed_rate: Decimal,
    pub variable_rate: Decimal,
    pub checkpoint_duration: u64,
    pub position_duration: u64,
    pub minimum_transaction_amount: Uint128,
}

impl Default for SimPoolParams {
    fn default() -> Self {
        Self {
            initial_liquidity: hyperdrive_agents_types::fixed::units(100_000_000),
            initial_fixed_rate: Decimal::new(5, 2),
            variable_rate: Decimal::new(5, 2),
            checkpoint_duration: 3600,
            position_duration: 7 * 24 * 3600,
            minimum_transaction_amount: Uint128::new(1_000_000_000_000_000),
        }
    }
}

/// Per-transaction execution context
pub(crate) struct Exec<'a> {
    pub now: u64,
    pub trader: &'a str,
    pub token: &'a mut SimToken,
    pub events: Vec<PoolEvent>,
}

#[derive(Clone, Debug)]
pub(crate) struct SimMarket {
    pub config: PoolConfig,
    variable_rate: Decimal,
    share_reserves: Uint128,
    bond_reserves: Uint128,
    lp_total_supply: Uint128,
    vault_share_price: Decimal,
    longs_outstanding: Uint128,
    shorts_outstanding: Uint128,
    withdrawal_shares_outstanding: Uint128,
    withdrawal_reserve: Uint128,
    long_maturities: BTreeMap<u64, Uint128>,
    short_maturities: BTreeMap<u64, Uint128>,
    checkpoints: BTreeMap<u64, Checkpoint>,
    balances: HashMap<(String, AssetId), Uint128>,
}

impl SimMarket {
    /// New pool seeded by `deployer`, who receives the initial LP tokens
    pub fn deploy(config: PoolConfig, params: &SimPoolParams, deployer: &str, ex: &mut Exec<'_>) -> Self {
        let t = Decimal::from(config.position_duration) / Decimal::from(SECONDS_PER_YEAR);
        let liquidity = params.initial_liquidity;
        let bond_reserves = liquidity + mul_decimal(liquidity, params.initial_fixed_rate * t);

        let mut market = Self {
            vault_share_price: config.initial_vault_share_price,
            config,
            variable_rate: params.variable_rate,
            share_reserves: liquidity,
            bond_reserves,
            lp_total_supply: Uint128::zero(),
            longs_outstanding: Uint128::zero(),
            shorts_outstanding: Uint128::zero(),
            withdrawal_shares_outstanding: Uint128::zero(),
            withdrawal_reserve: Uint128::zero(),
            long_maturities: BTreeMap::new(),
            short_maturities: BTreeMap::new(),
            checkpoints: BTreeMap::new(),
            balances: HashMap::new(),
        };

        let pool = market.config.hyperdrive_address.clone();
        let funded = ex.token.mint(&pool, liquidity);
        ex.events.push(funded);
        market.lp_total_supply = liquidity;
        market.mint(ex, deployer, AssetId::lp(), liquidity);
        market.ensure_checkpoint(ex);
        market
    }

    pub fn balance_of(&self, owner: &str, id: &AssetId) -> Uint128 {
        self.balances
            .get(&(owner.to_lowercase(), *id))
            .copied()
            .unwrap_or_default()
    }

    pub fn checkpoint(&self, checkpoint_time: u64) -> Checkpoint {
        self.checkpoints
            .get(&checkpoint_time)
            .cloned()
            .unwrap_or(Checkpoint {
                checkpoint_time,
                ..Default::default()
            })
    }

    /// Grow the vault share price by the variable rate over `elapsed` seconds
    pub fn accrue(&mut self, elapsed: u64) {
        if elapsed == 0 {
            return;
        }
        let growth = self.variable_rate * Decimal::from(elapsed) / Decimal::from(SECONDS_PER_YEAR);
        self.vault_share_price = (self.vault_share_price * (Decimal::ONE + growth)).round_dp(18);
    }

    fn ratio(num: Uint128, den: Uint128) -> Decimal {
        if den.is_zero() {
            return Decimal::ZERO;
        }
        to_decimal(num) / to_decimal(den)
    }

    fn spot_price(&self) -> Decimal {
        Self::ratio(self.share_reserves, self.bond_reserves)
    }

    fn fixed_rate(&self) -> Decimal {
        let price = self.spot_price();
        if price.is_zero() {
            return Decimal::ZERO;
        }
        let t = Decimal::from(self.config.position_duration) / Decimal::from(SECONDS_PER_YEAR);
        ((Decimal::ONE / price - Decimal::ONE) / t).round_dp(18)
    }

    fn lp_share_price(&self) -> Decimal {
        Self::ratio(self.share_reserves, self.lp_total_supply)
    }

    fn to_shares(&self, base: Uint128) -> Uint128 {
        if self.vault_share_price.is_zero() {
            return base;
        }
        mul_decimal(base, Decimal::ONE / self.vault_share_price)
    }

    fn withdrawal_shares_ready(&self) -> Uint128 {
        if self.longs_outstanding.is_zero() && self.shorts_outstanding.is_zero() {
            self.withdrawal_shares_outstanding
        } else {
            Uint128::zero()
        }
    }

    pub fn info(&self, block_number: u64, timestamp: u64) -> PoolInfo {
        PoolInfo {
            block_number,
            timestamp,
            share_reserves: self.share_reserves,
            bond_reserves: self.bond_reserves,
            lp_total_supply: self.lp_total_supply,
            vault_share_price: self.vault_share_price,
            lp_share_price: self.lp_share_price(),
            longs_outstanding: self.longs_outstanding,
            shorts_outstanding: self.shorts_outstanding,
            withdrawal_shares_outstanding: self.withdrawal_shares_outstanding,
            withdrawal_shares_ready_to_withdraw: self.withdrawal_shares_ready(),
            spot_price: self.spot_price(),
            fixed_rate: self.fixed_rate(),
        }
    }

    fn mint(&mut self, ex: &mut Exec<'_>, to: &str, id: AssetId, amount: Uint128) {
        *self.balances.entry((to.to_lowercase(), id)).or_default() += amount;
        ex.events.push(PoolEvent::TransferSingle {
            operator: self.config.hyperdrive_address.clone(),
            from: ZERO_ADDRESS.to_string(),
            to: to.to_string(),
            asset_id: id,
            value: amount,
        });
    }

    fn burn(&mut self, ex: &mut Exec<'_>, from: &str, id: AssetId, amount: Uint128) -> Result<(), String> {
        let balance = self.balance_of(from, &id);
        if balance < amount {
            return Err(INSUFFICIENT_BALANCE.to_string());
        }
        self.balances.insert((from.to_lowercase(), id), balance - amount);
        ex.events.push(PoolEvent::TransferSingle {
            operator: self.config.hyperdrive_address.clone(),
            from: from.to_string(),
            to: ZERO_ADDRESS.to_string(),
            asset_id: id,
            value: amount,
        });
        Ok(())
    }

    fn check_min(&self, amount: Uint128) -> Result<(), String> {
        if amount < self.config.minimum_transaction_amount {
            return Err(MIN_TXN_AMOUNT.to_string());
        }
        Ok(())
    }

    fn pay(&self, ex: &mut Exec<'_>, amount: Uint128) -> Result<(), String> {
        if amount.is_zero() {
            return Ok(());
        }
        let pool = self.config.hyperdrive_address.clone();
        let event = ex
            .token
            .transfer(&pool, ex.trader, amount)
            .map_err(|_| INSUFFICIENT_LIQUIDITY.to_string())?;
        ex.events.push(event);
        Ok(())
    }

    fn collect(&self, ex: &mut Exec<'_>, amount: Uint128) -> Result<(), String> {
        let pool = self.config.hyperdrive_address.clone();
        let event = ex.token.transfer_from(&pool, ex.trader, &pool, amount)?;
        ex.events.push(event);
        Ok(())
    }

    /// Mint the checkpoint for the current time if it is missing
    fn ensure_checkpoint(&mut self, ex: &mut Exec<'_>) {
        let id = self.config.checkpoint_id(ex.now);
        // Cannot fail: `id` is aligned and not in the future
        let _ = self.create_checkpoint(id, ex);
    }

    pub fn create_checkpoint(&mut self, checkpoint_time: u64, ex: &mut Exec<'_>) -> Result<Option<Checkpoint>, String> {
        let duration = self.config.checkpoint_duration;
        if duration == 0 || checkpoint_time % duration != 0 || checkpoint_time > ex.now {
            return Err(INVALID_CHECKPOINT_TIME.to_string());
        }
        if self.checkpoints.contains_key(&checkpoint_time) {
            return Ok(None);
        }
        let checkpoint = Checkpoint {
            checkpoint_time,
            vault_share_price: self.vault_share_price,
            matured_longs: self.long_maturities.get(&checkpoint_time).copied().unwrap_or_default(),
            matured_shorts: self.short_maturities.get(&checkpoint_time).copied().unwrap_or_default(),
        };
        self.checkpoints.insert(checkpoint_time, checkpoint.clone());
        ex.events.push(PoolEvent::CreateCheckpoint {
            checkpoint: checkpoint.clone(),
            lp_share_price: self.lp_share_price(),
        });
        Ok(Some(checkpoint))
    }

    fn breakdown(&self, ex: &Exec<'_>, asset_id: AssetId, base_amount: Uint128) -> ReceiptBreakdown {
        ReceiptBreakdown {
            trader: ex.trader.to_string(),
            asset_id: Some(asset_id),
            maturity_time: asset_id.maturity_time(),
            base_amount,
            vault_share_amount: self.to_shares(base_amount),
            vault_share_price: self.vault_share_price,
            lp_share_price: self.lp_share_price(),
            ..Default::default()
        }
    }

    fn emit(&self, ex: &mut Exec<'_>, action: ActionType, breakdown: ReceiptBreakdown) -> (ActionType, ReceiptBreakdown) {
        ex.events.push(PoolEvent::Trade {
            action,
            breakdown: breakdown.clone(),
        });
        (action, breakdown)
    }

    fn maturity_for_new_position(&self, now: u64) -> u64 {
        self.config.checkpoint_id(now) + self.config.position_duration
    }

    /// Execute a pool call. Returns the trade settled, if the call was a trade.
    pub fn apply(&mut self, call: &ContractCall, ex: &mut Exec<'_>) -> Result<Option<(ActionType, ReceiptBreakdown)>, String> {
        match call {
            ContractCall::Checkpoint { checkpoint_time } => {
                self.create_checkpoint(*checkpoint_time, ex)?;
                Ok(None)
            }
            ContractCall::Approve { .. } => Err("not a pool method".to_string()),
            trade => {
                self.ensure_checkpoint(ex);
                self.trade(trade, ex).map(Some)
            }
        }
    }

    fn trade(&mut self, call: &ContractCall, ex: &mut Exec<'_>) -> Result<(ActionType, ReceiptBreakdown), String> {
        match call {
            ContractCall::OpenLong {
                base_amount,
                min_output,
                min_vault_share_price,
            } => self.open_long(ex, *base_amount, *min_output, *min_vault_share_price),
            ContractCall::CloseLong {
                maturity_time,
                bond_amount,
                min_output,
            } => self.close_long(ex, *maturity_time, *bond_amount, *min_output),
            ContractCall::OpenShort {
                bond_amount,
                max_deposit,
                min_vault_share_price,
            } => self.open_short(ex, *bond_amount, *max_deposit, *min_vault_share_price),
            ContractCall::CloseShort {
                maturity_time,
                bond_amount,
                min_output,
            } => self.close_short(ex, *maturity_time, *bond_amount, *min_output),
            ContractCall::AddLiquidity {
                contribution,
                min_lp_share_price,
                min_apr,
                max_apr,
            } => self.add_liquidity(ex, *contribution, *min_lp_share_price, *min_apr, *max_apr),
            ContractCall::RemoveLiquidity {
                lp_shares,
                min_output_per_share,
            } => self.remove_liquidity(ex, *lp_shares, *min_output_per_share),
            ContractCall::RedeemWithdrawalShares {
                withdrawal_shares,
                min_output_per_share,
            } => self.redeem_withdrawal_shares(ex, *withdrawal_shares, *min_output_per_share),
            ContractCall::Checkpoint { .. } | ContractCall::Approve { .. } => Err("not a trade".to_string()),
        }
    }

    fn open_long(
        &mut self,
        ex: &mut Exec<'_>,
        base: Uint128,
        min_output: Uint128,
        min_vault_share_price: Decimal,
    ) -> Result<(ActionType, ReceiptBreakdown), String> {
        self.check_min(base)?;
        if self.vault_share_price < min_vault_share_price {
            return Err(MINIMUM_SHARE_PRICE.to_string());
        }
        self.collect(ex, base)?;

        let bonds = self
            .bond_reserves
            .multiply_ratio(base, self.share_reserves + base);
        if bonds < min_output {
            return Err(OUTPUT_LIMIT.to_string());
        }

        self.share_reserves += base;
        self.bond_reserves -= bonds;
        self.longs_outstanding += bonds;
        let maturity = self.maturity_for_new_position(ex.now);
        *self.long_maturities.entry(maturity).or_default() += bonds;

        let trader = ex.trader.to_string();
        self.mint(ex, &trader, AssetId::long(maturity), bonds);

        let mut breakdown = self.breakdown(ex, AssetId::long(maturity), base);
        breakdown.bond_amount = bonds;
        Ok(self.emit(ex, ActionType::OpenLong, breakdown))
    }

    fn close_long(
        &mut self,
        ex: &mut Exec<'_>,
        maturity: u64,
        bonds: Uint128,
        min_output: Uint128,
    ) -> Result<(ActionType, ReceiptBreakdown), String> {
        self.check_min(bonds)?;
        let trader = ex.trader.to_string();
        self.burn(ex, &trader, AssetId::long(maturity), bonds)?;

        let proceeds = if ex.now >= maturity {
            // Matured bonds redeem at face value
            if self.share_reserves <= bonds {
                return Err(INSUFFICIENT_LIQUIDITY.to_string());
            }
            self.share_reserves -= bonds;
            bonds
        } else {
            let proceeds = self
                .share_reserves
                .multiply_ratio(bonds, self.bond_reserves + bonds);
            self.share_reserves -= proceeds;
            self.bond_reserves += bonds;
            proceeds
        };
        if proceeds < min_output {
            return Err(OUTPUT_LIMIT.to_string());
        }

        self.longs_outstanding = self.longs_outstanding.saturating_sub(bonds);
        if let Some(outstanding) = self.long_maturities.get_mut(&maturity) {
            *outstanding = outstanding.saturating_sub(bonds);
        }
        self.pay(ex, proceeds)?;

        let mut breakdown = self.breakdown(ex, AssetId::long(maturity), proceeds);
        breakdown.bond_amount = bonds;
        Ok(self.emit(ex, ActionType::CloseLong, breakdown))
    }

    fn open_short(
        &mut self,
        ex: &mut Exec<'_>,
        bonds: Uint128,
        max_deposit: Uint128,
        min_vault_share_price: Decimal,
    ) -> Result<(ActionType, ReceiptBreakdown), String> {
        self.check_min(bonds)?;
        if self.vault_share_price < min_vault_share_price {
            return Err(MINIMUM_SHARE_PRICE.to_string());
        }

        let base_out = self
            .share_reserves
            .multiply_ratio(bonds, self.bond_reserves + bonds);
        let deposit = bonds.saturating_sub(base_out);
        if deposit > max_deposit {
            return Err(OUTPUT_LIMIT.to_string());
        }
        self.collect(ex, deposit)?;

        self.share_reserves -= base_out;
        self.bond_reserves += bonds;
        self.shorts_outstanding += bonds;
        let maturity = self.maturity_for_new_position(ex.now);
        *self.short_maturities.entry(maturity).or_default() += bonds;

        let trader = ex.trader.to_string();
        self.mint(ex, &trader, AssetId::short(maturity), bonds);

        let mut breakdown = self.breakdown(ex, AssetId::short(maturity), deposit);
        breakdown.bond_amount = bonds;
        Ok(self.emit(ex, ActionType::OpenShort, breakdown))
    }

    /// Variable interest a short of `bonds` earned since it was opened
    fn short_interest(&self, maturity: u64, bonds: Uint128) -> Uint128 {
        let open_checkpoint = maturity.saturating_sub(self.config.position_duration);
        let open_price = self
            .checkpoints
            .get(&open_checkpoint)
            .map(|c| c.vault_share_price)
            .filter(|p| !p.is_zero())
            .unwrap_or(self.vault_share_price);
        if self.vault_share_price <= open_price {
            return Uint128::zero();
        }
        mul_decimal(bonds, self.vault_share_price / open_price - Decimal::ONE)
    }

    fn close_short(
        &mut self,
        ex: &mut Exec<'_>,
        maturity: u64,
        bonds: Uint128,
        min_output: Uint128,
    ) -> Result<(ActionType, ReceiptBreakdown), String> {
        self.check_min(bonds)?;
        let trader = ex.trader.to_string();
        self.burn(ex, &trader, AssetId::short(maturity), bonds)?;

        let interest = self.short_interest(maturity, bonds);
        let proceeds = if ex.now >= maturity {
            interest
        } else {
            if self.bond_reserves <= bonds {
                return Err(INSUFFICIENT_LIQUIDITY.to_string());
            }
            let cost = self
                .share_reserves
                .multiply_ratio(bonds, self.bond_reserves - bonds);
            self.share_reserves += cost;
            self.bond_reserves -= bonds;
            bonds.saturating_sub(cost) + interest
        };
        if proceeds < min_output {
            return Err(OUTPUT_LIMIT.to_string());
        }

        self.shorts_outstanding = self.shorts_outstanding.saturating_sub(bonds);
        if let Some(outstanding) = self.short_maturities.get_mut(&maturity) {
            *outstanding = outstanding.saturating_sub(bonds);
        }
        self.pay(ex, proceeds)?;

        let mut breakdown = self.breakdown(ex, AssetId::short(maturity), proceeds);
        breakdown.bond_amount = bonds;
        Ok(self.emit(ex, ActionType::CloseShort, breakdown))
    }

    fn add_liquidity(
        &mut self,
        ex: &mut Exec<'_>,
        contribution: Uint128,
        min_lp_share_price: Decimal,
        min_apr: Decimal,
        max_apr: Decimal,
    ) -> Result<(ActionType, ReceiptBreakdown), String> {
        self.check_min(contribution)?;
        let apr = self.fixed_rate();
        if apr < min_apr || apr > max_apr {
            return Err(INVALID_APR.to_string());
        }
        let lp_share_price = self.lp_share_price();
        if lp_share_price < min_lp_share_price {
            return Err(OUTPUT_LIMIT.to_string());
        }
        self.collect(ex, contribution)?;

        let lp_amount = if self.lp_total_supply.is_zero() {
            contribution
        } else {
            self.lp_total_supply
                .multiply_ratio(contribution, self.share_reserves)
        };
        self.bond_reserves += self
            .bond_reserves
            .multiply_ratio(contribution, self.share_reserves);
        self.share_reserves += contribution;
        self.lp_total_supply += lp_amount;

        let trader = ex.trader.to_string();
        self.mint(ex, &trader, AssetId::lp(), lp_amount);

        let mut breakdown = self.breakdown(ex, AssetId::lp(), contribution);
        breakdown.lp_amount = lp_amount;
        breakdown.lp_share_price = lp_share_price;
        Ok(self.emit(ex, ActionType::AddLiquidity, breakdown))
    }

    fn remove_liquidity(
        &mut self,
        ex: &mut Exec<'_>,
        lp_shares: Uint128,
        min_output_per_share: Decimal,
    ) -> Result<(ActionType, ReceiptBreakdown), String> {
        self.check_min(lp_shares)?;
        let trader = ex.trader.to_string();
        let lp_share_price = self.lp_share_price();
        self.burn(ex, &trader, AssetId::lp(), lp_shares)?;

        let base_value = self
            .share_reserves
            .multiply_ratio(lp_shares, self.lp_total_supply);
        if base_value >= self.share_reserves {
            return Err(INSUFFICIENT_LIQUIDITY.to_string());
        }

        // Liquidity backing open positions stays locked as withdrawal shares
        let exposure = self.longs_outstanding + self.shorts_outstanding;
        let locked = base_value.multiply_ratio(exposure, self.share_reserves + exposure);
        let base_out = base_value - locked;
        let withdrawal_shares = if base_value.is_zero() {
            Uint128::zero()
        } else {
            lp_shares.multiply_ratio(locked, base_value)
        };
        if Self::ratio(base_out, lp_shares) < min_output_per_share {
            return Err(OUTPUT_LIMIT.to_string());
        }

        self.bond_reserves -= self
            .bond_reserves
            .multiply_ratio(base_value, self.share_reserves);
        self.share_reserves -= base_value;
        self.lp_total_supply -= lp_shares;
        self.withdrawal_reserve += locked;
        self.withdrawal_shares_outstanding += withdrawal_shares;

        self.pay(ex, base_out)?;
        if !withdrawal_shares.is_zero() {
            self.mint(ex, &trader, AssetId::withdrawal_share(), withdrawal_shares);
        }

        let mut breakdown = self.breakdown(ex, AssetId::lp(), base_out);
        breakdown.lp_amount = lp_shares;
        breakdown.withdrawal_share_amount = withdrawal_shares;
        breakdown.lp_share_price = lp_share_price;
        Ok(self.emit(ex, ActionType::RemoveLiquidity, breakdown))
    }

    fn redeem_withdrawal_shares(
        &mut self,
        ex: &mut Exec<'_>,
        withdrawal_shares: Uint128,
        min_output_per_share: Decimal,
    ) -> Result<(ActionType, ReceiptBreakdown), String> {
        self.check_min(withdrawal_shares)?;
        let trader = ex.trader.to_string();
        if self.balance_of(&trader, &AssetId::withdrawal_share()) < withdrawal_shares {
            return Err(INSUFFICIENT_BALANCE.to_string());
        }

        // Only shares whose backing capital is free can be redeemed
        let redeemed = withdrawal_shares.min(self.withdrawal_shares_ready());
        let base_out = if redeemed.is_zero() {
            Uint128::zero()
        } else {
            self.withdrawal_reserve
                .multiply_ratio(redeemed, self.withdrawal_shares_outstanding)
        };
        if !redeemed.is_zero() && Self::ratio(base_out, redeemed) < min_output_per_share {
            return Err(OUTPUT_LIMIT.to_string());
        }

        if !redeemed.is_zero() {
            self.burn(ex, &trader, AssetId::withdrawal_share(), redeemed)?;
        }
        self.withdrawal_shares_outstanding -= redeemed;
        self.withdrawal_reserve -= base_out;
        self.pay(ex, base_out)?;

        let mut breakdown = self.breakdown(ex, AssetId::withdrawal_share(), base_out);
        breakdown.withdrawal_share_amount = redeemed;
        Ok(self.emit(ex, ActionType::RedeemWithdrawShare, breakdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperdrive_agents_types::fixed::units;

    fn deploy(token: &mut SimToken) -> SimMarket {
        let params = SimPoolParams::default();
        let config = PoolConfig {
            hyperdrive_address: "0xpool".into(),
            base_token: token.address.clone(),
            checkpoint_duration: params.checkpoint_duration,
            position_duration: params.position_duration,
            minimum_transaction_amount: params.minimum_transaction_amount,
            initial_vault_share_price: Decimal::ONE,
        };
        let mut ex = Exec {
            now: 36_000,
            trader: "0xdeployer",
            token,
            events: vec![],
        };
        SimMarket::deploy(config, &params, "0xdeployer", &mut ex)
    }

    fn exec<'a>(token: &'a mut SimToken, trader: &'a str, now: u64) -> Exec<'a> {
        Exec {
            now,
            trader,
            token,
            events: vec![],
        }
    }

    #[test]
    fn test_deploy_sets_fixed_rate() {
        let mut token = SimToken::new("0xbase");
        let market = deploy(&mut token);
        let info = market.info(1, 36_000);
        assert!((info.fixed_rate - Decimal::new(5, 2)).abs() < Decimal::new(1, 6));
        assert_eq!(market.balance_of("0xdeployer", &AssetId::lp()), info.lp_total_supply);
        assert!(market.checkpoint(36_000).exists());
    }

    #[test]
    fn test_open_and_close_long() {
        let mut token = SimToken::new("0xbase");
        let mut market = deploy(&mut token);
        token.mint("0xalice", units(1000));
        token.approve("0xalice", "0xpool", Uint128::MAX);

        let call = ContractCall::OpenLong {
            base_amount: units(100),
            min_output: Uint128::zero(),
            min_vault_share_price: Decimal::ZERO,
        };
        let mut ex = exec(&mut token, "0xalice", 36_010);
        let (_, opened) = market.apply(&call, &mut ex).unwrap().unwrap();
        assert!(opened.bond_amount > units(100));
        assert_eq!(opened.maturity_time, 36_000 + 7 * 24 * 3600);

        let close = ContractCall::CloseLong {
            maturity_time: opened.maturity_time,
            bond_amount: opened.bond_amount,
            min_output: Uint128::zero(),
        };
        let mut ex = exec(&mut token, "0xalice", 36_020);
        let (_, closed) = market.apply(&close, &mut ex).unwrap().unwrap();
        assert!(closed.base_amount <= units(100));
        assert!(closed.base_amount > units(99));
        assert_eq!(market.balance_of("0xalice", &AssetId::long(opened.maturity_time)), Uint128::zero());
    }

    #[test]
    fn test_reverts() {
        let mut token = SimToken::new("0xbase");
        let mut market = deploy(&mut token);
        token.mint("0xalice", units(10));

        let open = |base| ContractCall::OpenLong {
            base_amount: base,
            min_output: Uint128::zero(),
            min_vault_share_price: Decimal::ZERO,
        };

        let mut ex = exec(&mut token, "0xalice", 36_010);
        assert_eq!(market.apply(&open(Uint128::new(5)), &mut ex).unwrap_err(), MIN_TXN_AMOUNT);

        let mut ex = exec(&mut token, "0xalice", 36_010);
        assert_eq!(market.apply(&open(units(1)), &mut ex).unwrap_err(), "ERC20: insufficient allowance");

        token.approve("0xalice", "0xpool", Uint128::MAX);
        let mut ex = exec(&mut token, "0xalice", 36_010);
        let limited = ContractCall::OpenLong {
            base_amount: units(1),
            min_output: units(2),
            min_vault_share_price: Decimal::ZERO,
        };
        assert_eq!(market.apply(&limited, &mut ex).unwrap_err(), OUTPUT_LIMIT);

        let mut ex = exec(&mut token, "0xalice", 36_010);
        let bad_apr = ContractCall::AddLiquidity {
            contribution: units(1),
            min_lp_share_price: Decimal::ZERO,
            min_apr: Decimal::ONE,
            max_apr: Decimal::TWO,
        };
        assert_eq!(market.apply(&bad_apr, &mut ex).unwrap_err(), INVALID_APR);
    }

    #[test]
    fn test_checkpoint_validation() {
        let mut token = SimToken::new("0xbase");
        let mut market = deploy(&mut token);

        let mut ex = exec(&mut token, "0xkeeper", 40_000);
        assert_eq!(market.create_checkpoint(39_000, &mut ex).unwrap_err(), INVALID_CHECKPOINT_TIME);
        assert_eq!(market.create_checkpoint(43_200, &mut ex).unwrap_err(), INVALID_CHECKPOINT_TIME);
        assert!(market.create_checkpoint(39_600, &mut ex).unwrap().is_some());
        assert!(market.create_checkpoint(39_600, &mut ex).unwrap().is_none());
    }

    #[test]
    fn test_withdrawal_shares_lock_until_positions_close() {
        let mut token = SimToken::new("0xbase");
        let mut market = deploy(&mut token);
        token.mint("0xlp", units(10_000));
        token.approve("0xlp", "0xpool", Uint128::MAX);

        let mut ex = exec(&mut token, "0xlp", 36_010);
        let add = ContractCall::AddLiquidity {
            contribution: units(1_000),
            min_lp_share_price: Decimal::ZERO,
            min_apr: Decimal::ZERO,
            max_apr: Decimal::ONE,
        };
        let (_, added) = market.apply(&add, &mut ex).unwrap().unwrap();

        let mut ex = exec(&mut token, "0xlp", 36_020);
        let long = ContractCall::OpenLong {
            base_amount: units(1_000),
            min_output: Uint128::zero(),
            min_vault_share_price: Decimal::ZERO,
        };
        let (_, long) = market.apply(&long, &mut ex).unwrap().unwrap();

        let mut ex = exec(&mut token, "0xlp", 36_030);
        let remove = ContractCall::RemoveLiquidity {
            lp_shares: added.lp_amount,
            min_output_per_share: Decimal::ZERO,
        };
        let (_, removed) = market.apply(&remove, &mut ex).unwrap().unwrap();
        assert!(!removed.withdrawal_share_amount.is_zero());

        let redeem = ContractCall::RedeemWithdrawalShares {
            withdrawal_shares: removed.withdrawal_share_amount,
            min_output_per_share: Decimal::ZERO,
        };
        let mut ex = exec(&mut token, "0xlp", 36_040);
        let (_, nothing) = market.apply(&redeem, &mut ex).unwrap().unwrap();
        assert!(nothing.withdrawal_share_amount.is_zero());

        let mut ex = exec(&mut token, "0xlp", 36_050);
        let close = ContractCall::CloseLong {
            maturity_time: long.maturity_time,
            bond_amount: long.bond_amount,
            min_output: Uint128::zero(),
        };
        market.apply(&close, &mut ex).unwrap();

        let mut ex = exec(&mut token, "0xlp", 36_060);
        let (_, redeemed) = market.apply(&redeem, &mut ex).unwrap().unwrap();
        assert_eq!(redeemed.withdrawal_share_amount, removed.withdrawal_share_amount);
        assert!(!redeemed.base_amount.is_zero());
        assert_eq!(market.balance_of("0xlp", &AssetId::withdrawal_share()), Uint128::zero());
    }
}
