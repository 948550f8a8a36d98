use cosmwasm_std::Uint128;
use hyperdrive_agents_types::{TradeIntent, Wallet};
use rand::{seq::SliceRandom, RngCore};
use tracing::debug;

/// Intents that close every position in `wallet`.
///
/// Longs, shorts and LP above `minimum_transaction_amount` are closed, in
/// that order unless `rng` is given, in which case they are shuffled.
/// Withdrawal shares are always redeemed last so closes settle first.
pub fn liquidation_intents<R: RngCore + ?Sized>(
    wallet: &Wallet,
    minimum_transaction_amount: Uint128,
    rng: Option<&mut R>,
) -> Vec<TradeIntent> {
    let mut intents = Vec::new();
    for (maturity_time, long) in &wallet.longs {
        debug!(maturity_time, balance = %long.balance, "closing long");
        if long.balance > minimum_transaction_amount {
            intents.push(TradeIntent::close_long(long.balance, *maturity_time));
        }
    }
    for (maturity_time, short) in &wallet.shorts {
        debug!(maturity_time, balance = %short.balance, "closing short");
        if short.balance > minimum_transaction_amount {
            intents.push(TradeIntent::close_short(short.balance, *maturity_time));
        }
    }
    if wallet.lp_tokens > minimum_transaction_amount {
        debug!(lp_tokens = %wallet.lp_tokens, "removing liquidity");
        intents.push(TradeIntent::remove_liquidity(wallet.lp_tokens));
    }

    if let Some(rng) = rng {
        intents.shuffle(rng);
    }

    if !wallet.withdrawal_shares.is_zero() {
        debug!(withdrawal_shares = %wallet.withdrawal_shares, "redeeming withdrawal shares");
        intents.push(TradeIntent::redeem_withdrawal_shares(wallet.withdrawal_shares));
    }
    intents
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperdrive_agents_types::{fixed::units, ActionType, BondPosition};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rust_decimal::Decimal;

    fn make_test_wallet() -> Wallet {
        let mut wallet = Wallet::new("0xabc").with_base(units(1));
        for maturity in [3_600u64, 7_200] {
            wallet.longs.insert(
                maturity,
                BondPosition {
                    balance: units(5),
                    maturity_time: maturity,
                    open_share_price: Decimal::ONE,
                },
            );
        }
        wallet.shorts.insert(
            7_200,
            BondPosition {
                balance: units(2),
                maturity_time: 7_200,
                open_share_price: Decimal::ONE,
            },
        );
        // Dust below the minimum is left alone
        wallet.shorts.insert(
            10_800,
            BondPosition {
                balance: Uint128::new(10),
                maturity_time: 10_800,
                open_share_price: Decimal::ONE,
            },
        );
        wallet.lp_tokens = units(50);
        wallet.withdrawal_shares = units(3);
        wallet
    }

    fn actions(intents: &[TradeIntent]) -> Vec<ActionType> {
        intents.iter().map(|i| i.action.action_type()).collect()
    }

    #[test]
    fn test_liquidation_order() {
        let intents = liquidation_intents::<ChaCha8Rng>(&make_test_wallet(), Uint128::new(1_000), None);

        assert_eq!(
            actions(&intents),
            vec![
                ActionType::CloseLong,
                ActionType::CloseLong,
                ActionType::CloseShort,
                ActionType::RemoveLiquidity,
                ActionType::RedeemWithdrawShare,
            ]
        );
        assert_eq!(intents[2], TradeIntent::close_short(units(2), 7_200));
        assert_eq!(intents[4], TradeIntent::redeem_withdrawal_shares(units(3)));
    }

    #[test]
    fn test_randomized_liquidation_keeps_redeem_last() {
        let wallet = make_test_wallet();
        for seed in 0..16 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let intents = liquidation_intents(&wallet, Uint128::new(1_000), Some(&mut rng));

            assert_eq!(intents.len(), 5);
            assert_eq!(intents[4].action.action_type(), ActionType::RedeemWithdrawShare);
            let mut sorted = actions(&intents[..4]);
            sorted.sort();
            assert_eq!(
                sorted,
                vec![
                    ActionType::CloseLong,
                    ActionType::CloseLong,
                    ActionType::CloseShort,
                    ActionType::RemoveLiquidity,
                ]
            );
        }
    }

    #[test]
    fn test_empty_wallet_has_nothing_to_liquidate() {
        let intents = liquidation_intents::<ChaCha8Rng>(&Wallet::new("0xabc"), Uint128::zero(), None);
        assert!(intents.is_empty());
    }
}
