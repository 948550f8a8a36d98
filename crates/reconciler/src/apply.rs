use cosmwasm_std::Uint128;
use hyperdrive_agents_types::{
    fixed::to_decimal, group_by_transaction, ActionType, AssetIdPrefix, BondPosition, EventLog, PoolEvent,
    PositionKind, ReceiptBreakdown, Wallet, ZERO_ADDRESS,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::error::{ReconcileError, Result};

// ═══════════════════════════════════════════════════════════════════════════
// BALANCE ARITHMETIC
// ═══════════════════════════════════════════════════════════════════════════

fn sub(kind: PositionKind, maturity_time: Option<u64>, balance: Uint128, delta: Uint128) -> Result<Uint128> {
    balance.checked_sub(delta).map_err(|_| ReconcileError::Underflow {
        kind,
        maturity_time,
        balance,
        delta,
    })
}

/// Weighted average of the existing open share price and the price of the
/// added bonds
fn weighted_price(position: &BondPosition, added: Uint128, price: Decimal) -> Decimal {
    let old = to_decimal(position.balance);
    let new = to_decimal(added);
    let total = old + new;
    if total.is_zero() {
        return price;
    }
    old.checked_mul(position.open_share_price)
        .zip(new.checked_mul(price))
        .and_then(|(a, b)| a.checked_add(b))
        .and_then(|sum| sum.checked_div(total))
        .unwrap_or(price)
}

fn increase(book: &mut BTreeMap<u64, BondPosition>, maturity: u64, amount: Uint128, price: Decimal) {
    let position = book.entry(maturity).or_insert_with(|| BondPosition {
        balance: Uint128::zero(),
        maturity_time: maturity,
        open_share_price: price,
    });
    position.open_share_price = weighted_price(position, amount, price);
    position.balance += amount;
}

/// New balance of a bond position after removing `amount`; `None` means the
/// entry goes away
fn decreased(
    book: &BTreeMap<u64, BondPosition>,
    kind: PositionKind,
    maturity: u64,
    amount: Uint128,
) -> Result<Option<Uint128>> {
    let balance = book.get(&maturity).map(|p| p.balance).unwrap_or_default();
    let left = sub(kind, Some(maturity), balance, amount)?;
    Ok(if left.is_zero() { None } else { Some(left) })
}

fn apply_decrease(book: &mut BTreeMap<u64, BondPosition>, maturity: u64, left: Option<Uint128>) {
    match left {
        Some(balance) => {
            if let Some(position) = book.get_mut(&maturity) {
                position.balance = balance;
            }
        }
        None => {
            book.remove(&maturity);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// INCREMENTAL PATH
// ═══════════════════════════════════════════════════════════════════════════

/// Apply one settled trade to `wallet`. Either the whole trade applies or,
/// on underflow, nothing does.
pub fn apply_receipt(wallet: &mut Wallet, action: ActionType, breakdown: &ReceiptBreakdown) -> Result<()> {
    let maturity = breakdown.maturity_time;
    let price = breakdown.vault_share_price;
    let base = breakdown.base_amount;

    match action {
        ActionType::OpenLong => {
            let base_left = sub(PositionKind::Base, None, wallet.base, base)?;
            increase(&mut wallet.longs, maturity, breakdown.bond_amount, price);
            wallet.base = base_left;
        }
        ActionType::CloseLong => {
            let left = decreased(&wallet.longs, PositionKind::Long, maturity, breakdown.bond_amount)?;
            apply_decrease(&mut wallet.longs, maturity, left);
            wallet.base += base;
        }
        ActionType::OpenShort => {
            let base_left = sub(PositionKind::Base, None, wallet.base, base)?;
            increase(&mut wallet.shorts, maturity, breakdown.bond_amount, price);
            wallet.base = base_left;
        }
        ActionType::CloseShort => {
            let left = decreased(&wallet.shorts, PositionKind::Short, maturity, breakdown.bond_amount)?;
            apply_decrease(&mut wallet.shorts, maturity, left);
            wallet.base += base;
        }
        ActionType::AddLiquidity => {
            let base_left = sub(PositionKind::Base, None, wallet.base, base)?;
            wallet.lp_tokens += breakdown.lp_amount;
            wallet.base = base_left;
        }
        ActionType::RemoveLiquidity => {
            wallet.lp_tokens = sub(PositionKind::Lp, None, wallet.lp_tokens, breakdown.lp_amount)?;
            wallet.base += base;
            wallet.withdrawal_shares += breakdown.withdrawal_share_amount;
        }
        ActionType::RedeemWithdrawShare => {
            wallet.withdrawal_shares = sub(
                PositionKind::WithdrawalShare,
                None,
                wallet.withdrawal_shares,
                breakdown.withdrawal_share_amount,
            )?;
            wallet.base += base;
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// REPLAY PATH
// ═══════════════════════════════════════════════════════════════════════════

/// Apply a raw transfer of `value` in (`incoming`) or out of the wallet.
/// Bonds received this way keep the position's open share price.
fn apply_transfer(wallet: &mut Wallet, event: &PoolEvent, incoming: bool) -> Result<()> {
    match event {
        PoolEvent::Transfer { value, .. } => {
            wallet.base = if incoming {
                wallet.base + *value
            } else {
                sub(PositionKind::Base, None, wallet.base, *value)?
            };
        }
        PoolEvent::TransferSingle { asset_id, value, .. } => {
            let (prefix, maturity) = asset_id.decode();
            match prefix {
                AssetIdPrefix::Lp | AssetIdPrefix::WithdrawalShare => {
                    let (kind, slot) = if prefix == AssetIdPrefix::Lp {
                        (PositionKind::Lp, &mut wallet.lp_tokens)
                    } else {
                        (PositionKind::WithdrawalShare, &mut wallet.withdrawal_shares)
                    };
                    *slot = if incoming { *slot + *value } else { sub(kind, None, *slot, *value)? };
                }
                AssetIdPrefix::Long | AssetIdPrefix::Short => {
                    let (kind, book) = if prefix == AssetIdPrefix::Long {
                        (PositionKind::Long, &mut wallet.longs)
                    } else {
                        (PositionKind::Short, &mut wallet.shorts)
                    };
                    if incoming {
                        let price = book.get(&maturity).map(|p| p.open_share_price).unwrap_or_default();
                        increase(book, maturity, *value, price);
                    } else {
                        let left = decreased(book, kind, maturity, *value)?;
                        apply_decrease(book, maturity, left);
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Rebuild the wallet of `address` from its full event history.
///
/// Transactions carrying trade events for the address apply those trades;
/// other transactions apply the raw multi-token and base token transfers
/// touching the address.
pub fn replay(address: &str, events: &[EventLog]) -> Result<Wallet> {
    let mut wallet = Wallet::new(address);
    for tx in group_by_transaction(events) {
        let trades = tx.trades_for(address);
        if !trades.is_empty() {
            for (action, breakdown) in trades {
                apply_receipt(&mut wallet, action, breakdown)?;
            }
            continue;
        }

        for log in &tx.events {
            let (from, to) = match &log.event {
                PoolEvent::Transfer { from, to, .. } | PoolEvent::TransferSingle { from, to, .. } => (from, to),
                _ => continue,
            };
            // Self transfers cancel out
            if from.eq_ignore_ascii_case(to) {
                continue;
            }
            if to.eq_ignore_ascii_case(address) && to != ZERO_ADDRESS {
                apply_transfer(&mut wallet, &log.event, true)?;
            } else if from.eq_ignore_ascii_case(address) && from != ZERO_ADDRESS {
                apply_transfer(&mut wallet, &log.event, false)?;
            }
        }
    }
    Ok(wallet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperdrive_agents_types::{fixed::units, AssetId};

    fn make_test_breakdown(maturity: u64, base: u64, bonds: u64, price: Decimal) -> ReceiptBreakdown {
        ReceiptBreakdown {
            trader: "0xabc".into(),
            asset_id: Some(AssetId::long(maturity)),
            maturity_time: maturity,
            base_amount: units(base),
            bond_amount: units(bonds),
            vault_share_price: price,
            ..Default::default()
        }
    }

    fn log(block: u64, tx: &str, index: u64, event: PoolEvent) -> EventLog {
        EventLog {
            block_number: block,
            transaction_hash: tx.into(),
            log_index: index,
            event,
        }
    }

    #[test]
    fn test_open_then_close_long() {
        let mut wallet = Wallet::new("0xabc").with_base(units(1_000));

        apply_receipt(&mut wallet, ActionType::OpenLong, &make_test_breakdown(100, 100, 105, Decimal::ONE)).unwrap();
        assert_eq!(wallet.base, units(900));
        assert_eq!(wallet.longs[&100].balance, units(105));

        apply_receipt(&mut wallet, ActionType::CloseLong, &make_test_breakdown(100, 101, 105, Decimal::ONE)).unwrap();
        assert_eq!(wallet.base, units(1_001));
        assert!(wallet.longs.is_empty());
    }

    #[test]
    fn test_open_share_price_is_weighted_on_increase_only() {
        let mut wallet = Wallet::new("0xabc").with_base(units(1_000));
        apply_receipt(&mut wallet, ActionType::OpenLong, &make_test_breakdown(100, 10, 10, Decimal::ONE)).unwrap();
        apply_receipt(&mut wallet, ActionType::OpenLong, &make_test_breakdown(100, 10, 10, Decimal::new(2, 0))).unwrap();
        assert_eq!(wallet.longs[&100].open_share_price, Decimal::new(15, 1));

        apply_receipt(&mut wallet, ActionType::CloseLong, &make_test_breakdown(100, 5, 5, Decimal::new(3, 0))).unwrap();
        assert_eq!(wallet.longs[&100].open_share_price, Decimal::new(15, 1));
        assert_eq!(wallet.longs[&100].balance, units(15));
    }

    #[test]
    fn test_underflow_leaves_wallet_untouched() {
        let mut wallet = Wallet::new("0xabc").with_base(units(10));
        let before = wallet.clone();

        let err = apply_receipt(&mut wallet, ActionType::OpenLong, &make_test_breakdown(100, 11, 12, Decimal::ONE))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Underflow { kind: PositionKind::Base, .. }));
        assert_eq!(wallet, before);

        let err = apply_receipt(&mut wallet, ActionType::CloseShort, &make_test_breakdown(100, 1, 1, Decimal::ONE))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Underflow { kind: PositionKind::Short, .. }));
        assert_eq!(wallet, before);
    }

    #[test]
    fn test_remove_liquidity_mints_withdrawal_shares() {
        let mut wallet = Wallet::new("0xabc");
        wallet.lp_tokens = units(50);
        let breakdown = ReceiptBreakdown {
            trader: "0xabc".into(),
            base_amount: units(30),
            lp_amount: units(50),
            withdrawal_share_amount: units(20),
            ..Default::default()
        };

        apply_receipt(&mut wallet, ActionType::RemoveLiquidity, &breakdown).unwrap();
        assert_eq!(wallet.lp_tokens, Uint128::zero());
        assert_eq!(wallet.withdrawal_shares, units(20));
        assert_eq!(wallet.base, units(30));
    }

    #[test]
    fn test_replay_prefers_trade_events_over_transfers() {
        let events = vec![
            log(
                1,
                "0x01",
                0,
                PoolEvent::Transfer {
                    token: "0xbase".into(),
                    from: ZERO_ADDRESS.into(),
                    to: "0xabc".into(),
                    value: units(100),
                },
            ),
            log(
                2,
                "0x02",
                1,
                PoolEvent::Trade {
                    action: ActionType::OpenLong,
                    breakdown: make_test_breakdown(100, 10, 11, Decimal::ONE),
                },
            ),
            log(
                2,
                "0x02",
                0,
                PoolEvent::Transfer {
                    token: "0xbase".into(),
                    from: "0xabc".into(),
                    to: "0xpool".into(),
                    value: units(10),
                },
            ),
            log(
                3,
                "0x03",
                0,
                PoolEvent::TransferSingle {
                    operator: "0xabc".into(),
                    from: "0xabc".into(),
                    to: "0xdef".into(),
                    asset_id: AssetId::long(100),
                    value: units(1),
                },
            ),
        ];

        let wallet = replay("0xABC", &events).unwrap();
        assert_eq!(wallet.base, units(90));
        assert_eq!(wallet.longs[&100].balance, units(10));

        let receiver = replay("0xdef", &events).unwrap();
        assert_eq!(receiver.longs[&100].balance, units(1));
    }
}
