use cosmwasm_std::Uint128;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ActionType, AssetId, Checkpoint, PositionKind, ReceiptBreakdown};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// A decoded pool or base token event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    /// One of the seven trade events
    Trade {
        action: ActionType,
        breakdown: ReceiptBreakdown,
    },

    /// Multi-token transfer, mint (from zero) or burn (to zero)
    TransferSingle {
        operator: String,
        from: String,
        to: String,
        asset_id: AssetId,
        value: Uint128,
    },

    /// Base token transfer
    Transfer {
        token: String,
        from: String,
        to: String,
        value: Uint128,
    },

    Approval {
        token: String,
        owner: String,
        spender: String,
        value: Uint128,
    },

    CreateCheckpoint {
        checkpoint: Checkpoint,
        lp_share_price: Decimal,
    },
}

impl PoolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::Trade { action, .. } => action.event_name(),
            PoolEvent::TransferSingle { .. } => "TransferSingle",
            PoolEvent::Transfer { .. } => "Transfer",
            PoolEvent::Approval { .. } => "Approval",
            PoolEvent::CreateCheckpoint { .. } => "CreateCheckpoint",
        }
    }
}

/// A decoded event with its position in the chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub block_number: u64,
    pub transaction_hash: String,
    pub log_index: u64,
    pub event: PoolEvent,
}

/// Events of one transaction in log order
#[derive(Debug)]
pub struct TransactionEvents<'a> {
    pub transaction_hash: &'a str,
    pub block_number: u64,
    pub events: Vec<&'a EventLog>,
}

impl TransactionEvents<'_> {
    /// Trade events whose trader is `address`
    pub fn trades_for(&self, address: &str) -> Vec<(ActionType, &ReceiptBreakdown)> {
        self.events
            .iter()
            .filter_map(|log| match &log.event {
                PoolEvent::Trade { action, breakdown } if breakdown.trader.eq_ignore_ascii_case(address) => {
                    Some((*action, breakdown))
                }
                _ => None,
            })
            .collect()
    }
}

/// Sort by (block, log index) and group consecutive logs of one transaction
pub fn group_by_transaction(logs: &[EventLog]) -> Vec<TransactionEvents<'_>> {
    let mut sorted: Vec<&EventLog> = logs.iter().collect();
    sorted.sort_by_key(|log| (log.block_number, log.log_index));

    let mut groups: Vec<TransactionEvents<'_>> = Vec::new();
    for log in sorted {
        match groups.last_mut() {
            Some(group) if group.transaction_hash == log.transaction_hash => group.events.push(log),
            _ => groups.push(TransactionEvents {
                transaction_hash: &log.transaction_hash,
                block_number: log.block_number,
                events: vec![log],
            }),
        }
    }
    groups
}

/// Signed balance change of one wallet caused by one event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDelta {
    pub transaction_hash: String,
    pub block_number: u64,
    pub log_index: u64,
    pub wallet_address: String,
    pub event_type: String,
    pub kind: PositionKind,
    pub maturity_time: Option<u64>,
    pub token_id: Option<AssetId>,
    /// Change of the `kind` token, zero for base rows
    pub token_delta: i128,
    pub base_delta: i128,
    pub vault_share_price: Option<Decimal>,
}

fn signed(value: Uint128) -> i128 {
    i128::try_from(value.u128()).unwrap_or(i128::MAX)
}

fn trade_deltas(log: &EventLog, action: ActionType, b: &ReceiptBreakdown) -> Vec<WalletDelta> {
    let base = signed(b.base_amount);
    let maturity = Some(b.maturity_time);
    let (kind, maturity_time, token_id, token_delta, base_delta) = match action {
        ActionType::OpenLong => (PositionKind::Long, maturity, Some(AssetId::long(b.maturity_time)), signed(b.bond_amount), -base),
        ActionType::CloseLong => (PositionKind::Long, maturity, Some(AssetId::long(b.maturity_time)), -signed(b.bond_amount), base),
        ActionType::OpenShort => (PositionKind::Short, maturity, Some(AssetId::short(b.maturity_time)), signed(b.bond_amount), -base),
        ActionType::CloseShort => (PositionKind::Short, maturity, Some(AssetId::short(b.maturity_time)), -signed(b.bond_amount), base),
        ActionType::AddLiquidity => (PositionKind::Lp, None, Some(AssetId::lp()), signed(b.lp_amount), -base),
        ActionType::RemoveLiquidity => (PositionKind::Lp, None, Some(AssetId::lp()), -signed(b.lp_amount), base),
        ActionType::RedeemWithdrawShare => (
            PositionKind::WithdrawalShare,
            None,
            Some(AssetId::withdrawal_share()),
            -signed(b.withdrawal_share_amount),
            base,
        ),
    };

    let row = |kind, maturity_time, token_id, token_delta, base_delta| WalletDelta {
        transaction_hash: log.transaction_hash.clone(),
        block_number: log.block_number,
        log_index: log.log_index,
        wallet_address: b.trader.clone(),
        event_type: action.event_name().to_string(),
        kind,
        maturity_time,
        token_id,
        token_delta,
        base_delta,
        vault_share_price: Some(b.vault_share_price),
    };

    let mut rows = vec![row(kind, maturity_time, token_id, token_delta, base_delta)];
    // Removing liquidity can also mint withdrawal shares
    if action == ActionType::RemoveLiquidity && !b.withdrawal_share_amount.is_zero() {
        rows.push(row(
            PositionKind::WithdrawalShare,
            None,
            Some(AssetId::withdrawal_share()),
            signed(b.withdrawal_share_amount),
            0,
        ));
    }
    rows
}

fn transfer_deltas(log: &EventLog, skip: &[&str]) -> Vec<WalletDelta> {
    let (from, to, value, kind, token_id) = match &log.event {
        PoolEvent::TransferSingle { from, to, asset_id, value, .. } => {
            (from, to, *value, PositionKind::from_prefix(asset_id.prefix()), Some(*asset_id))
        }
        PoolEvent::Transfer { from, to, value, .. } => (from, to, *value, PositionKind::Base, None),
        _ => return vec![],
    };

    let mut rows = Vec::new();
    for (wallet, sign) in [(from, -1i128), (to, 1i128)] {
        if wallet == ZERO_ADDRESS || skip.iter().any(|s| s.eq_ignore_ascii_case(wallet)) {
            continue;
        }
        let amount = sign * signed(value);
        let (token_delta, base_delta) = if kind == PositionKind::Base { (0, amount) } else { (amount, 0) };
        rows.push(WalletDelta {
            transaction_hash: log.transaction_hash.clone(),
            block_number: log.block_number,
            log_index: log.log_index,
            wallet_address: wallet.clone(),
            event_type: log.event.name().to_string(),
            kind,
            maturity_time: token_id.filter(|id| matches!(kind, PositionKind::Long | PositionKind::Short)).map(|id| id.maturity_time()),
            token_id,
            token_delta,
            base_delta,
            vault_share_price: None,
        });
    }
    rows
}

/// Per-wallet balance changes of a batch of logs. Inside a transaction that
/// carries a trade event for a wallet, the trade event is authoritative for
/// that wallet and its raw transfers are skipped.
pub fn wallet_deltas(logs: &[EventLog]) -> Vec<WalletDelta> {
    let mut rows = Vec::new();
    for tx in group_by_transaction(logs) {
        let traders: Vec<&str> = tx
            .events
            .iter()
            .filter_map(|log| match &log.event {
                PoolEvent::Trade { breakdown, .. } => Some(breakdown.trader.as_str()),
                _ => None,
            })
            .collect();

        for log in &tx.events {
            match &log.event {
                PoolEvent::Trade { action, breakdown } => rows.extend(trade_deltas(log, *action, breakdown)),
                PoolEvent::TransferSingle { .. } | PoolEvent::Transfer { .. } => {
                    rows.extend(transfer_deltas(log, &traders))
                }
                _ => {}
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::units;

    fn log(block: u64, tx: &str, index: u64, event: PoolEvent) -> EventLog {
        EventLog {
            block_number: block,
            transaction_hash: tx.to_string(),
            log_index: index,
            event,
        }
    }

    fn open_long_tx(trader: &str) -> Vec<EventLog> {
        vec![
            log(
                2,
                "0xaa",
                0,
                PoolEvent::Transfer {
                    token: "0xbase".into(),
                    from: trader.into(),
                    to: "0xpool".into(),
                    value: units(10),
                },
            ),
            log(
                2,
                "0xaa",
                1,
                PoolEvent::TransferSingle {
                    operator: "0xpool".into(),
                    from: ZERO_ADDRESS.into(),
                    to: trader.into(),
                    asset_id: AssetId::long(3600),
                    value: units(11),
                },
            ),
            log(
                2,
                "0xaa",
                2,
                PoolEvent::Trade {
                    action: ActionType::OpenLong,
                    breakdown: ReceiptBreakdown {
                        trader: trader.into(),
                        asset_id: Some(AssetId::long(3600)),
                        maturity_time: 3600,
                        base_amount: units(10),
                        bond_amount: units(11),
                        vault_share_price: Decimal::ONE,
                        ..Default::default()
                    },
                },
            ),
        ]
    }

    #[test]
    fn test_grouping_orders_by_block_and_index() {
        let mut logs = open_long_tx("0xtrader");
        logs.reverse();
        logs.push(log(
            1,
            "0x01",
            0,
            PoolEvent::Transfer {
                token: "0xbase".into(),
                from: ZERO_ADDRESS.into(),
                to: "0xtrader".into(),
                value: units(100),
            },
        ));

        let groups = group_by_transaction(&logs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].transaction_hash, "0x01");
        assert_eq!(groups[1].events.len(), 3);
        assert_eq!(groups[1].events[0].log_index, 0);
    }

    #[test]
    fn test_trade_event_supersedes_transfers_for_trader() {
        let rows = wallet_deltas(&open_long_tx("0xtrader"));
        let trader_rows: Vec<_> = rows.iter().filter(|r| r.wallet_address == "0xtrader").collect();
        assert_eq!(trader_rows.len(), 1);
        assert_eq!(trader_rows[0].kind, PositionKind::Long);
        assert_eq!(trader_rows[0].token_delta, units(11).u128() as i128);
        assert_eq!(trader_rows[0].base_delta, -(units(10).u128() as i128));

        // The pool side of the base transfer is still recorded
        assert!(rows.iter().any(|r| r.wallet_address == "0xpool" && r.base_delta > 0));
    }
}
