use cosmwasm_std::Uint128;
use hyperdrive_agents_chain::ContractCall;
use hyperdrive_agents_types::{fixed::mul_decimal, MarketAction, ReceiptBreakdown, TradeIntent};
use rust_decimal::Decimal;

/// Pool call for `action` with no output floor and no deposit cap
pub fn unprotected_call(action: &MarketAction) -> ContractCall {
    match action {
        MarketAction::OpenLong { base } => ContractCall::OpenLong {
            base_amount: *base,
            min_output: Uint128::zero(),
            min_vault_share_price: Decimal::ZERO,
        },
        MarketAction::CloseLong { bonds, maturity_time } => ContractCall::CloseLong {
            maturity_time: maturity_time.unwrap_or_default(),
            bond_amount: *bonds,
            min_output: Uint128::zero(),
        },
        MarketAction::OpenShort { bonds } => ContractCall::OpenShort {
            bond_amount: *bonds,
            max_deposit: Uint128::MAX,
            min_vault_share_price: Decimal::ZERO,
        },
        MarketAction::CloseShort { bonds, maturity_time } => ContractCall::CloseShort {
            maturity_time: maturity_time.unwrap_or_default(),
            bond_amount: *bonds,
            min_output: Uint128::zero(),
        },
        MarketAction::AddLiquidity { base, min_apr, max_apr } => ContractCall::AddLiquidity {
            contribution: *base,
            min_lp_share_price: Decimal::ZERO,
            min_apr: min_apr.unwrap_or(Decimal::ZERO),
            max_apr: max_apr.unwrap_or(Decimal::MAX),
        },
        MarketAction::RemoveLiquidity { lp_shares } => ContractCall::RemoveLiquidity {
            lp_shares: *lp_shares,
            min_output_per_share: Decimal::ZERO,
        },
        MarketAction::RedeemWithdrawShare { withdrawal_shares } => ContractCall::RedeemWithdrawalShares {
            withdrawal_shares: *withdrawal_shares,
            min_output_per_share: Decimal::ZERO,
        },
    }
}

/// Whether the intent's bounds depend on a preview
pub fn needs_preview(intent: &TradeIntent) -> bool {
    intent.slippage_tolerance.is_some()
        && matches!(
            intent.action,
            MarketAction::OpenLong { .. }
                | MarketAction::CloseLong { .. }
                | MarketAction::OpenShort { .. }
                | MarketAction::CloseShort { .. }
        )
}

/// Pool call for `intent` with slippage bounds derived from `preview`.
/// Without a tolerance or a preview the call is unprotected.
pub fn protected_call(intent: &TradeIntent, preview: Option<&ReceiptBreakdown>) -> ContractCall {
    let mut call = unprotected_call(&intent.action);
    let (Some(tolerance), Some(preview)) = (intent.slippage_tolerance, preview) else {
        return call;
    };
    let floor = Decimal::ONE - tolerance;
    let cap = Decimal::ONE + tolerance;

    match &mut call {
        ContractCall::OpenLong { min_output, .. } => *min_output = mul_decimal(preview.bond_amount, floor),
        ContractCall::CloseLong { min_output, .. } | ContractCall::CloseShort { min_output, .. } => {
            *min_output = mul_decimal(preview.base_amount, floor)
        }
        ContractCall::OpenShort { max_deposit, .. } => *max_deposit = mul_decimal(preview.base_amount, cap),
        _ => {}
    }
    call
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperdrive_agents_types::fixed::units;
    use std::str::FromStr;

    fn make_test_preview(base: u64, bonds: u64) -> ReceiptBreakdown {
        ReceiptBreakdown {
            base_amount: units(base),
            bond_amount: units(bonds),
            ..Default::default()
        }
    }

    #[test]
    fn test_bounds_without_tolerance_are_open() {
        let intent = TradeIntent::open_short(units(10));
        let call = protected_call(&intent, Some(&make_test_preview(1, 10)));

        assert!(!needs_preview(&intent));
        assert_eq!(
            call,
            ContractCall::OpenShort {
                bond_amount: units(10),
                max_deposit: Uint128::MAX,
                min_vault_share_price: Decimal::ZERO,
            }
        );
    }

    #[test]
    fn test_bounds_from_preview() {
        let tolerance = Decimal::from_str("0.01").unwrap();
        let preview = make_test_preview(100, 200);

        let open_long = TradeIntent::open_long(units(100)).with_slippage_tolerance(tolerance);
        assert!(needs_preview(&open_long));
        match protected_call(&open_long, Some(&preview)) {
            ContractCall::OpenLong { min_output, .. } => assert_eq!(min_output, units(198)),
            other => panic!("unexpected call {other:?}"),
        }

        let close = TradeIntent::close_long(units(200), 86_400).with_slippage_tolerance(tolerance);
        match protected_call(&close, Some(&preview)) {
            ContractCall::CloseLong { min_output, maturity_time, .. } => {
                assert_eq!(min_output, units(99));
                assert_eq!(maturity_time, 86_400);
            }
            other => panic!("unexpected call {other:?}"),
        }

        let short = TradeIntent::open_short(units(200)).with_slippage_tolerance(tolerance);
        match protected_call(&short, Some(&preview)) {
            ContractCall::OpenShort { max_deposit, .. } => assert_eq!(max_deposit, units(101)),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn test_failed_preview_leaves_call_unprotected() {
        let intent = TradeIntent::open_long(units(5)).with_slippage_tolerance(Decimal::from_str("0.05").unwrap());
        assert_eq!(protected_call(&intent, None), unprotected_call(&intent.action));
    }
}
