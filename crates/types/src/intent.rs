use cosmwasm_std::Uint128;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven trade kinds a pool accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    OpenLong,
    CloseLong,
    OpenShort,
    CloseShort,
    AddLiquidity,
    RemoveLiquidity,
    RedeemWithdrawShare,
}

impl ActionType {
    pub const ALL: [ActionType; 7] = [
        ActionType::OpenLong,
        ActionType::CloseLong,
        ActionType::OpenShort,
        ActionType::CloseShort,
        ActionType::AddLiquidity,
        ActionType::RemoveLiquidity,
        ActionType::RedeemWithdrawShare,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::OpenLong => "OPEN_LONG",
            ActionType::CloseLong => "CLOSE_LONG",
            ActionType::OpenShort => "OPEN_SHORT",
            ActionType::CloseShort => "CLOSE_SHORT",
            ActionType::AddLiquidity => "ADD_LIQUIDITY",
            ActionType::RemoveLiquidity => "REMOVE_LIQUIDITY",
            ActionType::RedeemWithdrawShare => "REDEEM_WITHDRAW_SHARE",
        }
    }

    /// Name of the pool event emitted when this action settles
    pub fn event_name(&self) -> &'static str {
        match self {
            ActionType::OpenLong => "OpenLong",
            ActionType::CloseLong => "CloseLong",
            ActionType::OpenShort => "OpenShort",
            ActionType::CloseShort => "CloseShort",
            ActionType::AddLiquidity => "AddLiquidity",
            ActionType::RemoveLiquidity => "RemoveLiquidity",
            ActionType::RedeemWithdrawShare => "RedeemWithdrawalShares",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.event_name() == name)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single market action against a pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketAction {
    /// Spend `base` to buy bonds
    OpenLong { base: Uint128 },

    /// Sell `bonds` of the long maturing at `maturity_time`
    CloseLong {
        bonds: Uint128,
        maturity_time: Option<u64>,
    },

    /// Short `bonds` bonds
    OpenShort { bonds: Uint128 },

    /// Close `bonds` of the short maturing at `maturity_time`
    CloseShort {
        bonds: Uint128,
        maturity_time: Option<u64>,
    },

    /// Contribute `base` as liquidity, bounded by the pool's fixed apr
    AddLiquidity {
        base: Uint128,
        min_apr: Option<Decimal>,
        max_apr: Option<Decimal>,
    },

    /// Burn `lp_shares` LP tokens
    RemoveLiquidity { lp_shares: Uint128 },

    /// Redeem `withdrawal_shares` withdrawal shares for base
    RedeemWithdrawShare { withdrawal_shares: Uint128 },
}

impl MarketAction {
    pub fn action_type(&self) -> ActionType {
        match self {
            MarketAction::OpenLong { .. } => ActionType::OpenLong,
            MarketAction::CloseLong { .. } => ActionType::CloseLong,
            MarketAction::OpenShort { .. } => ActionType::OpenShort,
            MarketAction::CloseShort { .. } => ActionType::CloseShort,
            MarketAction::AddLiquidity { .. } => ActionType::AddLiquidity,
            MarketAction::RemoveLiquidity { .. } => ActionType::RemoveLiquidity,
            MarketAction::RedeemWithdrawShare { .. } => ActionType::RedeemWithdrawShare,
        }
    }

    /// The amount the trade is denominated in
    pub fn trade_amount(&self) -> Uint128 {
        match self {
            MarketAction::OpenLong { base } => *base,
            MarketAction::CloseLong { bonds, .. } => *bonds,
            MarketAction::OpenShort { bonds } => *bonds,
            MarketAction::CloseShort { bonds, .. } => *bonds,
            MarketAction::AddLiquidity { base, .. } => *base,
            MarketAction::RemoveLiquidity { lp_shares } => *lp_shares,
            MarketAction::RedeemWithdrawShare { withdrawal_shares } => *withdrawal_shares,
        }
    }

    pub fn maturity_time(&self) -> Option<u64> {
        match self {
            MarketAction::CloseLong { maturity_time, .. }
            | MarketAction::CloseShort { maturity_time, .. } => *maturity_time,
            _ => None,
        }
    }
}

/// A policy's request to perform one market action
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub action: MarketAction,

    /// Accepted deviation from the previewed outcome, e.g. 0.01 for 1%
    pub slippage_tolerance: Option<Decimal>,

    pub gas_limit: Option<u64>,
}

impl TradeIntent {
    pub fn new(action: MarketAction) -> Self {
        Self {
            action,
            slippage_tolerance: None,
            gas_limit: None,
        }
    }

    pub fn open_long(base: Uint128) -> Self {
        Self::new(MarketAction::OpenLong { base })
    }

    pub fn close_long(bonds: Uint128, maturity_time: u64) -> Self {
        Self::new(MarketAction::CloseLong {
            bonds,
            maturity_time: Some(maturity_time),
        })
    }

    pub fn open_short(bonds: Uint128) -> Self {
        Self::new(MarketAction::OpenShort { bonds })
    }

    pub fn close_short(bonds: Uint128, maturity_time: u64) -> Self {
        Self::new(MarketAction::CloseShort {
            bonds,
            maturity_time: Some(maturity_time),
        })
    }

    pub fn add_liquidity(base: Uint128, min_apr: Decimal, max_apr: Decimal) -> Self {
        Self::new(MarketAction::AddLiquidity {
            base,
            min_apr: Some(min_apr),
            max_apr: Some(max_apr),
        })
    }

    pub fn remove_liquidity(lp_shares: Uint128) -> Self {
        Self::new(MarketAction::RemoveLiquidity { lp_shares })
    }

    pub fn redeem_withdrawal_shares(withdrawal_shares: Uint128) -> Self {
        Self::new(MarketAction::RedeemWithdrawShare { withdrawal_shares })
    }

    pub fn with_slippage_tolerance(mut self, tolerance: Decimal) -> Self {
        self.slippage_tolerance = Some(tolerance);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn action_type(&self) -> ActionType {
        self.action.action_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::units;

    #[test]
    fn test_intent_serialization_is_tagged() {
        let intent = TradeIntent::close_long(units(10), 3600);
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["action"]["action_type"], "CLOSE_LONG");
        assert_eq!(json["action"]["maturity_time"], 3600);

        let back: TradeIntent = serde_json::from_value(json).unwrap();
        assert_eq!(back, intent);
    }

    #[test]
    fn test_event_names_round_trip() {
        for action in ActionType::ALL {
            assert_eq!(ActionType::from_event_name(action.event_name()), Some(action));
        }
        assert_eq!(ActionType::from_event_name("TransferSingle"), None);
    }

    #[test]
    fn test_trade_amount() {
        let intent = TradeIntent::add_liquidity(units(1000), Decimal::ZERO, Decimal::ONE);
        assert_eq!(intent.action.trade_amount(), units(1000));
        assert_eq!(intent.action.maturity_time(), None);
        assert_eq!(intent.action_type(), ActionType::AddLiquidity);
    }
}
