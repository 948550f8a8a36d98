use cosmwasm_std::Uint128;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{AssetId, AssetIdPrefix};

/// Decoded settlement fields of one trade. Every amount is a magnitude;
/// the direction follows from the action that produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptBreakdown {
    pub trader: String,
    pub asset_id: Option<AssetId>,
    pub maturity_time: u64,
    pub base_amount: Uint128,
    pub vault_share_amount: Uint128,
    pub bond_amount: Uint128,
    pub lp_amount: Uint128,
    pub withdrawal_share_amount: Uint128,
    pub vault_share_price: Decimal,
    pub lp_share_price: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionKind {
    Base,
    Lp,
    WithdrawalShare,
    Long,
    Short,
}

impl PositionKind {
    pub fn from_prefix(prefix: AssetIdPrefix) -> Self {
        match prefix {
            AssetIdPrefix::Lp => PositionKind::Lp,
            AssetIdPrefix::Long => PositionKind::Long,
            AssetIdPrefix::Short => PositionKind::Short,
            AssetIdPrefix::WithdrawalShare => PositionKind::WithdrawalShare,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionKind::Base => "BASE",
            PositionKind::Lp => "LP",
            PositionKind::WithdrawalShare => "WITHDRAWAL_SHARE",
            PositionKind::Long => "LONG",
            PositionKind::Short => "SHORT",
        }
    }
}

/// Flat view of one token holding
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub kind: PositionKind,
    pub maturity_time: Option<u64>,
    pub balance: Uint128,
    pub open_share_price: Option<Decimal>,
}

impl Position {
    /// Multi-token id of this position, `None` for base
    pub fn asset_id(&self) -> Option<AssetId> {
        match self.kind {
            PositionKind::Base => None,
            PositionKind::Lp => Some(AssetId::lp()),
            PositionKind::WithdrawalShare => Some(AssetId::withdrawal_share()),
            PositionKind::Long => Some(AssetId::long(self.maturity_time.unwrap_or_default())),
            PositionKind::Short => Some(AssetId::short(self.maturity_time.unwrap_or_default())),
        }
    }
}

/// An open long or short at one maturity
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondPosition {
    pub balance: Uint128,
    pub maturity_time: u64,
    /// Weighted average vault share price at open
    pub open_share_price: Decimal,
}

/// Everything an address holds in one pool
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: String,
    pub base: Uint128,
    pub lp_tokens: Uint128,
    pub withdrawal_shares: Uint128,
    pub longs: BTreeMap<u64, BondPosition>,
    pub shorts: BTreeMap<u64, BondPosition>,
}

impl Wallet {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_base(mut self, base: Uint128) -> Self {
        self.base = base;
        self
    }

    /// All holdings, base first, then LP, withdrawal shares, longs and shorts
    pub fn positions(&self) -> Vec<Position> {
        let mut positions = vec![
            Position {
                kind: PositionKind::Base,
                maturity_time: None,
                balance: self.base,
                open_share_price: None,
            },
            Position {
                kind: PositionKind::Lp,
                maturity_time: None,
                balance: self.lp_tokens,
                open_share_price: None,
            },
            Position {
                kind: PositionKind::WithdrawalShare,
                maturity_time: None,
                balance: self.withdrawal_shares,
                open_share_price: None,
            },
        ];
        for (kind, book) in [(PositionKind::Long, &self.longs), (PositionKind::Short, &self.shorts)] {
            positions.extend(book.values().map(|p| Position {
                kind,
                maturity_time: Some(p.maturity_time),
                balance: p.balance,
                open_share_price: Some(p.open_share_price),
            }));
        }
        positions
    }

    /// Balance of one multi-token id
    pub fn balance_of(&self, asset_id: &AssetId) -> Uint128 {
        let (prefix, maturity) = asset_id.decode();
        match prefix {
            AssetIdPrefix::Lp => self.lp_tokens,
            AssetIdPrefix::WithdrawalShare => self.withdrawal_shares,
            AssetIdPrefix::Long => self.longs.get(&maturity).map(|p| p.balance).unwrap_or_default(),
            AssetIdPrefix::Short => self.shorts.get(&maturity).map(|p| p.balance).unwrap_or_default(),
        }
    }

    /// True when nothing but base is held
    pub fn has_only_base(&self) -> bool {
        self.lp_tokens.is_zero()
            && self.withdrawal_shares.is_zero()
            && self.longs.values().all(|p| p.balance.is_zero())
            && self.shorts.values().all(|p| p.balance.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::units;

    #[test]
    fn test_positions_listing() {
        let mut wallet = Wallet::new("0xabc").with_base(units(100));
        wallet.longs.insert(
            3600,
            BondPosition {
                balance: units(5),
                maturity_time: 3600,
                open_share_price: Decimal::ONE,
            },
        );

        let positions = wallet.positions();
        assert_eq!(positions.len(), 4);
        assert_eq!(positions[0].kind, PositionKind::Base);
        assert_eq!(positions[3].asset_id(), Some(AssetId::long(3600)));
        assert_eq!(wallet.balance_of(&AssetId::long(3600)), units(5));
        assert_eq!(wallet.balance_of(&AssetId::short(3600)), Uint128::zero());
        assert!(!wallet.has_only_base());
    }
}
