//! Conversions between 18-decimal on-chain amounts and `Decimal`.

use cosmwasm_std::Uint128;
use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimals used by every on-chain amount.
pub const DECIMALS: u32 = 18;

/// 10^18
pub const ONE: u128 = 1_000_000_000_000_000_000;

/// Whole token units to a scaled amount.
pub fn units(amount: u64) -> Uint128 {
    Uint128::new(amount as u128 * ONE)
}

/// Scaled amount to a `Decimal` in token units. Saturates at `Decimal::MAX`.
pub fn to_decimal(value: Uint128) -> Decimal {
    let raw = match i128::try_from(value.u128()) {
        Ok(raw) => raw,
        Err(_) => return Decimal::MAX,
    };
    Decimal::try_from_i128_with_scale(raw, DECIMALS).unwrap_or(Decimal::MAX)
}

/// `Decimal` in token units to a scaled amount. Rounds toward zero,
/// negative values map to zero and overflow saturates.
pub fn from_decimal(value: Decimal) -> Uint128 {
    if value.is_sign_negative() || value.is_zero() {
        return Uint128::zero();
    }
    let value = value.round_dp_with_strategy(DECIMALS, RoundingStrategy::ToZero);
    let mantissa = value.mantissa() as u128;
    let factor = 10u128.pow(DECIMALS - value.scale());
    match mantissa.checked_mul(factor) {
        Some(raw) => Uint128::new(raw),
        None => Uint128::MAX,
    }
}

/// `amount * ratio`, rounded toward zero.
pub fn mul_decimal(amount: Uint128, ratio: Decimal) -> Uint128 {
    to_decimal(amount)
        .checked_mul(ratio)
        .map(from_decimal)
        .unwrap_or(Uint128::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_units_to_decimal() {
        assert_eq!(to_decimal(units(22222)), Decimal::from(22222u64));
        assert_eq!(to_decimal(Uint128::new(1)), Decimal::from_str("0.000000000000000001").unwrap());
    }

    #[test]
    fn test_from_decimal_truncates() {
        let value = Decimal::from_str("1.5").unwrap();
        assert_eq!(from_decimal(value), Uint128::new(ONE + ONE / 2));
        assert_eq!(from_decimal(Decimal::from(-3)), Uint128::zero());
    }

    #[test]
    fn test_mul_decimal() {
        let slippage = Decimal::from_str("0.99").unwrap();
        assert_eq!(mul_decimal(units(100), slippage), units(99));
    }
}
