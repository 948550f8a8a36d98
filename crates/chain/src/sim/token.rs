use cosmwasm_std::Uint128;
use hyperdrive_agents_types::{PoolEvent, ZERO_ADDRESS};
use std::collections::HashMap;

/// In-memory ERC-20 ledger used as a pool's base token
#[derive(Clone, Debug, Default)]
pub(crate) struct SimToken {
    pub address: String,
    balances: HashMap<String, Uint128>,
    allowances: HashMap<(String, String), Uint128>,
}

impl SimToken {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn balance_of(&self, owner: &str) -> Uint128 {
        self.balances.get(&owner.to_lowercase()).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: &str, spender: &str) -> Uint128 {
        self.allowances
            .get(&(owner.to_lowercase(), spender.to_lowercase()))
            .copied()
            .unwrap_or_default()
    }

    pub fn approve(&mut self, owner: &str, spender: &str, amount: Uint128) -> PoolEvent {
        self.allowances
            .insert((owner.to_lowercase(), spender.to_lowercase()), amount);
        PoolEvent::Approval {
            token: self.address.clone(),
            owner: owner.to_string(),
            spender: spender.to_string(),
            value: amount,
        }
    }

    pub fn mint(&mut self, to: &str, amount: Uint128) -> PoolEvent {
        *self.balances.entry(to.to_lowercase()).or_default() += amount;
        self.transfer_event(ZERO_ADDRESS, to, amount)
    }

    pub fn transfer(&mut self, from: &str, to: &str, amount: Uint128) -> Result<PoolEvent, String> {
        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err("ERC20: transfer amount exceeds balance".to_string());
        }
        self.balances.insert(from.to_lowercase(), from_balance - amount);
        *self.balances.entry(to.to_lowercase()).or_default() += amount;
        Ok(self.transfer_event(from, to, amount))
    }

    /// `spender` moves `amount` from `from` to `to` using its allowance
    pub fn transfer_from(&mut self, spender: &str, from: &str, to: &str, amount: Uint128) -> Result<PoolEvent, String> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err("ERC20: insufficient allowance".to_string());
        }
        let event = self.transfer(from, to, amount)?;
        if allowance != Uint128::MAX {
            self.allowances
                .insert((from.to_lowercase(), spender.to_lowercase()), allowance - amount);
        }
        Ok(event)
    }

    fn transfer_event(&self, from: &str, to: &str, amount: Uint128) -> PoolEvent {
        PoolEvent::Transfer {
            token: self.address.clone(),
            from: from.to_string(),
            to: to.to_string(),
            value: amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_from_checks_allowance_before_balance() {
        let mut token = SimToken::new("0xbase");
        token.mint("0xalice", Uint128::new(10));

        let err = token.transfer_from("0xpool", "0xalice", "0xpool", Uint128::new(5)).unwrap_err();
        assert_eq!(err, "ERC20: insufficient allowance");

        token.approve("0xalice", "0xpool", Uint128::new(100));
        let err = token.transfer_from("0xpool", "0xalice", "0xpool", Uint128::new(50)).unwrap_err();
        assert_eq!(err, "ERC20: transfer amount exceeds balance");

        token.transfer_from("0xpool", "0xalice", "0xpool", Uint128::new(4)).unwrap();
        assert_eq!(token.balance_of("0xALICE"), Uint128::new(6));
        assert_eq!(token.allowance("0xalice", "0xpool"), Uint128::new(96));
    }
}
