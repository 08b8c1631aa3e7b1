//! memory token - in-process balance table
//!
//! behaves like the deployed test token: transfers are all-or-nothing and
//! failures carry the token's own messages, which the ledger surfaces as-is.

use std::collections::HashMap;

use crate::token::TokenLedger;
use crate::types::{Address, Amount};
use crate::{Error, Result};

pub struct MemoryToken {
    address: Address,
    symbol: String,
    total_supply: Amount,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
}

impl MemoryToken {
    /// deploy with the whole `supply` minted to `minter`
    pub fn new(address: Address, symbol: impl Into<String>, minter: Address, supply: Amount) -> Self {
        let mut balances = HashMap::new();
        balances.insert(minter, supply);
        Self {
            address,
            symbol: symbol.into(),
            total_supply: supply,
            balances,
            allowances: HashMap::new(),
        }
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    fn debit(&mut self, from: Address, amount: Amount) -> Result<()> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(Error::InsufficientTokenBalance(format!(
                "Insufficient {} tokens for transfer!",
                self.symbol
            )));
        }
        self.balances.insert(from, balance - amount);
        Ok(())
    }

    fn credit(&mut self, to: Address, amount: Amount) {
        // supply is fixed at deploy time, so a credit never exceeds it
        *self.balances.entry(to).or_insert(0) += amount;
    }
}

impl TokenLedger for MemoryToken {
    fn address(&self) -> Address {
        self.address
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> Result<()> {
        self.debit(from, amount)?;
        self.credit(to, amount);
        tracing::trace!(%from, %to, amount, "token transfer");
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()> {
        let allowance = self.allowance(owner, spender);
        if allowance < amount {
            return Err(Error::InsufficientAllowance(format!(
                "Insufficient allowance for transfer_from! Allowed {}, but trying to transfer {}",
                allowance, amount
            )));
        }
        self.debit(owner, amount)?;
        self.credit(to, amount);
        self.allowances.insert((owner, spender), allowance - amount);
        tracing::trace!(%spender, %owner, %to, amount, "token transfer_from");
        Ok(())
    }

    fn approve(&mut self, owner: Address, spender: Address, amount: Amount) -> Result<()> {
        self.allowances.insert((owner, spender), amount);
        Ok(())
    }

    fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.allowances.get(&(owner, spender)).copied().unwrap_or(0)
    }

    fn balance_of(&self, owner: Address) -> Amount {
        self.balances.get(&owner).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: Address = Address::repeat(0xee);
    const MINTER: Address = Address::repeat(1);
    const ALICE: Address = Address::repeat(2);
    const SPENDER: Address = Address::repeat(3);

    fn token() -> MemoryToken {
        MemoryToken::new(TOKEN, "TT", MINTER, 10_000)
    }

    #[test]
    fn test_transfer_moves_balance() {
        let mut token = token();
        token.transfer(MINTER, ALICE, 400).unwrap();

        assert_eq!(token.balance_of(MINTER), 9_600);
        assert_eq!(token.balance_of(ALICE), 400);
    }

    #[test]
    fn test_transfer_insufficient_balance_message() {
        let mut token = token();
        let err = token.transfer(ALICE, MINTER, 1).unwrap_err();

        assert_eq!(err.to_string(), "Insufficient TT tokens for transfer!");
        assert_eq!(token.balance_of(MINTER), 10_000);
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut token = token();
        token.approve(MINTER, SPENDER, 500).unwrap();
        token.transfer_from(SPENDER, MINTER, ALICE, 300).unwrap();

        assert_eq!(token.allowance(MINTER, SPENDER), 200);
        assert_eq!(token.balance_of(ALICE), 300);
    }

    #[test]
    fn test_transfer_from_without_allowance_fails() {
        let mut token = token();
        let err = token.transfer_from(SPENDER, MINTER, ALICE, 1).unwrap_err();

        assert!(matches!(err, Error::InsufficientAllowance(_)));
        assert_eq!(token.balance_of(ALICE), 0);
    }

    #[test]
    fn test_transfer_from_keeps_allowance_on_insufficient_balance() {
        let mut token = token();
        token.approve(ALICE, SPENDER, 50).unwrap();
        let err = token.transfer_from(SPENDER, ALICE, MINTER, 50).unwrap_err();

        assert!(matches!(err, Error::InsufficientTokenBalance(_)));
        assert_eq!(token.allowance(ALICE, SPENDER), 50);
    }
}
