//! fungible token collaborator
//!
//! the ledger only talks to the public token through this trait:
//! - pull deposits with a prior approval (`transfer_from`)
//! - pay out redemptions and compensations (`transfer`)
//!
//! implementations:
//! - memory: in-process balance table for tests and local runs

pub mod memory;

use crate::types::{Address, Amount};
use crate::Result;

pub use memory::MemoryToken;

/// public fungible balance ledger with approve/allowance semantics
pub trait TokenLedger {
    /// address the token contract is deployed at
    fn address(&self) -> Address;

    /// ticker used in user-facing messages
    fn symbol(&self) -> &str;

    /// move `amount` from `from` to `to`, signed by `from`
    fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> Result<()>;

    /// move `amount` from `owner` to `to`, consuming `spender`'s allowance
    fn transfer_from(
        &mut self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()>;

    /// let `spender` move up to `amount` of `owner`'s tokens
    fn approve(&mut self, owner: Address, spender: Address, amount: Amount) -> Result<()>;

    fn allowance(&self, owner: Address, spender: Address) -> Amount;

    fn balance_of(&self, owner: Address) -> Amount;
}
