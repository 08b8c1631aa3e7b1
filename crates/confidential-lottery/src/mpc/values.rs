//! confidential value layouts
//!
//! every value is flattened to a vector of 128-bit words before sharing.
//! the [`ValueKind`] tag is public metadata (the backend needs it to find
//! balances), the words are not.

use serde::{Deserialize, Serialize};

use crate::types::{AccountKey, Amount, LotteryId};
use crate::{Error, Result};

/// public tag of a stored confidential value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Balance,
    LotteryState,
    AccountCreation,
    LotteryCreation,
    TicketPurchase,
}

/// balance of a user account or of a lottery escrow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountBalance {
    pub account_key: AccountKey,
    pub balance: Amount,
}

impl AccountBalance {
    pub fn empty(account_key: AccountKey) -> Self {
        Self { account_key, balance: 0 }
    }
}

/// tickets `[previous end, end)` belong to `buyer`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TicketRange {
    pub end: u128,
    pub buyer: AccountKey,
}

/// hidden part of a lottery
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LotteryState {
    /// modular sum of every contributed seed
    pub entropy: u128,
    pub tickets_sold: u128,
    /// ordered purchase ranges, cumulative `end`
    pub ticket_ledger: Vec<TicketRange>,
}

impl LotteryState {
    pub fn seeded(seed: u128) -> Self {
        Self { entropy: seed, tickets_sold: 0, ticket_ledger: Vec::new() }
    }

    /// buyer holding ticket `index`, if that many tickets were sold
    pub fn owner_of(&self, index: u128) -> Option<AccountKey> {
        self.ticket_ledger
            .iter()
            .find(|range| index < range.end)
            .map(|range| range.buyer)
    }
}

/// secret input of `create_account`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountCreationSecret {
    pub account_key: AccountKey,
}

/// secret input of `create_lottery`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LotteryCreationSecret {
    /// doubles as the key of the lottery's escrow balance
    pub lottery_id: LotteryId,
    pub creator_account_key: AccountKey,
    pub random_seed: u128,
}

/// secret input of `purchase_tickets`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TicketPurchaseSecret {
    pub lottery_id: LotteryId,
    pub player_account_key: AccountKey,
    pub ticket_count: u128,
    pub random_seed: u128,
}

/// any value the secret backend stores
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecretValue {
    Balance(AccountBalance),
    LotteryState(LotteryState),
    AccountCreation(AccountCreationSecret),
    LotteryCreation(LotteryCreationSecret),
    TicketPurchase(TicketPurchaseSecret),
}

impl SecretValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            SecretValue::Balance(_) => ValueKind::Balance,
            SecretValue::LotteryState(_) => ValueKind::LotteryState,
            SecretValue::AccountCreation(_) => ValueKind::AccountCreation,
            SecretValue::LotteryCreation(_) => ValueKind::LotteryCreation,
            SecretValue::TicketPurchase(_) => ValueKind::TicketPurchase,
        }
    }

    pub fn as_balance(&self) -> Option<&AccountBalance> {
        match self {
            SecretValue::Balance(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_lottery_state(&self) -> Option<&LotteryState> {
        match self {
            SecretValue::LotteryState(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn to_words(&self) -> Vec<u128> {
        match self {
            SecretValue::Balance(b) => vec![b.account_key, b.balance],
            SecretValue::LotteryState(s) => {
                let mut words = Vec::with_capacity(3 + 2 * s.ticket_ledger.len());
                words.push(s.entropy);
                words.push(s.tickets_sold);
                words.push(s.ticket_ledger.len() as u128);
                for range in &s.ticket_ledger {
                    words.push(range.end);
                    words.push(range.buyer);
                }
                words
            }
            SecretValue::AccountCreation(c) => vec![c.account_key],
            SecretValue::LotteryCreation(c) => {
                vec![c.lottery_id, c.creator_account_key, c.random_seed]
            }
            SecretValue::TicketPurchase(p) => {
                vec![p.lottery_id, p.player_account_key, p.ticket_count, p.random_seed]
            }
        }
    }

    pub(crate) fn from_words(kind: ValueKind, words: &[u128]) -> Result<Self> {
        let bad_layout = || Error::ComputationFailed(format!("malformed {:?} value", kind));
        let value = match (kind, words) {
            (ValueKind::Balance, &[account_key, balance]) => {
                SecretValue::Balance(AccountBalance { account_key, balance })
            }
            (ValueKind::LotteryState, [entropy, tickets_sold, count, rest @ ..]) => {
                if (*count as usize).checked_mul(2) != Some(rest.len()) {
                    return Err(bad_layout());
                }
                let ticket_ledger = rest
                    .chunks_exact(2)
                    .map(|pair| TicketRange { end: pair[0], buyer: pair[1] })
                    .collect();
                SecretValue::LotteryState(LotteryState {
                    entropy: *entropy,
                    tickets_sold: *tickets_sold,
                    ticket_ledger,
                })
            }
            (ValueKind::AccountCreation, &[account_key]) => {
                SecretValue::AccountCreation(AccountCreationSecret { account_key })
            }
            (ValueKind::LotteryCreation, &[lottery_id, creator_account_key, random_seed]) => {
                SecretValue::LotteryCreation(LotteryCreationSecret {
                    lottery_id,
                    creator_account_key,
                    random_seed,
                })
            }
            (
                ValueKind::TicketPurchase,
                &[lottery_id, player_account_key, ticket_count, random_seed],
            ) => SecretValue::TicketPurchase(TicketPurchaseSecret {
                lottery_id,
                player_account_key,
                ticket_count,
                random_seed,
            }),
            _ => return Err(bad_layout()),
        };
        Ok(value)
    }
}

impl From<AccountBalance> for SecretValue {
    fn from(b: AccountBalance) -> Self {
        SecretValue::Balance(b)
    }
}

impl From<LotteryState> for SecretValue {
    fn from(s: LotteryState) -> Self {
        SecretValue::LotteryState(s)
    }
}

impl From<AccountCreationSecret> for SecretValue {
    fn from(c: AccountCreationSecret) -> Self {
        SecretValue::AccountCreation(c)
    }
}

impl From<LotteryCreationSecret> for SecretValue {
    fn from(c: LotteryCreationSecret) -> Self {
        SecretValue::LotteryCreation(c)
    }
}

impl From<TicketPurchaseSecret> for SecretValue {
    fn from(p: TicketPurchaseSecret) -> Self {
        SecretValue::TicketPurchase(p)
    }
}
