//! confidential computations run by the secret backend
//!
//! every circuit is evaluated obliviously: it always produces the same number
//! and kinds of outputs whether its checks pass or not, and the only value
//! that leaves the backend in the clear is a [`Revealed`] status code. when a
//! check fails the outputs are unchanged copies of the inputs and the ledger
//! throws them away.

use serde::{Deserialize, Serialize};

use crate::mpc::values::{
    AccountBalance, LotteryState, SecretValue, TicketRange, ValueKind,
};
use crate::types::{AccountKey, Amount, LotteryId, SecretVarId};
use crate::{Error, Result};

/// the single public output of a computation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Revealed {
    Ok,
    /// key is zero or already bound to another balance
    KeyRejected,
    /// supplied key does not match the referenced balance
    KeyMismatch,
    InsufficientBalance,
    InvalidTicketCount,
}

/// a computation request: secret operands by reference, public operands inline
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Computation {
    /// bind a fresh zero balance to a new, unused account key
    CreateAccount { creation: SecretVarId },

    /// `balance + amount`; linear, evaluated share-locally
    MintCredits { balance: SecretVarId, amount: Amount },

    /// `balance - amount` if `balance >= amount`
    BurnCredits { balance: SecretVarId, amount: Amount },

    /// move `prize_pool` from the creator into a new lottery escrow
    CreateLottery {
        creation: SecretVarId,
        creator_balance: SecretVarId,
        lottery_id: LotteryId,
        prize_pool: Amount,
    },

    /// pay `entry_cost * ticket_count` into the escrow and record the tickets
    PurchaseTickets {
        purchase: SecretVarId,
        player_balance: SecretVarId,
        lottery_balance: SecretVarId,
        lottery_state: SecretVarId,
        lottery_id: LotteryId,
        entry_cost: Amount,
        max_tickets: u128,
    },

    /// pick the winning ticket and pay out the whole escrow.
    /// `accounts[0]` is the creator, the rest are the ticket buyers
    DrawWinner {
        lottery_state: SecretVarId,
        lottery_balance: SecretVarId,
        accounts: Vec<SecretVarId>,
    },
}

impl Computation {
    pub fn name(&self) -> &'static str {
        match self {
            Computation::CreateAccount { .. } => "create_account",
            Computation::MintCredits { .. } => "mint_credits",
            Computation::BurnCredits { .. } => "burn_credits",
            Computation::CreateLottery { .. } => "create_lottery",
            Computation::PurchaseTickets { .. } => "purchase_tickets",
            Computation::DrawWinner { .. } => "draw_winner",
        }
    }

    /// secret operands, in the order the circuit consumes them
    pub fn inputs(&self) -> Vec<SecretVarId> {
        match self {
            Computation::CreateAccount { creation } => vec![*creation],
            Computation::MintCredits { balance, .. } | Computation::BurnCredits { balance, .. } => {
                vec![*balance]
            }
            Computation::CreateLottery { creation, creator_balance, .. } => {
                vec![*creation, *creator_balance]
            }
            Computation::PurchaseTickets {
                purchase,
                player_balance,
                lottery_balance,
                lottery_state,
                ..
            } => vec![*purchase, *player_balance, *lottery_balance, *lottery_state],
            Computation::DrawWinner { lottery_state, lottery_balance, accounts } => {
                let mut inputs = vec![*lottery_state, *lottery_balance];
                inputs.extend_from_slice(accounts);
                inputs
            }
        }
    }

    /// expected kinds of the secret operands, aligned with [`Self::inputs`]
    pub fn input_kinds(&self) -> Vec<ValueKind> {
        match self {
            Computation::CreateAccount { .. } => vec![ValueKind::AccountCreation],
            Computation::MintCredits { .. } | Computation::BurnCredits { .. } => {
                vec![ValueKind::Balance]
            }
            Computation::CreateLottery { .. } => {
                vec![ValueKind::LotteryCreation, ValueKind::Balance]
            }
            Computation::PurchaseTickets { .. } => vec![
                ValueKind::TicketPurchase,
                ValueKind::Balance,
                ValueKind::Balance,
                ValueKind::LotteryState,
            ],
            Computation::DrawWinner { accounts, .. } => {
                let mut kinds = vec![ValueKind::LotteryState, ValueKind::Balance];
                kinds.extend(accounts.iter().map(|_| ValueKind::Balance));
                kinds
            }
        }
    }

    /// kinds of the produced values, in output order
    pub fn output_kinds(&self) -> Vec<ValueKind> {
        match self {
            Computation::CreateAccount { .. }
            | Computation::MintCredits { .. }
            | Computation::BurnCredits { .. } => vec![ValueKind::Balance],
            Computation::CreateLottery { .. } | Computation::PurchaseTickets { .. } => {
                vec![ValueKind::Balance, ValueKind::Balance, ValueKind::LotteryState]
            }
            Computation::DrawWinner { accounts, .. } => {
                let mut kinds = vec![ValueKind::LotteryState, ValueKind::Balance];
                kinds.extend(accounts.iter().map(|_| ValueKind::Balance));
                kinds
            }
        }
    }

    /// whether the circuit needs the keys of every live balance
    pub fn scans_account_keys(&self) -> bool {
        matches!(
            self,
            Computation::CreateAccount { .. } | Computation::CreateLottery { .. }
        )
    }
}

/// plaintext result of a circuit, before re-sharing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub outputs: Vec<SecretValue>,
    pub revealed: Revealed,
}

/// evaluate `computation` over reconstructed `inputs`.
///
/// `known_keys` holds the keys of every live balance; it is only consulted by
/// circuits that check key uniqueness.
pub fn evaluate(
    computation: &Computation,
    inputs: &[SecretValue],
    known_keys: &[AccountKey],
) -> Result<Evaluation> {
    match computation {
        Computation::CreateAccount { .. } => {
            let [SecretValue::AccountCreation(creation)] = inputs else {
                return Err(operand_error(computation));
            };
            Ok(create_account(creation.account_key, known_keys))
        }
        Computation::MintCredits { amount, .. } => {
            let [SecretValue::Balance(balance)] = inputs else {
                return Err(operand_error(computation));
            };
            Ok(mint_credits(*balance, *amount))
        }
        Computation::BurnCredits { amount, .. } => {
            let [SecretValue::Balance(balance)] = inputs else {
                return Err(operand_error(computation));
            };
            Ok(burn_credits(*balance, *amount))
        }
        Computation::CreateLottery { lottery_id, prize_pool, .. } => {
            let [SecretValue::LotteryCreation(creation), SecretValue::Balance(creator)] = inputs
            else {
                return Err(operand_error(computation));
            };
            Ok(create_lottery(
                creation.lottery_id,
                creation.creator_account_key,
                creation.random_seed,
                *creator,
                *lottery_id,
                *prize_pool,
                known_keys,
            ))
        }
        Computation::PurchaseTickets { lottery_id, entry_cost, max_tickets, .. } => {
            let [
                SecretValue::TicketPurchase(purchase),
                SecretValue::Balance(player),
                SecretValue::Balance(escrow),
                SecretValue::LotteryState(state),
            ] = inputs
            else {
                return Err(operand_error(computation));
            };
            Ok(purchase_tickets(
                purchase,
                *player,
                *escrow,
                state.clone(),
                *lottery_id,
                *entry_cost,
                *max_tickets,
            ))
        }
        Computation::DrawWinner { .. } => {
            let [SecretValue::LotteryState(state), SecretValue::Balance(escrow), rest @ ..] =
                inputs
            else {
                return Err(operand_error(computation));
            };
            let accounts = rest
                .iter()
                .map(|v| v.as_balance().copied())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| operand_error(computation))?;
            if accounts.is_empty() {
                return Err(operand_error(computation));
            }
            Ok(draw_winner(state.clone(), *escrow, accounts))
        }
    }
}

fn operand_error(computation: &Computation) -> Error {
    Error::ComputationFailed(format!("{}: operands have the wrong kinds", computation.name()))
}

fn key_available(key: AccountKey, known_keys: &[AccountKey]) -> bool {
    key != 0 && !known_keys.contains(&key)
}

fn create_account(account_key: AccountKey, known_keys: &[AccountKey]) -> Evaluation {
    let revealed = if key_available(account_key, known_keys) {
        Revealed::Ok
    } else {
        Revealed::KeyRejected
    };
    Evaluation {
        outputs: vec![AccountBalance::empty(account_key).into()],
        revealed,
    }
}

fn mint_credits(mut balance: AccountBalance, amount: Amount) -> Evaluation {
    balance.balance = balance.balance.wrapping_add(amount);
    Evaluation { outputs: vec![balance.into()], revealed: Revealed::Ok }
}

fn burn_credits(mut balance: AccountBalance, amount: Amount) -> Evaluation {
    let revealed = match balance.balance.checked_sub(amount) {
        Some(rest) => {
            balance.balance = rest;
            Revealed::Ok
        }
        None => Revealed::InsufficientBalance,
    };
    Evaluation { outputs: vec![balance.into()], revealed }
}

fn create_lottery(
    secret_lottery_id: LotteryId,
    creator_account_key: AccountKey,
    random_seed: u128,
    mut creator: AccountBalance,
    lottery_id: LotteryId,
    prize_pool: Amount,
    known_keys: &[AccountKey],
) -> Evaluation {
    let revealed = if creator_account_key != creator.account_key {
        Revealed::KeyMismatch
    } else if secret_lottery_id != lottery_id || !key_available(lottery_id, known_keys) {
        Revealed::KeyRejected
    } else if creator.balance < prize_pool {
        Revealed::InsufficientBalance
    } else {
        Revealed::Ok
    };

    let escrow = if revealed == Revealed::Ok {
        creator.balance -= prize_pool;
        AccountBalance { account_key: lottery_id, balance: prize_pool }
    } else {
        AccountBalance::empty(lottery_id)
    };

    Evaluation {
        outputs: vec![
            creator.into(),
            escrow.into(),
            LotteryState::seeded(random_seed).into(),
        ],
        revealed,
    }
}

fn purchase_tickets(
    purchase: &crate::mpc::values::TicketPurchaseSecret,
    mut player: AccountBalance,
    mut escrow: AccountBalance,
    mut state: LotteryState,
    lottery_id: LotteryId,
    entry_cost: Amount,
    max_tickets: u128,
) -> Evaluation {
    let count = purchase.ticket_count;
    let cost = entry_cost.checked_mul(count);
    let tickets_sold = state.tickets_sold.checked_add(count);

    let revealed = if purchase.player_account_key != player.account_key
        || purchase.lottery_id != lottery_id
        || escrow.account_key != lottery_id
    {
        Revealed::KeyMismatch
    } else if count == 0 || count > max_tickets || tickets_sold.is_none() {
        Revealed::InvalidTicketCount
    } else {
        match cost {
            Some(cost) if player.balance >= cost => Revealed::Ok,
            _ => Revealed::InsufficientBalance,
        }
    };

    if let (Revealed::Ok, Some(cost), Some(tickets_sold)) = (revealed, cost, tickets_sold) {
        player.balance -= cost;
        escrow.balance += cost;
        // plain modular sum: each buyer moves the result by an amount only
        // they know, so nobody controls the final value alone
        state.entropy = state.entropy.wrapping_add(purchase.random_seed);
        state.tickets_sold = tickets_sold;
        state.ticket_ledger.push(TicketRange {
            end: state.tickets_sold,
            buyer: purchase.player_account_key,
        });
    }

    Evaluation {
        outputs: vec![player.into(), escrow.into(), state.into()],
        revealed,
    }
}

fn draw_winner(
    state: LotteryState,
    mut escrow: AccountBalance,
    mut accounts: Vec<AccountBalance>,
) -> Evaluation {
    let pool = escrow.balance;

    let winner = if state.tickets_sold == 0 {
        None
    } else {
        state.owner_of(state.entropy % state.tickets_sold)
    };

    // every account is rewritten; only the winner's amount changes
    let mut paid = false;
    for account in accounts.iter_mut() {
        if Some(account.account_key) == winner && !paid {
            account.balance += pool;
            paid = true;
        }
    }
    if !paid {
        // no tickets sold: the escrow goes back to the creator
        accounts[0].balance += pool;
    }
    escrow.balance = 0;

    let mut outputs = Vec::with_capacity(2 + accounts.len());
    outputs.push(state.into());
    outputs.push(escrow.into());
    outputs.extend(accounts.into_iter().map(SecretValue::from));

    Evaluation { outputs, revealed: Revealed::Ok }
}
