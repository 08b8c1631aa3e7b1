//! # confidential-lottery
//!
//! confidential credit ledger and lottery on top of a secret-shared mpc
//! backend.
//!
//! users deposit a public token as confidential credits, fund lotteries from
//! them, buy tickets and receive payouts, while balances, ticket counts and
//! pool sizes stay split across the computing parties. public state only
//! holds opaque references.
//!
//! ## architecture
//!
//! ```text
//!   transaction ──▶ Ledger ──validate──▶ TokenLedger (deposit pull)
//!                     │
//!                     │ submit, lock entities
//!                     ▼
//!               ┌─────────────┐   run    ┌─────┐ ┌─────┐ ┌─────┐
//!               │ SecretStore │ ───────▶ │ p 1 │ │ p 2 │ │ p 3 │  additive shares
//!               └──────┬──────┘          └─────┘ └─────┘ └─────┘
//!                      │ poll
//!                      ▼
//!   Ledger::on_complete ──▶ swap references, unlock, emit LedgerEvent
//! ```
//!
//! every mutation is two-phase: the transaction submits and returns a
//! [`RequestId`], the new state becomes readable only once the outcome is
//! finalized. an entity with a computation in flight rejects further
//! mutations with [`Error::Busy`].
//!
//! ## usage
//!
//! ```rust,ignore
//! use confidential_lottery::{
//!     mpc::{AccountCreationSecret, MemoryMpc, SecretStore},
//!     token::MemoryToken, Ledger, LedgerConfig, TxContext,
//! };
//!
//! let config = LedgerConfig::from_file("ledger.json")?;
//! let store = MemoryMpc::from_config(&config)?;
//! let mut ledger = Ledger::initialize(contract, config, token, store)?;
//!
//! let key = ledger.store_mut().input(alice, AccountCreationSecret { account_key }.into())?;
//! ledger.create_account(TxContext::new(alice, now), key)?;
//!
//! ledger.store_mut().run_all();
//! for done in ledger.process_completions() {
//!     println!("{}: {:?}", done.request, done.outcome);
//! }
//! ```

pub mod account;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod lottery;
pub mod mpc;
pub mod token;
pub mod types;

pub use account::Account;
pub use config::LedgerConfig;
pub use coordinator::{ComputationHandle, EntityId};
pub use error::{Error, ErrorKind, Result};
pub use ledger::{Completion, Ledger, LedgerEvent};
pub use lottery::{LotteryParams, LotteryStatus, LotteryView, StatusEvent};
pub use types::{AccountKey, Address, Amount, LotteryId, RequestId, SecretVarId, Timestamp, TxContext};
