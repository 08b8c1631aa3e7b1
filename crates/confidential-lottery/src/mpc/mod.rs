//! secret value store
//!
//! the store holds confidential values split across computing parties and
//! runs computations over them off the transaction's critical path. public
//! state only ever sees opaque [`SecretVarId`]s, owners and commitments.
//!
//! lifecycle of a computation:
//! 1. `submit` queues it and reserves the ids its outputs will get
//! 2. the parties evaluate it whenever they get to it
//! 3. `poll` hands back the outcome exactly once
//!
//! implementations:
//! - engine: in-process additive sharing over Z/2^128, driven manually

pub mod circuits;
pub mod engine;
pub mod shares;
pub mod values;

use serde::{Deserialize, Serialize};

use crate::types::{Address, RequestId, SecretVarId};
use crate::Result;

pub use circuits::{Computation, Revealed};
pub use engine::MemoryMpc;
pub use values::{
    AccountBalance, AccountCreationSecret, LotteryCreationSecret, LotteryState, SecretValue,
    TicketPurchaseSecret, TicketRange, ValueKind,
};

/// a computation plus the owners of the values it will produce
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputationRequest {
    pub computation: Computation,
    /// one owner per output, in output order
    pub output_owners: Vec<Address>,
}

impl ComputationRequest {
    pub fn new(computation: Computation, output_owners: Vec<Address>) -> Self {
        Self { computation, output_owners }
    }
}

/// receipt of a queued computation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub request: RequestId,
    /// ids the outputs will be stored under if the computation completes
    pub outputs: Vec<SecretVarId>,
}

/// how a computation resolved
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputationOutcome {
    /// outputs exist under the reserved ids; `revealed` is the only public result
    Completed { outputs: Vec<SecretVarId>, revealed: Revealed },
    /// backend could not complete; no outputs were produced
    Failed { reason: String },
}

/// secret store trait - pluggable mpc backend
///
/// implementors must provide:
/// - input: secret-share a client value, return its public id
/// - submit/poll: asynchronous computation with reserved output ids
/// - discard: drop values that public state no longer references
pub trait SecretStore {
    /// secret-share `value` on behalf of `owner`
    fn input(&mut self, owner: Address, value: SecretValue) -> Result<SecretVarId>;

    /// queue a computation; fails synchronously on unknown or ill-typed operands
    fn submit(&mut self, request: ComputationRequest) -> Result<Submission>;

    /// take the outcome of `request`, `None` while it is still running
    fn poll(&mut self, request: RequestId) -> Option<ComputationOutcome>;

    /// forget a variable and all of its shares
    fn discard(&mut self, var: SecretVarId);

    fn owner(&self, var: SecretVarId) -> Option<Address>;

    fn kind(&self, var: SecretVarId) -> Option<ValueKind>;

    /// public commitment to the variable's shares
    fn commitment(&self, var: SecretVarId) -> Option<[u8; 32]>;
}
