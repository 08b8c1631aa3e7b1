//! error types for the confidential ledger
//!
//! messages never carry confidential values. failures detected inside a
//! secret computation only say that the check did not pass.

use thiserror::Error;

use crate::coordinator::EntityId;
use crate::types::{LotteryId, RequestId, SecretVarId};

pub type Result<T> = std::result::Result<T, Error>;

/// coarse failure category an operation aborted with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// duplicate id, unauthorized caller, malformed input
    Validation,
    /// missing account, lottery not open, draw too early, already drawn
    Precondition,
    /// token-side or confidential-side shortfall
    InsufficientFunds,
    /// secret backend rejected or could not complete the computation
    ComputationFailure,
    /// entity already has a computation in flight
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // === validation errors ===
    #[error("an account already exists for this address")]
    AccountExists,

    #[error("Could not create account")]
    AccountKeyRejected,

    #[error("Could not create lottery")]
    LotteryIdConflict,

    #[error("Lottery end must be in the future")]
    InvalidDeadline,

    #[error("Could not purchase lottery ticket")]
    InvalidTicketCount,

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("configuration error: {0}")]
    Config(String),

    // === precondition errors ===
    #[error("{0}")]
    AccountNotFound(&'static str),

    #[error("lottery {0} does not exist")]
    LotteryNotFound(LotteryId),

    #[error("Lottery not open")]
    LotteryNotOpen,

    #[error("Lottery deadline has passed")]
    DeadlinePassed,

    #[error("Cannot draw a winner before the lottery deadline!")]
    DeadlineNotReached,

    #[error("lottery has already been drawn")]
    AlreadyDrawn,

    #[error("unknown computation request {0}")]
    UnknownRequest(RequestId),

    #[error("computation request {0} has not completed yet")]
    StillRunning(RequestId),

    #[error("unknown secret variable {0}")]
    UnknownVariable(SecretVarId),

    // === funds ===
    #[error("{0}")]
    InsufficientTokenBalance(String),

    #[error("{0}")]
    InsufficientAllowance(String),

    #[error("{0}")]
    InsufficientFunds(&'static str),

    // === secret backend ===
    #[error("confidential computation failed: {0}")]
    ComputationFailed(String),

    // === concurrency ===
    #[error("{0} has a confidential computation in flight")]
    Busy(EntityId),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AccountExists
            | Error::AccountKeyRejected
            | Error::LotteryIdConflict
            | Error::InvalidDeadline
            | Error::InvalidTicketCount
            | Error::ZeroAmount
            | Error::Unauthorized(_)
            | Error::InvalidAddress(_)
            | Error::Config(_) => ErrorKind::Validation,

            Error::AccountNotFound(_)
            | Error::LotteryNotFound(_)
            | Error::LotteryNotOpen
            | Error::DeadlinePassed
            | Error::DeadlineNotReached
            | Error::AlreadyDrawn
            | Error::UnknownRequest(_)
            | Error::StillRunning(_)
            | Error::UnknownVariable(_) => ErrorKind::Precondition,

            Error::InsufficientTokenBalance(_)
            | Error::InsufficientAllowance(_)
            | Error::InsufficientFunds(_) => ErrorKind::InsufficientFunds,

            Error::ComputationFailed(_) => ErrorKind::ComputationFailure,

            Error::Busy(_) => ErrorKind::Busy,
        }
    }
}
