//! account subsystem
//!
//! one account per address, created once and never removed. the public side
//! only records which balance reference belongs to whom; the balance and
//! the account key stay in the secret store.
//!
//! credits move in and out against the public token:
//! - purchase: pull tokens first, then mint confidentially. a failed mint
//!   sends the tokens back
//! - redeem: burn confidentially first, pay tokens out on finalization

use serde::{Deserialize, Serialize};

use crate::coordinator::EntityId;
use crate::ledger::{output, Ledger, LedgerEvent, Pending, PendingOp};
use crate::mpc::{Computation, ComputationOutcome, ComputationRequest, Revealed, SecretStore};
use crate::token::TokenLedger;
use crate::types::{Address, Amount, RequestId, SecretVarId, TxContext};
use crate::{Error, Result};

/// public part of an account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub owner: Address,
    /// current confidential balance
    pub balance_ref: SecretVarId,
}

impl<T: TokenLedger, S: SecretStore> Ledger<T, S> {
    /// register an account for the sender.
    ///
    /// `creation` must be an [`AccountCreationSecret`](crate::mpc::AccountCreationSecret)
    /// input by the sender. the key is checked for uniqueness inside the
    /// computation; a clash surfaces on finalization as `AccountKeyRejected`.
    pub fn create_account(&mut self, ctx: TxContext, creation: SecretVarId) -> Result<RequestId> {
        let owner = ctx.sender;
        if self.accounts.contains_key(&owner) {
            return Err(Error::AccountExists);
        }
        self.require_input(creation, owner, "account key input belongs to another address")?;
        let entities = vec![EntityId::Account(owner)];
        self.coordinator.ensure_idle(&entities)?;

        let submission = self.store.submit(ComputationRequest::new(
            Computation::CreateAccount { creation },
            vec![owner],
        ))?;
        tracing::debug!(request = %submission.request, %owner, "create account submitted");

        let request = submission.request;
        self.coordinator.begin(
            request,
            entities,
            Pending {
                op: PendingOp::CreateAccount { owner, creation },
                outputs: submission.outputs,
            },
        )?;
        Ok(request)
    }

    /// deposit `amount` tokens as confidential credits.
    ///
    /// the sender must have approved the ledger for at least `amount`
    pub fn purchase_credits(&mut self, ctx: TxContext, amount: Amount) -> Result<RequestId> {
        let owner = ctx.sender;
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let account = self.accounts.get(&owner).copied().ok_or(Error::AccountNotFound(
            "Cannot purchase credits for an account that does not exist",
        ))?;
        let entities = vec![EntityId::Account(owner)];
        self.coordinator.ensure_idle(&entities)?;

        self.token.transfer_from(self.address, owner, self.address, amount)?;

        let submitted = self.store.submit(ComputationRequest::new(
            Computation::MintCredits { balance: account.balance_ref, amount },
            vec![owner],
        ));
        let submission = match submitted {
            Ok(submission) => submission,
            Err(e) => {
                self.refund(owner, amount);
                return Err(e);
            }
        };
        tracing::debug!(request = %submission.request, %owner, amount, "purchase credits submitted");

        let request = submission.request;
        let locked = self.coordinator.begin(
            request,
            entities,
            Pending {
                op: PendingOp::PurchaseCredits { owner, amount, previous: account.balance_ref },
                outputs: submission.outputs,
            },
        );
        if let Err(e) = locked {
            self.refund(owner, amount);
            return Err(e);
        }
        Ok(request)
    }

    /// withdraw `amount` credits back to the token.
    ///
    /// sufficiency is checked inside the computation; the tokens are paid
    /// out on finalization
    pub fn redeem_credits(&mut self, ctx: TxContext, amount: Amount) -> Result<RequestId> {
        let owner = ctx.sender;
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let account = self.accounts.get(&owner).copied().ok_or(Error::AccountNotFound(
            "Cannot redeem credits for an account that does not exist",
        ))?;
        let entities = vec![EntityId::Account(owner)];
        self.coordinator.ensure_idle(&entities)?;

        let submission = self.store.submit(ComputationRequest::new(
            Computation::BurnCredits { balance: account.balance_ref, amount },
            vec![owner],
        ))?;
        tracing::debug!(request = %submission.request, %owner, amount, "redeem credits submitted");

        let request = submission.request;
        self.coordinator.begin(
            request,
            entities,
            Pending {
                op: PendingOp::RedeemCredits { owner, amount, previous: account.balance_ref },
                outputs: submission.outputs,
            },
        )?;
        Ok(request)
    }

    // === finalization ===

    pub(crate) fn finish_create_account(
        &mut self,
        owner: Address,
        creation: SecretVarId,
        outcome: ComputationOutcome,
    ) -> Result<LedgerEvent> {
        self.store.discard(creation);
        let (outputs, revealed) = self.completed(outcome, 1)?;
        if revealed != Revealed::Ok {
            self.discard_all(&outputs);
            return Err(Error::AccountKeyRejected);
        }

        let balance_ref = output(&outputs, 0)?;
        self.accounts.insert(owner, Account { owner, balance_ref });
        Ok(LedgerEvent::AccountCreated { owner, balance_ref })
    }

    pub(crate) fn finish_purchase_credits(
        &mut self,
        owner: Address,
        amount: Amount,
        previous: SecretVarId,
        outcome: ComputationOutcome,
    ) -> Result<LedgerEvent> {
        let (outputs, _) = match self.completed(outcome, 1) {
            Ok(done) => done,
            Err(e) => {
                self.refund(owner, amount);
                return Err(e);
            }
        };

        let balance_ref = self.swap_balance(owner, previous, output(&outputs, 0)?);
        Ok(LedgerEvent::CreditsPurchased { owner, amount, balance_ref })
    }

    pub(crate) fn finish_redeem_credits(
        &mut self,
        owner: Address,
        amount: Amount,
        previous: SecretVarId,
        outcome: ComputationOutcome,
    ) -> Result<LedgerEvent> {
        let (outputs, revealed) = self.completed(outcome, 1)?;
        if revealed != Revealed::Ok {
            self.discard_all(&outputs);
            return Err(Error::InsufficientFunds("Insufficient deposit balance! Could not withdraw"));
        }

        // pay out before adopting the debited balance; a failed payout
        // leaves the old balance in place
        if let Err(e) = self.token.transfer(self.address, owner, amount) {
            self.discard_all(&outputs);
            return Err(e);
        }

        let balance_ref = self.swap_balance(owner, previous, output(&outputs, 0)?);
        Ok(LedgerEvent::CreditsRedeemed { owner, amount, balance_ref })
    }

    /// point `owner`'s account at `next` and drop `previous`
    pub(crate) fn swap_balance(
        &mut self,
        owner: Address,
        previous: SecretVarId,
        next: SecretVarId,
    ) -> SecretVarId {
        if let Some(account) = self.accounts.get_mut(&owner) {
            account.balance_ref = next;
        }
        self.store.discard(previous);
        next
    }

    fn refund(&mut self, owner: Address, amount: Amount) {
        if let Err(e) = self.token.transfer(self.address, owner, amount) {
            tracing::error!(%owner, amount, error = %e, "could not refund deposit");
        }
    }
}
