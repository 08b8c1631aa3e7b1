//! confidential ledger - public contract state and finalization
//!
//! the ledger holds only public data: who has an account, which lotteries
//! exist, and opaque references into the secret store. operations live in
//! [`crate::account`] and [`crate::lottery`]; they validate, move tokens,
//! submit a computation and lock the touched entities. the outcome is applied
//! later by [`Ledger::on_complete`], which is the only place confidential
//! references are swapped.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::config::LedgerConfig;
use crate::coordinator::{ComputationHandle, Coordinator, EntityId, InFlight};
use crate::lottery::{Lottery, LotteryView};
use crate::mpc::{ComputationOutcome, SecretStore};
use crate::token::TokenLedger;
use crate::types::{Address, Amount, LotteryId, RequestId, SecretVarId};
use crate::{Error, Result};

/// public record of a finalized state change
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    AccountCreated {
        owner: Address,
        balance_ref: SecretVarId,
    },
    CreditsPurchased {
        owner: Address,
        amount: Amount,
        balance_ref: SecretVarId,
    },
    CreditsRedeemed {
        owner: Address,
        amount: Amount,
        balance_ref: SecretVarId,
    },
    LotteryCreated {
        lottery_id: LotteryId,
        creator: Address,
        secret_state_id: SecretVarId,
    },
    TicketsPurchased {
        lottery_id: LotteryId,
        buyer: Address,
        secret_state_id: SecretVarId,
    },
    LotteryClosed {
        lottery_id: LotteryId,
        secret_state_id: SecretVarId,
    },
    ComputationFailed {
        request: RequestId,
        entity: EntityId,
        reason: String,
    },
}

/// result of finalizing one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub request: RequestId,
    /// what the operation turned out to be, as its caller would see it
    pub outcome: std::result::Result<LedgerEvent, Error>,
}

/// operation waiting on the secret store
#[derive(Debug)]
pub(crate) enum PendingOp {
    CreateAccount {
        owner: Address,
        creation: SecretVarId,
    },
    PurchaseCredits {
        owner: Address,
        amount: Amount,
        previous: SecretVarId,
    },
    RedeemCredits {
        owner: Address,
        amount: Amount,
        previous: SecretVarId,
    },
    CreateLottery {
        lottery: Lottery,
        creation: SecretVarId,
        previous: SecretVarId,
    },
    PurchaseTickets {
        lottery_id: LotteryId,
        buyer: Address,
        purchase: SecretVarId,
        /// player balance, lottery balance, lottery state
        previous: [SecretVarId; 3],
    },
    DrawWinner {
        lottery_id: LotteryId,
        previous_state: SecretVarId,
        previous_balance: SecretVarId,
        /// creator first, then every ticket buyer
        accounts: Vec<(Address, SecretVarId)>,
    },
}

impl PendingOp {
    /// entity failures are reported against
    fn subject(&self) -> EntityId {
        match self {
            PendingOp::CreateAccount { owner, .. }
            | PendingOp::PurchaseCredits { owner, .. }
            | PendingOp::RedeemCredits { owner, .. } => EntityId::Account(*owner),
            PendingOp::CreateLottery { lottery, .. } => EntityId::Lottery(lottery.lottery_id),
            PendingOp::PurchaseTickets { lottery_id, .. }
            | PendingOp::DrawWinner { lottery_id, .. } => EntityId::Lottery(*lottery_id),
        }
    }
}

/// payload the coordinator keeps per request
#[derive(Debug)]
pub(crate) struct Pending {
    pub op: PendingOp,
    /// ids reserved for the outputs at submission
    pub outputs: Vec<SecretVarId>,
}

impl Pending {
    /// state reference a lottery will move to once this request finalizes
    fn lottery_state(&self, id: LotteryId) -> Option<SecretVarId> {
        match &self.op {
            PendingOp::PurchaseTickets { lottery_id, .. } if *lottery_id == id => {
                self.outputs.get(2).copied()
            }
            PendingOp::DrawWinner { lottery_id, .. } if *lottery_id == id => {
                self.outputs.first().copied()
            }
            _ => None,
        }
    }
}

pub struct Ledger<T: TokenLedger, S: SecretStore> {
    pub(crate) address: Address,
    pub(crate) config: LedgerConfig,
    pub(crate) token: T,
    pub(crate) store: S,
    pub(crate) accounts: BTreeMap<Address, Account>,
    pub(crate) lotteries: BTreeMap<LotteryId, Lottery>,
    /// ids of lotteries whose creation is still in flight
    pub(crate) reserved_lottery_ids: BTreeSet<LotteryId>,
    pub(crate) coordinator: Coordinator<Pending>,
    events: Vec<LedgerEvent>,
}

impl<T: TokenLedger, S: SecretStore> Ledger<T, S> {
    /// deploy the ledger at `address`, bound to `token`
    pub fn initialize(address: Address, config: LedgerConfig, token: T, store: S) -> Result<Self> {
        config.validate()?;
        if token.address() != config.token_address {
            return Err(Error::Config(format!(
                "token collaborator is deployed at {}, config expects {}",
                token.address(),
                config.token_address
            )));
        }
        if token.symbol() != config.token_symbol {
            return Err(Error::Config(format!(
                "token collaborator trades as {}, config expects {}",
                token.symbol(),
                config.token_symbol
            )));
        }
        tracing::info!(
            contract = %address,
            token = %config.token_address,
            parties = config.mpc_parties,
            "ledger initialized"
        );
        Ok(Self {
            address,
            config,
            token,
            store,
            accounts: BTreeMap::new(),
            lotteries: BTreeMap::new(),
            reserved_lottery_ids: BTreeSet::new(),
            coordinator: Coordinator::new(),
            events: Vec::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    // === public reads ===

    /// balance reference of `owner`'s account, if it has one
    pub fn get_account(&self, owner: Address) -> Option<SecretVarId> {
        self.accounts.get(&owner).map(|a| a.balance_ref)
    }

    pub fn account(&self, owner: Address) -> Option<&Account> {
        self.accounts.get(&owner)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> + '_ {
        self.accounts.values()
    }

    pub fn get_lottery(&self, lottery_id: LotteryId) -> Option<LotteryView> {
        self.lotteries
            .get(&lottery_id)
            .map(|l| l.view(self.pending_lottery_state(lottery_id)))
    }

    /// every finalized lottery, ordered by id
    pub fn lotteries(&self) -> Vec<LotteryView> {
        self.lotteries
            .values()
            .map(|l| l.view(self.pending_lottery_state(l.lottery_id)))
            .collect()
    }

    /// `limit` lotteries starting at `page * limit`
    pub fn lottery_page(&self, page: usize, limit: usize) -> Vec<LotteryView> {
        self.lotteries
            .values()
            .skip(page.saturating_mul(limit))
            .take(limit)
            .map(|l| l.view(self.pending_lottery_state(l.lottery_id)))
            .collect()
    }

    pub fn handle(&self, entity: EntityId) -> ComputationHandle {
        self.coordinator.handle(entity)
    }

    pub fn is_pending(&self, request: RequestId) -> bool {
        self.coordinator.pending(request).is_some()
    }

    /// requests submitted but not yet finalized, oldest first
    pub fn in_flight(&self) -> Vec<RequestId> {
        self.coordinator.in_flight().collect()
    }

    /// drain the public event log
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    fn pending_lottery_state(&self, lottery_id: LotteryId) -> Option<SecretVarId> {
        match self.coordinator.handle(EntityId::Lottery(lottery_id)) {
            ComputationHandle::Pending(request) => self
                .coordinator
                .pending(request)
                .and_then(|p| p.payload.lottery_state(lottery_id)),
            ComputationHandle::Idle => None,
        }
    }

    // === finalization ===

    /// apply the outcome of `request` to public state.
    ///
    /// fails with `StillRunning` if the store has not resolved it yet and
    /// with `UnknownRequest` if it was never submitted through this ledger
    /// or is already finalized. operation-level failures are reported in
    /// [`Completion::outcome`], the entities are unlocked either way.
    pub fn on_complete(&mut self, request: RequestId) -> Result<Completion> {
        if !self.is_pending(request) {
            return Err(Error::UnknownRequest(request));
        }
        let outcome = self.store.poll(request).ok_or(Error::StillRunning(request))?;
        let InFlight { payload, .. } = self.coordinator.finish(request)?;
        let subject = payload.op.subject();

        let result = match payload.op {
            PendingOp::CreateAccount { owner, creation } => {
                self.finish_create_account(owner, creation, outcome)
            }
            PendingOp::PurchaseCredits { owner, amount, previous } => {
                self.finish_purchase_credits(owner, amount, previous, outcome)
            }
            PendingOp::RedeemCredits { owner, amount, previous } => {
                self.finish_redeem_credits(owner, amount, previous, outcome)
            }
            PendingOp::CreateLottery { lottery, creation, previous } => {
                self.finish_create_lottery(lottery, creation, previous, outcome)
            }
            PendingOp::PurchaseTickets { lottery_id, buyer, purchase, previous } => {
                self.finish_purchase_tickets(lottery_id, buyer, purchase, previous, outcome)
            }
            PendingOp::DrawWinner { lottery_id, previous_state, previous_balance, accounts } => {
                self.finish_draw_winner(lottery_id, previous_state, previous_balance, accounts, outcome)
            }
        };

        match &result {
            Ok(event) => {
                tracing::info!(%request, entity = %subject, ?event, "computation finalized");
                self.events.push(event.clone());
            }
            Err(e) => {
                tracing::warn!(%request, entity = %subject, error = %e, "computation rejected");
                self.events.push(LedgerEvent::ComputationFailed {
                    request,
                    entity: subject,
                    reason: e.to_string(),
                });
            }
        }
        Ok(Completion { request, outcome: result })
    }

    /// finalize every request the store has resolved, oldest first
    pub fn process_completions(&mut self) -> Vec<Completion> {
        let mut done = Vec::new();
        for request in self.in_flight() {
            match self.on_complete(request) {
                Ok(completion) => done.push(completion),
                Err(Error::StillRunning(_)) => {}
                Err(e) => tracing::error!(%request, error = %e, "could not finalize request"),
            }
        }
        done
    }

    // === helpers for the operation modules ===

    /// check that `var` exists and was input by `sender`
    pub(crate) fn require_input(
        &self,
        var: SecretVarId,
        sender: Address,
        denied: &'static str,
    ) -> Result<()> {
        match self.store.owner(var) {
            None => Err(Error::UnknownVariable(var)),
            Some(owner) if owner != sender => Err(Error::Unauthorized(denied)),
            Some(_) => Ok(()),
        }
    }

    pub(crate) fn discard_all(&mut self, vars: &[SecretVarId]) {
        for var in vars {
            self.store.discard(*var);
        }
    }

    /// outputs of a computation, or the store's failure reason. a store that
    /// hands back fewer than `expected` outputs failed too
    pub(crate) fn completed(
        &mut self,
        outcome: ComputationOutcome,
        expected: usize,
    ) -> Result<(Vec<SecretVarId>, crate::mpc::Revealed)> {
        match outcome {
            ComputationOutcome::Completed { outputs, .. } if outputs.len() < expected => {
                self.discard_all(&outputs);
                Err(Error::ComputationFailed(format!(
                    "store returned {} outputs, expected {}",
                    outputs.len(),
                    expected
                )))
            }
            ComputationOutcome::Completed { outputs, revealed } => Ok((outputs, revealed)),
            ComputationOutcome::Failed { reason } => Err(Error::ComputationFailed(reason)),
        }
    }
}

/// output `index` of a computation
pub(crate) fn output(outputs: &[SecretVarId], index: usize) -> Result<SecretVarId> {
    outputs
        .get(index)
        .copied()
        .ok_or_else(|| Error::ComputationFailed(format!("missing computation output {}", index)))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::lottery::LotteryParams;
    use crate::mpc::{
        AccountBalance, AccountCreationSecret, LotteryCreationSecret, MemoryMpc, SecretValue,
        TicketPurchaseSecret,
    };
    use crate::token::MemoryToken;
    use crate::types::{AccountKey, Timestamp, TxContext};

    pub const CONTRACT: Address = Address::repeat(0xcc);
    pub const TOKEN: Address = Address::repeat(0xee);
    pub const AUDITOR: Address = Address::repeat(0xad);
    pub const ALICE: Address = Address::repeat(1);
    pub const BOB: Address = Address::repeat(2);
    pub const CAROL: Address = Address::repeat(3);

    pub const NOW: Timestamp = 1_000_000;
    pub const DEADLINE: Timestamp = NOW + 60_000;

    pub type TestLedger = Ledger<MemoryToken, MemoryMpc>;

    pub fn ledger() -> TestLedger {
        let mut token = MemoryToken::new(TOKEN, "TT", ALICE, 30_000);
        token.transfer(ALICE, BOB, 10_000).unwrap();
        token.transfer(ALICE, CAROL, 10_000).unwrap();
        let config = LedgerConfig::new(TOKEN).with_auxiliary_reader(AUDITOR);
        let store = MemoryMpc::with_seed(3, 42).with_auxiliary_reader(AUDITOR);
        Ledger::initialize(CONTRACT, config, token, store).unwrap()
    }

    pub fn at(sender: Address, block_time: Timestamp) -> TxContext {
        TxContext::new(sender, block_time)
    }

    pub fn now(sender: Address) -> TxContext {
        at(sender, NOW)
    }

    /// run every queued computation and finalize all of them
    pub fn settle(ledger: &mut TestLedger) -> Vec<Completion> {
        ledger.store_mut().run_all();
        ledger.process_completions()
    }

    pub fn settle_one(ledger: &mut TestLedger) -> std::result::Result<LedgerEvent, Error> {
        let mut done = settle(ledger);
        assert_eq!(done.len(), 1, "expected exactly one completion");
        done.remove(0).outcome
    }

    pub fn reveal(ledger: &TestLedger, var: SecretVarId) -> SecretValue {
        ledger.store().reveal_to(AUDITOR, var).unwrap()
    }

    /// plaintext balance of `owner`'s account
    pub fn credits(ledger: &TestLedger, owner: Address) -> Amount {
        let var = ledger.get_account(owner).unwrap();
        match reveal(ledger, var) {
            SecretValue::Balance(AccountBalance { balance, .. }) => balance,
            other => panic!("not a balance: {:?}", other),
        }
    }

    pub fn lottery_credits(ledger: &TestLedger, lottery_id: LotteryId) -> Amount {
        let var = ledger.lotteries[&lottery_id].balance_id;
        match reveal(ledger, var) {
            SecretValue::Balance(AccountBalance { balance, .. }) => balance,
            other => panic!("not a balance: {:?}", other),
        }
    }

    pub fn open_account(ledger: &mut TestLedger, owner: Address, key: AccountKey) {
        let creation = ledger
            .store_mut()
            .input(owner, AccountCreationSecret { account_key: key }.into())
            .unwrap();
        ledger.create_account(now(owner), creation).unwrap();
        settle_one(ledger).unwrap();
    }

    pub fn deposit(ledger: &mut TestLedger, owner: Address, amount: Amount) {
        ledger.token_mut().approve(owner, CONTRACT, amount).unwrap();
        ledger.purchase_credits(now(owner), amount).unwrap();
        settle_one(ledger).unwrap();
    }

    pub fn params(lottery_id: LotteryId, entry_cost: Amount, prize: Amount) -> LotteryParams {
        LotteryParams {
            lottery_id,
            deadline: DEADLINE,
            entry_cost,
            declared_prize_pool: prize,
        }
    }

    pub fn creation_input(
        ledger: &mut TestLedger,
        creator: Address,
        lottery_id: LotteryId,
        key: AccountKey,
    ) -> SecretVarId {
        let seed = ChaCha20Rng::seed_from_u64(lottery_id as u64).next_u64() as u128;
        ledger
            .store_mut()
            .input(
                creator,
                LotteryCreationSecret { lottery_id, creator_account_key: key, random_seed: seed }
                    .into(),
            )
            .unwrap()
    }

    pub fn ticket_input(
        ledger: &mut TestLedger,
        buyer: Address,
        lottery_id: LotteryId,
        key: AccountKey,
        ticket_count: u128,
        random_seed: u128,
    ) -> SecretVarId {
        ledger
            .store_mut()
            .input(
                buyer,
                TicketPurchaseSecret {
                    lottery_id,
                    player_account_key: key,
                    ticket_count,
                    random_seed,
                }
                .into(),
            )
            .unwrap()
    }
}
