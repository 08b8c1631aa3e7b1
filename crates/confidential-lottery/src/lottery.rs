//! lottery subsystem
//!
//! ```text
//!   Open ──purchase_tickets──▶ Open
//!   Open ──draw_winner (deadline reached)──▶ Closed (terminal)
//! ```
//!
//! a lottery's pool and its entropy/ticket ledger are confidential. the
//! public side records the creator, the terms, the status, and who bought
//! tickets (purchases are public transactions, their counts are not).
//!
//! the draw never reveals the winner: it rewrites the balance of the creator
//! and of every buyer in one computation, and only the winner's changes in
//! value. status flips to `Closed` in the same finalization that adopts the
//! rewritten balances.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::coordinator::EntityId;
use crate::ledger::{output, Ledger, LedgerEvent, Pending, PendingOp};
use crate::mpc::{Computation, ComputationOutcome, ComputationRequest, Revealed, SecretStore};
use crate::token::TokenLedger;
use crate::types::{Address, Amount, LotteryId, RequestId, SecretVarId, Timestamp, TxContext};
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotteryStatus {
    Open,
    Closed,
}

/// public events that drive the status machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusEvent {
    TicketsPurchased,
    Drawn,
}

impl LotteryStatus {
    /// next status after `event`, or why the event is not allowed
    pub fn apply(self, event: StatusEvent) -> Result<LotteryStatus> {
        match (self, event) {
            (LotteryStatus::Open, StatusEvent::TicketsPurchased) => Ok(LotteryStatus::Open),
            (LotteryStatus::Open, StatusEvent::Drawn) => Ok(LotteryStatus::Closed),
            (LotteryStatus::Closed, StatusEvent::TicketsPurchased) => Err(Error::LotteryNotOpen),
            (LotteryStatus::Closed, StatusEvent::Drawn) => Err(Error::AlreadyDrawn),
        }
    }
}

/// public terms of a new lottery
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryParams {
    pub lottery_id: LotteryId,
    /// draws allowed at or after this block time
    pub deadline: Timestamp,
    pub entry_cost: Amount,
    pub declared_prize_pool: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Lottery {
    pub lottery_id: LotteryId,
    pub creator: Address,
    pub deadline: Timestamp,
    pub entry_cost: Amount,
    pub declared_prize_pool: Amount,
    pub status: LotteryStatus,
    /// entropy, ticket count and ticket ledger
    pub secret_state_id: SecretVarId,
    /// escrowed pool, keyed by the lottery id
    pub balance_id: SecretVarId,
    pub participants: BTreeSet<Address>,
}

/// what anyone can read about a lottery
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryView {
    pub lottery_id: LotteryId,
    pub creator: Address,
    pub deadline: Timestamp,
    pub entry_cost: Amount,
    pub declared_prize_pool: Amount,
    pub status: LotteryStatus,
    pub secret_state_id: SecretVarId,
    /// state reference a computation in flight will produce
    pub pending_secret_state_id: Option<SecretVarId>,
    pub balance_id: SecretVarId,
    pub participants: Vec<Address>,
}

impl Lottery {
    pub(crate) fn view(&self, pending_secret_state_id: Option<SecretVarId>) -> LotteryView {
        LotteryView {
            lottery_id: self.lottery_id,
            creator: self.creator,
            deadline: self.deadline,
            entry_cost: self.entry_cost,
            declared_prize_pool: self.declared_prize_pool,
            status: self.status,
            secret_state_id: self.secret_state_id,
            pending_secret_state_id,
            balance_id: self.balance_id,
            participants: self.participants.iter().copied().collect(),
        }
    }
}

impl<T: TokenLedger, S: SecretStore> Ledger<T, S> {
    /// open a lottery funded from the sender's confidential balance.
    ///
    /// `creation` is a [`LotteryCreationSecret`](crate::mpc::LotteryCreationSecret)
    /// input by the sender. the id stays reserved while the computation runs
    /// and the lottery is readable only after finalization
    pub fn create_lottery(
        &mut self,
        ctx: TxContext,
        params: LotteryParams,
        creation: SecretVarId,
    ) -> Result<RequestId> {
        let creator = ctx.sender;
        let lottery_id = params.lottery_id;
        if self.lotteries.contains_key(&lottery_id) || self.reserved_lottery_ids.contains(&lottery_id) {
            return Err(Error::LotteryIdConflict);
        }
        if params.deadline <= ctx.block_time {
            return Err(Error::InvalidDeadline);
        }
        let account = self.accounts.get(&creator).copied().ok_or(Error::AccountNotFound(
            "Cannot create a lottery for an account that does not exist",
        ))?;
        self.require_input(creation, creator, "lottery input belongs to another address")?;
        let entities = vec![EntityId::Account(creator), EntityId::Lottery(lottery_id)];
        self.coordinator.ensure_idle(&entities)?;

        let submission = self.store.submit(ComputationRequest::new(
            Computation::CreateLottery {
                creation,
                creator_balance: account.balance_ref,
                lottery_id,
                prize_pool: params.declared_prize_pool,
            },
            vec![creator, self.address, self.address],
        ))?;
        tracing::debug!(
            request = %submission.request,
            lottery_id,
            %creator,
            deadline = params.deadline,
            "create lottery submitted"
        );

        // placeholders until the computation produces the real references
        let lottery = Lottery {
            lottery_id,
            creator,
            deadline: params.deadline,
            entry_cost: params.entry_cost,
            declared_prize_pool: params.declared_prize_pool,
            status: LotteryStatus::Open,
            secret_state_id: output(&submission.outputs, 2)?,
            balance_id: output(&submission.outputs, 1)?,
            participants: BTreeSet::new(),
        };
        let request = submission.request;
        self.coordinator.begin(
            request,
            entities,
            Pending {
                op: PendingOp::CreateLottery { lottery, creation, previous: account.balance_ref },
                outputs: submission.outputs,
            },
        )?;
        self.reserved_lottery_ids.insert(lottery_id);
        Ok(request)
    }

    /// buy tickets in an open lottery.
    ///
    /// `purchase` is a [`TicketPurchaseSecret`](crate::mpc::TicketPurchaseSecret)
    /// input by the sender; the count, the cost check and the seed stay secret
    pub fn purchase_tickets(
        &mut self,
        ctx: TxContext,
        lottery_id: LotteryId,
        purchase: SecretVarId,
    ) -> Result<RequestId> {
        let buyer = ctx.sender;
        let lottery = self.lotteries.get(&lottery_id).ok_or(Error::LotteryNotFound(lottery_id))?;
        lottery.status.apply(StatusEvent::TicketsPurchased)?;
        if ctx.block_time >= lottery.deadline {
            return Err(Error::DeadlinePassed);
        }
        let (entry_cost, lottery_balance, lottery_state) =
            (lottery.entry_cost, lottery.balance_id, lottery.secret_state_id);
        let account = self
            .accounts
            .get(&buyer)
            .copied()
            .ok_or(Error::AccountNotFound("Cannot purchase lottery tickets"))?;
        self.require_input(purchase, buyer, "Cannot purchase lottery tickets")?;
        let entities = vec![EntityId::Account(buyer), EntityId::Lottery(lottery_id)];
        self.coordinator.ensure_idle(&entities)?;

        let submission = self.store.submit(ComputationRequest::new(
            Computation::PurchaseTickets {
                purchase,
                player_balance: account.balance_ref,
                lottery_balance,
                lottery_state,
                lottery_id,
                entry_cost,
                max_tickets: self.config.max_tickets_per_purchase,
            },
            vec![buyer, self.address, self.address],
        ))?;
        tracing::debug!(request = %submission.request, lottery_id, %buyer, "ticket purchase submitted");

        let request = submission.request;
        self.coordinator.begin(
            request,
            entities,
            Pending {
                op: PendingOp::PurchaseTickets {
                    lottery_id,
                    buyer,
                    purchase,
                    previous: [account.balance_ref, lottery_balance, lottery_state],
                },
                outputs: submission.outputs,
            },
        )?;
        Ok(request)
    }

    /// draw the winner once the deadline is reached. anyone may call it.
    ///
    /// locks the lottery, its creator and every buyer; fails with `Busy` if
    /// any of them has a computation in flight
    pub fn draw_winner(&mut self, ctx: TxContext, lottery_id: LotteryId) -> Result<RequestId> {
        let lottery = self.lotteries.get(&lottery_id).ok_or(Error::LotteryNotFound(lottery_id))?;
        if ctx.block_time < lottery.deadline {
            return Err(Error::DeadlineNotReached);
        }
        lottery.status.apply(StatusEvent::Drawn)?;

        let holders: Vec<Address> = std::iter::once(lottery.creator)
            .chain(lottery.participants.iter().copied().filter(|p| *p != lottery.creator))
            .collect();
        let (previous_state, previous_balance) = (lottery.secret_state_id, lottery.balance_id);

        let accounts = holders
            .iter()
            .map(|owner| {
                self.accounts
                    .get(owner)
                    .map(|a| (*owner, a.balance_ref))
                    .ok_or(Error::AccountNotFound("lottery participant has no account"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut entities = vec![EntityId::Lottery(lottery_id)];
        entities.extend(holders.iter().map(|owner| EntityId::Account(*owner)));
        self.coordinator.ensure_idle(&entities)?;

        let mut output_owners = vec![self.address, self.address];
        output_owners.extend(holders.iter().copied());
        let submission = self.store.submit(ComputationRequest::new(
            Computation::DrawWinner {
                lottery_state: previous_state,
                lottery_balance: previous_balance,
                accounts: accounts.iter().map(|(_, var)| *var).collect(),
            },
            output_owners,
        ))?;
        tracing::debug!(
            request = %submission.request,
            lottery_id,
            holders = holders.len(),
            "draw submitted"
        );

        let request = submission.request;
        self.coordinator.begin(
            request,
            entities,
            Pending {
                op: PendingOp::DrawWinner { lottery_id, previous_state, previous_balance, accounts },
                outputs: submission.outputs,
            },
        )?;
        Ok(request)
    }

    // === finalization ===

    pub(crate) fn finish_create_lottery(
        &mut self,
        mut lottery: Lottery,
        creation: SecretVarId,
        previous: SecretVarId,
        outcome: ComputationOutcome,
    ) -> Result<LedgerEvent> {
        self.reserved_lottery_ids.remove(&lottery.lottery_id);
        self.store.discard(creation);
        let (outputs, revealed) = self.completed(outcome, 3)?;
        if revealed != Revealed::Ok {
            // bad key, taken id and short balance all look the same
            self.discard_all(&outputs);
            return Err(Error::LotteryIdConflict);
        }

        let [creator_balance, balance_id, secret_state_id] =
            [output(&outputs, 0)?, output(&outputs, 1)?, output(&outputs, 2)?];
        self.swap_balance(lottery.creator, previous, creator_balance);
        lottery.balance_id = balance_id;
        lottery.secret_state_id = secret_state_id;
        let event = LedgerEvent::LotteryCreated {
            lottery_id: lottery.lottery_id,
            creator: lottery.creator,
            secret_state_id: lottery.secret_state_id,
        };
        self.lotteries.insert(lottery.lottery_id, lottery);
        Ok(event)
    }

    pub(crate) fn finish_purchase_tickets(
        &mut self,
        lottery_id: LotteryId,
        buyer: Address,
        purchase: SecretVarId,
        previous: [SecretVarId; 3],
        outcome: ComputationOutcome,
    ) -> Result<LedgerEvent> {
        self.store.discard(purchase);
        let (outputs, revealed) = self.completed(outcome, 3)?;
        let rejected = match revealed {
            Revealed::Ok => None,
            Revealed::KeyMismatch => Some(Error::Unauthorized("Cannot purchase lottery tickets")),
            Revealed::InvalidTicketCount => Some(Error::InvalidTicketCount),
            Revealed::InsufficientBalance => {
                Some(Error::InsufficientFunds("Could not purchase lottery ticket"))
            }
            Revealed::KeyRejected => Some(Error::ComputationFailed(
                "unexpected key rejection in ticket purchase".into(),
            )),
        };
        let status = self
            .lotteries
            .get(&lottery_id)
            .ok_or(Error::LotteryNotFound(lottery_id))
            .and_then(|l| l.status.apply(StatusEvent::TicketsPurchased));
        if let Some(e) = rejected.or(status.err()) {
            self.discard_all(&outputs);
            return Err(e);
        }

        let [player_balance, balance_id, secret_state_id] =
            [output(&outputs, 0)?, output(&outputs, 1)?, output(&outputs, 2)?];
        let [previous_player, previous_balance, previous_state] = previous;
        self.swap_balance(buyer, previous_player, player_balance);
        self.discard_all(&[previous_balance, previous_state]);
        let lottery = self
            .lotteries
            .get_mut(&lottery_id)
            .ok_or(Error::LotteryNotFound(lottery_id))?;
        lottery.balance_id = balance_id;
        lottery.secret_state_id = secret_state_id;
        lottery.participants.insert(buyer);

        Ok(LedgerEvent::TicketsPurchased {
            lottery_id,
            buyer,
            secret_state_id: lottery.secret_state_id,
        })
    }

    pub(crate) fn finish_draw_winner(
        &mut self,
        lottery_id: LotteryId,
        previous_state: SecretVarId,
        previous_balance: SecretVarId,
        accounts: Vec<(Address, SecretVarId)>,
        outcome: ComputationOutcome,
    ) -> Result<LedgerEvent> {
        let (outputs, _) = self.completed(outcome, 2 + accounts.len())?;
        let closed = self
            .lotteries
            .get(&lottery_id)
            .ok_or(Error::LotteryNotFound(lottery_id))
            .and_then(|l| l.status.apply(StatusEvent::Drawn));
        let closed = match closed {
            Ok(status) => status,
            Err(e) => {
                self.discard_all(&outputs);
                return Err(e);
            }
        };

        let (secret_state_id, balance_id) = (output(&outputs, 0)?, output(&outputs, 1)?);
        for (index, (owner, previous)) in accounts.into_iter().enumerate() {
            self.swap_balance(owner, previous, output(&outputs, 2 + index)?);
        }
        self.discard_all(&[previous_state, previous_balance]);
        let lottery = self
            .lotteries
            .get_mut(&lottery_id)
            .ok_or(Error::LotteryNotFound(lottery_id))?;
        lottery.secret_state_id = secret_state_id;
        lottery.balance_id = balance_id;
        lottery.status = closed;

        Ok(LedgerEvent::LotteryClosed { lottery_id, secret_state_id: lottery.secret_state_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::fixtures::*;
    use crate::mpc::LotteryState;
    use crate::ErrorKind;

    const LOTTERY: LotteryId = 500;

    /// alice (key 11) funds 1000 and opens lottery 500 at cost 100, prize 1;
    /// bob (key 12) holds 1000
    fn funded() -> TestLedger {
        let mut ledger = ledger();
        open_account(&mut ledger, ALICE, 11);
        deposit(&mut ledger, ALICE, 1000);
        open_account(&mut ledger, BOB, 12);
        deposit(&mut ledger, BOB, 1000);
        let creation = creation_input(&mut ledger, ALICE, LOTTERY, 11);
        ledger.create_lottery(now(ALICE), params(LOTTERY, 100, 1), creation).unwrap();
        settle_one(&mut ledger).unwrap();
        ledger.take_events();
        ledger
    }

    fn buy(ledger: &mut TestLedger, buyer: Address, key: u128, count: u128, seed: u128) -> Result<LedgerEvent> {
        let purchase = ticket_input(ledger, buyer, LOTTERY, key, count, seed);
        ledger.purchase_tickets(now(buyer), LOTTERY, purchase)?;
        settle_one(ledger)
    }

    fn state(ledger: &TestLedger) -> LotteryState {
        let var = ledger.get_lottery(LOTTERY).unwrap().secret_state_id;
        reveal(ledger, var).as_lottery_state().unwrap().clone()
    }

    #[test]
    fn test_status_machine() {
        use LotteryStatus::*;
        use StatusEvent::*;

        assert_eq!(Open.apply(TicketsPurchased), Ok(Open));
        assert_eq!(Open.apply(Drawn), Ok(Closed));
        assert_eq!(Closed.apply(TicketsPurchased), Err(Error::LotteryNotOpen));
        assert_eq!(Closed.apply(Drawn), Err(Error::AlreadyDrawn));
    }

    #[test]
    fn test_create_lottery_escrows_prize() {
        let ledger = funded();
        let view = ledger.get_lottery(LOTTERY).unwrap();

        assert_eq!(view.status, LotteryStatus::Open);
        assert_eq!(view.creator, ALICE);
        assert_eq!(view.pending_secret_state_id, None);
        assert_eq!(credits(&ledger, ALICE), 999);
        assert_eq!(lottery_credits(&ledger, LOTTERY), 1);
        assert_eq!(state(&ledger).tickets_sold, 0);
    }

    #[test]
    fn test_lottery_id_is_reserved_while_pending() {
        let mut ledger = ledger();
        open_account(&mut ledger, ALICE, 11);
        deposit(&mut ledger, ALICE, 100);
        open_account(&mut ledger, BOB, 12);

        let creation = creation_input(&mut ledger, ALICE, LOTTERY, 11);
        ledger.create_lottery(now(ALICE), params(LOTTERY, 1, 1), creation).unwrap();
        assert_eq!(ledger.get_lottery(LOTTERY), None);

        let other = creation_input(&mut ledger, BOB, LOTTERY, 12);
        assert_eq!(
            ledger.create_lottery(now(BOB), params(LOTTERY, 1, 0), other),
            Err(Error::LotteryIdConflict)
        );

        settle(&mut ledger);
        assert!(ledger.get_lottery(LOTTERY).is_some());
        let again = creation_input(&mut ledger, BOB, LOTTERY, 12);
        assert_eq!(
            ledger.create_lottery(now(BOB), params(LOTTERY, 1, 0), again),
            Err(Error::LotteryIdConflict)
        );
    }

    #[test]
    fn test_create_lottery_failures_are_indistinguishable() {
        let mut ledger = ledger();
        open_account(&mut ledger, ALICE, 11);
        deposit(&mut ledger, ALICE, 10);

        // prize larger than balance
        let creation = creation_input(&mut ledger, ALICE, LOTTERY, 11);
        ledger.create_lottery(now(ALICE), params(LOTTERY, 1, 11), creation).unwrap();
        let short = settle_one(&mut ledger).unwrap_err();

        // wrong account key
        let creation = creation_input(&mut ledger, ALICE, LOTTERY, 99);
        ledger.create_lottery(now(ALICE), params(LOTTERY, 1, 1), creation).unwrap();
        let wrong_key = settle_one(&mut ledger).unwrap_err();

        // lottery id equal to an account key
        let creation = creation_input(&mut ledger, ALICE, 11, 11);
        ledger.create_lottery(now(ALICE), params(11, 1, 1), creation).unwrap();
        let clash = settle_one(&mut ledger).unwrap_err();

        assert_eq!(short, Error::LotteryIdConflict);
        assert_eq!(wrong_key, Error::LotteryIdConflict);
        assert_eq!(clash, Error::LotteryIdConflict);
        assert_eq!(credits(&ledger, ALICE), 10);
        // the id is free again after a rejected creation
        assert!(ledger.lotteries().is_empty());
        let creation = creation_input(&mut ledger, ALICE, LOTTERY, 11);
        ledger.create_lottery(now(ALICE), params(LOTTERY, 1, 1), creation).unwrap();
        assert!(settle_one(&mut ledger).is_ok());
    }

    #[test]
    fn test_create_lottery_preconditions() {
        let mut ledger = ledger();
        let creation = creation_input(&mut ledger, ALICE, LOTTERY, 11);
        assert_eq!(
            ledger.create_lottery(now(ALICE), params(LOTTERY, 1, 1), creation).unwrap_err().to_string(),
            "Cannot create a lottery for an account that does not exist"
        );

        open_account(&mut ledger, ALICE, 11);
        let mut past = params(LOTTERY, 1, 1);
        past.deadline = NOW;
        assert_eq!(
            ledger.create_lottery(now(ALICE), past, creation),
            Err(Error::InvalidDeadline)
        );
    }

    #[test]
    fn test_purchase_tickets_moves_cost_into_pool() {
        let mut ledger = funded();

        let event = buy(&mut ledger, BOB, 12, 5, 1234).unwrap();

        assert!(matches!(event, LedgerEvent::TicketsPurchased { lottery_id: LOTTERY, buyer: BOB, .. }));
        assert_eq!(credits(&ledger, BOB), 500);
        assert_eq!(lottery_credits(&ledger, LOTTERY), 501);
        let state = state(&ledger);
        assert_eq!(state.tickets_sold, 5);
        assert_eq!(state.ticket_ledger.len(), 1);
        assert_eq!(ledger.get_lottery(LOTTERY).unwrap().participants, vec![BOB]);
    }

    #[test]
    fn test_entropy_accumulates_seeds() {
        let mut ledger = funded();
        let initial = state(&ledger).entropy;

        buy(&mut ledger, BOB, 12, 1, 10).unwrap();
        buy(&mut ledger, ALICE, 11, 2, 20).unwrap();

        let state = state(&ledger);
        assert_eq!(state.entropy, initial.wrapping_add(30));
        assert_eq!(state.tickets_sold, 3);
    }

    #[test]
    fn test_pending_state_id_tracks_purchase() {
        let mut ledger = funded();
        let before = ledger.get_lottery(LOTTERY).unwrap();

        let purchase = ticket_input(&mut ledger, BOB, LOTTERY, 12, 1, 0);
        ledger.purchase_tickets(now(BOB), LOTTERY, purchase).unwrap();
        let pending = ledger.get_lottery(LOTTERY).unwrap();

        assert_eq!(pending.secret_state_id, before.secret_state_id);
        let next = pending.pending_secret_state_id.unwrap();

        settle(&mut ledger);
        let after = ledger.get_lottery(LOTTERY).unwrap();
        assert_eq!(after.secret_state_id, next);
        assert_eq!(after.pending_secret_state_id, None);
    }

    #[test]
    fn test_purchase_rejections() {
        let mut ledger = funded();

        // bob claims alice's key
        assert_eq!(
            buy(&mut ledger, BOB, 11, 1, 0).unwrap_err().to_string(),
            "Cannot purchase lottery tickets"
        );
        assert_eq!(
            buy(&mut ledger, BOB, 12, 11, 0).unwrap_err().to_string(),
            "Could not purchase lottery ticket"
        );
        assert_eq!(buy(&mut ledger, BOB, 12, 0, 0), Err(Error::InvalidTicketCount));

        assert_eq!(credits(&ledger, BOB), 1000);
        assert_eq!(lottery_credits(&ledger, LOTTERY), 1);
        assert!(ledger.get_lottery(LOTTERY).unwrap().participants.is_empty());
    }

    #[test]
    fn test_purchase_public_preconditions() {
        let mut ledger = funded();
        let purchase = ticket_input(&mut ledger, CAROL, LOTTERY, 13, 1, 0);
        assert_eq!(
            ledger.purchase_tickets(now(CAROL), LOTTERY, purchase).unwrap_err().to_string(),
            "Cannot purchase lottery tickets"
        );

        let purchase = ticket_input(&mut ledger, BOB, LOTTERY, 12, 1, 0);
        assert_eq!(
            ledger.purchase_tickets(at(BOB, DEADLINE), LOTTERY, purchase),
            Err(Error::DeadlinePassed)
        );
        assert_eq!(
            ledger.purchase_tickets(now(BOB), 999, purchase),
            Err(Error::LotteryNotFound(999))
        );
        // someone else's secret input
        let err = ledger.purchase_tickets(now(ALICE), LOTTERY, purchase).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_draw_before_deadline_fails() {
        let mut ledger = funded();
        buy(&mut ledger, BOB, 12, 5, 7).unwrap();

        let err = ledger.draw_winner(at(CAROL, DEADLINE - 1), LOTTERY).unwrap_err();
        assert_eq!(err.to_string(), "Cannot draw a winner before the lottery deadline!");
        assert_eq!(ledger.get_lottery(LOTTERY).unwrap().status, LotteryStatus::Open);
    }

    #[test]
    fn test_draw_pays_single_buyer_and_closes() {
        let mut ledger = funded();
        buy(&mut ledger, BOB, 12, 5, 7).unwrap();

        ledger.draw_winner(at(CAROL, DEADLINE), LOTTERY).unwrap();
        // nothing changes publicly until finalization
        assert_eq!(ledger.get_lottery(LOTTERY).unwrap().status, LotteryStatus::Open);
        assert!(ledger.get_lottery(LOTTERY).unwrap().pending_secret_state_id.is_some());

        let event = settle_one(&mut ledger).unwrap();
        assert!(matches!(event, LedgerEvent::LotteryClosed { lottery_id: LOTTERY, .. }));
        assert_eq!(ledger.get_lottery(LOTTERY).unwrap().status, LotteryStatus::Closed);
        assert_eq!(credits(&ledger, BOB), 500 + 501);
        assert_eq!(credits(&ledger, ALICE), 999);
        assert_eq!(lottery_credits(&ledger, LOTTERY), 0);

        assert_eq!(ledger.draw_winner(at(CAROL, DEADLINE), LOTTERY), Err(Error::AlreadyDrawn));
        let purchase = ticket_input(&mut ledger, BOB, LOTTERY, 12, 1, 0);
        assert_eq!(
            ledger.purchase_tickets(now(BOB), LOTTERY, purchase),
            Err(Error::LotteryNotOpen)
        );
    }

    #[test]
    fn test_draw_rewrites_every_holder() {
        let mut ledger = funded();
        buy(&mut ledger, BOB, 12, 2, 3).unwrap();
        let alice_before = ledger.get_account(ALICE).unwrap();
        let bob_before = ledger.get_account(BOB).unwrap();

        ledger.draw_winner(at(BOB, DEADLINE), LOTTERY).unwrap();
        settle_one(&mut ledger).unwrap();

        // both references change, so the winner is not visible publicly
        assert_ne!(ledger.get_account(ALICE).unwrap(), alice_before);
        assert_ne!(ledger.get_account(BOB).unwrap(), bob_before);
        assert_eq!(credits(&ledger, ALICE) + credits(&ledger, BOB), 999 + 800 + 201);
    }

    #[test]
    fn test_draw_without_tickets_refunds_creator() {
        let mut ledger = funded();

        ledger.draw_winner(at(ALICE, DEADLINE), LOTTERY).unwrap();
        settle_one(&mut ledger).unwrap();

        assert_eq!(credits(&ledger, ALICE), 1000);
        assert_eq!(ledger.get_lottery(LOTTERY).unwrap().status, LotteryStatus::Closed);
    }

    #[test]
    fn test_draw_busy_while_holder_pending() {
        let mut ledger = funded();
        buy(&mut ledger, BOB, 12, 1, 0).unwrap();

        ledger.redeem_credits(now(BOB), 10).unwrap();
        assert_eq!(
            ledger.draw_winner(at(CAROL, DEADLINE), LOTTERY),
            Err(Error::Busy(EntityId::Account(BOB)))
        );

        settle(&mut ledger);
        ledger.draw_winner(at(CAROL, DEADLINE), LOTTERY).unwrap();
        assert!(settle_one(&mut ledger).is_ok());
    }

    #[test]
    fn test_lottery_busy_while_purchase_pending() {
        let mut ledger = funded();
        let before = ledger.get_lottery(LOTTERY).unwrap();

        let purchase = ticket_input(&mut ledger, BOB, LOTTERY, 12, 3, 9);
        let request = ledger.purchase_tickets(now(BOB), LOTTERY, purchase).unwrap();
        let pending = ledger.get_lottery(LOTTERY).unwrap();
        assert!(pending.pending_secret_state_id.is_some());

        let second = ticket_input(&mut ledger, ALICE, LOTTERY, 11, 1, 4);
        assert_eq!(
            ledger.purchase_tickets(now(ALICE), LOTTERY, second),
            Err(Error::Busy(EntityId::Lottery(LOTTERY)))
        );
        assert_eq!(
            ledger.draw_winner(at(CAROL, DEADLINE), LOTTERY),
            Err(Error::Busy(EntityId::Lottery(LOTTERY)))
        );

        // the rejected calls left the pending purchase untouched
        assert_eq!(ledger.get_lottery(LOTTERY), Some(pending.clone()));
        assert_eq!(pending.secret_state_id, before.secret_state_id);
        assert_eq!(ledger.in_flight(), vec![request]);
        assert_eq!(credits(&ledger, ALICE), 999);

        assert!(settle_one(&mut ledger).is_ok());
        let view = ledger.get_lottery(LOTTERY).unwrap();
        assert_eq!(Some(view.secret_state_id), pending.pending_secret_state_id);
        assert_eq!(state(&ledger).tickets_sold, 3);
        assert_eq!(credits(&ledger, BOB), 700);
    }

    #[test]
    fn test_failed_draw_keeps_lottery_open() {
        let mut ledger = funded();
        buy(&mut ledger, BOB, 12, 1, 0).unwrap();
        let request = ledger.draw_winner(at(CAROL, DEADLINE), LOTTERY).unwrap();

        ledger.store_mut().abort(request, "party offline").unwrap();
        let completion = ledger.on_complete(request).unwrap();

        assert_eq!(completion.outcome.unwrap_err().kind(), ErrorKind::ComputationFailure);
        assert_eq!(ledger.get_lottery(LOTTERY).unwrap().status, LotteryStatus::Open);
        assert_eq!(lottery_credits(&ledger, LOTTERY), 101);
        assert_eq!(credits(&ledger, BOB), 900);
    }
}
