//! pending-computation coordinator
//!
//! every account and every lottery is its own serialized resource: at most
//! one confidential computation may be in flight against it. the coordinator
//! keeps one request id per busy entity, so two overlapping mutations of the
//! same entity cannot be recorded at all. a second request is rejected with
//! [`Error::Busy`], never queued.
//!
//! ```text
//!   Idle ──begin──▶ Pending(request) ──finish──▶ Idle
//!                        │
//!                        └── begin ──▶ Busy
//! ```

use core::fmt;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{Address, LotteryId, RequestId};
use crate::{Error, Result};

/// anything holding confidential state that mutations must serialize on
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityId {
    Account(Address),
    Lottery(LotteryId),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Account(owner) => write!(f, "account {}", owner),
            EntityId::Lottery(id) => write!(f, "lottery {}", id),
        }
    }
}

/// whether an entity has a confidential mutation outstanding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputationHandle {
    Idle,
    Pending(RequestId),
}

impl ComputationHandle {
    pub fn is_idle(&self) -> bool {
        matches!(self, ComputationHandle::Idle)
    }
}

/// bookkeeping for one outstanding request
#[derive(Debug)]
pub struct InFlight<P> {
    /// every entity the request locks
    pub entities: Vec<EntityId>,
    /// what to do with the outcome
    pub payload: P,
}

pub struct Coordinator<P> {
    handles: HashMap<EntityId, RequestId>,
    in_flight: BTreeMap<RequestId, InFlight<P>>,
}

impl<P> Coordinator<P> {
    pub fn new() -> Self {
        Self { handles: HashMap::new(), in_flight: BTreeMap::new() }
    }

    pub fn handle(&self, entity: EntityId) -> ComputationHandle {
        match self.handles.get(&entity) {
            Some(request) => ComputationHandle::Pending(*request),
            None => ComputationHandle::Idle,
        }
    }

    /// fail with `Busy` on the first entity that has a request in flight
    pub fn ensure_idle(&self, entities: &[EntityId]) -> Result<()> {
        match entities.iter().find(|e| self.handles.contains_key(*e)) {
            Some(entity) => Err(Error::Busy(*entity)),
            None => Ok(()),
        }
    }

    /// lock `entities` for `request`; fails with `Busy` if any is already locked
    pub fn begin(&mut self, request: RequestId, entities: Vec<EntityId>, payload: P) -> Result<()> {
        self.ensure_idle(&entities)?;
        if self.in_flight.contains_key(&request) {
            return Err(Error::ComputationFailed(format!("{} submitted twice", request)));
        }
        for entity in &entities {
            self.handles.insert(*entity, request);
        }
        self.in_flight.insert(request, InFlight { entities, payload });
        Ok(())
    }

    /// release every lock held by `request` and hand back its payload
    pub fn finish(&mut self, request: RequestId) -> Result<InFlight<P>> {
        let in_flight = self.in_flight.remove(&request).ok_or(Error::UnknownRequest(request))?;
        for entity in &in_flight.entities {
            self.handles.remove(entity);
        }
        Ok(in_flight)
    }

    pub fn pending(&self, request: RequestId) -> Option<&InFlight<P>> {
        self.in_flight.get(&request)
    }

    /// outstanding requests, oldest first
    pub fn in_flight(&self) -> impl Iterator<Item = RequestId> + '_ {
        self.in_flight.keys().copied()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }
}

impl<P> Default for Coordinator<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: EntityId = EntityId::Account(Address::repeat(1));
    const BOB: EntityId = EntityId::Account(Address::repeat(2));
    const LOTTERY: EntityId = EntityId::Lottery(500);

    #[test]
    fn test_idle_pending_idle() {
        let mut coordinator = Coordinator::new();
        assert_eq!(coordinator.handle(ALICE), ComputationHandle::Idle);

        coordinator.begin(RequestId(1), vec![ALICE], "mint").unwrap();
        assert_eq!(coordinator.handle(ALICE), ComputationHandle::Pending(RequestId(1)));

        let done = coordinator.finish(RequestId(1)).unwrap();
        assert_eq!(done.payload, "mint");
        assert!(coordinator.handle(ALICE).is_idle());
        assert!(coordinator.is_idle());
    }

    #[test]
    fn test_second_request_is_busy() {
        let mut coordinator = Coordinator::new();
        coordinator.begin(RequestId(1), vec![ALICE, LOTTERY], ()).unwrap();

        assert_eq!(coordinator.ensure_idle(&[BOB, LOTTERY]), Err(Error::Busy(LOTTERY)));
        assert_eq!(
            coordinator.begin(RequestId(2), vec![ALICE], ()),
            Err(Error::Busy(ALICE))
        );
        // the rejected request left the first lock alone
        assert_eq!(coordinator.handle(ALICE), ComputationHandle::Pending(RequestId(1)));
    }

    #[test]
    fn test_distinct_entities_overlap() {
        let mut coordinator = Coordinator::new();
        coordinator.begin(RequestId(1), vec![ALICE], ()).unwrap();
        coordinator.begin(RequestId(2), vec![BOB], ()).unwrap();

        assert_eq!(coordinator.in_flight().collect::<Vec<_>>(), vec![RequestId(1), RequestId(2)]);
        coordinator.finish(RequestId(2)).unwrap();
        assert_eq!(coordinator.handle(ALICE), ComputationHandle::Pending(RequestId(1)));
    }

    #[test]
    fn test_finish_unknown_request() {
        let mut coordinator: Coordinator<()> = Coordinator::new();
        assert!(matches!(
            coordinator.finish(RequestId(9)),
            Err(Error::UnknownRequest(RequestId(9)))
        ));
    }

    #[test]
    fn test_entity_display() {
        assert_eq!(LOTTERY.to_string(), "lottery 500");
        assert_eq!(ALICE.to_string(), "account 0x0101010101010101");
    }
}
