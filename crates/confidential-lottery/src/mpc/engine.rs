//! memory mpc - in-process secret store
//!
//! every variable is held as additive shares across `parties` simulated
//! computing parties. computations queue on submit and only run when the
//! host drives them (`run_next`, `run`, `run_all`), which lets tests observe
//! the gap between submission and finalization. NOT a distributed protocol:
//! all parties live in one process.

use std::collections::{BTreeMap, HashMap, VecDeque};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::config::LedgerConfig;
use crate::mpc::circuits::{self, Computation, Evaluation, Revealed};
use crate::mpc::shares::SharedValue;
use crate::mpc::values::{SecretValue, ValueKind};
use crate::mpc::{ComputationOutcome, ComputationRequest, SecretStore, Submission};
use crate::types::{AccountKey, Address, RequestId, SecretVarId};
use crate::{Error, Result};

struct Variable {
    owner: Address,
    shared: SharedValue,
    /// recorded when the shares were dealt, checked before every use
    commitment: [u8; 32],
}

struct Queued {
    request: ComputationRequest,
    outputs: Vec<SecretVarId>,
}

pub struct MemoryMpc {
    parties: usize,
    rng: ChaCha20Rng,
    auxiliary_reader: Option<Address>,
    variables: BTreeMap<SecretVarId, Variable>,
    queue: VecDeque<RequestId>,
    queued: HashMap<RequestId, Queued>,
    outcomes: HashMap<RequestId, ComputationOutcome>,
    next_var: u64,
    next_request: u64,
}

impl MemoryMpc {
    /// create an engine with fresh os randomness
    pub fn new(parties: usize) -> Self {
        Self::with_rng(parties, ChaCha20Rng::from_entropy())
    }

    /// create with a fixed seed (for testing)
    pub fn with_seed(parties: usize, seed: u64) -> Self {
        Self::with_rng(parties, ChaCha20Rng::seed_from_u64(seed))
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        let mut mpc = Self::new(config.mpc_parties);
        mpc.auxiliary_reader = config.auxiliary_reader;
        Ok(mpc)
    }

    fn with_rng(parties: usize, rng: ChaCha20Rng) -> Self {
        Self {
            parties: parties.max(2),
            rng,
            auxiliary_reader: None,
            variables: BTreeMap::new(),
            queue: VecDeque::new(),
            queued: HashMap::new(),
            outcomes: HashMap::new(),
            next_var: 1,
            next_request: 1,
        }
    }

    /// allow `reader` to reconstruct any variable
    pub fn with_auxiliary_reader(mut self, reader: Address) -> Self {
        self.auxiliary_reader = Some(reader);
        self
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// number of computations waiting to run
    pub fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    pub fn live_variables(&self) -> usize {
        self.variables.len()
    }

    /// run the oldest queued computation, if any
    pub fn run_next(&mut self) -> Option<RequestId> {
        let request = self.queue.pop_front()?;
        self.execute(request);
        Some(request)
    }

    /// run one specific queued computation, out of order if needed
    pub fn run(&mut self, request: RequestId) -> Result<()> {
        let position = self
            .queue
            .iter()
            .position(|r| *r == request)
            .ok_or(Error::UnknownRequest(request))?;
        self.queue.remove(position);
        self.execute(request);
        Ok(())
    }

    /// run everything queued, in submission order
    pub fn run_all(&mut self) -> Vec<RequestId> {
        let mut ran = Vec::with_capacity(self.queue.len());
        while let Some(request) = self.run_next() {
            ran.push(request);
        }
        ran
    }

    /// fail a queued computation without running it
    pub fn abort(&mut self, request: RequestId, reason: impl Into<String>) -> Result<()> {
        let position = self
            .queue
            .iter()
            .position(|r| *r == request)
            .ok_or(Error::UnknownRequest(request))?;
        self.queue.remove(position);
        self.queued.remove(&request);
        let reason = reason.into();
        tracing::warn!(%request, %reason, "computation aborted");
        self.outcomes.insert(request, ComputationOutcome::Failed { reason });
        Ok(())
    }

    /// reconstruct a variable for its owner or the auxiliary reader
    pub fn reveal_to(&self, requester: Address, var: SecretVarId) -> Result<SecretValue> {
        let variable = self.variables.get(&var).ok_or(Error::UnknownVariable(var))?;
        if requester != variable.owner && Some(requester) != self.auxiliary_reader {
            return Err(Error::Unauthorized("only the owner may read a confidential variable"));
        }
        verify(var, variable)?;
        variable.shared.reconstruct()
    }

    #[cfg(test)]
    pub(crate) fn corrupt(&mut self, var: SecretVarId) {
        if let Some(variable) = self.variables.get_mut(&var) {
            variable.shared.corrupt(0, 0);
        }
    }

    fn store(&mut self, id: SecretVarId, owner: Address, shared: SharedValue) {
        let commitment = shared.commitment();
        self.variables.insert(id, Variable { owner, shared, commitment });
    }

    fn reserve_var(&mut self) -> SecretVarId {
        let id = SecretVarId(self.next_var);
        self.next_var += 1;
        id
    }

    fn execute(&mut self, request: RequestId) {
        let Some(queued) = self.queued.remove(&request) else {
            return;
        };
        let name = queued.request.computation.name();
        let outcome = match self.evaluate(&queued) {
            Ok(revealed) => {
                tracing::debug!(%request, computation = name, ?revealed, "computation completed");
                ComputationOutcome::Completed { outputs: queued.outputs, revealed }
            }
            Err(e) => {
                tracing::warn!(%request, computation = name, error = %e, "computation failed");
                ComputationOutcome::Failed { reason: e.to_string() }
            }
        };
        self.outcomes.insert(request, outcome);
    }

    fn evaluate(&mut self, queued: &Queued) -> Result<Revealed> {
        let computation = &queued.request.computation;
        let inputs = computation.inputs();
        for var in &inputs {
            let variable = self.variables.get(var).ok_or(Error::UnknownVariable(*var))?;
            verify(*var, variable)?;
        }

        // linear: parties adjust their own shares, nothing is reconstructed
        if let Computation::MintCredits { balance, amount } = computation {
            let mut shared = self.variables[balance].shared.clone();
            shared.add_public(1, *amount)?;
            shared.rerandomize(&mut self.rng);
            self.store(queued.outputs[0], queued.request.output_owners[0], shared);
            return Ok(Revealed::Ok);
        }

        let values = inputs
            .iter()
            .map(|var| self.variables[var].shared.reconstruct())
            .collect::<Result<Vec<_>>>()?;
        let known_keys = if computation.scans_account_keys() {
            self.balance_keys()?
        } else {
            Vec::new()
        };

        let Evaluation { outputs, revealed } = circuits::evaluate(computation, &values, &known_keys)?;
        if outputs.len() != queued.outputs.len() {
            return Err(Error::ComputationFailed(format!(
                "{} produced {} outputs, expected {}",
                computation.name(),
                outputs.len(),
                queued.outputs.len()
            )));
        }

        for ((value, id), owner) in outputs
            .iter()
            .zip(&queued.outputs)
            .zip(&queued.request.output_owners)
        {
            let shared = SharedValue::share(value, self.parties, &mut self.rng);
            self.store(*id, *owner, shared);
        }
        Ok(revealed)
    }

    fn balance_keys(&self) -> Result<Vec<AccountKey>> {
        self.variables
            .values()
            .filter(|v| v.shared.kind() == ValueKind::Balance)
            .map(|v| match v.shared.reconstruct()? {
                SecretValue::Balance(b) => Ok(b.account_key),
                _ => Err(Error::ComputationFailed("balance variable has wrong layout".into())),
            })
            .collect()
    }
}

fn verify(var: SecretVarId, variable: &Variable) -> Result<()> {
    if variable.shared.commitment() != variable.commitment {
        return Err(Error::ComputationFailed(format!("share commitment mismatch for {}", var)));
    }
    Ok(())
}

impl SecretStore for MemoryMpc {
    fn input(&mut self, owner: Address, value: SecretValue) -> Result<SecretVarId> {
        let id = self.reserve_var();
        let shared = SharedValue::share(&value, self.parties, &mut self.rng);
        self.store(id, owner, shared);
        tracing::trace!(var = %id, %owner, kind = ?value.kind(), "secret input");
        Ok(id)
    }

    fn submit(&mut self, request: ComputationRequest) -> Result<Submission> {
        let computation = &request.computation;
        for (var, expected) in computation.inputs().into_iter().zip(computation.input_kinds()) {
            let variable = self.variables.get(&var).ok_or(Error::UnknownVariable(var))?;
            if variable.shared.kind() != expected {
                return Err(Error::ComputationFailed(format!(
                    "{}: {} is {:?}, expected {:?}",
                    computation.name(),
                    var,
                    variable.shared.kind(),
                    expected
                )));
            }
        }
        let output_count = computation.output_kinds().len();
        if request.output_owners.len() != output_count {
            return Err(Error::ComputationFailed(format!(
                "{}: {} output owners for {} outputs",
                computation.name(),
                request.output_owners.len(),
                output_count
            )));
        }

        let id = RequestId(self.next_request);
        self.next_request += 1;
        let outputs: Vec<_> = (0..output_count).map(|_| self.reserve_var()).collect();

        tracing::debug!(request = %id, computation = computation.name(), "computation queued");
        self.queued.insert(id, Queued { request, outputs: outputs.clone() });
        self.queue.push_back(id);
        Ok(Submission { request: id, outputs })
    }

    fn poll(&mut self, request: RequestId) -> Option<ComputationOutcome> {
        self.outcomes.remove(&request)
    }

    fn discard(&mut self, var: SecretVarId) {
        self.variables.remove(&var);
    }

    fn owner(&self, var: SecretVarId) -> Option<Address> {
        self.variables.get(&var).map(|v| v.owner)
    }

    fn kind(&self, var: SecretVarId) -> Option<ValueKind> {
        self.variables.get(&var).map(|v| v.shared.kind())
    }

    fn commitment(&self, var: SecretVarId) -> Option<[u8; 32]> {
        self.variables.get(&var).map(|v| v.commitment)
    }
}
