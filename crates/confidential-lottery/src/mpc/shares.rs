//! additive secret sharing over Z/2^128
//!
//! each word `w` is split into `n` shares `s_0 .. s_{n-1}` with
//! `s_0 + ... + s_{n-1} = w (mod 2^128)`. any `n - 1` shares are uniformly
//! random and say nothing about `w`; reconstruction needs all of them.
//!
//! linear operations (adding a public constant, adding two shared words)
//! run locally on each party's shares without reconstruction.

use rand::RngCore;

use crate::mpc::values::{SecretValue, ValueKind};
use crate::{Error, Result};

/// split one word into `parties` additive shares
pub fn split_word<R: RngCore>(word: u128, parties: usize, rng: &mut R) -> Vec<u128> {
    let mut shares = Vec::with_capacity(parties);
    let mut sum = 0u128;
    for _ in 1..parties {
        let share = random_word(rng);
        sum = sum.wrapping_add(share);
        shares.push(share);
    }
    shares.push(word.wrapping_sub(sum));
    shares
}

/// recombine additive shares of one word
pub fn combine_word(shares: &[u128]) -> u128 {
    shares.iter().fold(0u128, |acc, s| acc.wrapping_add(*s))
}

fn random_word<R: RngCore>(rng: &mut R) -> u128 {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    u128::from_le_bytes(bytes)
}

/// a confidential value as held by the computing parties
///
/// `parties[i][j]` is party `i`'s share of word `j`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedValue {
    kind: ValueKind,
    parties: Vec<Vec<u128>>,
}

impl SharedValue {
    pub fn share<R: RngCore>(value: &SecretValue, parties: usize, rng: &mut R) -> Self {
        let words = value.to_words();
        let mut by_party = vec![Vec::with_capacity(words.len()); parties];
        for word in words {
            for (party, share) in split_word(word, parties, rng).into_iter().enumerate() {
                by_party[party].push(share);
            }
        }
        Self { kind: value.kind(), parties: by_party }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn party_count(&self) -> usize {
        self.parties.len()
    }

    pub fn word_count(&self) -> usize {
        self.parties.first().map_or(0, Vec::len)
    }

    /// shares held by one party
    pub fn party_shares(&self, party: usize) -> Option<&[u128]> {
        self.parties.get(party).map(Vec::as_slice)
    }

    /// combine every party's shares back into the plaintext value
    pub fn reconstruct(&self) -> Result<SecretValue> {
        let words = self.word_count();
        if self.parties.iter().any(|p| p.len() != words) {
            return Err(Error::ComputationFailed("ragged share vectors".into()));
        }
        let plain: Vec<u128> = (0..words)
            .map(|j| combine_word(&self.parties.iter().map(|p| p[j]).collect::<Vec<_>>()))
            .collect();
        SecretValue::from_words(self.kind, &plain)
    }

    /// add a public constant to word `index`; only party 0 adjusts its share
    pub fn add_public(&mut self, index: usize, constant: u128) -> Result<()> {
        let share = self
            .parties
            .first_mut()
            .and_then(|p| p.get_mut(index))
            .ok_or_else(|| Error::ComputationFailed(format!("word {} out of range", index)))?;
        *share = share.wrapping_add(constant);
        Ok(())
    }

    /// add a fresh sharing of zero to every word, unlinking the new shares
    /// from the old ones without changing the value
    pub fn rerandomize<R: RngCore>(&mut self, rng: &mut R) {
        let parties = self.parties.len();
        for j in 0..self.word_count() {
            for (party, mask) in split_word(0, parties, rng).into_iter().enumerate() {
                self.parties[party][j] = self.parties[party][j].wrapping_add(mask);
            }
        }
    }

    /// public commitment binding all shares (blake3)
    pub fn commitment(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"confidential-lottery:shares:v1");
        hasher.update(&[kind_tag(self.kind)]);
        hasher.update(&(self.parties.len() as u64).to_le_bytes());
        for party in &self.parties {
            hasher.update(&(party.len() as u64).to_le_bytes());
            for share in party {
                hasher.update(&share.to_le_bytes());
            }
        }
        *hasher.finalize().as_bytes()
    }

    #[cfg(test)]
    pub(crate) fn corrupt(&mut self, party: usize, index: usize) {
        self.parties[party][index] ^= 1;
    }
}

fn kind_tag(kind: ValueKind) -> u8 {
    match kind {
        ValueKind::Balance => 1,
        ValueKind::LotteryState => 2,
        ValueKind::AccountCreation => 3,
        ValueKind::LotteryCreation => 4,
        ValueKind::TicketPurchase => 5,
    }
}
