//! public identifiers shared by the ledger, token and mpc layers
//!
//! nothing in here is confidential: addresses, ids and amounts that appear in
//! these types are visible to every observer of the contract state.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// token amount in smallest unit
pub type Amount = u128;

/// secret 128-bit key identifying a confidential balance
pub type AccountKey = u128;

/// caller-chosen lottery identifier
pub type LotteryId = u128;

/// unix timestamp in milliseconds
pub type Timestamp = i64;

/// 32-byte account or contract address
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const fn from_raw(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// address with every byte set to `byte` (handy for fixtures)
    pub const fn repeat(byte: u8) -> Self {
        Self([byte; 32])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| Error::InvalidAddress(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| Error::InvalidAddress(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

/// opaque reference to a confidential value held by the secret backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecretVarId(pub u64);

impl fmt::Display for SecretVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "svar#{}", self.0)
    }
}

/// identifier of one submitted confidential computation
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// public context of the transaction invoking a ledger operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxContext {
    /// signer of the transaction
    pub sender: Address,
    /// block production time in milliseconds
    pub block_time: Timestamp,
}

impl TxContext {
    pub fn new(sender: Address, block_time: Timestamp) -> Self {
        Self { sender, block_time }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Address::repeat(0xab);
        let parsed = Address::from_hex(&format!("0x{}", addr.to_hex())).unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn test_address_rejects_short_hex() {
        assert!(matches!(Address::from_hex("abcd"), Err(Error::InvalidAddress(_))));
        assert!(matches!(Address::from_hex("zz"), Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn test_display_is_abbreviated() {
        let addr = Address::repeat(1);
        assert_eq!(addr.to_string(), "0x0101010101010101");
        assert_eq!(SecretVarId(7).to_string(), "svar#7");
    }
}
