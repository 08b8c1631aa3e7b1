//! ledger configuration
//!
//! loaded from json, e.g.
//!
//! ```json
//! {
//!   "token_address": "0101010101010101010101010101010101010101010101010101010101010101",
//!   "auxiliary_reader": null,
//!   "mpc_parties": 3
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount};
use crate::{Error, Result};

/// default number of computing parties holding shares
pub const DEFAULT_MPC_PARTIES: usize = 3;

/// default cap on tickets bought in one purchase
pub const DEFAULT_MAX_TICKETS_PER_PURCHASE: u128 = 1_000_000;

/// highest ticket cap a config may set. keeps the running ticket count of a
/// lottery far from the u128 limit even with free entries
pub const TICKET_CAP_LIMIT: u128 = u64::MAX as u128;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// fungible token backing the confidential credits
    #[serde(with = "hex_address")]
    pub token_address: Address,

    /// designated reader allowed to reconstruct any confidential variable.
    /// stopgap for variable ownership display, not needed by the core
    #[serde(default, with = "hex_address_opt")]
    pub auxiliary_reader: Option<Address>,

    /// number of parties each confidential word is split across
    #[serde(default = "default_mpc_parties")]
    pub mpc_parties: usize,

    /// upper bound on `ticket_count` accepted by a single purchase
    #[serde(default = "default_max_tickets")]
    pub max_tickets_per_purchase: Amount,

    /// symbol the token collaborator must report at initialization
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,
}

fn default_mpc_parties() -> usize {
    DEFAULT_MPC_PARTIES
}

fn default_max_tickets() -> Amount {
    DEFAULT_MAX_TICKETS_PER_PURCHASE
}

fn default_token_symbol() -> String {
    "TT".to_string()
}

impl LedgerConfig {
    pub fn new(token_address: Address) -> Self {
        Self {
            token_address,
            auxiliary_reader: None,
            mpc_parties: DEFAULT_MPC_PARTIES,
            max_tickets_per_purchase: DEFAULT_MAX_TICKETS_PER_PURCHASE,
            token_symbol: default_token_symbol(),
        }
    }

    pub fn with_auxiliary_reader(mut self, reader: Address) -> Self {
        self.auxiliary_reader = Some(reader);
        self
    }

    pub fn with_mpc_parties(mut self, parties: usize) -> Self {
        self.mpc_parties = parties;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.mpc_parties < 2 {
            return Err(Error::Config(format!(
                "mpc_parties must be at least 2, got {}",
                self.mpc_parties
            )));
        }
        if self.max_tickets_per_purchase == 0 {
            return Err(Error::Config("max_tickets_per_purchase must be non-zero".into()));
        }
        if self.max_tickets_per_purchase > TICKET_CAP_LIMIT {
            return Err(Error::Config(format!(
                "max_tickets_per_purchase must be at most {}, got {}",
                TICKET_CAP_LIMIT, self.max_tickets_per_purchase
            )));
        }
        if self.token_symbol.is_empty() {
            return Err(Error::Config("token_symbol must not be empty".into()));
        }
        Ok(())
    }
}

mod hex_address {
    use super::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addr: &Address, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&addr.to_hex())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Address, D::Error> {
        let s = String::deserialize(d)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

mod hex_address_opt {
    use super::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addr: &Option<Address>, s: S) -> Result<S::Ok, S::Error> {
        match addr {
            Some(addr) => s.serialize_some(&addr.to_hex()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Address>, D::Error> {
        let s: Option<String> = Option::deserialize(d)?;
        s.map(|s| Address::from_hex(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let json = format!(r#"{{ "token_address": "{}" }}"#, Address::repeat(1).to_hex());
        let config = LedgerConfig::from_json_str(&json).unwrap();

        assert_eq!(config.token_address, Address::repeat(1));
        assert_eq!(config.auxiliary_reader, None);
        assert_eq!(config.mpc_parties, DEFAULT_MPC_PARTIES);
        assert_eq!(config.token_symbol, "TT");
    }

    #[test]
    fn test_json_roundtrip_with_reader() {
        let config = LedgerConfig::new(Address::repeat(1)).with_auxiliary_reader(Address::repeat(9));
        let json = config.to_json().unwrap();
        assert_eq!(LedgerConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_single_party() {
        let config = LedgerConfig::new(Address::repeat(1)).with_mpc_parties(1);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_ticket_cap_is_bounded() {
        let mut config = LedgerConfig::new(Address::repeat(1));
        config.max_tickets_per_purchase = TICKET_CAP_LIMIT;
        assert_eq!(config.validate(), Ok(()));

        config.max_tickets_per_purchase = u128::MAX;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.max_tickets_per_purchase = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_bad_token_address() {
        let result = LedgerConfig::from_json_str(r#"{ "token_address": "nothex" }"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
