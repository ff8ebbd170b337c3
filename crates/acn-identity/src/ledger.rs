use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// The set of ledgers whose address-derivation and signature schemes this
/// crate understands.
///
/// A closed tagged variant with per-variant dispatch rather than a trait
/// object over ledger kinds — see `address::derive_address` and
/// `por::verify_por`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ledger {
    #[serde(rename = "fetchai")]
    FetchAi,
    Cosmos,
    Ethereum,
}

impl Ledger {
    /// The bech32 human-readable prefix used by `fetchai`/`cosmos` address
    /// derivation. Ethereum addresses have no bech32 prefix.
    pub fn bech32_hrp(self) -> Option<&'static str> {
        match self {
            Ledger::FetchAi => Some("fetch"),
            Ledger::Cosmos => Some("cosmos"),
            Ledger::Ethereum => None,
        }
    }
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Ledger::FetchAi => "fetchai",
            Ledger::Cosmos => "cosmos",
            Ledger::Ethereum => "ethereum",
        };
        f.write_str(s)
    }
}

impl FromStr for Ledger {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetchai" => Ok(Ledger::FetchAi),
            "cosmos" => Ok(Ledger::Cosmos),
            "ethereum" => Ok(Ledger::Ethereum),
            other => Err(IdentityError::UnsupportedLedger(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_display_and_parse() {
        for ledger in [Ledger::FetchAi, Ledger::Cosmos, Ledger::Ethereum] {
            let s = ledger.to_string();
            assert_eq!(s.parse::<Ledger>().unwrap(), ledger);
        }
    }

    #[test]
    fn unknown_ledger_is_rejected() {
        assert!(matches!(
            "solana".parse::<Ledger>(),
            Err(IdentityError::UnsupportedLedger(_))
        ));
    }

    #[test]
    fn hrp_is_ledger_specific() {
        assert_eq!(Ledger::FetchAi.bech32_hrp(), Some("fetch"));
        assert_eq!(Ledger::Cosmos.bech32_hrp(), Some("cosmos"));
        assert_eq!(Ledger::Ethereum.bech32_hrp(), None);
    }
}
