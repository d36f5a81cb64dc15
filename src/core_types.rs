//! Core types used throughout the system
//!
//! Identifiers shared by the engine contract, the aggregator and the
//! workflows. They provide semantic meaning and keep call sites honest about
//! which string is which.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in the token's smallest unit (wei for 18-decimal tokens).
///
/// Engine amounts routinely exceed `u128` for malformed tokens, so the
/// aggregator never narrows them.
pub type Amount = num_bigint::BigUint;

/// Engine-assigned wallet identifier (opaque hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletId(String);

impl WalletId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WalletId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Chain family. The engine only speaks EVM today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Evm,
}

/// Chain reference as the engine understands it: family + numeric chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chain {
    #[serde(rename = "type")]
    pub kind: ChainType,
    pub id: u64,
}

impl Chain {
    pub const fn evm(id: u64) -> Self {
        Self {
            kind: ChainType::Evm,
            id,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChainType::Evm => write!(f, "evm:{}", self.id),
        }
    }
}

/// Transaction hash as returned by the chain provider (`0x`-prefixed hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_display() {
        assert_eq!(Chain::evm(1).to_string(), "evm:1");
    }

    #[test]
    fn test_chain_serde_shape() {
        let json = serde_json::to_string(&Chain::evm(137)).unwrap();
        assert_eq!(json, r#"{"type":"evm","id":137}"#);
    }

    #[test]
    fn test_wallet_id_display() {
        let id = WalletId::from("abc123");
        assert_eq!(id.to_string(), "abc123");
        assert_eq!(id.as_str(), "abc123");
    }
}
