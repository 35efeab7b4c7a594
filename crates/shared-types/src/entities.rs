//! # Core Domain Entities
//!
//! Identities and block metadata shared across the application layer.
//!
//! ## Clusters
//!
//! - **Identity**: `Address`, `PubKey`
//! - **Chain**: `BlockHeader`, `ProtocolDefinition`
//! - **Consensus boundary**: `VoteInfo`, `Evidence`, `ValidatorUpdate`

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Block height.
pub type Height = u64;

/// A 20-byte account, operator or consensus address.
///
/// Derived from the first 20 bytes of SHA-256 over an ed25519 public key.
/// Serialized as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const LEN: usize = 20;

    pub fn from_pubkey(pub_key: &PubKey) -> Self {
        let digest = Sha256::digest(pub_key.0);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        Self(out)
    }

    /// Deterministic address for a module-held account (fee collector, escrow).
    pub fn for_module(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid address {s}: {e}"))?;
        Self::from_slice(&bytes).ok_or_else(|| format!("address {s} is not 20 bytes"))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A 32-byte ed25519 public key, used for accounts and consensus keys alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PubKey(pub [u8; 32]);

impl PubKey {
    pub fn address(&self) -> Address {
        Address::from_pubkey(self)
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for PubKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid pubkey {s}: {e}"))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| format!("pubkey {s} is not 32 bytes"))?;
        Ok(Self(arr))
    }
}

impl Serialize for PubKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PubKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// CLUSTER B: THE CHAIN
// =============================================================================

/// Identifies one deployable protocol and the height at which it governs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProtocolDefinition {
    pub version: u64,
    /// Release locator of the software implementing this version.
    pub software: String,
    /// Switch height. Zero for the genesis protocol.
    pub height: Height,
}

impl ProtocolDefinition {
    pub fn new(version: u64, software: impl Into<String>, height: Height) -> Self {
        Self {
            version,
            software: software.into(),
            height,
        }
    }
}

/// The parts of a block header the application observes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    pub chain_id: String,
    pub height: Height,
    /// Unix seconds.
    pub time: u64,
    /// Consensus address of the proposer.
    pub proposer: Address,
}

// =============================================================================
// CLUSTER C: CONSENSUS BOUNDARY
// =============================================================================

/// One validator's participation in the previous block's commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInfo {
    /// Consensus address.
    pub validator: Address,
    pub power: u64,
    pub signed_last_block: bool,
}

/// Evidence of validator misbehavior reported by the consensus engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Consensus address of the offender.
    pub validator: Address,
    pub power: u64,
    /// Height of the infraction.
    pub height: Height,
}

/// A change of voting power handed back to the consensus engine.
/// Power zero removes the validator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pub_key: PubKey,
    pub power: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_round_trip() {
        let addr = Address([0xAB; 20]);
        let text = addr.to_string();
        assert_eq!(text.len(), 40);
        assert_eq!(text.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!("abcd".parse::<Address>().is_err());
        assert!("zz".repeat(20).parse::<Address>().is_err());
    }

    #[test]
    fn test_address_from_pubkey_is_stable() {
        let pk = PubKey([7u8; 32]);
        assert_eq!(pk.address(), Address::from_pubkey(&pk));
        assert_ne!(pk.address(), PubKey([8u8; 32]).address());
    }

    #[test]
    fn test_address_serializes_as_string() {
        let addr = Address([1u8; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(20)));
    }

    #[test]
    fn test_module_addresses_differ() {
        assert_ne!(Address::for_module("fee"), Address::for_module("gov"));
    }
}
