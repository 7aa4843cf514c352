//! Minimal surface the client needs from a blockchain client
//!
//! Adapting a concrete RPC library lives outside this crate: implement
//! [`ChainAdapter`] for read-only coordinator queries and [`Signer`] for the
//! account that authorizes ciphertexts and signs in to nodes.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::crypto::DkgPublicKey;

/// Size of an Ethereum address in bytes
pub const ADDRESS_SIZE: usize = 20;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    /// The RPC endpoint could not be reached or answered garbage
    #[error("chain transport error: {0}")]
    Transport(String),
    /// The call executed and reverted, e.g. no record for the queried key
    #[error("contract call reverted: {0}")]
    Reverted(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid address {input:?}: {reason}")]
pub struct AddressError {
    pub input: String,
    pub reason: &'static str,
}

/// A 20-byte account address
///
/// Parses `0x`-prefixed hex of any case; renders as an EIP-55 checksum.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Address owning an uncompressed public key: the low 20 bytes of its keccak hash
    pub fn from_public_key_bytes(public_key: &[u8]) -> Self {
        let hash = Keccak256::digest(public_key);
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&hash[hash.len() - ADDRESS_SIZE..]);
        Self(bytes)
    }

    /// EIP-55 mixed-case checksum encoding
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());

        let mut out = String::with_capacity(2 + 2 * ADDRESS_SIZE);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl From<[u8; ADDRESS_SIZE]> for Address {
    fn from(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| AddressError {
            input: s.to_string(),
            reason,
        };
        let hex = s.strip_prefix("0x").ok_or_else(|| err("missing 0x prefix"))?;
        if hex.len() != 2 * ADDRESS_SIZE {
            return Err(err("expected 40 hex characters"));
        }
        let mut bytes = [0u8; ADDRESS_SIZE];
        hex::decode_to_slice(hex, &mut bytes).map_err(|_| err("not hexadecimal"))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Read-only coordinator queries
///
/// The adapter owns contract addresses and ABI encoding; results come back as
/// JSON documents the [`RitualResolver`](crate::ritual::RitualResolver) decodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// `getRitualIdFromPublicKey(publicKey) -> uint32`, returned as a JSON number
    RitualIdFromPublicKey { public_key: DkgPublicKey },
    /// `getRitual(ritualId)` plus its participants, returned as a [`Ritual`](crate::ritual::Ritual) document
    GetRitual { ritual_id: u32 },
}

#[async_trait]
pub trait ChainAdapter: Send + Sync + fmt::Debug + 'static {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn call(&self, call: ContractCall) -> Result<serde_json::Value, ChainError>;
}

/// An account able to sign arbitrary messages (EIP-191 style)
#[async_trait]
pub trait Signer: Send + Sync + fmt::Debug {
    async fn address(&self) -> Result<Address, ChainError>;

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, ChainError>;
}
