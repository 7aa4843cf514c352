use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::chain::{Address, ChainAdapter, ChainError, ContractCall, Signer};
use crate::ritual::Ritual;

/// A coordinator contract held in memory
///
/// Unknown rituals revert, like the real contract. `set_offline` makes every
/// call fail at the transport level.
#[derive(Debug)]
pub struct MemoryChain {
    chain_id: u64,
    rituals: Mutex<BTreeMap<u32, Ritual>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            rituals: Mutex::new(BTreeMap::new()),
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn add_ritual(&self, ritual: Ritual) {
        self.rituals.lock().insert(ritual.id, ritual);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of contract calls served or refused so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), ChainError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChainError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainAdapter for MemoryChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.check_online()?;
        Ok(self.chain_id)
    }

    async fn call(&self, call: ContractCall) -> Result<Value, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let rituals = self.rituals.lock();
        match call {
            ContractCall::RitualIdFromPublicKey { public_key } => rituals
                .values()
                .find(|r| r.dkg_public_key == public_key)
                .map(|r| json!(r.id))
                .ok_or_else(|| ChainError::Reverted("no ritual for public key".to_string())),
            ContractCall::GetRitual { ritual_id } => {
                let ritual = rituals
                    .get(&ritual_id)
                    .ok_or_else(|| ChainError::Reverted("ritual does not exist".to_string()))?;
                serde_json::to_value(ritual).map_err(|e| ChainError::Transport(e.to_string()))
            }
        }
    }
}

/// A signing account backed by a local ed25519 key
///
/// Its address is the keccak hash of the verifying key, the same derivation
/// account addresses use.
#[derive(Debug)]
pub struct LocalSigner {
    key: SigningKey,
    issued: AtomicUsize,
}

impl LocalSigner {
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).map_err(|e| anyhow::anyhow!("randomness: {}", e))?;
        Ok(Self::from_seed(seed))
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
            issued: AtomicUsize::new(0),
        }
    }

    pub fn local_address(&self) -> Address {
        Address::from_public_key_bytes(self.key.verifying_key().as_bytes())
    }

    /// How many messages this signer has signed
    pub fn signatures_issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn verify_bytes(&self, message: &[u8], signature: &[u8]) -> bool {
        Signature::from_slice(signature)
            .map(|signature| self.key.verifying_key().verify(message, &signature).is_ok())
            .unwrap_or(false)
    }

    /// Verify a `0x`-prefixed hex signature
    pub fn verify(&self, message: &[u8], signature: &str) -> bool {
        signature
            .strip_prefix("0x")
            .and_then(|raw| hex::decode(raw).ok())
            .is_some_and(|bytes| self.verify_bytes(message, &bytes))
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn address(&self) -> Result<Address, ChainError> {
        Ok(self.local_address())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, ChainError> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(self.key.sign(message).to_bytes().to_vec())
    }
}
