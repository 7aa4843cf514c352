//! DKG ritual lookups through the coordinator contract

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::chain::{Address, ChainAdapter, ChainError, ContractCall};
use crate::crypto::{DkgPublicKey, SessionPublicKey};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RitualError {
    #[error("no ritual found for {0}")]
    NotFound(String),
    #[error("chain unavailable: {0}")]
    ChainUnavailable(#[source] ChainError),
    #[error("ritual {ritual_id} is {state}, not ACTIVE")]
    NotActive { ritual_id: u32, state: RitualState },
    #[error("ritual {ritual_id} record is malformed: {reason}")]
    Decode { ritual_id: u32, reason: String },
}

impl RitualError {
    fn from_chain(error: ChainError, query: impl fmt::Display) -> Self {
        match error {
            ChainError::Reverted(_) => RitualError::NotFound(query.to_string()),
            other => RitualError::ChainUnavailable(other),
        }
    }
}

/// Coordinator lifecycle of a ritual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RitualState {
    NonInitiated,
    DkgAwaitingTranscripts,
    DkgAwaitingAggregations,
    DkgTimeout,
    DkgInvalid,
    Active,
    Expired,
}

impl fmt::Display for RitualState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RitualState::NonInitiated => "NON_INITIATED",
            RitualState::DkgAwaitingTranscripts => "DKG_AWAITING_TRANSCRIPTS",
            RitualState::DkgAwaitingAggregations => "DKG_AWAITING_AGGREGATIONS",
            RitualState::DkgTimeout => "DKG_TIMEOUT",
            RitualState::DkgInvalid => "DKG_INVALID",
            RitualState::Active => "ACTIVE",
            RitualState::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub address: Address,
    pub session_public_key: SessionPublicKey,
}

/// A ritual as recorded by the coordinator
///
/// Participants are listed in share-index order: the participant at position
/// `i` holds the key share evaluated at `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ritual {
    pub id: u32,
    pub dkg_public_key: DkgPublicKey,
    pub threshold: u32,
    pub total_participants: u32,
    pub participants: Vec<Participant>,
    pub state: RitualState,
}

impl Ritual {
    pub fn is_active(&self) -> bool {
        self.state == RitualState::Active
    }

    pub fn participant(&self, address: &Address) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.address == address)
    }

    /// 1-based share index of a participant
    pub fn share_index(&self, address: &Address) -> Option<u32> {
        self.participants
            .iter()
            .position(|p| &p.address == address)
            .map(|i| i as u32 + 1)
    }

    pub fn participant_addresses(&self) -> Vec<Address> {
        self.participants.iter().map(|p| p.address).collect()
    }

    fn check(&self) -> Result<(), String> {
        if self.threshold == 0 || self.threshold > self.total_participants {
            return Err(format!(
                "threshold {} of {} participants",
                self.threshold, self.total_participants
            ));
        }
        if self.participants.len() != self.total_participants as usize {
            return Err(format!(
                "{} participants listed, {} declared",
                self.participants.len(),
                self.total_participants
            ));
        }
        Ok(())
    }
}

/// Reads ritual records through a [`ChainAdapter`]
///
/// Lookups go to the chain every time unless the resolver was built
/// [`with_cache`](Self::with_cache), in which case active rituals are kept
/// for the resolver's lifetime.
#[derive(Debug, Clone)]
pub struct RitualResolver {
    chain: Arc<dyn ChainAdapter>,
    cache: Option<Arc<Mutex<HashMap<u32, Ritual>>>>,
}

impl RitualResolver {
    pub fn new(chain: Arc<dyn ChainAdapter>) -> Self {
        Self { chain, cache: None }
    }

    pub fn with_cache(mut self) -> Self {
        self.cache = Some(Arc::new(Mutex::new(HashMap::new())));
        self
    }

    pub fn chain(&self) -> &Arc<dyn ChainAdapter> {
        &self.chain
    }

    pub async fn ritual_id_for_public_key(
        &self,
        public_key: &DkgPublicKey,
    ) -> Result<u32, RitualError> {
        let query = format!("public key {}", public_key.to_hex());
        let value = self
            .chain
            .call(ContractCall::RitualIdFromPublicKey {
                public_key: *public_key,
            })
            .await
            .map_err(|e| RitualError::from_chain(e, &query))?;

        let ritual_id = value
            .as_u64()
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| RitualError::NotFound(query))?;
        tracing::debug!(ritual_id, "resolved ritual id from public key");
        Ok(ritual_id)
    }

    pub async fn ritual(&self, ritual_id: u32) -> Result<Ritual, RitualError> {
        if let Some(cached) = self.cached(ritual_id) {
            tracing::trace!(ritual_id, "ritual cache hit");
            return Ok(cached);
        }

        let value = self
            .chain
            .call(ContractCall::GetRitual { ritual_id })
            .await
            .map_err(|e| RitualError::from_chain(e, format!("ritual {}", ritual_id)))?;
        if value.is_null() {
            return Err(RitualError::NotFound(format!("ritual {}", ritual_id)));
        }

        let ritual: Ritual =
            serde_json::from_value(value).map_err(|e| RitualError::Decode {
                ritual_id,
                reason: e.to_string(),
            })?;
        if ritual.id != ritual_id {
            return Err(RitualError::Decode {
                ritual_id,
                reason: format!("record is for ritual {}", ritual.id),
            });
        }
        ritual
            .check()
            .map_err(|reason| RitualError::Decode { ritual_id, reason })?;

        tracing::debug!(
            ritual_id,
            threshold = ritual.threshold,
            participants = ritual.total_participants,
            state = %ritual.state,
            "fetched ritual"
        );
        if let (Some(cache), true) = (&self.cache, ritual.is_active()) {
            cache.lock().insert(ritual_id, ritual.clone());
        }
        Ok(ritual)
    }

    /// Fetch a ritual that can serve decryption requests
    pub async fn active_ritual(&self, ritual_id: u32) -> Result<Ritual, RitualError> {
        let ritual = self.ritual(ritual_id).await?;
        if !ritual.is_active() {
            return Err(RitualError::NotActive {
                ritual_id,
                state: ritual.state,
            });
        }
        Ok(ritual)
    }

    fn cached(&self, ritual_id: u32) -> Option<Ritual> {
        self.cache.as_ref()?.lock().get(&ritual_id).cloned()
    }
}
