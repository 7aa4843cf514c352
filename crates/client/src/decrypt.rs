//! Quorum decryption of a [`ThresholdMessageKit`]
//!
//! 1. Find the ritual behind the kit's public key and check it is active.
//! 2. Generate a session key for this attempt only.
//! 3. Resolve the condition context.
//! 4. Ask Porter for shares, sealed to the session key.
//! 5. Open each share with the sending node's published session key.
//! 6. With at least `threshold` shares, combine them and decrypt.
//!
//! Any failure before step 6 aborts the call. Node-level failures are kept
//! per node and returned in full when the quorum is not met.

use std::collections::BTreeMap;
use std::fmt;

use crate::cancel::{Cancellation, Interrupted};
use crate::chain::Address;
use crate::conditions::{ConditionContext, ConditionError, ContextError};
use crate::config::{self, ConfigError, Domain};
use crate::crypto::{
    self, combine_decryption_shares, DecryptionShare, DkgError, InitError, SessionKeyError,
    SessionSecretKey,
};
use crate::message_kit::ThresholdMessageKit;
use crate::porter::{DecryptionRequest, PorterClient, PorterError, ShareOutcome};
use crate::ritual::{Ritual, RitualError, RitualResolver};

/// Why a node's share is missing from the quorum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareFailure {
    /// The node answered with an error, e.g. the condition was not satisfied
    Rejected(String),
    /// The node answered with a share that does not open under its session key
    Undecryptable(String),
    /// The responding address is not a participant of the ritual
    UnknownParticipant,
    /// The node did not answer at all
    NoResponse,
}

impl fmt::Display for ShareFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareFailure::Rejected(reason) => write!(f, "rejected: {}", reason),
            ShareFailure::Undecryptable(reason) => write!(f, "undecryptable share: {}", reason),
            ShareFailure::UnknownParticipant => f.write_str("not a ritual participant"),
            ShareFailure::NoResponse => f.write_str("no response"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error(transparent)]
    Init(#[from] InitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ritual(#[from] RitualError),
    #[error("ritual {ritual_id} public key does not match the message kit")]
    PublicKeyMismatch { ritual_id: u32 },
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("message kit conditions are invalid: {0}")]
    Condition(#[from] ConditionError),
    #[error(transparent)]
    Porter(#[from] PorterError),
    #[error("session key error: {0}")]
    Session(#[from] SessionKeyError),
    #[error(
        "ritual {ritual_id} needs {threshold} shares, received {received}: {}",
        format_failures(.failures)
    )]
    InsufficientShares {
        ritual_id: u32,
        threshold: u32,
        received: usize,
        failures: BTreeMap<Address, ShareFailure>,
    },
    #[error("share combination failed: {0}")]
    Crypto(#[from] DkgError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

fn format_failures(failures: &BTreeMap<Address, ShareFailure>) -> String {
    failures
        .iter()
        .map(|(address, failure)| format!("{} {}", address, failure))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Drives the decryption flow for one ritual network
#[derive(Debug, Clone)]
pub struct ThresholdDecryptor {
    resolver: RitualResolver,
    porter: PorterClient,
    domain: Option<Domain>,
}

impl ThresholdDecryptor {
    pub fn new(resolver: RitualResolver, porter: PorterClient) -> Self {
        Self {
            resolver,
            porter,
            domain: None,
        }
    }

    /// Refuse to run against a chain adapter that is not on `domain`'s chain
    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn resolver(&self) -> &RitualResolver {
        &self.resolver
    }

    pub fn porter(&self) -> &PorterClient {
        &self.porter
    }

    /// Recover the plaintext of `kit`
    ///
    /// `context` must carry every parameter the kit's conditions reference.
    pub async fn retrieve_and_decrypt(
        &self,
        kit: &ThresholdMessageKit,
        context: &ConditionContext,
        cancel: &Cancellation,
    ) -> Result<Vec<u8>, DecryptError> {
        cancel
            .run(self.retrieve_and_decrypt_inner(kit, context))
            .await?
    }

    async fn retrieve_and_decrypt_inner(
        &self,
        kit: &ThresholdMessageKit,
        context: &ConditionContext,
    ) -> Result<Vec<u8>, DecryptError> {
        crypto::init().await?;
        if let Some(domain) = self.domain {
            config::ensure_chain(domain, self.resolver.chain().as_ref()).await?;
        }

        let ritual = self.resolve_ritual(kit).await?;
        let session_key = SessionSecretKey::generate()?;
        let parameters = context.to_context_parameters().await?;
        let aad = kit.acp().aad()?;

        let request = DecryptionRequest {
            ritual_id: ritual.id,
            threshold: ritual.threshold,
            ciphertext_header: *kit.ciphertext_header(),
            acp: kit.acp().clone(),
            aad: aad.clone(),
            context: parameters,
            requester_public_key: session_key.public(),
            participants: ritual.participant_addresses(),
        };
        // the caller's cancellation already wraps this whole flow
        let outcomes = self
            .porter
            .request_decryption_shares(&request, &Cancellation::none())
            .await?;

        let (shares, failures) = open_shares(&ritual, &session_key, outcomes).await;
        if shares.len() < ritual.threshold as usize {
            tracing::warn!(
                ritual_id = ritual.id,
                threshold = ritual.threshold,
                received = shares.len(),
                failed = failures.len(),
                "not enough decryption shares"
            );
            return Err(DecryptError::InsufficientShares {
                ritual_id: ritual.id,
                threshold: ritual.threshold,
                received: shares.len(),
                failures,
            });
        }

        let quorum: Vec<(u32, DecryptionShare)> = shares
            .into_iter()
            .take(ritual.threshold as usize)
            .collect();
        let shared_secret = combine_decryption_shares(&quorum)?;
        let plaintext = kit
            .ciphertext()
            .decrypt_with_shared_secret(&aad, &shared_secret)?;

        tracing::info!(
            ritual_id = ritual.id,
            shares = quorum.len(),
            ignored_failures = failures.len(),
            "decrypted message kit"
        );
        Ok(plaintext)
    }

    async fn resolve_ritual(&self, kit: &ThresholdMessageKit) -> Result<Ritual, DecryptError> {
        let public_key = kit.acp().public_key();
        let ritual_id = self.resolver.ritual_id_for_public_key(public_key).await?;
        let ritual = self.resolver.active_ritual(ritual_id).await?;
        if &ritual.dkg_public_key != public_key {
            return Err(DecryptError::PublicKeyMismatch { ritual_id });
        }
        Ok(ritual)
    }
}

/// Open every successful response; returns shares by participant index plus failures
async fn open_shares(
    ritual: &Ritual,
    session_key: &SessionSecretKey,
    mut outcomes: BTreeMap<Address, ShareOutcome>,
) -> (BTreeMap<u32, DecryptionShare>, BTreeMap<Address, ShareFailure>) {
    let mut shares = BTreeMap::new();
    let mut failures = BTreeMap::new();
    let mut sealed = Vec::new();

    for (index, participant) in ritual.participants.iter().enumerate() {
        let address = participant.address;
        match outcomes.remove(&address) {
            Some(ShareOutcome::Success(share)) => {
                sealed.push((index as u32 + 1, address, participant.session_public_key, share));
            }
            Some(ShareOutcome::Failure(reason)) => {
                tracing::debug!(%address, %reason, "node declined to share");
                failures.insert(address, ShareFailure::Rejected(reason));
            }
            None => {
                failures.insert(address, ShareFailure::NoResponse);
            }
        }
    }

    // whatever is left came from outside the ritual
    for address in outcomes.into_keys() {
        failures.insert(address, ShareFailure::UnknownParticipant);
    }

    // one blocking worker per share; results keep participant order
    let opened = futures::future::join_all(sealed.into_iter().map(
        |(share_index, address, node_key, share)| {
            let session_key = session_key.clone();
            async move {
                let result =
                    tokio::task::spawn_blocking(move || share.open(&session_key, &node_key))
                        .await
                        .map_err(|e| e.to_string())
                        .and_then(|opened| opened.map_err(|e| e.to_string()));
                (share_index, address, result)
            }
        },
    ))
    .await;

    for (share_index, address, result) in opened {
        match result {
            Ok(share) => {
                tracing::debug!(%address, share_index, "opened decryption share");
                shares.insert(share_index, share);
            }
            Err(reason) => {
                tracing::debug!(%address, error = %reason, "could not open decryption share");
                failures.insert(address, ShareFailure::Undecryptable(reason));
            }
        }
    }

    (shares, failures)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testkit::TestRitual;

    #[tokio::test]
    async fn test_open_shares_classifies_outcomes() {
        let ritual = TestRitual::new(1, 2, 4).unwrap();
        let record = ritual.ritual();
        let requester = SessionSecretKey::generate().unwrap();
        let header_source = ritual.encrypt_dummy(b"aad").unwrap();

        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            record.participants[0].address,
            ShareOutcome::Success(
                ritual
                    .sealed_share(0, header_source.header(), b"aad", &requester.public())
                    .unwrap(),
            ),
        );
        outcomes.insert(
            record.participants[1].address,
            ShareOutcome::Failure("condition not satisfied".to_string()),
        );
        // sealed by node 2 but claimed by node 3
        outcomes.insert(
            record.participants[3].address,
            ShareOutcome::Success(
                ritual
                    .sealed_share(2, header_source.header(), b"aad", &requester.public())
                    .unwrap(),
            ),
        );
        let stranger = Address::from([0xee; 20]);
        outcomes.insert(stranger, ShareOutcome::Failure("who?".to_string()));

        let (shares, failures) = open_shares(&record, &requester, outcomes).await;
        assert_eq!(shares.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(
            failures[&record.participants[1].address],
            ShareFailure::Rejected("condition not satisfied".to_string())
        );
        assert_eq!(failures[&record.participants[2].address], ShareFailure::NoResponse);
        assert!(matches!(
            failures[&record.participants[3].address],
            ShareFailure::Undecryptable(_)
        ));
        assert_eq!(failures[&stranger], ShareFailure::UnknownParticipant);
    }

    #[tokio::test]
    async fn test_open_shares_keeps_participant_indices() {
        let ritual = TestRitual::new(2, 3, 5).unwrap();
        let record = ritual.ritual();
        let requester = SessionSecretKey::generate().unwrap();
        let header_source = ritual.encrypt_dummy(b"aad").unwrap();

        let outcomes = record
            .participants
            .iter()
            .enumerate()
            .rev()
            .map(|(i, participant)| {
                let sealed = ritual
                    .sealed_share(i, header_source.header(), b"aad", &requester.public())
                    .unwrap();
                (participant.address, ShareOutcome::Success(sealed))
            })
            .collect();

        let (shares, failures) = open_shares(&record, &requester, outcomes).await;
        assert!(failures.is_empty());
        assert_eq!(shares.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_insufficient_shares_message_lists_every_node() {
        let mut failures = BTreeMap::new();
        failures.insert(Address::from([1; 20]), ShareFailure::Rejected("nope".to_string()));
        failures.insert(Address::from([2; 20]), ShareFailure::NoResponse);
        let error = DecryptError::InsufficientShares {
            ritual_id: 9,
            threshold: 3,
            received: 1,
            failures,
        };
        let message = error.to_string();
        assert!(message.contains("needs 3 shares, received 1"));
        assert!(message.contains("rejected: nope"));
        assert!(message.contains("no response"));
    }
}
