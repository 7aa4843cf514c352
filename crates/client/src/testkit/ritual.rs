use std::collections::BTreeSet;

use anyhow::{anyhow, Result};

use crate::chain::Address;
use crate::conditions::ConditionContext;
use crate::crypto::dkg::{self, Ciphertext, CiphertextHeader, PrivateKeyShare};
use crate::crypto::{
    combine_decryption_shares, DkgPublicKey, EncryptedDecryptionShare, SessionPublicKey,
    SessionSecretKey,
};
use crate::message_kit::ThresholdMessageKit;
use crate::porter::{DecryptionRequestBody, DecryptionResults};
use crate::ritual::{Participant, Ritual, RitualState};

/// One ritual node: its key share and session key
#[derive(Debug)]
pub struct TestNode {
    pub address: Address,
    key_share: PrivateKeyShare,
    session_key: SessionSecretKey,
}

impl TestNode {
    pub fn session_public_key(&self) -> SessionPublicKey {
        self.session_key.public()
    }

    /// Produce this node's share for `header`, sealed to `requester`
    pub fn sealed_share(
        &self,
        header: &CiphertextHeader,
        aad: &[u8],
        requester: &SessionPublicKey,
    ) -> Result<EncryptedDecryptionShare> {
        let share = self.key_share.create_decryption_share(header, aad)?;
        Ok(EncryptedDecryptionShare::seal(
            &share,
            &self.session_key,
            requester,
        )?)
    }
}

/// A dealt ritual: public key plus every node's secrets
#[derive(Debug)]
pub struct TestRitual {
    id: u32,
    threshold: u32,
    public_key: DkgPublicKey,
    nodes: Vec<TestNode>,
}

impl TestRitual {
    pub fn new(id: u32, threshold: u32, shares: u32) -> Result<Self> {
        let (public_key, key_shares) = dkg::generate_key_shares(threshold, shares)?;
        let nodes = key_shares
            .into_iter()
            .map(|key_share| {
                let session_key = SessionSecretKey::generate()?;
                let address = Address::from_public_key_bytes(&session_key.public().to_bytes());
                Ok(TestNode {
                    address,
                    key_share,
                    session_key,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id,
            threshold,
            public_key,
            nodes,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn public_key(&self) -> DkgPublicKey {
        self.public_key
    }

    pub fn nodes(&self) -> &[TestNode] {
        &self.nodes
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.nodes.iter().map(|n| n.address).collect()
    }

    /// The coordinator record for this ritual, in share-index order
    pub fn ritual(&self) -> Ritual {
        Ritual {
            id: self.id,
            dkg_public_key: self.public_key,
            threshold: self.threshold,
            total_participants: self.nodes.len() as u32,
            participants: self
                .nodes
                .iter()
                .map(|node| Participant {
                    address: node.address,
                    session_public_key: node.session_public_key(),
                })
                .collect(),
            state: RitualState::Active,
        }
    }

    /// Share of the node at `position`, sealed to `requester`
    pub fn sealed_share(
        &self,
        position: usize,
        header: &CiphertextHeader,
        aad: &[u8],
        requester: &SessionPublicKey,
    ) -> Result<EncryptedDecryptionShare> {
        self.nodes
            .get(position)
            .ok_or_else(|| anyhow!("no node at position {}", position))?
            .sealed_share(header, aad, requester)
    }

    /// Encrypt an empty payload, for tests that only need a header
    pub fn encrypt_dummy(&self, aad: &[u8]) -> Result<Ciphertext> {
        Ok(dkg::encrypt(b"", aad, &self.public_key)?)
    }

    /// Decrypt with the first `threshold` key shares directly, bypassing nodes
    pub fn decrypt_locally(&self, kit: &ThresholdMessageKit, aad: &[u8]) -> Result<Vec<u8>> {
        let shares = self
            .nodes
            .iter()
            .take(self.threshold as usize)
            .map(|node| {
                let share = node
                    .key_share
                    .create_decryption_share(kit.ciphertext_header(), aad)?;
                Ok((node.key_share.index(), share))
            })
            .collect::<Result<Vec<_>>>()?;
        let secret = combine_decryption_shares(&shares)?;
        Ok(kit.ciphertext().decrypt_with_shared_secret(aad, &secret)?)
    }

    /// Answer a decryption request the way the ritual's nodes would
    ///
    /// Nodes in `failing` refuse with "condition not satisfied". Every node
    /// refuses when the request lacks a context parameter its conditions need.
    pub fn respond(
        &self,
        request: &DecryptionRequestBody,
        failing: &BTreeSet<Address>,
    ) -> Result<DecryptionResults> {
        if request.ritual_id != self.id {
            return Err(anyhow!("unknown ritual {}", request.ritual_id));
        }
        let header = request.ciphertext_header().map_err(|e| anyhow!(e))?;
        let aad = request.aad().map_err(|e| anyhow!(e))?;
        let acp = request.acp().map_err(|e| anyhow!(e))?;
        if acp.aad()? != aad {
            return Err(anyhow!("aad does not match access control policy"));
        }

        let context: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&request.context)?;
        let missing: Vec<String> = ConditionContext::new(acp.conditions())
            .required_parameters()
            .iter()
            .filter(|name| !context.contains_key(name.as_str()))
            .cloned()
            .collect();

        let mut results = DecryptionResults::default();
        for node in &self.nodes {
            if !request.participants.contains(&node.address) {
                continue;
            }
            if !missing.is_empty() {
                results.insert_error(
                    node.address,
                    format!("missing context parameters: {}", missing.join(", ")),
                );
            } else if failing.contains(&node.address) {
                results.insert_error(node.address, "condition not satisfied");
            } else {
                let share =
                    node.sealed_share(&header, &aad, &request.requester_public_key)?;
                results.insert_share(node.address, &share);
            }
        }
        Ok(results)
    }
}
