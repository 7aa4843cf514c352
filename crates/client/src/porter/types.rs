use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{endpoint_url, PorterError, PorterRequest};
use crate::chain::Address;
use crate::conditions::ContextParameters;
use crate::crypto::{CiphertextHeader, EncryptedDecryptionShare, SessionPublicKey};
use crate::message_kit::AccessControlPolicy;

/// Every Porter response wraps its payload the same way
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterResponse<T> {
    pub result: T,
    #[serde(default)]
    pub version: String,
}

/// A node as advertised by Porter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Hex-encoded node encrypting key
    pub encrypting_key: String,
    pub uri: String,
    pub checksum_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeersResult {
    #[serde(alias = "ursulas")]
    pub peers: Vec<Peer>,
}

/// `GET /get_ursulas`
#[derive(Debug, Clone, Default)]
pub struct GetPeersRequest {
    pub quantity: usize,
    pub exclude: Vec<Address>,
    pub include: Vec<Address>,
}

impl PorterRequest for GetPeersRequest {
    type Response = PorterResponse<PeersResult>;

    fn build_request(&self, base_url: &Url, client: &Client) -> Result<RequestBuilder, PorterError> {
        let mut query = vec![("quantity", self.quantity.to_string())];
        if !self.exclude.is_empty() {
            query.push(("exclude_ursulas", join_addresses(&self.exclude)));
        }
        if !self.include.is_empty() {
            query.push(("include_ursulas", join_addresses(&self.include)));
        }
        Ok(client
            .get(endpoint_url(base_url, "get_ursulas"))
            .query(&query))
    }
}

fn join_addresses(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(Address::to_checksum)
        .collect::<Vec<_>>()
        .join(",")
}

/// Everything nodes need to evaluate a condition and produce a share
#[derive(Debug, Clone)]
pub struct DecryptionRequest {
    pub ritual_id: u32,
    /// Nodes stop once this many shares are produced
    pub threshold: u32,
    pub ciphertext_header: CiphertextHeader,
    pub acp: AccessControlPolicy,
    pub aad: Vec<u8>,
    pub context: ContextParameters,
    pub requester_public_key: SessionPublicKey,
    pub participants: Vec<Address>,
}

/// JSON body of `POST /decrypt`; binary fields are base64
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptionRequestBody {
    pub ritual_id: u32,
    pub threshold: u32,
    pub ciphertext_header: String,
    pub acp: String,
    pub aad: String,
    /// Context parameters as a JSON document
    pub context: String,
    pub requester_public_key: SessionPublicKey,
    pub participants: Vec<Address>,
}

impl DecryptionRequestBody {
    pub fn ciphertext_header(&self) -> Result<CiphertextHeader, String> {
        let bytes = BASE64.decode(&self.ciphertext_header).map_err(|e| e.to_string())?;
        CiphertextHeader::from_bytes(&bytes).map_err(|e| e.to_string())
    }

    pub fn acp(&self) -> Result<AccessControlPolicy, String> {
        let bytes = BASE64.decode(&self.acp).map_err(|e| e.to_string())?;
        AccessControlPolicy::from_bytes(&bytes).map_err(|e| e.to_string())
    }

    pub fn aad(&self) -> Result<Vec<u8>, String> {
        BASE64.decode(&self.aad).map_err(|e| e.to_string())
    }
}

impl DecryptionRequest {
    pub fn to_body(&self) -> Result<DecryptionRequestBody, PorterError> {
        let acp = self
            .acp
            .to_bytes()
            .map_err(|e| PorterError::Request(e.to_string()))?;
        let context = self
            .context
            .to_json()
            .map_err(|e| PorterError::Request(e.to_string()))?;
        Ok(DecryptionRequestBody {
            ritual_id: self.ritual_id,
            threshold: self.threshold,
            ciphertext_header: BASE64.encode(self.ciphertext_header.to_bytes()),
            acp: BASE64.encode(acp),
            aad: BASE64.encode(&self.aad),
            context,
            requester_public_key: self.requester_public_key,
            participants: self.participants.clone(),
        })
    }
}

impl PorterRequest for DecryptionRequest {
    type Response = PorterResponse<DecryptionResponse>;

    fn build_request(&self, base_url: &Url, client: &Client) -> Result<RequestBuilder, PorterError> {
        Ok(client
            .post(endpoint_url(base_url, "decrypt"))
            .json(&self.to_body()?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionResponse {
    pub decryption_results: DecryptionResults,
}

/// Per-node results: base64 encrypted shares and error strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionResults {
    #[serde(default)]
    pub encrypted_decryption_responses: BTreeMap<Address, String>,
    #[serde(default)]
    pub errors: BTreeMap<Address, String>,
}

/// What one node answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    Success(EncryptedDecryptionShare),
    Failure(String),
}

impl DecryptionResults {
    /// Merge both maps into one outcome per node
    ///
    /// A node listed as successful wins over an error for the same node. A
    /// share that is not valid base64 of the right size becomes a failure.
    pub fn into_outcomes(self) -> BTreeMap<Address, ShareOutcome> {
        let mut outcomes: BTreeMap<Address, ShareOutcome> = self
            .errors
            .into_iter()
            .map(|(address, reason)| (address, ShareOutcome::Failure(reason)))
            .collect();

        for (address, encoded) in self.encrypted_decryption_responses {
            let outcome = BASE64
                .decode(&encoded)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    EncryptedDecryptionShare::try_from(bytes.as_slice()).map_err(|e| e.to_string())
                })
                .map(ShareOutcome::Success)
                .unwrap_or_else(|reason| ShareOutcome::Failure(format!("malformed share: {}", reason)));
            outcomes.insert(address, outcome);
        }
        outcomes
    }

    /// Record a sealed share for `address`
    pub fn insert_share(&mut self, address: Address, share: &EncryptedDecryptionShare) {
        self.encrypted_decryption_responses
            .insert(address, BASE64.encode(share.bytes()));
    }

    pub fn insert_error(&mut self, address: Address, reason: impl Into<String>) {
        self.errors.insert(address, reason.into());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn address(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn test_peers_accepts_either_key() {
        let peer = json!({
            "encrypting_key": "02aa",
            "uri": "https://node.example:9151",
            "checksum_address": address(1).to_checksum(),
        });
        let a: PorterResponse<PeersResult> =
            serde_json::from_value(json!({"result": {"peers": [peer.clone()]}, "version": "1.0"}))
                .unwrap();
        let b: PorterResponse<PeersResult> =
            serde_json::from_value(json!({"result": {"ursulas": [peer]}, "version": "1.0"})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.result.peers[0].checksum_address, address(1));
    }

    #[test]
    fn test_outcomes_merge() {
        let share = EncryptedDecryptionShare::try_from(&[9u8; 60][..]).unwrap();
        let mut results = DecryptionResults::default();
        results.insert_share(address(1), &share);
        results.insert_error(address(2), "condition not satisfied");
        results
            .encrypted_decryption_responses
            .insert(address(3), "!!not base64".to_string());

        let outcomes = results.into_outcomes();
        assert_eq!(outcomes[&address(1)], ShareOutcome::Success(share));
        assert_eq!(
            outcomes[&address(2)],
            ShareOutcome::Failure("condition not satisfied".to_string())
        );
        assert!(matches!(&outcomes[&address(3)], ShareOutcome::Failure(r) if r.starts_with("malformed share")));
    }

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let base = Url::parse("https://relay.example/porter").unwrap();
        assert_eq!(
            endpoint_url(&base, "decrypt").as_str(),
            "https://relay.example/porter/decrypt"
        );
        let root = Url::parse("https://relay.example/").unwrap();
        assert_eq!(
            endpoint_url(&root, "get_ursulas").as_str(),
            "https://relay.example/get_ursulas"
        );
    }
}
