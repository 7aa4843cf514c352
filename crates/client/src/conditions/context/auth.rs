//! Authentication proofs for reserved context parameters
//!
//! Nodes resolve `:userAddress` by verifying a signed EIP-4361 ("Sign-In with
//! Ethereum") message rather than trusting a literal address. An
//! [`AuthProvider`] produces that proof on demand.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use url::Url;

use crate::chain::{Address, ChainError, Signer};

const SIWE_PREAMBLE: &str = " wants you to sign in with your Ethereum account:";
const DEFAULT_STATEMENT: &str = "Sign in to decrypt data protected by access conditions.";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("signer error: {0}")]
    Signer(#[from] ChainError),
    #[error("malformed EIP-4361 message: {0}")]
    InvalidMessage(String),
    #[error("malformed signature: {0}")]
    InvalidSignature(String),
}

/// Proof schemes nodes know how to verify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthScheme {
    #[serde(rename = "EIP4361")]
    Eip4361,
}

/// A signed authentication payload, sent in place of a literal context value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSignature {
    /// `0x`-prefixed hex signature over `typed_data`
    pub signature: String,
    pub address: Address,
    pub scheme: AuthScheme,
    /// The signed message
    pub typed_data: String,
}

/// Produces an [`AuthSignature`] for a reserved context parameter
#[async_trait]
pub trait AuthProvider: Send + Sync + fmt::Debug {
    async fn auth_signature(&self) -> Result<AuthSignature, AuthError>;
}

/// Signs a fresh EIP-4361 message with the requester's account
///
/// The proof is produced once per provider; later calls return the same
/// signature without asking the signer again.
#[derive(Debug)]
pub struct Eip4361AuthProvider {
    signer: Arc<dyn Signer>,
    domain: String,
    uri: Url,
    chain_id: u64,
    statement: String,
    proof: OnceCell<AuthSignature>,
}

impl Eip4361AuthProvider {
    pub fn new(signer: Arc<dyn Signer>, domain: impl Into<String>, uri: Url, chain_id: u64) -> Self {
        Self {
            signer,
            domain: domain.into(),
            uri,
            chain_id,
            statement: DEFAULT_STATEMENT.to_string(),
            proof: OnceCell::new(),
        }
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = statement.into();
        self
    }

    async fn sign_in(&self) -> Result<AuthSignature, AuthError> {
        let address = self.signer.address().await?;
        let message = SiweMessage {
            domain: &self.domain,
            address,
            statement: &self.statement,
            uri: &self.uri,
            chain_id: self.chain_id,
            nonce: uuid::Uuid::new_v4().simple().to_string(),
            issued_at: Utc::now(),
        }
        .to_string();

        tracing::debug!(%address, domain = %self.domain, "signing EIP-4361 message");
        let signature = self.signer.sign_message(message.as_bytes()).await?;

        Ok(AuthSignature {
            signature: format!("0x{}", hex::encode(signature)),
            address,
            scheme: AuthScheme::Eip4361,
            typed_data: message,
        })
    }
}

#[async_trait]
impl AuthProvider for Eip4361AuthProvider {
    async fn auth_signature(&self) -> Result<AuthSignature, AuthError> {
        self.proof
            .get_or_try_init(|| self.sign_in())
            .await
            .cloned()
    }
}

/// Reuses an EIP-4361 sign-in the requester already performed elsewhere
#[derive(Debug, Clone)]
pub struct SingleSignOnEip4361AuthProvider {
    proof: AuthSignature,
}

impl SingleSignOnEip4361AuthProvider {
    /// Build from an existing message and its `0x`-prefixed hex signature
    pub fn new(message: impl Into<String>, signature: impl Into<String>) -> Result<Self, AuthError> {
        let message = message.into();
        let signature = signature.into();

        let address = parse_siwe_address(&message)?;
        let raw = signature
            .strip_prefix("0x")
            .ok_or_else(|| AuthError::InvalidSignature("missing 0x prefix".to_string()))?;
        if raw.is_empty() || hex::decode(raw).is_err() {
            return Err(AuthError::InvalidSignature("not hexadecimal".to_string()));
        }

        Ok(Self {
            proof: AuthSignature {
                signature,
                address,
                scheme: AuthScheme::Eip4361,
                typed_data: message,
            },
        })
    }

    pub fn address(&self) -> Address {
        self.proof.address
    }
}

#[async_trait]
impl AuthProvider for SingleSignOnEip4361AuthProvider {
    async fn auth_signature(&self) -> Result<AuthSignature, AuthError> {
        Ok(self.proof.clone())
    }
}

struct SiweMessage<'a> {
    domain: &'a str,
    address: Address,
    statement: &'a str,
    uri: &'a Url,
    chain_id: u64,
    nonce: String,
    issued_at: DateTime<Utc>,
}

impl fmt::Display for SiweMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", self.domain, SIWE_PREAMBLE)?;
        writeln!(f, "{}", self.address)?;
        writeln!(f)?;
        writeln!(f, "{}", self.statement)?;
        writeln!(f)?;
        writeln!(f, "URI: {}", self.uri)?;
        writeln!(f, "Version: 1")?;
        writeln!(f, "Chain ID: {}", self.chain_id)?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        write!(
            f,
            "Issued At: {}",
            self.issued_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

fn parse_siwe_address(message: &str) -> Result<Address, AuthError> {
    let mut lines = message.lines();
    let header = lines.next().unwrap_or_default();
    if !header.ends_with(SIWE_PREAMBLE) {
        return Err(AuthError::InvalidMessage(
            "first line is not a sign-in request".to_string(),
        ));
    }
    let address = lines
        .next()
        .ok_or_else(|| AuthError::InvalidMessage("missing address line".to_string()))?;
    address
        .trim()
        .parse()
        .map_err(|e: crate::chain::AddressError| AuthError::InvalidMessage(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testkit::LocalSigner;

    fn provider(signer: Arc<LocalSigner>) -> Eip4361AuthProvider {
        Eip4361AuthProvider::new(
            signer,
            "localhost",
            Url::parse("http://localhost:3000").unwrap(),
            80002,
        )
    }

    #[tokio::test]
    async fn test_sign_in_message_layout() {
        let signer = Arc::new(LocalSigner::generate().unwrap());
        let proof = provider(signer.clone()).auth_signature().await.unwrap();

        assert_eq!(proof.address, signer.local_address());
        assert_eq!(proof.scheme, AuthScheme::Eip4361);
        assert!(proof.signature.starts_with("0x"));

        let lines: Vec<&str> = proof.typed_data.lines().collect();
        assert_eq!(
            lines[0],
            "localhost wants you to sign in with your Ethereum account:"
        );
        assert_eq!(lines[1], signer.local_address().to_checksum());
        assert!(lines.contains(&"Chain ID: 80002"));
        assert!(lines.iter().any(|l| l.starts_with("Issued At: ")));
        assert!(signer.verify(proof.typed_data.as_bytes(), &proof.signature));
    }

    #[tokio::test]
    async fn test_proof_is_memoized() {
        let signer = Arc::new(LocalSigner::generate().unwrap());
        let provider = provider(signer.clone());

        let first = provider.auth_signature().await.unwrap();
        let second = provider.auth_signature().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(signer.signatures_issued(), 1);
    }

    #[tokio::test]
    async fn test_single_sign_on() {
        let signer = Arc::new(LocalSigner::generate().unwrap());
        let existing = provider(signer.clone()).auth_signature().await.unwrap();

        let sso =
            SingleSignOnEip4361AuthProvider::new(existing.typed_data.clone(), existing.signature.clone())
                .unwrap();
        assert_eq!(sso.address(), signer.local_address());
        assert_eq!(sso.auth_signature().await.unwrap(), existing);

        assert!(SingleSignOnEip4361AuthProvider::new("hello", "0x00").is_err());
        assert!(SingleSignOnEip4361AuthProvider::new(existing.typed_data, "deadbeef").is_err());
    }

    #[test]
    fn test_wire_shape() {
        let proof = AuthSignature {
            signature: "0x01".to_string(),
            address: "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap(),
            scheme: AuthScheme::Eip4361,
            typed_data: "message".to_string(),
        };
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["scheme"], "EIP4361");
        assert_eq!(json["typedData"], "message");
        assert_eq!(json["address"], "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
    }
}
