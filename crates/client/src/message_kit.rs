//! Ciphertext bundled with the policy needed to decrypt it
//!
//! A [`ThresholdMessageKit`] is what an encryptor hands to readers. Its
//! [`AccessControlPolicy`] names the ritual key and the conditions, and carries
//! the encryptor's signature over the ciphertext header. The policy's
//! authenticated data is bound into the ciphertext as associated data, so
//! nodes refuse to produce shares for a kit whose policy was swapped.
//!
//! Binary layout: `b"TMK" || major version (1 byte) || bincode(kit)`.

use serde::{Deserialize, Serialize};

use crate::conditions::{ConditionError, ConditionExpression};
use crate::crypto::{Ciphertext, CiphertextHeader, DkgError, DkgPublicKey};

const MAGIC: &[u8; 3] = b"TMK";
const KIT_VERSION: u8 = 1;
const PREFIX_SIZE: usize = MAGIC.len() + 1;

#[derive(Debug, thiserror::Error)]
pub enum MessageKitError {
    #[error("not a message kit: bad magic bytes")]
    BadMagic,
    #[error("message kit format version {0} is not supported")]
    UnsupportedVersion(u8),
    #[error("message kit encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("message kit conditions are invalid: {0}")]
    Conditions(#[from] ConditionError),
    #[error("message kit public key is invalid: {0}")]
    PublicKey(#[from] DkgError),
}

/// The part of the policy bound into the ciphertext
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedData {
    public_key: DkgPublicKey,
    conditions: ConditionExpression,
}

impl AuthenticatedData {
    pub fn new(public_key: DkgPublicKey, conditions: ConditionExpression) -> Self {
        Self {
            public_key,
            conditions,
        }
    }

    pub fn public_key(&self) -> &DkgPublicKey {
        &self.public_key
    }

    pub fn conditions(&self) -> &ConditionExpression {
        &self.conditions
    }

    /// Associated data: `public key bytes || conditions JSON`
    pub fn aad(&self) -> Result<Vec<u8>, ConditionError> {
        let conditions = self.conditions.to_json()?;
        let mut aad = Vec::with_capacity(self.public_key.to_bytes().len() + conditions.len());
        aad.extend_from_slice(&self.public_key.to_bytes());
        aad.extend_from_slice(conditions.as_bytes());
        Ok(aad)
    }
}

/// Authenticated data plus the encryptor's authorization
#[derive(Debug, Clone, PartialEq)]
pub struct AccessControlPolicy {
    auth_data: AuthenticatedData,
    authorization: Vec<u8>,
}

impl AccessControlPolicy {
    pub fn new(auth_data: AuthenticatedData, authorization: Vec<u8>) -> Self {
        Self {
            auth_data,
            authorization,
        }
    }

    pub fn auth_data(&self) -> &AuthenticatedData {
        &self.auth_data
    }

    pub fn public_key(&self) -> &DkgPublicKey {
        self.auth_data.public_key()
    }

    pub fn conditions(&self) -> &ConditionExpression {
        self.auth_data.conditions()
    }

    /// Signature over the ciphertext header hash
    pub fn authorization(&self) -> &[u8] {
        &self.authorization
    }

    pub fn aad(&self) -> Result<Vec<u8>, ConditionError> {
        self.auth_data.aad()
    }

    /// Bincode form, as sent to nodes alongside a decryption request
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageKitError> {
        Ok(bincode::serialize(&AcpWire::from_policy(self)?)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageKitError> {
        bincode::deserialize::<AcpWire>(bytes)?.into_policy()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdMessageKit {
    ciphertext: Ciphertext,
    acp: AccessControlPolicy,
}

/// Conditions travel as JSON text inside the binary form
#[derive(Serialize, Deserialize)]
struct AcpWire {
    public_key: [u8; 32],
    conditions: String,
    authorization: Vec<u8>,
}

impl AcpWire {
    fn from_policy(acp: &AccessControlPolicy) -> Result<Self, MessageKitError> {
        Ok(Self {
            public_key: acp.public_key().to_bytes(),
            conditions: acp.conditions().to_json()?,
            authorization: acp.authorization.clone(),
        })
    }

    fn into_policy(self) -> Result<AccessControlPolicy, MessageKitError> {
        let public_key = DkgPublicKey::from_bytes(&self.public_key)?;
        let conditions = ConditionExpression::from_json(&self.conditions)?;
        Ok(AccessControlPolicy::new(
            AuthenticatedData::new(public_key, conditions),
            self.authorization,
        ))
    }
}

#[derive(Serialize, Deserialize)]
struct KitWire {
    ciphertext: Ciphertext,
    acp: AcpWire,
}

impl ThresholdMessageKit {
    pub fn new(ciphertext: Ciphertext, acp: AccessControlPolicy) -> Self {
        Self { ciphertext, acp }
    }

    pub fn ciphertext(&self) -> &Ciphertext {
        &self.ciphertext
    }

    pub fn ciphertext_header(&self) -> &CiphertextHeader {
        self.ciphertext.header()
    }

    pub fn acp(&self) -> &AccessControlPolicy {
        &self.acp
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageKitError> {
        let wire = KitWire {
            ciphertext: self.ciphertext.clone(),
            acp: AcpWire::from_policy(&self.acp)?,
        };
        let mut out = Vec::with_capacity(PREFIX_SIZE + 256);
        out.extend_from_slice(MAGIC);
        out.push(KIT_VERSION);
        out.extend(bincode::serialize(&wire)?);
        Ok(out)
    }

    /// Decode a kit, rejecting conditions written by a newer expression major version
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageKitError> {
        if bytes.len() < PREFIX_SIZE || &bytes[..MAGIC.len()] != MAGIC {
            return Err(MessageKitError::BadMagic);
        }
        let version = bytes[MAGIC.len()];
        if version != KIT_VERSION {
            return Err(MessageKitError::UnsupportedVersion(version));
        }

        let wire: KitWire = bincode::deserialize(&bytes[PREFIX_SIZE..])?;
        Ok(Self {
            ciphertext: wire.ciphertext,
            acp: wire.acp.into_policy()?,
        })
    }
}
