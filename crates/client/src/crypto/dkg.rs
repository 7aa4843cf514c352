//! Threshold encryption over Ristretto255
//!
//! A ritual's public key is `P = s·G` where `s` is Shamir-shared across the
//! participants (`s_i = f(i)`, `deg f = threshold - 1`). Encryption is hashed
//! ElGamal: `U = r·G`, payload key `= KDF(r·P)`. A participant's decryption share
//! is `s_i·U`; any `threshold` of them combine with Lagrange coefficients at
//! zero into `s·U = r·P`, the payload key material.

use std::collections::BTreeSet;
use std::fmt;

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::secret::{Secret, SecretError};

/// Size of a compressed Ristretto point in bytes
pub const POINT_SIZE: usize = 32;
/// Size of a [`CiphertextHeader`] in bytes
pub const HEADER_SIZE: usize = POINT_SIZE + 32;

const PAYLOAD_KEY_CONTEXT: &str = "taco 2024 threshold payload key";

#[derive(Debug, thiserror::Error)]
pub enum DkgError {
    #[error("invalid {0}: not a canonical group element")]
    InvalidPoint(&'static str),
    #[error("invalid {what} length, expected {expected}, got {got}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("hex decode error in {0}")]
    Hex(&'static str),
    #[error("invalid threshold parameters: threshold {threshold} of {shares} shares")]
    InvalidParameters { threshold: u32, shares: u32 },
    #[error("share index {0} is not a valid participant index")]
    InvalidShareIndex(u32),
    #[error("share index {0} appears more than once")]
    DuplicateShareIndex(u32),
    #[error("no decryption shares to combine")]
    NoShares,
    #[error("associated data does not match the ciphertext header")]
    AadMismatch,
    #[error("randomness unavailable: {0}")]
    Rng(String),
    #[error("payload error: {0}")]
    Payload(#[from] SecretError),
}

fn random_scalar() -> Result<Scalar, DkgError> {
    let mut wide = [0u8; 64];
    getrandom::getrandom(&mut wide).map_err(|e| DkgError::Rng(e.to_string()))?;
    Ok(Scalar::from_bytes_mod_order_wide(&wide))
}

fn decompress(bytes: &[u8; POINT_SIZE], what: &'static str) -> Result<RistrettoPoint, DkgError> {
    CompressedRistretto(*bytes)
        .decompress()
        .ok_or(DkgError::InvalidPoint(what))
}

fn digest(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn payload_secret(key_material: &RistrettoPoint, header: &CiphertextHeader) -> Secret {
    let mut material = Vec::with_capacity(POINT_SIZE + HEADER_SIZE);
    material.extend_from_slice(key_material.compress().as_bytes());
    material.extend_from_slice(&header.to_bytes());
    Secret::derive(PAYLOAD_KEY_CONTEXT, &material)
}

/// Public key produced by a DKG ritual
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DkgPublicKey([u8; POINT_SIZE]);

impl fmt::Debug for DkgPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DkgPublicKey({})", self.to_hex())
    }
}

impl DkgPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DkgError> {
        let buff: [u8; POINT_SIZE] = bytes.try_into().map_err(|_| DkgError::InvalidLength {
            what: "dkg public key",
            expected: POINT_SIZE,
            got: bytes.len(),
        })?;
        decompress(&buff, "dkg public key")?;
        Ok(Self(buff))
    }

    /// Parse a public key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, DkgError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex).map_err(|_| DkgError::Hex("dkg public key"))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; POINT_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn point(&self) -> Result<RistrettoPoint, DkgError> {
        decompress(&self.0, "dkg public key")
    }
}

impl Serialize for DkgPublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DkgPublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        DkgPublicKey::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// The part of a ciphertext every participant needs to produce a share
///
/// Layout: `ephemeral point (32 bytes) || sha256(aad) (32 bytes)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextHeader {
    ephemeral: [u8; POINT_SIZE],
    aad_digest: [u8; 32],
}

impl CiphertextHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..POINT_SIZE].copy_from_slice(&self.ephemeral);
        out[POINT_SIZE..].copy_from_slice(&self.aad_digest);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DkgError> {
        if bytes.len() != HEADER_SIZE {
            return Err(DkgError::InvalidLength {
                what: "ciphertext header",
                expected: HEADER_SIZE,
                got: bytes.len(),
            });
        }
        let mut ephemeral = [0u8; POINT_SIZE];
        let mut aad_digest = [0u8; 32];
        ephemeral.copy_from_slice(&bytes[..POINT_SIZE]);
        aad_digest.copy_from_slice(&bytes[POINT_SIZE..]);
        decompress(&ephemeral, "ciphertext header")?;
        Ok(Self {
            ephemeral,
            aad_digest,
        })
    }

    /// Deterministic sha256 digest of the header, the value encryptors sign
    pub fn hash(&self) -> [u8; 32] {
        digest(&self.to_bytes())
    }

    fn check_aad(&self, aad: &[u8]) -> Result<(), DkgError> {
        if digest(aad) != self.aad_digest {
            return Err(DkgError::AadMismatch);
        }
        Ok(())
    }
}

/// Threshold ciphertext: header plus AEAD payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    header: CiphertextHeader,
    payload: Vec<u8>,
}

impl Ciphertext {
    pub fn header(&self) -> &CiphertextHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decrypt the payload with a combined shared secret
    pub fn decrypt_with_shared_secret(
        &self,
        aad: &[u8],
        shared_secret: &SharedSecret,
    ) -> Result<Vec<u8>, DkgError> {
        self.header.check_aad(aad)?;
        let secret = payload_secret(&shared_secret.0, &self.header);
        Ok(secret.decrypt(&self.payload, &self.header.to_bytes())?)
    }
}

/// Encrypt `message` to a ritual's public key, binding `aad` into the header
pub fn encrypt(
    message: &[u8],
    aad: &[u8],
    public_key: &DkgPublicKey,
) -> Result<Ciphertext, DkgError> {
    let r = random_scalar()?;
    let ephemeral = RistrettoPoint::mul_base(&r);
    let key_material = r * public_key.point()?;

    let header = CiphertextHeader {
        ephemeral: ephemeral.compress().to_bytes(),
        aad_digest: digest(aad),
    };
    let secret = payload_secret(&key_material, &header);
    let payload = secret.encrypt(message, &header.to_bytes())?;

    Ok(Ciphertext { header, payload })
}

/// One participant's contribution towards decrypting a specific ciphertext
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DecryptionShare([u8; POINT_SIZE]);

impl fmt::Debug for DecryptionShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionShare(..)")
    }
}

impl DecryptionShare {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DkgError> {
        let buff: [u8; POINT_SIZE] = bytes.try_into().map_err(|_| DkgError::InvalidLength {
            what: "decryption share",
            expected: POINT_SIZE,
            got: bytes.len(),
        })?;
        decompress(&buff, "decryption share")?;
        Ok(Self(buff))
    }

    pub fn to_bytes(&self) -> [u8; POINT_SIZE] {
        self.0
    }
}

/// A participant's secret share of the ritual key
///
/// Lives on network nodes; the client only ever sees these in the test kit.
#[derive(Clone)]
pub struct PrivateKeyShare {
    index: u32,
    scalar: Scalar,
}

impl fmt::Debug for PrivateKeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyShare")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl PrivateKeyShare {
    /// 1-based participant index this share was evaluated at
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Produce a decryption share, refusing headers not bound to `aad`
    pub fn create_decryption_share(
        &self,
        header: &CiphertextHeader,
        aad: &[u8],
    ) -> Result<DecryptionShare, DkgError> {
        header.check_aad(aad)?;
        let ephemeral = decompress(&header.ephemeral, "ciphertext header")?;
        Ok(DecryptionShare((self.scalar * ephemeral).compress().to_bytes()))
    }
}

/// Secret shared across a quorum, recovered by [`combine_decryption_shares`]
pub struct SharedSecret(RistrettoPoint);

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Split a fresh ritual key into `shares` pieces, any `threshold` of which decrypt
///
/// Stands in for the DKG transcript aggregation a real ritual performs.
pub fn generate_key_shares(
    threshold: u32,
    shares: u32,
) -> Result<(DkgPublicKey, Vec<PrivateKeyShare>), DkgError> {
    if threshold == 0 || threshold > shares {
        return Err(DkgError::InvalidParameters { threshold, shares });
    }

    let coefficients = (0..threshold)
        .map(|_| random_scalar())
        .collect::<Result<Vec<_>, _>>()?;
    let public_key = RistrettoPoint::mul_base(&coefficients[0]);

    let key_shares = (1..=shares)
        .map(|index| {
            let x = Scalar::from(index as u64);
            // horner evaluation of f(x)
            let scalar = coefficients
                .iter()
                .rev()
                .fold(Scalar::ZERO, |acc, coefficient| acc * x + coefficient);
            PrivateKeyShare { index, scalar }
        })
        .collect();

    Ok((DkgPublicKey(public_key.compress().to_bytes()), key_shares))
}

/// Combine decryption shares, keyed by 1-based participant index
///
/// The caller decides how many shares to pass: fewer than the ritual threshold
/// yields a wrong secret, which then fails payload authentication.
pub fn combine_decryption_shares(
    shares: &[(u32, DecryptionShare)],
) -> Result<SharedSecret, DkgError> {
    if shares.is_empty() {
        return Err(DkgError::NoShares);
    }

    let mut seen = BTreeSet::new();
    for (index, _) in shares {
        if *index == 0 {
            return Err(DkgError::InvalidShareIndex(*index));
        }
        if !seen.insert(*index) {
            return Err(DkgError::DuplicateShareIndex(*index));
        }
    }

    let mut combined = RistrettoPoint::default();
    for (index, share) in shares {
        let xi = Scalar::from(*index as u64);
        let mut numerator = Scalar::ONE;
        let mut denominator = Scalar::ONE;
        for (other, _) in shares {
            if other == index {
                continue;
            }
            let xj = Scalar::from(*other as u64);
            numerator *= xj;
            denominator *= xj - xi;
        }
        let lambda = numerator * denominator.invert();
        combined += lambda * decompress(&share.0, "decryption share")?;
    }

    Ok(SharedSecret(combined))
}
