use std::fmt;

use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::secret::Secret;

/// Size of an x25519 session key in bytes
pub const SESSION_KEY_SIZE: usize = 32;

const SHARED_SECRET_CONTEXT: &str = "taco 2024 session shared secret";

/// Errors that can occur during session key operations
#[derive(Debug, thiserror::Error)]
pub enum SessionKeyError {
    #[error("session key error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Public half of a session key pair
///
/// Ritual participants publish one of these on chain; requesters generate a
/// fresh one for every decryption attempt and send it alongside the request so
/// each node can seal its share to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionPublicKey(X25519PublicKey);

impl fmt::Debug for SessionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionPublicKey({})", self.to_hex())
    }
}

impl From<[u8; SESSION_KEY_SIZE]> for SessionPublicKey {
    fn from(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        SessionPublicKey(X25519PublicKey::from(bytes))
    }
}

impl TryFrom<&[u8]> for SessionPublicKey {
    type Error = SessionKeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let buff: [u8; SESSION_KEY_SIZE] = bytes.try_into().map_err(|_| {
            anyhow::anyhow!(
                "invalid session key size, expected {}, got {}",
                SESSION_KEY_SIZE,
                bytes.len()
            )
        })?;
        Ok(buff.into())
    }
}

impl SessionPublicKey {
    /// Parse a session key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, SessionKeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; SESSION_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("session key hex decode error"))?;
        Ok(buff.into())
    }

    pub fn to_bytes(&self) -> [u8; SESSION_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl Serialize for SessionPublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SessionPublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        SessionPublicKey::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Secret half of a session key pair
///
/// Never serialized. A requester's key lives only for one decryption attempt.
#[derive(Clone)]
pub struct SessionSecretKey(StaticSecret);

impl fmt::Debug for SessionSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecretKey(..)")
    }
}

impl From<[u8; SESSION_KEY_SIZE]> for SessionSecretKey {
    fn from(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        SessionSecretKey(StaticSecret::from(bytes))
    }
}

impl SessionSecretKey {
    /// Generate a new random session key using a cryptographically secure RNG
    pub fn generate() -> Result<Self, SessionKeyError> {
        let mut bytes = [0u8; SESSION_KEY_SIZE];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| anyhow::anyhow!("failed to generate random bytes: {}", e))?;
        Ok(Self::from(bytes))
    }

    pub fn public(&self) -> SessionPublicKey {
        SessionPublicKey(X25519PublicKey::from(&self.0))
    }

    /// Diffie-Hellman with a peer's public key, hashed into a symmetric [`Secret`]
    ///
    /// Both sides derive the same secret: `a.derive_shared_secret(B) == b.derive_shared_secret(A)`.
    pub fn derive_shared_secret(&self, peer: &SessionPublicKey) -> Secret {
        let shared = self.0.diffie_hellman(&peer.0);
        Secret::derive(SHARED_SECRET_CONTEXT, shared.as_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shared_secret_agreement() {
        let alice = SessionSecretKey::generate().unwrap();
        let bob = SessionSecretKey::generate().unwrap();

        let ab = alice.derive_shared_secret(&bob.public());
        let ba = bob.derive_shared_secret(&alice.public());
        assert_eq!(ab, ba);

        let carol = SessionSecretKey::generate().unwrap();
        assert_ne!(ab, carol.derive_shared_secret(&alice.public()));
    }

    #[test]
    fn test_public_key_hex() {
        let key = SessionSecretKey::generate().unwrap().public();
        let recovered = SessionPublicKey::from_hex(&format!("0x{}", key.to_hex())).unwrap();
        assert_eq!(key, recovered);

        assert!(SessionPublicKey::from_hex("abcd").is_err());
        assert!(SessionPublicKey::try_from([0u8; 31].as_slice()).is_err());
    }
}
