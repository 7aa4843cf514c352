//! Decryption shares sealed to a requester's session key
//!
//! A node never returns a bare [`DecryptionShare`]: it derives a symmetric key
//! from its own session secret and the requester's ephemeral session public key,
//! and seals the share with it. The requester derives the same key from its
//! ephemeral secret and the node's published session public key.
//!
//! # Wire Format
//!
//! ```text
//! [ nonce: 12 bytes ][ encrypted share: 32 bytes ][ tag: 16 bytes ]
//! ```

use serde::{Deserialize, Serialize};

use super::dkg::{DecryptionShare, DkgError, POINT_SIZE};
use super::secret::{SecretError, NONCE_SIZE, TAG_SIZE};
use super::session::{SessionPublicKey, SessionSecretKey};

/// Total size of a sealed share in bytes
pub const ENCRYPTED_SHARE_SIZE: usize = NONCE_SIZE + POINT_SIZE + TAG_SIZE;

const SHARE_AAD: &[u8] = b"taco decryption share";

/// Errors that can occur while sealing or opening a share
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("invalid encrypted share size, expected {expected}, got {got}")]
    InvalidSize { expected: usize, got: usize },
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("share error: {0}")]
    Dkg(#[from] DkgError),
}

/// A [`DecryptionShare`] encrypted for one requester session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedDecryptionShare(Vec<u8>);

impl TryFrom<&[u8]> for EncryptedDecryptionShare {
    type Error = ShareError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != ENCRYPTED_SHARE_SIZE {
            return Err(ShareError::InvalidSize {
                expected: ENCRYPTED_SHARE_SIZE,
                got: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }
}

impl EncryptedDecryptionShare {
    /// Seal a share for `requester`, using the sending node's session secret
    pub fn seal(
        share: &DecryptionShare,
        node_secret: &SessionSecretKey,
        requester: &SessionPublicKey,
    ) -> Result<Self, ShareError> {
        let secret = node_secret.derive_shared_secret(requester);
        let sealed = secret.encrypt(&share.to_bytes(), SHARE_AAD)?;
        Self::try_from(sealed.as_slice())
    }

    /// Open a share with the requester's session secret and the node's session public key
    ///
    /// Fails if the share was sealed for a different session or by a different node.
    pub fn open(
        &self,
        requester_secret: &SessionSecretKey,
        node_public: &SessionPublicKey,
    ) -> Result<DecryptionShare, ShareError> {
        let secret = requester_secret.derive_shared_secret(node_public);
        let bytes = secret.decrypt(&self.0, SHARE_AAD)?;
        Ok(DecryptionShare::from_bytes(&bytes)?)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::dkg::{encrypt, generate_key_shares};

    fn share() -> DecryptionShare {
        let (public_key, key_shares) = generate_key_shares(1, 1).unwrap();
        let ciphertext = encrypt(b"secret", b"", &public_key).unwrap();
        key_shares[0]
            .create_decryption_share(ciphertext.header(), b"")
            .unwrap()
    }

    #[test]
    fn test_seal_and_open() {
        let node = SessionSecretKey::generate().unwrap();
        let requester = SessionSecretKey::generate().unwrap();
        let share = share();

        let sealed = EncryptedDecryptionShare::seal(&share, &node, &requester.public()).unwrap();
        assert_eq!(sealed.bytes().len(), ENCRYPTED_SHARE_SIZE);

        let opened = sealed.open(&requester, &node.public()).unwrap();
        assert_eq!(opened, share);
    }

    #[test]
    fn test_open_with_wrong_session_fails() {
        let node = SessionSecretKey::generate().unwrap();
        let requester = SessionSecretKey::generate().unwrap();
        let eavesdropper = SessionSecretKey::generate().unwrap();

        let sealed = EncryptedDecryptionShare::seal(&share(), &node, &requester.public()).unwrap();
        assert!(sealed.open(&eavesdropper, &node.public()).is_err());

        // a share attributed to the wrong node does not open either
        let other_node = SessionSecretKey::generate().unwrap();
        assert!(sealed.open(&requester, &other_node.public()).is_err());
    }

    #[test]
    fn test_size_validation() {
        assert!(EncryptedDecryptionShare::try_from([0u8; 10].as_slice()).is_err());
        assert!(EncryptedDecryptionShare::try_from([0u8; ENCRYPTED_SHARE_SIZE].as_slice()).is_ok());
    }
}
