//! Cryptographic primitives for threshold access control
//!
//! - **Threshold encryption**: hashed ElGamal over Ristretto255 against a ritual's
//!   DKG public key, with ChaCha20-Poly1305 payloads ([`dkg`])
//! - **Session keys**: x25519 key pairs used to seal each decryption share to the
//!   requester that asked for it ([`SessionSecretKey`], [`EncryptedDecryptionShare`])
//! - **Key derivation**: blake3 `derive_key` with fixed context strings
//!
//! Call [`init`] once before encrypting or decrypting. It is cheap to call again:
//! the first caller runs a self-test and every later (or concurrent) caller awaits
//! that same result.

pub mod dkg;
mod secret;
mod session;
mod share;

use tokio::sync::OnceCell;

pub use dkg::{
    combine_decryption_shares, Ciphertext, CiphertextHeader, DecryptionShare, DkgError,
    DkgPublicKey, PrivateKeyShare, SharedSecret,
};
pub use secret::{Secret, SecretError};
pub use session::{SessionKeyError, SessionPublicKey, SessionSecretKey};
pub use share::{EncryptedDecryptionShare, ShareError};

static INIT: OnceCell<()> = OnceCell::const_new();

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("crypto self-test failed: {0}")]
    SelfTest(String),
}

/// Initialize the cryptography backend
///
/// Idempotent. A failed self-test is not cached, so a later call retries.
pub async fn init() -> Result<(), InitError> {
    INIT.get_or_try_init(|| async {
        tracing::debug!("running crypto self-test");
        self_test().map_err(|e| InitError::SelfTest(e.to_string()))
    })
    .await?;
    Ok(())
}

pub fn is_initialized() -> bool {
    INIT.initialized()
}

fn self_test() -> anyhow::Result<()> {
    const MESSAGE: &[u8] = b"self-test";
    const AAD: &[u8] = b"self-test aad";

    let (public_key, key_shares) = dkg::generate_key_shares(2, 3)?;
    let ciphertext = dkg::encrypt(MESSAGE, AAD, &public_key)?;

    let requester = SessionSecretKey::generate()?;
    let mut shares = Vec::with_capacity(2);
    for key_share in key_shares.iter().take(2) {
        let node = SessionSecretKey::generate()?;
        let share = key_share.create_decryption_share(ciphertext.header(), AAD)?;
        let sealed = EncryptedDecryptionShare::seal(&share, &node, &requester.public())?;
        shares.push((key_share.index(), sealed.open(&requester, &node.public())?));
    }

    let shared_secret = combine_decryption_shares(&shares)?;
    let plaintext = ciphertext.decrypt_with_shared_secret(AAD, &shared_secret)?;
    anyhow::ensure!(plaintext == MESSAGE, "round trip produced different plaintext");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_init_is_idempotent_and_concurrent() {
        let results = futures::future::join_all((0..8).map(|_| init())).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(is_initialized());
        assert!(init().await.is_ok());
    }
}
