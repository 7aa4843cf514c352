//! Encrypting data under a ritual key and an access condition

use std::sync::Arc;

use crate::cancel::{Cancellation, Interrupted};
use crate::chain::{ChainError, Signer};
use crate::conditions::{Condition, ConditionError, ConditionExpression};
use crate::crypto::{self, dkg, DkgError, DkgPublicKey, InitError};
use crate::message_kit::{AccessControlPolicy, AuthenticatedData, ThresholdMessageKit};
use crate::ritual::{RitualError, RitualResolver};

#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error(transparent)]
    Init(#[from] InitError),
    #[error("condition error: {0}")]
    Condition(#[from] ConditionError),
    #[error("encryption failed: {0}")]
    Crypto(#[from] DkgError),
    #[error("authorization signature failed: {0}")]
    Signer(#[from] ChainError),
    #[error(transparent)]
    Ritual(#[from] RitualError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Encrypt `message` so that only a quorum of the ritual behind
/// `dkg_public_key` can decrypt it, and only while `condition` holds
///
/// `auth_signer` signs the ciphertext header hash; nodes check that signature
/// before serving shares.
pub async fn encrypt(
    message: &[u8],
    condition: Condition,
    dkg_public_key: &DkgPublicKey,
    auth_signer: &dyn Signer,
) -> Result<ThresholdMessageKit, EncryptError> {
    crypto::init().await?;

    let auth_data = AuthenticatedData::new(*dkg_public_key, ConditionExpression::new(condition));
    let aad = auth_data.aad()?;
    let ciphertext = dkg::encrypt(message, &aad, dkg_public_key)?;

    let header_hash = ciphertext.header().hash();
    let authorization = auth_signer.sign_message(&header_hash).await?;
    tracing::info!(
        bytes = message.len(),
        public_key = %dkg_public_key.to_hex(),
        "encrypted message"
    );

    Ok(ThresholdMessageKit::new(
        ciphertext,
        AccessControlPolicy::new(auth_data, authorization),
    ))
}

/// Encrypts on behalf of one authorized account
#[derive(Debug, Clone)]
pub struct Encryptor {
    signer: Arc<dyn Signer>,
}

impl Encryptor {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }

    pub async fn encrypt(
        &self,
        message: &[u8],
        condition: Condition,
        dkg_public_key: &DkgPublicKey,
        cancel: &Cancellation,
    ) -> Result<ThresholdMessageKit, EncryptError> {
        cancel
            .run(encrypt(message, condition, dkg_public_key, self.signer.as_ref()))
            .await?
    }

    /// Encrypt to an active ritual by id, looking up its public key first
    pub async fn encrypt_for_ritual(
        &self,
        resolver: &RitualResolver,
        ritual_id: u32,
        message: &[u8],
        condition: Condition,
        cancel: &Cancellation,
    ) -> Result<ThresholdMessageKit, EncryptError> {
        cancel
            .run(async {
                let ritual = resolver.active_ritual(ritual_id).await?;
                encrypt(message, condition, &ritual.dkg_public_key, self.signer.as_ref()).await
            })
            .await?
    }
}
