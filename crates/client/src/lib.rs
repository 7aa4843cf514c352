/**
 * Request cancellation and deadlines shared by
 *  every network-bound operation.
 */
pub mod cancel;
/**
 * Chain-facing seams: addresses, coordinator
 *  queries and message signing.
 */
pub mod chain;
/**
 * Access conditions, their versioned wire
 *  expression, and the runtime context that
 *  fills in their variables.
 */
pub mod conditions;
/**
 * Domains, ritual ids and the on-disk
 *  client configuration.
 */
pub mod config;
/**
 * Threshold encryption, session keys and
 *  sealed decryption shares.
 */
pub mod crypto;
/**
 * Quorum decryption of message kits through Porter.
 */
pub mod decrypt;
/**
 * Encryption of data under a ritual key and
 *  an access condition.
 */
pub mod encrypt;
/**
 * The encrypted artifact: ciphertext plus
 *  its access control policy.
 */
pub mod message_kit;
/**
 * HTTP client for the Porter relay, with
 *  ordered endpoint fallback.
 */
pub mod porter;
/**
 * Ritual lookup against the coordinator.
 */
pub mod ritual;
/**
 * In-process ritual network for tests.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::cancel::{CancelHandle, Cancellation, Interrupted};
    pub use crate::chain::{Address, ChainAdapter, Signer};
    pub use crate::conditions::{
        AuthProvider, Comparator, CompoundCondition, Condition, ConditionContext,
        ConditionExpression, ContractCondition, Eip4361AuthProvider, JsonApiCondition,
        JwtCondition, ReturnValueTest, RpcCondition, SequentialCondition,
        SingleSignOnEip4361AuthProvider, TimeCondition, USER_ADDRESS_PARAM,
    };
    pub use crate::config::{ClientConfig, Domain, RitualId};
    pub use crate::decrypt::{DecryptError, ThresholdDecryptor};
    pub use crate::encrypt::{encrypt, EncryptError, Encryptor};
    pub use crate::message_kit::ThresholdMessageKit;
    pub use crate::porter::PorterClient;
    pub use crate::ritual::{Ritual, RitualResolver};
}
