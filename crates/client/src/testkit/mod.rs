//! In-process stand-ins for a ritual network
//!
//! Everything a decryption needs besides Porter itself: a dealer that plays the
//! part of a finished DKG ritual and its nodes ([`TestRitual`]), a coordinator
//! contract held in memory ([`MemoryChain`]), and a signing account
//! ([`LocalSigner`]).
//!
//! ```rust,ignore
//! let ritual = TestRitual::new(0, 4, 6)?;
//! let chain = Arc::new(MemoryChain::new(80002));
//! chain.add_ritual(ritual.ritual());
//!
//! // serve `ritual.respond(&body, &failing)` from a fake Porter, then decrypt
//! ```
mod chain;
mod ritual;

pub use chain::{LocalSigner, MemoryChain};
pub use ritual::{TestNode, TestRitual};
