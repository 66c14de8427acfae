//! Chain-agnostic cryptographic primitives for wallet custody: AEAD,
//! KDFs, the envelope codec, and the arm-session manager. No knowledge of
//! Solana, HTTP, or any repository — those live in the orchestration
//! layer that depends on this crate.

pub mod aead;
pub mod arm_session;
pub mod envelope;
pub mod error;
pub mod kdf;

pub use aead::KEY_LEN;
pub use arm_session::{ArmSessionManager, SessionKey, SessionStatus};
pub use envelope::{EnvelopeJson, LegacyEnvelopeJson};
pub use error::{Error, Result};
