use thiserror::Error;

/// Errors produced by the envelope key custody primitives.
///
/// These never carry key material — only enough context (lengths, field
/// names) to diagnose a malformed envelope or a failed unwrap.
#[derive(Debug, Error)]
pub enum Error {
    /// AEAD tag verification failed. Fatal to the operation; callers must
    /// not retry with the same inputs and must not log the ciphertext.
    #[error("AEAD tag verification failed")]
    AeadVerifyFailed,

    #[error("unsupported envelope schema version: {0}")]
    InvalidEnvelopeVersion(u32),

    #[error("unsupported KDF descriptor: {0}")]
    UnsupportedKdf(String),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("envelope JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected {expected}-byte key material, got {actual}")]
    KeyLength { expected: usize, actual: usize },

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("envelope field missing or malformed: {0}")]
    MalformedEnvelope(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
