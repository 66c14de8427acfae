use thiserror::Error;

/// Top-level error type for the orchestration layer. Wraps
/// [`custody_core::Error`] for cryptographic failures and adds the
/// resolver/risk/quote/transport error families.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Custody(#[from] custody_core::Error),

    #[error("wallet not found")]
    WalletNotFound,

    #[error("wallet has no encrypted envelope")]
    EncryptedMissing,

    #[error("automation not armed for this wallet")]
    AutomationNotArmed,

    #[error("required environment input missing: {0}")]
    EnvMissing(&'static str),

    #[error("legacy privateKey format is not supported by the resolver")]
    LegacyPrivateKeyUnsupported,

    #[error("no usable secret found for this wallet")]
    SecretMissing,

    #[error("quote request failed: {0}")]
    Quote(String),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("circuit breaker open for {0}")]
    CircuitOpen(String),

    #[error("trade execution budget exceeded")]
    DeadlineExceeded,

    #[error("repository operation failed: {0}")]
    Repository(String),
}

impl Error {
    /// HTTP-style status code a transport-facing caller can translate
    /// this error into. The core itself never constructs a response.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::WalletNotFound => 404,
            Error::EncryptedMissing => 500,
            Error::AutomationNotArmed => 401,
            Error::EnvMissing(_) => 500,
            Error::LegacyPrivateKeyUnsupported => 400,
            Error::SecretMissing => 500,
            Error::Custody(custody_core::Error::AeadVerifyFailed) => 500,
            Error::Custody(_) => 500,
            Error::Quote(_) => 502,
            Error::Http(_) => 502,
            Error::CircuitOpen(_) => 503,
            Error::DeadlineExceeded => 504,
            Error::Repository(_) => 500,
        }
    }

    /// Stable resolver error code string, for callers that key off the
    /// published error-class contract rather than the enum variant.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Error::WalletNotFound => Some("WALLET_NOT_FOUND"),
            Error::EncryptedMissing => Some("ENCRYPTED_MISSING"),
            Error::AutomationNotArmed => Some("AUTOMATION_NOT_ARMED"),
            Error::EnvMissing(_) => Some("ENV_MISSING"),
            Error::LegacyPrivateKeyUnsupported => Some("LEGACY_PRIVATEKEY_UNSUPPORTED"),
            Error::SecretMissing => Some("SECRET_MISSING"),
            Error::Custody(custody_core::Error::AeadVerifyFailed) => Some("AEAD_VERIFY_FAILED"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
