//! Wallet data model: identity of a signing-key holder, plus whichever
//! encrypted-secret representation currently backs it.

use serde::{Deserialize, Serialize};

/// A wallet row as read from the repository. Exactly one of `encrypted`
/// (current envelope format) or `private_key` (legacy, unsupported by the
/// resolver) is meaningful at a time — see `signer::resolve_signer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRow {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub label: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "isProtected")]
    pub is_protected: bool,
    pub encrypted: Option<custody_core::EnvelopeJson>,
    #[serde(rename = "privateKey")]
    pub private_key: Option<String>,
    #[serde(rename = "passphraseHash")]
    pub passphrase_hash: Option<String>,
    #[serde(rename = "encryptionVersion")]
    pub encryption_version: u32,
}

impl WalletRow {
    /// True if this row's `privateKey` field is a legacy secret the
    /// resolver must refuse rather than silently consume.
    pub fn has_legacy_secret(&self) -> bool {
        self.encrypted.is_none()
            && self
                .private_key
                .as_ref()
                .is_some_and(|s| !s.is_empty())
    }
}
