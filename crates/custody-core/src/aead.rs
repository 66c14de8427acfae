//! AES-256-GCM encrypt/decrypt with 96-bit IV and 128-bit tag. Pure function
//! layer — no persistence, no key derivation. Callers are responsible for
//! never reusing a key across an unbounded number of messages; the envelope
//! layer ensures each DEK wraps exactly one secret and each KEK wraps
//! exactly one DEK.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{Error, Result};

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// An AEAD ciphertext bundle: the encrypted payload split into its
/// ciphertext, the IV used to produce it, and the authentication tag.
///
/// `ct` does not include the tag — `aes-gcm` appends it internally and we
/// split it back out so the on-disk envelope (§6) can carry `ct`/`tag`
/// as distinct base64 fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ct: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub tag: [u8; TAG_LEN],
}

/// Encrypt `plaintext` under `key` with a fresh random IV, authenticating
/// `aad`. The IV is drawn from a CSPRNG for every call.
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Sealed> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::KeyLength {
        expected: KEY_LEN,
        actual: key.len(),
    })?;
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let mut out = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| Error::AeadVerifyFailed)?;

    // `aes-gcm` appends the 16-byte tag to the ciphertext; split it back out.
    let tag_start = out.len() - TAG_LEN;
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&out[tag_start..]);
    out.truncate(tag_start);

    Ok(Sealed { ct: out, iv, tag })
}

/// Decrypt a [`Sealed`] bundle under `key`, authenticating `aad`. Returns
/// `Error::AeadVerifyFailed` on any tag mismatch — including a wrong key, a
/// corrupted ciphertext, or an AAD that doesn't match what was used at
/// encryption time.
pub fn decrypt(key: &[u8; KEY_LEN], sealed: &Sealed, aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::KeyLength {
        expected: KEY_LEN,
        actual: key.len(),
    })?;
    let nonce = Nonce::from_slice(&sealed.iv);

    let mut combined = Vec::with_capacity(sealed.ct.len() + TAG_LEN);
    combined.extend_from_slice(&sealed.ct);
    combined.extend_from_slice(&sealed.tag);

    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| Error::AeadVerifyFailed)?;

    combined.zeroize();
    Ok(plaintext)
}
