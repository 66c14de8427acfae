//! Envelope JSON codec: builds and parses the on-disk ciphertext bundle
//! that wraps a wallet's raw secret. Two schemes share one wire shape —
//! `protected` (passphrase-derived KEK) and `unprotected` (server-derived
//! KEK) — plus a legacy field set accepted on read only.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::aead::{self, Sealed, IV_LEN, KEY_LEN, TAG_LEN};
use crate::error::{Error, Result};
use crate::kdf::{self, SALT_LEN};

const SCHEMA_VERSION: u32 = 1;
const ALG: &str = "aes-256-gcm";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedJson {
    ct: String,
    iv: String,
    tag: String,
}

impl From<&Sealed> for SealedJson {
    fn from(s: &Sealed) -> Self {
        SealedJson {
            ct: BASE64.encode(&s.ct),
            iv: BASE64.encode(s.iv),
            tag: BASE64.encode(s.tag),
        }
    }
}

impl SealedJson {
    fn into_sealed(self) -> Result<Sealed> {
        let ct = BASE64.decode(self.ct)?;
        let iv_v = BASE64.decode(self.iv)?;
        let tag_v = BASE64.decode(self.tag)?;
        let iv: [u8; IV_LEN] = iv_v
            .try_into()
            .map_err(|_| Error::MalformedEnvelope("iv"))?;
        let tag: [u8; TAG_LEN] = tag_v
            .try_into()
            .map_err(|_| Error::MalformedEnvelope("tag"))?;
        Ok(Sealed { ct, iv, tag })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum KdfDescriptor {
    Argon2id {
        name: String,
        salt: String,
    },
    HkdfSha256 {
        name: String,
        info: String,
        #[serde(rename = "saltSrc")]
        salt_src: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeJson {
    pub v: u32,
    pub scheme: String,
    pub alg: String,
    pub kdf: KdfDescriptor,
    pub wrapped: SealedJson,
    #[serde(rename = "kekWrappedDek")]
    pub kek_wrapped_dek: SealedJson,
}

impl EnvelopeJson {
    /// Whether this envelope uses the passphrase-derived (Argon2id) KEK
    /// scheme, as opposed to the server-derived (HKDF) scheme.
    pub fn is_protected(&self) -> bool {
        matches!(self.kdf, KdfDescriptor::Argon2id { .. })
    }
}

/// Legacy field set accepted on read only. Normalized to [`EnvelopeJson`]
/// the next time the envelope is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyEnvelopeJson {
    #[serde(rename = "dekCipher")]
    pub dek_cipher: String,
    #[serde(rename = "dekIV")]
    pub dek_iv: String,
    #[serde(rename = "dekTag")]
    pub dek_tag: String,
    pub salt: String,
}

fn aad_protected(user_id: &str, wallet_id: &str) -> Vec<u8> {
    format!("user:{user_id}:wallet:{wallet_id}").into_bytes()
}

/// Encrypt a raw secret under a fresh random DEK, itself wrapped under a
/// passphrase-derived KEK. Zeroizes the DEK and KEK before returning.
pub fn encrypt_protected(secret: &[u8], passphrase: &str, user_id: &str, wallet_id: &str) -> Result<EnvelopeJson> {
    let mut dek = [0u8; KEY_LEN];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut dek);
    let mut salt = [0u8; SALT_LEN];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut salt);

    let mut kek = kdf::derive_kek_passphrase(passphrase, &salt)?;

    let aad = aad_protected(user_id, wallet_id);
    let wrapped = aead::encrypt(&dek, secret, &aad)?;
    let kek_wrapped_dek = aead::encrypt(&kek, &dek, b"")?;

    dek.zeroize();
    kek.zeroize();

    Ok(EnvelopeJson {
        v: SCHEMA_VERSION,
        scheme: "envelope".to_string(),
        alg: ALG.to_string(),
        kdf: KdfDescriptor::Argon2id {
            name: "argon2id".to_string(),
            salt: BASE64.encode(salt),
        },
        wrapped: (&wrapped).into(),
        kek_wrapped_dek: (&kek_wrapped_dek).into(),
    })
}

/// Derive the KEK from `passphrase` and unwrap the DEK it protects,
/// without touching the wrapped secret. This is the operation an "arm"
/// endpoint performs: verify a passphrase and hand the resulting DEK to
/// the Arm-Session Manager, never the raw secret itself.
///
/// Fails with [`Error::AeadVerifyFailed`] on a wrong passphrase or a
/// tampered `kekWrappedDek` field — the same variant either way, so no
/// oracle distinguishes the two failure causes.
pub fn unwrap_dek_protected(env: &EnvelopeJson, passphrase: &str) -> Result<[u8; KEY_LEN]> {
    if env.v != SCHEMA_VERSION {
        return Err(Error::InvalidEnvelopeVersion(env.v));
    }
    let salt = match &env.kdf {
        KdfDescriptor::Argon2id { salt, .. } => {
            let raw = BASE64.decode(salt)?;
            let arr: [u8; SALT_LEN] = raw.try_into().map_err(|_| Error::MalformedEnvelope("kdf.salt"))?;
            arr
        }
        KdfDescriptor::HkdfSha256 { .. } => {
            return Err(Error::UnsupportedKdf("expected argon2id, got hkdf-sha256".to_string()))
        }
    };

    let mut kek = kdf::derive_kek_passphrase(passphrase, &salt)?;
    let kek_wrapped_dek = env.kek_wrapped_dek.clone().into_sealed()?;
    let dek_result = aead::decrypt(&kek, &kek_wrapped_dek, b"");
    kek.zeroize();
    let mut dek_vec = dek_result.map_err(|_| Error::AeadVerifyFailed)?;
    let dek: [u8; KEY_LEN] = dek_vec
        .as_slice()
        .try_into()
        .map_err(|_| Error::MalformedEnvelope("dek"))?;
    dek_vec.zeroize();
    Ok(dek)
}

/// Decrypt a protected envelope with a user-supplied passphrase in one
/// shot (derive KEK, unwrap DEK, unwrap secret). Fails with
/// [`Error::AeadVerifyFailed`] on a wrong passphrase, wrong AAD, or
/// tampered ciphertext — the same variant in every case, so no oracle is
/// leaked about which stage failed.
pub fn decrypt_protected(
    env: &EnvelopeJson,
    passphrase: &str,
    user_id: &str,
    wallet_id: &str,
) -> Result<Vec<u8>> {
    let mut dek = unwrap_dek_protected(env, passphrase)?;
    let secret = unwrap_secret_with_dek(env, &dek, user_id, wallet_id);
    dek.zeroize();
    secret
}

/// Unwrap the `wrapped` secret directly with an externally-held DEK (an
/// armed session's DEK), bypassing KEK derivation entirely. Used by the
/// signer resolver's protected path once the Arm-Session Manager has
/// already produced a live DEK.
pub fn unwrap_secret_with_dek(
    env: &EnvelopeJson,
    dek: &[u8; KEY_LEN],
    user_id: &str,
    wallet_id: &str,
) -> Result<Vec<u8>> {
    if env.v != SCHEMA_VERSION {
        return Err(Error::InvalidEnvelopeVersion(env.v));
    }
    let aad = aad_protected(user_id, wallet_id);
    let wrapped = env.wrapped.clone().into_sealed()?;
    aead::decrypt(dek, &wrapped, &aad)
}

/// Encrypt a raw secret under a fresh random DEK, wrapped under a
/// server-secret-derived KEK. Both AEAD calls use empty AAD — the HKDF
/// salt already binds the user.
pub fn encrypt_unprotected(secret: &[u8], server_secret: &str, user_id: &str) -> Result<EnvelopeJson> {
    let mut dek = [0u8; KEY_LEN];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut dek);
    let mut kek = kdf::derive_kek_server(server_secret, user_id)?;

    let wrapped = aead::encrypt(&dek, secret, b"")?;
    let kek_wrapped_dek = aead::encrypt(&kek, &dek, b"")?;

    dek.zeroize();
    kek.zeroize();

    Ok(EnvelopeJson {
        v: SCHEMA_VERSION,
        scheme: "envelope".to_string(),
        alg: ALG.to_string(),
        kdf: KdfDescriptor::HkdfSha256 {
            name: "hkdf-sha256".to_string(),
            info: "wallet-kek".to_string(),
            salt_src: "userId".to_string(),
        },
        wrapped: (&wrapped).into(),
        kek_wrapped_dek: (&kek_wrapped_dek).into(),
    })
}

/// Decrypt an unprotected envelope. Fails with [`Error::AeadVerifyFailed`]
/// if `user_id` does not match the user the envelope was encrypted for —
/// the HKDF salt binds it, so a mismatched user derives a different KEK
/// and the DEK unwrap tag check fails.
pub fn decrypt_unprotected(env: &EnvelopeJson, server_secret: &str, user_id: &str) -> Result<Vec<u8>> {
    if env.v != SCHEMA_VERSION {
        return Err(Error::InvalidEnvelopeVersion(env.v));
    }
    match &env.kdf {
        KdfDescriptor::HkdfSha256 { .. } => {}
        KdfDescriptor::Argon2id { .. } => {
            return Err(Error::UnsupportedKdf("expected hkdf-sha256, got argon2id".to_string()))
        }
    }

    let mut kek = kdf::derive_kek_server(server_secret, user_id)?;
    let kek_wrapped_dek = env.kek_wrapped_dek.clone().into_sealed()?;
    let dek_result = aead::decrypt(&kek, &kek_wrapped_dek, b"");
    kek.zeroize();
    let mut dek_vec = dek_result.map_err(|_| Error::AeadVerifyFailed)?;
    let dek: [u8; KEY_LEN] = dek_vec
        .as_slice()
        .try_into()
        .map_err(|_| Error::MalformedEnvelope("dek"))?;

    let wrapped = env.wrapped.clone().into_sealed()?;
    let secret = aead::decrypt(&dek, &wrapped, b"");

    dek_vec.zeroize();
    let mut dek = dek;
    dek.zeroize();

    secret
}

/// Normalize a legacy `{dekCipher, dekIV, dekTag, salt}` field set into
/// the current envelope shape, given the secret it already decrypts to
/// (legacy rows are migrated by decrypting once under the old layout and
/// re-encrypting under the current one — callers do that, this only
/// reshapes the JSON for rows that are already current-format candidates).
pub fn from_legacy_json(legacy: &LegacyEnvelopeJson) -> Result<EnvelopeJson> {
    let salt_raw = BASE64.decode(&legacy.salt)?;
    let salt: [u8; SALT_LEN] = salt_raw
        .try_into()
        .map_err(|_| Error::MalformedEnvelope("salt"))?;
    let dek_ct = BASE64.decode(&legacy.dek_cipher)?;
    let dek_iv_v = BASE64.decode(&legacy.dek_iv)?;
    let dek_tag_v = BASE64.decode(&legacy.dek_tag)?;
    let iv: [u8; IV_LEN] = dek_iv_v.try_into().map_err(|_| Error::MalformedEnvelope("dekIV"))?;
    let tag: [u8; TAG_LEN] = dek_tag_v.try_into().map_err(|_| Error::MalformedEnvelope("dekTag"))?;

    Ok(EnvelopeJson {
        v: SCHEMA_VERSION,
        scheme: "envelope".to_string(),
        alg: ALG.to_string(),
        kdf: KdfDescriptor::Argon2id {
            name: "argon2id".to_string(),
            salt: BASE64.encode(salt),
        },
        wrapped: SealedJson {
            ct: String::new(),
            iv: String::new(),
            tag: String::new(),
        },
        kek_wrapped_dek: SealedJson {
            ct: BASE64.encode(dek_ct),
            iv: BASE64.encode(iv),
            tag: BASE64.encode(tag),
        },
    })
}

pub fn to_json_string(env: &EnvelopeJson) -> Result<String> {
    Ok(serde_json::to_string(env)?)
}

pub fn from_json_str(s: &str) -> Result<EnvelopeJson> {
    Ok(serde_json::from_str(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_round_trip() {
        let secret = b"raw-ed25519-secret-key-64-bytes";
        let env = encrypt_protected(secret, "hunter2", "u1", "w1").unwrap();
        let out = decrypt_protected(&env, "hunter2", "u1", "w1").unwrap();
        assert_eq!(out, secret);
    }

    #[test]
    fn protected_wrong_passphrase_fails() {
        let secret = b"top secret";
        let env = encrypt_protected(secret, "hunter2", "u1", "w1").unwrap();
        let err = decrypt_protected(&env, "wrong", "u1", "w1").unwrap_err();
        assert!(matches!(err, Error::AeadVerifyFailed));
    }

    #[test]
    fn protected_wrong_aad_binding_fails() {
        let secret = b"top secret";
        let env = encrypt_protected(secret, "hunter2", "u1", "w1").unwrap();
        let err = decrypt_protected(&env, "hunter2", "u1", "w2").unwrap_err();
        assert!(matches!(err, Error::AeadVerifyFailed));
    }

    #[test]
    fn unprotected_round_trip() {
        let secret = b"raw-ed25519-secret-key-64-bytes";
        let env = encrypt_unprotected(secret, "server-secret", "u1").unwrap();
        let out = decrypt_unprotected(&env, "server-secret", "u1").unwrap();
        assert_eq!(out, secret);
    }

    #[test]
    fn unprotected_wrong_user_fails() {
        let secret = b"top secret";
        let env = encrypt_unprotected(secret, "server-secret", "u1").unwrap();
        let err = decrypt_unprotected(&env, "server-secret", "u2").unwrap_err();
        assert!(matches!(err, Error::AeadVerifyFailed));
    }

    #[test]
    fn unwrap_dek_then_unwrap_secret_matches_decrypt_protected() {
        let secret = b"top secret";
        let env = encrypt_protected(secret, "hunter2", "u1", "w1").unwrap();
        let dek = unwrap_dek_protected(&env, "hunter2").unwrap();
        let out = unwrap_secret_with_dek(&env, &dek, "u1", "w1").unwrap();
        assert_eq!(out, secret);
    }

    #[test]
    fn unwrap_dek_wrong_passphrase_fails() {
        let env = encrypt_protected(b"top secret", "hunter2", "u1", "w1").unwrap();
        assert!(matches!(
            unwrap_dek_protected(&env, "wrong"),
            Err(Error::AeadVerifyFailed)
        ));
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let secret = b"top secret";
        let env = encrypt_protected(secret, "hunter2", "u1", "w1").unwrap();
        let json = to_json_string(&env).unwrap();
        let parsed = from_json_str(&json).unwrap();
        let out = decrypt_protected(&parsed, "hunter2", "u1", "w1").unwrap();
        assert_eq!(out, secret);
    }
}
