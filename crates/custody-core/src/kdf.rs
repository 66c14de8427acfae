//! Key-encryption-key derivation. Two provenances coexist: a passphrase
//! path (Argon2id) for wallets a user must unlock explicitly, and a
//! server-secret path (HKDF-SHA-256) for wallets the server can unlock on
//! its own.

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::aead::KEY_LEN;
use crate::error::{Error, Result};

pub const SALT_LEN: usize = 16;

const ARGON2_TIME_COST: u32 = 3;
const ARGON2_MEM_COST_KIB: u32 = 1 << 16;
const ARGON2_PARALLELISM: u32 = 1;

const HKDF_INFO: &[u8] = b"wallet-kek";

/// Derive a 32-byte KEK from a user passphrase and a 16-byte salt using
/// Argon2id with fixed, non-configurable parameters — callers must not be
/// able to weaken these.
pub fn derive_kek_passphrase(passphrase: &str, salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN]> {
    let params = Params::new(
        ARGON2_MEM_COST_KIB,
        ARGON2_TIME_COST,
        ARGON2_PARALLELISM,
        Some(KEY_LEN),
    )
    .map_err(|e| Error::Kdf(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut out)
        .map_err(|e| Error::Kdf(e.to_string()))?;
    Ok(out)
}

/// Derive a 32-byte KEK from a server-held secret and a user id using
/// HKDF-SHA-256. `server_secret` is interpreted as hex if it is an
/// even-length string made entirely of hex digits, otherwise as raw UTF-8
/// bytes.
pub fn derive_kek_server(server_secret: &str, user_id: &str) -> Result<[u8; KEY_LEN]> {
    let ikm = interpret_server_secret(server_secret);
    let hk = Hkdf::<Sha256>::new(Some(user_id.as_bytes()), &ikm);
    let mut out = [0u8; KEY_LEN];
    hk.expand(HKDF_INFO, &mut out)
        .map_err(|e| Error::Kdf(e.to_string()))?;
    Ok(out)
}

fn interpret_server_secret(server_secret: &str) -> Vec<u8> {
    if server_secret.len() % 2 == 0 && !server_secret.is_empty() {
        if let Ok(bytes) = hex::decode(server_secret) {
            return bytes;
        }
    }
    server_secret.as_bytes().to_vec()
}
