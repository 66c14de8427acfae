//! Signer Resolver (C4): given `(userId, walletId)`, produces a ready
//! signer by selecting the wallet's envelope scheme and, for protected
//! wallets, consulting the Arm-Session Manager.

use custody_core::{envelope, ArmSessionManager, SessionKey};
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer as SolanaSignerTrait;
use zeroize::Zeroize;

use crate::config::ServerSecret;
use crate::error::{Error, Result};
use crate::repository::WalletRepository;
use crate::wallet::WalletRow;

/// A resolved signer, holding a Solana keypair built from a wallet's
/// unwrapped secret. The raw secret bytes that produced it are zeroized
/// before this struct is returned to the caller.
pub struct Signer {
    keypair: Keypair,
}

impl Signer {
    pub fn public_key(&self) -> solana_sdk::pubkey::Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

fn build_signer(mut secret: Vec<u8>) -> Result<Signer> {
    let keypair = Keypair::from_bytes(&secret).map_err(|_| Error::SecretMissing)?;
    secret.zeroize();
    Ok(Signer { keypair })
}

/// Resolve a ready signer for `(user_id, wallet_id)`.
///
/// `server_secret` is required for the unprotected path and absent
/// otherwise yields `ENV_MISSING`. The protected path never receives a
/// passphrase here — it can only succeed if the wallet has already been
/// armed via [`ArmSessionManager::arm`].
pub async fn resolve_signer(
    user_id: &str,
    wallet_id: &str,
    repository: &dyn WalletRepository,
    arm_sessions: &ArmSessionManager,
    server_secret: Option<&ServerSecret>,
) -> Result<Signer> {
    let row = repository
        .find_one(wallet_id, user_id)
        .await
        .map_err(|e| Error::Repository(e.to_string()))?
        .ok_or(Error::WalletNotFound)?;

    if row.is_protected {
        resolve_protected(&row, arm_sessions).await
    } else if row.encrypted.is_some() {
        resolve_unprotected(&row, server_secret)
    } else if row.has_legacy_secret() {
        Err(Error::LegacyPrivateKeyUnsupported)
    } else {
        Err(Error::SecretMissing)
    }
}

async fn resolve_protected(row: &WalletRow, arm_sessions: &ArmSessionManager) -> Result<Signer> {
    let env = row.encrypted.as_ref().ok_or(Error::EncryptedMissing)?;

    let key = SessionKey::new(row.user_id.clone(), row.id.clone());
    let dek = arm_sessions
        .get_dek(&key)
        .await
        .ok_or(Error::AutomationNotArmed)?;

    let mut dek = dek;
    let secret = envelope::unwrap_secret_with_dek(env, &dek, &row.user_id, &row.id)?;
    dek.zeroize();

    build_signer(secret)
}

fn resolve_unprotected(row: &WalletRow, server_secret: Option<&ServerSecret>) -> Result<Signer> {
    let env = row.encrypted.as_ref().ok_or(Error::EncryptedMissing)?;
    let server_secret = server_secret.ok_or(Error::EnvMissing("SERVER_ENCRYPTION_SECRET"))?;

    let secret = envelope::decrypt_unprotected(env, server_secret.as_str(), &row.user_id)?;
    build_signer(secret)
}

/// Arm a protected wallet: verify `passphrase` against the wallet's
/// persisted envelope and, on success, hand the unwrapped DEK to the
/// Arm-Session Manager for `ttl`. A wrong passphrase fails with
/// `Error::Custody(AeadVerifyFailed)` and leaves no session behind — the
/// DEK is only constructed after the AEAD tag check succeeds.
///
/// This is the operation an external "unlock wallet" endpoint calls; the
/// resolver itself never sees a passphrase (§4.4 step 3b assumes a
/// session is already armed).
pub async fn arm_wallet(
    user_id: &str,
    wallet_id: &str,
    passphrase: &str,
    ttl: std::time::Duration,
    repository: &dyn WalletRepository,
    arm_sessions: &ArmSessionManager,
) -> Result<()> {
    let row = repository
        .find_one(wallet_id, user_id)
        .await
        .map_err(|e| Error::Repository(e.to_string()))?
        .ok_or(Error::WalletNotFound)?;

    if !row.is_protected {
        return Err(Error::SecretMissing);
    }
    let env = row.encrypted.as_ref().ok_or(Error::EncryptedMissing)?;

    let dek = envelope::unwrap_dek_protected(env, passphrase)?;
    let key = SessionKey::new(row.user_id.clone(), row.id.clone());
    arm_sessions.arm(key, dek, ttl).await;
    Ok(())
}
