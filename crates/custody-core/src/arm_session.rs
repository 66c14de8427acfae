//! Process-local, time-bounded cache of armed DEKs keyed by
//! `(userId, walletId)`. Lets automation sign transactions for a protected
//! wallet without re-prompting for a passphrase on every trade, for a
//! bounded window.
//!
//! Every entry carries both a per-entry expiry timer and is covered by a
//! periodic sweep — belt-and-braces against a timer that fails to fire.
//! Every exit path (disarm, expiry, sweep, shutdown) zeroizes the DEK
//! bytes before dropping them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use zeroize::Zeroize;

use crate::aead::KEY_LEN;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub wallet_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, wallet_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            wallet_id: wallet_id.into(),
        }
    }
}

struct Entry {
    dek: [u8; KEY_LEN],
    expires_at: Instant,
    timer: JoinHandle<()>,
}

impl Entry {
    fn zeroize_and_abort(mut self) {
        self.timer.abort();
        self.dek.zeroize();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub armed: bool,
    pub ms_left: u64,
}

/// Serializes all operations per key via a single mutex over the whole
/// table; cross-key operations interleave freely since none of them
/// touch I/O, so the lock is held only for in-memory bookkeeping.
pub struct ArmSessionManager {
    sessions: Arc<Mutex<HashMap<SessionKey, Entry>>>,
}

impl ArmSessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Arm `key` with `dek` for `ttl`. Disarms and zeroizes any prior
    /// entry for the same key first, so a fresh `arm` always wins over a
    /// stale timer that hasn't fired yet.
    pub async fn arm(&self, key: SessionKey, dek: [u8; KEY_LEN], ttl: Duration) {
        let mut guard = self.sessions.lock().await;
        if let Some(prev) = guard.remove(&key) {
            prev.zeroize_and_abort();
        }

        let expires_at = Instant::now() + ttl;
        let sessions = self.sessions.clone();
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut guard = sessions.lock().await;
            if let Some(entry) = guard.get(&timer_key) {
                if entry.expires_at <= Instant::now() {
                    if let Some(entry) = guard.remove(&timer_key) {
                        entry.dek_only_zeroize();
                    }
                }
            }
        });

        guard.insert(key.clone(), Entry { dek, expires_at, timer });
        log::debug!(target: "custody_core::arm_session", "armed wallet={}", key.wallet_id);
    }

    /// Extend an existing entry's TTL by `extra`, replacing it with an
    /// identical DEK copy and a fresh timer. Returns `false` if no entry
    /// exists (including one that already expired).
    pub async fn extend(&self, key: &SessionKey, extra: Duration) -> bool {
        let mut guard = self.sessions.lock().await;
        let Some(prev) = guard.remove(key) else {
            return false;
        };
        let now = Instant::now();
        if prev.expires_at <= now {
            prev.zeroize_and_abort();
            return false;
        }

        let remaining = prev.expires_at - now;
        let new_ttl = remaining + extra;
        let mut dek = prev.dek;
        prev.timer.abort();

        let expires_at = now + new_ttl;
        let sessions = self.sessions.clone();
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(new_ttl).await;
            let mut guard = sessions.lock().await;
            if let Some(entry) = guard.get(&timer_key) {
                if entry.expires_at <= Instant::now() {
                    if let Some(entry) = guard.remove(&timer_key) {
                        entry.dek_only_zeroize();
                    }
                }
            }
        });

        let dek_copy = dek;
        dek.zeroize();
        guard.insert(
            key.clone(),
            Entry {
                dek: dek_copy,
                expires_at,
                timer,
            },
        );
        log::debug!(target: "custody_core::arm_session", "extended wallet={}", key.wallet_id);
        true
    }

    /// Cancel the timer, zeroize the DEK, and remove the entry. No-op if
    /// no entry exists.
    pub async fn disarm(&self, key: &SessionKey) {
        let mut guard = self.sessions.lock().await;
        if let Some(entry) = guard.remove(key) {
            entry.zeroize_and_abort();
            log::debug!(target: "custody_core::arm_session", "disarmed wallet={}", key.wallet_id);
        }
    }

    /// Report whether `key` is currently armed and, if so, how much time
    /// remains. An expired entry is disarmed as a side effect.
    pub async fn status(&self, key: &SessionKey) -> SessionStatus {
        let mut guard = self.sessions.lock().await;
        match guard.get(key) {
            Some(entry) => {
                let now = Instant::now();
                if entry.expires_at <= now {
                    if let Some(entry) = guard.remove(key) {
                        entry.zeroize_and_abort();
                    }
                    SessionStatus { armed: false, ms_left: 0 }
                } else {
                    let ms_left = (entry.expires_at - now).as_millis() as u64;
                    SessionStatus { armed: true, ms_left }
                }
            }
            None => SessionStatus { armed: false, ms_left: 0 },
        }
    }

    /// Return a copy of the armed DEK if `key` is still within its
    /// validity window, disarming (and returning `None`) otherwise.
    pub async fn get_dek(&self, key: &SessionKey) -> Option<[u8; KEY_LEN]> {
        let mut guard = self.sessions.lock().await;
        match guard.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.dek),
            Some(_) => {
                if let Some(entry) = guard.remove(key) {
                    entry.zeroize_and_abort();
                }
                None
            }
            None => None,
        }
    }

    /// Scan for and disarm any expired entries. Defense in depth against
    /// a per-entry timer that never fired (e.g. the runtime was starved).
    pub async fn sweep(&self) {
        let mut guard = self.sessions.lock().await;
        let now = Instant::now();
        let expired: Vec<SessionKey> = guard
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            if let Some(entry) = guard.remove(&key) {
                entry.zeroize_and_abort();
            }
        }
    }

    /// Spawn the periodic sweeper task. The returned handle is not
    /// generally needed — call [`ArmSessionManager::shutdown`] to stop it.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                this.sweep().await;
            }
        })
    }

    /// Zeroize and remove every entry. Called on graceful shutdown; an
    /// embedder's signal handler should call this before the process
    /// exits.
    pub async fn shutdown(&self) {
        let mut guard = self.sessions.lock().await;
        for (_, entry) in guard.drain() {
            entry.zeroize_and_abort();
        }
        log::debug!(target: "custody_core::arm_session", "shutdown: all sessions zeroized");
    }
}

impl Entry {
    fn dek_only_zeroize(mut self) {
        self.dek.zeroize();
    }
}

impl Default for ArmSessionManager {
    fn default() -> Self {
        Self::new()
    }
}
