pub mod config;
pub mod error;
pub mod executor;
pub mod fifo;
pub mod http_client;
pub mod market_data;
pub mod metrics;
pub mod quote;
pub mod repository;
pub mod request_context;
pub mod risk;
pub mod signer;
pub mod wallet;

use std::sync::Arc;
use std::time::Duration;

use custody_core::ArmSessionManager;

use config::ServerSecret;

pub use error::{Error, Result};

/// Bundles the long-lived, process-local state this core needs: the
/// Arm-Session Manager and its background sweeper, plus the server
/// secret used to derive unprotected-wallet KEKs. An embedder constructs
/// one of these at startup and hands `&TradeCoreState` to executor runs.
pub struct TradeCoreState {
    pub arm_sessions: Arc<ArmSessionManager>,
    pub server_secret: Option<ServerSecret>,
    sweeper: tokio::task::JoinHandle<()>,
}

impl TradeCoreState {
    /// Construct state and start the Arm-Session sweeper at
    /// `sweep_interval`.
    pub fn new(sweep_interval: Duration) -> Self {
        let arm_sessions = Arc::new(ArmSessionManager::new());
        let sweeper = arm_sessions.spawn_sweeper(sweep_interval);
        Self {
            arm_sessions,
            server_secret: ServerSecret::from_env(),
            sweeper,
        }
    }

    /// Stop the sweeper and zeroize every armed session. Call this during
    /// process shutdown rather than letting armed DEKs leak into a
    /// terminated process's memory dump.
    pub async fn shutdown(self) {
        self.sweeper.abort();
        self.arm_sessions.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn state_shutdown_clears_sessions() {
        let state = TradeCoreState::new(Duration::from_secs(30));
        state.shutdown().await;
    }
}
