//! Env-var and struct-literal configuration. Matches the teacher's
//! lightweight approach to config (plain structs with `Default` impls)
//! rather than pulling in a generic config-loading crate the teacher
//! doesn't use.

use std::env;
use std::time::Duration;

/// The server-held secret used to derive unprotected-wallet KEKs via
/// HKDF. Read once from `SERVER_ENCRYPTION_SECRET`.
#[derive(Clone)]
pub struct ServerSecret(String);

impl ServerSecret {
    pub fn from_env() -> Option<Self> {
        env::var("SERVER_ENCRYPTION_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(ServerSecret)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub fn from_env_value(value: String) -> Self {
        ServerSecret(value)
    }
}

impl std::fmt::Debug for ServerSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServerSecret(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            half_open_success_threshold: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(6000),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Overall hot-path deadline; exceeding it classifies the trade as
    /// `UNKNOWN` and records elapsed stages rather than hanging.
    pub hotpath_deadline: Duration,
    /// Arm-Session Manager sweeper interval.
    pub sweep_interval: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            hotpath_deadline: Duration::from_secs(15),
            sweep_interval: custody_core::arm_session::DEFAULT_SWEEP_INTERVAL,
            retry_policy: RetryPolicy::default(),
        }
    }
}
