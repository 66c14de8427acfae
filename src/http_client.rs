//! HTTP client with a per-host circuit breaker and bounded, jittered
//! retries. A single entry point handles every outbound call so the
//! retry/backoff/circuit-breaker logic lives in one place instead of at
//! each call site.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::Method;

use crate::config::HttpClientConfig;
use crate::metrics::{Labels, MetricsSink};
use crate::request_context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct CircuitEntry {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    next_attempt_at: Option<Instant>,
}

impl CircuitEntry {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            success_count: 0,
            next_attempt_at: None,
        }
    }
}

/// Per-host circuit breaker state, process-local, guarded by per-key
/// exclusive updates.
pub struct CircuitBreaker {
    entries: Mutex<HashMap<String, CircuitEntry>>,
    cfg: crate::config::CircuitBreakerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    Allow,
    ShortCircuit,
}

impl CircuitBreaker {
    pub fn new(cfg: crate::config::CircuitBreakerConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            cfg,
        }
    }

    /// Decide whether a call against `key` may proceed, transitioning
    /// OPEN → HALF_OPEN if the cooldown has elapsed.
    pub fn admit(&self, key: &str) -> AdmitDecision {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_insert_with(CircuitEntry::new);
        match entry.state {
            BreakerState::Closed => AdmitDecision::Allow,
            BreakerState::HalfOpen => AdmitDecision::Allow,
            BreakerState::Open => {
                let now = Instant::now();
                if entry.next_attempt_at.is_some_and(|t| now >= t) {
                    entry.state = BreakerState::HalfOpen;
                    entry.success_count = 0;
                    log::warn!(target: "trade_core::http_client", "circuit breaker half-open for {key}");
                    AdmitDecision::Allow
                } else {
                    AdmitDecision::ShortCircuit
                }
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_insert_with(CircuitEntry::new);
        match entry.state {
            BreakerState::Closed => {
                entry.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                entry.success_count += 1;
                if entry.success_count >= self.cfg.half_open_success_threshold {
                    entry.state = BreakerState::Closed;
                    entry.failure_count = 0;
                    entry.success_count = 0;
                    log::warn!(target: "trade_core::http_client", "circuit breaker closed for {key}");
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_insert_with(CircuitEntry::new);
        match entry.state {
            BreakerState::Closed => {
                entry.failure_count += 1;
                if entry.failure_count >= self.cfg.failure_threshold {
                    entry.state = BreakerState::Open;
                    entry.next_attempt_at = Some(Instant::now() + self.cfg.cooldown);
                    log::warn!(target: "trade_core::http_client", "circuit breaker opened for {key}");
                }
            }
            BreakerState::HalfOpen => {
                entry.state = BreakerState::Open;
                entry.failure_count = self.cfg.failure_threshold;
                entry.next_attempt_at = Some(Instant::now() + self.cfg.cooldown);
                log::warn!(target: "trade_core::http_client", "circuit breaker re-opened for {key} after half-open failure");
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self, key: &str) -> BreakerState {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|e| e.state)
            .unwrap_or(BreakerState::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    None,
    Net,
    User,
    Unknown,
}

impl ErrorClass {
    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorClass::None => "NONE",
            ErrorClass::Net => "NET",
            ErrorClass::User => "USER",
            ErrorClass::Unknown => "UNKNOWN",
        }
    }
}

pub struct CallParams<'a> {
    pub url: &'a str,
    pub method: Method,
    pub body: Option<Vec<u8>>,
    pub headers: Vec<(&'a str, String)>,
    pub circuit_key: Option<&'a str>,
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("circuit breaker open for {0}")]
    ShortCircuited(String),
    #[error("request failed after retries: {0}")]
    Transport(String),
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Issue a single outbound HTTP call with circuit-breaker admission,
/// timeout, and capped exponential-backoff-with-jitter retries on
/// network-class failures. Non-idempotent failures that produced a
/// concrete HTTP response are never retried.
pub async fn call(
    client: &reqwest::Client,
    params: CallParams<'_>,
    cfg: &HttpClientConfig,
    breaker: &CircuitBreaker,
    metrics: &dyn MetricsSink,
) -> Result<reqwest::Response, CallError> {
    let circuit_key = params.circuit_key.map(str::to_string).unwrap_or_else(|| host_of(params.url));
    let service_label = circuit_key.clone();

    if breaker.admit(&circuit_key) == AdmitDecision::ShortCircuit {
        metrics.increment(
            "external_request_total",
            1,
            &label_set(&service_label, "short_circuit", ErrorClass::Net),
        );
        return Err(CallError::ShortCircuited(circuit_key));
    }

    let caller_set_request_id = params
        .headers
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case("x-request-id"));
    let ambient_request_id = request_context::current_request_id();

    let mut attempt: u32 = 0;
    let start = Instant::now();
    loop {
        let mut request = client.request(params.method.clone(), params.url).timeout(cfg.timeout);
        for (k, v) in &params.headers {
            request = request.header(*k, v);
        }
        if !caller_set_request_id {
            if let Some(id) = &ambient_request_id {
                request = request.header("x-request-id", id.clone());
            }
        }
        if let Some(body) = &params.body {
            request = request.body(body.clone());
        }

        let result = request.send().await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(response) if response.status().is_success() => {
                breaker.record_success(&circuit_key);
                metrics.observe(
                    "external_request_ms",
                    elapsed_ms,
                    &vec![
                        ("service", service_label.clone()),
                        ("status", response.status().as_u16().to_string()),
                    ],
                );
                return Ok(response);
            }
            Ok(response) => {
                // A concrete HTTP response that wasn't a success is a
                // semantic failure, not a network failure: not retried.
                breaker.record_failure(&circuit_key);
                let status = response.status().as_u16();
                metrics.increment(
                    "external_request_total",
                    1,
                    &label_set(&service_label, &status.to_string(), ErrorClass::User),
                );
                return Err(CallError::Transport(format!("http status {status}")));
            }
            Err(e) => {
                breaker.record_failure(&circuit_key);
                attempt += 1;
                if attempt > cfg.retry.max_attempts {
                    metrics.increment(
                        "external_request_total",
                        1,
                        &label_set(&service_label, "network_error", ErrorClass::Net),
                    );
                    return Err(CallError::Transport(e.to_string()));
                }
                let backoff = cfg.retry.base_delay * 2u32.pow(attempt.saturating_sub(1));
                let jitter_ms = rand::thread_rng().gen_range(0..=cfg.retry.base_delay.as_millis() as u64);
                tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
            }
        }
    }
}

fn label_set(service: &str, status: &str, class: ErrorClass) -> Labels {
    vec![
        ("service", service.to_string()),
        ("status", status.to_string()),
        ("errorClass", class.as_label().to_string()),
    ]
}
