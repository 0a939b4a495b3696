//! Metrics sink interface.
//!
//! The pipeline core emits counters and latency observations through this
//! trait and makes no assumption about the backend; production wires it to
//! a Prometheus-style exporter, tests use [`InMemoryMetrics`].
//!
//! Implementations must be safe for concurrent increments from multiple
//! pipelines; this is the only shared mutable surface between them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Counter and histogram events the orchestration core emits.
pub trait MetricsSink: Send + Sync {
    /// One capability call attempt (per attempt, not per invocation).
    fn call_attempt(&self, module: &str);
    /// One failed capability call attempt, tagged by classified reason.
    fn call_failure(&self, module: &str, reason: &str);
    /// A non-primary path produced a stage's output.
    fn fallback_used(&self, module: &str);
    /// The content firewall replaced a stage's output.
    fn sanitization_triggered(&self, stage: &str);
    /// A message was classified with the given label.
    fn classification(&self, label: &str);
    /// Knowledge retrieval yielded nothing usable.
    fn empty_context(&self);
    /// Wall-clock duration of one pipeline stage.
    fn stage_latency(&self, stage: &str, elapsed: Duration);
}

/// Sink that drops every event. Default when the caller doesn't care.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn call_attempt(&self, _module: &str) {}
    fn call_failure(&self, _module: &str, _reason: &str) {}
    fn fallback_used(&self, _module: &str) {}
    fn sanitization_triggered(&self, _stage: &str) {}
    fn classification(&self, _label: &str) {}
    fn empty_context(&self) {}
    fn stage_latency(&self, _stage: &str, _elapsed: Duration) {}
}

/// In-memory sink for tests and local inspection.
///
/// Counters are keyed `name{label}`; latencies are collected per stage.
#[derive(Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<String, u64>>,
    latencies: Mutex<HashMap<String, Vec<Duration>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn incr(&self, key: String) {
        let mut counters = self.counters.lock().expect("metrics lock poisoned");
        *counters.entry(key).or_insert(0) += 1;
    }

    /// Current value of a counter key (e.g. `"call_attempts{filtering}"`).
    pub fn counter(&self, key: &str) -> u64 {
        self.counters
            .lock()
            .expect("metrics lock poisoned")
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Number of latency observations recorded for a stage.
    pub fn latency_samples(&self, stage: &str) -> usize {
        self.latencies
            .lock()
            .expect("metrics lock poisoned")
            .get(stage)
            .map_or(0, Vec::len)
    }
}

impl MetricsSink for InMemoryMetrics {
    fn call_attempt(&self, module: &str) {
        self.incr(format!("call_attempts{{{module}}}"));
    }

    fn call_failure(&self, module: &str, reason: &str) {
        self.incr(format!("call_failures{{{module},{reason}}}"));
    }

    fn fallback_used(&self, module: &str) {
        self.incr(format!("fallback_used{{{module}}}"));
    }

    fn sanitization_triggered(&self, stage: &str) {
        self.incr(format!("sanitization_triggered{{{stage}}}"));
    }

    fn classification(&self, label: &str) {
        self.incr(format!("classification{{{label}}}"));
    }

    fn empty_context(&self) {
        self.incr("kb_empty_results".to_string());
    }

    fn stage_latency(&self, stage: &str, elapsed: Duration) {
        let mut latencies = self.latencies.lock().expect("metrics lock poisoned");
        latencies.entry(stage.to_string()).or_default().push(elapsed);
    }
}
