//! Configuration types.
//!
//! Every retry bound and delay lives here rather than as constants buried in
//! the call sites, so deployments can tune them and tests can shrink them.

use std::time::Duration;

/// Retry and backoff settings for the rate-limited invoker.
///
/// Worst-case added delay per invocation is bounded by
/// `max_attempts × max_backoff`; there is no unbounded retry path.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts per capability call (including the first).
    pub max_attempts: u32,
    /// Initial cooldown after a throttle error.
    pub initial_cooldown: Duration,
    /// Multiplier applied to the cooldown after each throttle retry.
    pub backoff_factor: f64,
    /// Upper bound on any single cooldown sleep.
    pub max_backoff: Duration,
    /// Fixed delay after a transient (timeout/network) error, before jitter.
    pub transient_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_cooldown: Duration::from_secs(35),
            backoff_factor: 1.4,
            max_backoff: Duration::from_secs(120),
            transient_delay: Duration::from_secs(2),
        }
    }
}

/// Pipeline-level configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Name used to sign generated replies (passed to the generation capability).
    pub agent_name: String,
    /// Confidence below this routes the terminal state to human review.
    pub review_threshold: f32,
    /// Responses shorter than this (characters) take a confidence penalty.
    pub min_response_length: usize,
    /// Retry/backoff settings shared by all capability calls.
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            agent_name: "Customer Support".to_string(),
            review_threshold: 0.45,
            min_response_length: 40,
            retry: RetryConfig::default(),
        }
    }
}
