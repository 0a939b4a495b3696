//! Rate-limited capability invoker.
//!
//! Wraps any remote capability call with bounded retries, exponential
//! backoff on throttle errors, a fixed short delay on transient errors, and
//! per-attempt API key rotation. Error kinds are classified once here; the
//! rest of the pipeline only sees [`InvokeError`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, warn};

use crate::config::RetryConfig;
use crate::error::{CapabilityError, ConfigError, ErrorKind, InvokeError};
use crate::metrics::MetricsSink;

/// Selects one API key per call attempt.
///
/// Behind a trait so tests can inject a fixed-order selector and get
/// deterministic rotation.
pub trait KeySelector: Send + Sync {
    fn next_key(&self) -> SecretString;
}

/// Round-robin rotation over a non-empty key pool.
///
/// Single-key pools simply hand out the same key on every attempt.
pub struct RoundRobinSelector {
    keys: Vec<SecretString>,
    cursor: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new(keys: Vec<SecretString>) -> Result<Self, ConfigError> {
        if keys.is_empty() {
            return Err(ConfigError::EmptyKeyPool);
        }
        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }
}

impl KeySelector for RoundRobinSelector {
    fn next_key(&self) -> SecretString {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        self.keys[idx].clone()
    }
}

/// Always returns the same key. For tests.
pub struct FixedSelector(pub SecretString);

impl KeySelector for FixedSelector {
    fn next_key(&self) -> SecretString {
        self.0.clone()
    }
}

/// Loggable key prefix; never log a full key.
fn key_prefix(key: &SecretString) -> String {
    key.expose_secret().chars().take(6).collect()
}

/// Executes capability calls under the retry policy.
pub struct RateLimitedInvoker {
    selector: Arc<dyn KeySelector>,
    config: RetryConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl RateLimitedInvoker {
    pub fn new(
        selector: Arc<dyn KeySelector>,
        config: RetryConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            selector,
            config,
            metrics,
        }
    }

    /// Run `op` with retry, backoff, and key rotation.
    ///
    /// `op` receives the key selected for the current attempt. The underlying
    /// capability is called at most `max_attempts` times. Empty-but-successful
    /// output is returned as success; whether that counts as a failure is a
    /// stage-level decision.
    pub async fn invoke<T, F, Fut>(&self, module: &'static str, op: F) -> Result<T, InvokeError>
    where
        F: Fn(SecretString) -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut cooldown = self.config.initial_cooldown;
        let mut last_kind = ErrorKind::Transient;

        for attempt in 1..=max_attempts {
            let key = self.selector.next_key();
            self.metrics.call_attempt(module);
            debug!(
                module,
                attempt,
                max_attempts,
                key_prefix = %key_prefix(&key),
                "capability call attempt"
            );

            let err = match op(key).await {
                Ok(output) => return Ok(output),
                Err(e) => e,
            };

            let kind = ErrorKind::classify(&err);
            last_kind = kind;
            self.metrics.call_failure(module, kind.as_str());

            match kind {
                ErrorKind::Throttle => {
                    if attempt < max_attempts {
                        warn!(
                            module,
                            attempt,
                            cooldown_secs = cooldown.as_secs_f64(),
                            error = %err,
                            "rate limit hit, backing off and rotating key"
                        );
                        tokio::time::sleep(cooldown).await;
                        cooldown = cooldown
                            .mul_f64(self.config.backoff_factor)
                            .min(self.config.max_backoff);
                    }
                }
                ErrorKind::Transient => {
                    if attempt < max_attempts {
                        let jitter = std::time::Duration::from_millis(
                            rand::thread_rng().gen_range(0..250),
                        );
                        warn!(module, attempt, error = %err, "transient error, retrying shortly");
                        tokio::time::sleep(self.config.transient_delay + jitter).await;
                    }
                }
                ErrorKind::Fatal => {
                    error!(module, error = %err, "fatal capability error, aborting attempts");
                    return Err(InvokeError::Fatal {
                        module,
                        source: err,
                    });
                }
            }
        }

        error!(module, attempts = max_attempts, kind = last_kind.as_str(), "retries exhausted");
        Err(match last_kind {
            ErrorKind::Throttle => InvokeError::ExhaustedThrottle {
                module,
                attempts: max_attempts,
            },
            _ => InvokeError::ExhaustedTransient {
                module,
                attempts: max_attempts,
            },
        })
    }
}
