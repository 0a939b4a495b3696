//! Error types for Mail Sentinel.
//!
//! Capability errors arrive from external collaborators (remote inference
//! services) as opaque provider/message pairs. They are classified into an
//! [`ErrorKind`] exactly once, at the invoker boundary; downstream logic
//! matches on the kind and never re-parses error text.

use thiserror::Error;

/// Error returned by an external capability (classify/summarize/generate/retrieve).
///
/// Collaborators wrap whatever their SDK produced into this shape; the raw
/// message is kept because rate-limit and transient failures are only
/// distinguishable by textual signature at this boundary.
#[derive(Debug, Clone, Error)]
#[error("{provider}: {message}")]
pub struct CapabilityError {
    /// Which remote service failed (e.g. "gemini", "vector-store").
    pub provider: String,
    /// Raw error description from the provider.
    pub message: String,
}

impl CapabilityError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Textual signatures that mark a capability error as throttle-related.
const THROTTLE_TOKENS: &[&str] = &[
    "429",
    "quota",
    "rate limit",
    "exceeded",
    "resourceexhausted",
    "too many requests",
    "exhausted",
];

/// Textual signatures that mark a capability error as transient.
const TRANSIENT_TOKENS: &[&str] = &["timeout", "timed out", "network", "connection"];

/// Retry classification of a capability error, computed once per error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rate limit / quota: retry with backoff and key rotation.
    Throttle,
    /// Timeout / network: retry after a fixed short delay.
    Transient,
    /// Anything else: no retry.
    Fatal,
}

impl ErrorKind {
    /// Classify a capability error by its textual signature.
    pub fn classify(err: &CapabilityError) -> Self {
        let text = err.message.to_lowercase();
        if THROTTLE_TOKENS.iter().any(|t| text.contains(t)) {
            Self::Throttle
        } else if TRANSIENT_TOKENS.iter().any(|t| text.contains(t)) {
            Self::Transient
        } else {
            Self::Fatal
        }
    }

    /// Metric label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Throttle => "rate_limit",
            Self::Transient => "transient",
            Self::Fatal => "other_error",
        }
    }
}

/// Terminal outcome of a rate-limited invocation.
///
/// Exhaustion variants are distinct so callers can choose different fallback
/// messaging for "the service is saturated" vs "the network is flaky".
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("{module}: rate-limit retries exhausted after {attempts} attempts")]
    ExhaustedThrottle { module: &'static str, attempts: u32 },

    #[error("{module}: transient-error retries exhausted after {attempts} attempts")]
    ExhaustedTransient { module: &'static str, attempts: u32 },

    #[error("{module}: fatal capability error: {source}")]
    Fatal {
        module: &'static str,
        source: CapabilityError,
    },
}

impl InvokeError {
    /// Short label for history notes and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ExhaustedThrottle { .. } => "throttle-exhausted",
            Self::ExhaustedTransient { .. } => "transient-exhausted",
            Self::Fatal { .. } => "fatal",
        }
    }
}

/// Configuration errors surfaced at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key pool must contain at least one key")]
    EmptyKeyPool,

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
