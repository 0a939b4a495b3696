//! mail-sentinel: reliability and safety core for an LLM-backed email
//! reply pipeline.
//!
//! Every inbound message is driven through a strict stage machine
//! (filter → summarize → respond) in which remote model calls are treated as
//! unreliable by construction: calls go through a rate-limited invoker with
//! bounded retries and key rotation, every stage has a deterministic local
//! fallback, and all candidate output passes a content firewall before it is
//! stored. The pipeline never fails; it degrades, records how it degraded,
//! and routes low-confidence results to human review.
//!
//! The crate is transport-agnostic: mailbox polling, model SDKs, and reply
//! delivery live behind the capability traits in [`capability`] and are
//! injected by the embedding application.

pub mod capability;
pub mod config;
pub mod confidence;
pub mod error;
pub mod fallback;
pub mod invoker;
pub mod metrics;
pub mod pipeline;
pub mod safety;

pub use capability::{
    ClassifyCapability, GenerateCapability, RetrieveKnowledge, SentimentLabel,
    SummarizeCapability,
};
pub use config::{PipelineConfig, RetryConfig};
pub use confidence::ConfidenceScorer;
pub use error::{CapabilityError, ConfigError, ErrorKind, InvokeError};
pub use fallback::{FallbackPolicy, Intent, TemplateId};
pub use invoker::{FixedSelector, KeySelector, RateLimitedInvoker, RoundRobinSelector};
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};
pub use pipeline::{
    Classification, InboundEmail, PipelineOrchestrator, PipelineState, Provenance, Stage,
};
pub use safety::{ContentFirewall, FirewallStage, PatternCategory, PatternRegistry};
