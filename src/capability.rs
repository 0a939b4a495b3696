//! External capability interfaces.
//!
//! The core treats classification, summarization, response generation, and
//! knowledge retrieval as opaque remote capabilities. Implementations live
//! in collaborator crates (or test mocks) and are injected by constructor,
//! never reached through ambient global state.
//!
//! Remote capabilities receive the API key selected for the current attempt
//! so the invoker can rotate keys across retries.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;
use crate::pipeline::types::{Classification, InboundEmail};

/// Sentiment label a remote classifier may return.
///
/// Spam/promotional are resolved locally by keyword fast paths before this
/// capability is ever invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Parse a model's raw label output. Anything negative-ish maps to
    /// `Negative`; unrecognized text maps to `Neutral`.
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim().to_lowercase();
        if text.starts_with("neg") {
            Self::Negative
        } else if text.starts_with("pos") {
            Self::Positive
        } else {
            Self::Neutral
        }
    }
}

impl From<SentimentLabel> for Classification {
    fn from(label: SentimentLabel) -> Self {
        match label {
            SentimentLabel::Positive => Classification::Positive,
            SentimentLabel::Neutral => Classification::Neutral,
            SentimentLabel::Negative => Classification::Negative,
        }
    }
}

/// Remote sentiment classification.
#[async_trait]
pub trait ClassifyCapability: Send + Sync {
    async fn classify(
        &self,
        api_key: &SecretString,
        email: &InboundEmail,
    ) -> Result<SentimentLabel, CapabilityError>;
}

/// Remote intent summarization.
#[async_trait]
pub trait SummarizeCapability: Send + Sync {
    async fn summarize(
        &self,
        api_key: &SecretString,
        email: &InboundEmail,
    ) -> Result<String, CapabilityError>;
}

/// Remote reply-body generation.
#[async_trait]
pub trait GenerateCapability: Send + Sync {
    async fn generate(
        &self,
        api_key: &SecretString,
        email: &InboundEmail,
        contextual_summary: &str,
        recipient_name: &str,
        agent_name: &str,
    ) -> Result<String, CapabilityError>;
}

/// Best-effort knowledge-context retrieval.
///
/// Failures degrade to an empty context and never fail the calling stage.
#[async_trait]
pub trait RetrieveKnowledge: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<String, CapabilityError>;
}
