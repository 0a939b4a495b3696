//! Shared types for the reply orchestration pipeline.
//!
//! One [`PipelineState`] exists per message. It is mutated only by the stage
//! currently executing, becomes immutable at `Terminated`, and is handed back
//! to the caller whole; the core never persists or transmits it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Inbound message ─────────────────────────────────────────────────

/// Immutable inbound email record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    /// Unique ID (mailbox-native or generated UUID).
    pub id: String,
    /// Sender address.
    pub sender: String,
    /// Human-readable sender name, if the transport provided one.
    pub sender_name: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl InboundEmail {
    /// Build an email with a generated id and current timestamp.
    pub fn new(
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            sender_name: None,
            subject: subject.into(),
            body: body.into(),
            received_at: Utc::now(),
        }
    }

    /// Name to address the reply to.
    pub fn recipient_name(&self) -> &str {
        self.sender_name.as_deref().unwrap_or(&self.sender)
    }
}

// ── Stage machine ───────────────────────────────────────────────────

/// Pipeline stage. Strictly ordered; no re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Filtered,
    Summarized,
    Responded,
    Terminated,
}

/// Classification assigned by the filter stage. Set once, read-only after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Positive,
    Neutral,
    Negative,
    Spam,
    Promotional,
    Error,
}

impl Classification {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::Spam => "spam",
            Self::Promotional => "promotional",
            Self::Error => "error",
        }
    }

    /// Labels that terminate the pipeline at the filter stage.
    pub fn is_early_exit(self) -> bool {
        matches!(self, Self::Spam | Self::Promotional | Self::Error)
    }
}

/// Which path produced a stage's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// The remote capability answered and its output passed the firewall.
    Primary,
    /// A local deterministic heuristic produced the output.
    LocalFallback,
    /// The firewall replaced the output with a template.
    Sanitized,
    /// The output is a pre-approved template chosen without sanitization
    /// (capability failed or returned nothing usable).
    TemplateDefault,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::LocalFallback => "local-fallback",
            Self::Sanitized => "sanitized",
            Self::TemplateDefault => "template-default",
        }
    }
}

// ── Audit history ───────────────────────────────────────────────────

/// One append-only audit entry. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub stage: String,
    pub timestamp: DateTime<Utc>,
    pub classification: Option<Classification>,
    pub summary: Option<String>,
    pub response_body: Option<String>,
    pub confidence: Option<f32>,
    pub requires_human_review: bool,
    pub provenance: Option<Provenance>,
    pub note: String,
}

// ── Pipeline state ──────────────────────────────────────────────────

/// Per-message pipeline state. Single writer; never shared across messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Original inbound message.
    pub email: InboundEmail,
    /// Current stage.
    pub stage: Stage,
    /// Filter-stage label.
    pub classification: Option<Classification>,
    /// Summarize-stage output (skip sentinel when routing bypassed it).
    pub summary: Option<String>,
    /// Sanitized, ready-to-send body. `None` on early exit; do not send.
    pub response_body: Option<String>,
    /// Path that produced `response_body`.
    pub response_provenance: Option<Provenance>,
    /// Confidence in [0,1], computed only at the respond stage.
    pub confidence: Option<f32>,
    /// Error description; presence short-circuits later stages.
    pub processing_error: Option<String>,
    // Set-only: flips false→true and never back. Kept private so no caller
    // or stage can clear it.
    requires_human_review: bool,
    history: Vec<HistoryEntry>,
}

impl PipelineState {
    /// Create the initial state for a message.
    pub fn new(email: InboundEmail) -> Self {
        Self {
            email,
            stage: Stage::Start,
            classification: None,
            summary: None,
            response_body: None,
            response_provenance: None,
            confidence: None,
            processing_error: None,
            requires_human_review: false,
            history: Vec::new(),
        }
    }

    /// Whether this state needs a human before anything is sent.
    pub fn requires_human_review(&self) -> bool {
        self.requires_human_review
    }

    /// Flag for human review. Monotone: there is no way to clear it.
    pub fn flag_for_review(&mut self) {
        self.requires_human_review = true;
    }

    /// Append an audit entry snapshotting the key fields.
    pub fn record_history(
        &mut self,
        stage: &str,
        provenance: Option<Provenance>,
        note: impl Into<String>,
    ) {
        self.history.push(HistoryEntry {
            stage: stage.to_string(),
            timestamp: Utc::now(),
            classification: self.classification,
            summary: self.summary.clone(),
            response_body: self.response_body.clone(),
            confidence: self.confidence,
            requires_human_review: self.requires_human_review,
            provenance,
            note: note.into(),
        });
    }

    /// Read-only view of the audit trail.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// True when the caller may deliver `response_body`.
    ///
    /// Early-exit states (spam, promotional, error) are never sendable even
    /// if a safe body was filled in for them, and neither is a run that was
    /// cancelled or faulted partway through.
    pub fn is_sendable(&self) -> bool {
        self.stage == Stage::Terminated
            && self.response_body.is_some()
            && self.processing_error.is_none()
            && self.classification.is_none_or(|c| !c.is_early_exit())
    }
}
