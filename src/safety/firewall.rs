//! Content firewall.
//!
//! Composes the pattern registry and the fallback policy: any stage output
//! passes through here before it is stored on the pipeline state. A firewall
//! hit is not an error; it is a normal control-flow outcome that resolves
//! to a deterministic template and a recorded reason.

use std::sync::Arc;

use tracing::warn;

use crate::fallback::FallbackPolicy;
use crate::metrics::MetricsSink;
use crate::safety::patterns::{PatternCategory, PatternRegistry};

/// Stage tag for sanitization metrics and per-stage category policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallStage {
    Summarize,
    Respond,
}

impl FirewallStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Respond => "respond",
        }
    }
}

/// Result of a sanitization pass.
#[derive(Debug, Clone)]
pub struct SanitizeOutcome {
    /// Text safe to store: the candidate unchanged, or a template.
    pub final_text: String,
    /// Whether the candidate was replaced.
    pub was_sanitized: bool,
    /// Why it was replaced ("empty" or joined category names).
    pub reason: Option<String>,
}

/// Sanitizes stage output before it is persisted or sent.
pub struct ContentFirewall {
    registry: PatternRegistry,
    policy: FallbackPolicy,
    metrics: Arc<dyn MetricsSink>,
    summarize_categories: Vec<PatternCategory>,
    respond_categories: Vec<PatternCategory>,
}

impl ContentFirewall {
    /// Firewall with every category enabled for both stages.
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            registry: PatternRegistry::new(),
            policy: FallbackPolicy::new(),
            metrics,
            summarize_categories: PatternCategory::ALL.to_vec(),
            respond_categories: PatternCategory::ALL.to_vec(),
        }
    }

    /// Override which categories a stage checks.
    pub fn with_stage_categories(
        mut self,
        stage: FirewallStage,
        categories: Vec<PatternCategory>,
    ) -> Self {
        match stage {
            FirewallStage::Summarize => self.summarize_categories = categories,
            FirewallStage::Respond => self.respond_categories = categories,
        }
        self
    }

    fn categories_for(&self, stage: FirewallStage) -> &[PatternCategory] {
        match stage {
            FirewallStage::Summarize => &self.summarize_categories,
            FirewallStage::Respond => &self.respond_categories,
        }
    }

    /// Sanitize a stage's candidate output.
    ///
    /// `source_text` is the original inbound body (feeds the relative
    /// identifier check); `summary` drives template selection when the
    /// candidate must be replaced.
    ///
    /// Idempotent over template output: templates never match the registry,
    /// so sanitizing an already-sanitized result is a no-op.
    pub fn sanitize(
        &self,
        candidate: &str,
        source_text: &str,
        stage: FirewallStage,
        summary: &str,
    ) -> SanitizeOutcome {
        if candidate.trim().is_empty() {
            self.metrics.sanitization_triggered(stage.as_str());
            warn!(stage = stage.as_str(), "empty candidate, substituting default template");
            return SanitizeOutcome {
                final_text: crate::fallback::TemplateId::Default.text().to_string(),
                was_sanitized: true,
                reason: Some("empty".to_string()),
            };
        }

        let matched =
            self.registry
                .scan_with(self.categories_for(stage), candidate, Some(source_text));
        if matched.is_empty() {
            return SanitizeOutcome {
                final_text: candidate.to_string(),
                was_sanitized: false,
                reason: None,
            };
        }

        let reason = matched
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.metrics.sanitization_triggered(stage.as_str());
        warn!(
            stage = stage.as_str(),
            reason = %reason,
            "unsafe content detected, substituting template"
        );

        let template = self.policy.select_template(summary, source_text);
        SanitizeOutcome {
            final_text: template.text().to_string(),
            was_sanitized: true,
            reason: Some(reason),
        }
    }
}
