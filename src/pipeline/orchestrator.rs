//! Pipeline orchestrator: the stage state machine.
//!
//! Flow: filter → (early exit | summarize) → respond → terminated.
//!
//! **Core invariant: `process` never fails.** Every capability error is
//! recovered locally by the next fallback in the chain; panics are caught at
//! this boundary and converted into a safe terminal state. The caller always
//! receives a `Terminated` state with a complete audit history.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::capability::{
    ClassifyCapability, GenerateCapability, RetrieveKnowledge, SummarizeCapability,
};
use crate::confidence::ConfidenceScorer;
use crate::config::PipelineConfig;
use crate::fallback::{FallbackPolicy, TemplateId};
use crate::invoker::{KeySelector, RateLimitedInvoker};
use crate::metrics::MetricsSink;
use crate::pipeline::heuristics::{
    contains_urgency, keyword_classification, local_classify, local_summary,
};
use crate::pipeline::types::{
    Classification, InboundEmail, PipelineState, Provenance, Stage,
};
use crate::safety::{ContentFirewall, FirewallStage};

/// Sentinel stored when routing bypassed summarization.
pub const SUMMARY_SKIPPED: &str = "Summary skipped.";

/// Drives one message at a time through the stage machine.
///
/// All collaborators are injected at construction; the orchestrator holds no
/// ambient global state and is `Send + Sync`, so one instance can serve many
/// concurrent messages, each with its own [`PipelineState`].
pub struct PipelineOrchestrator {
    classifier: Arc<dyn ClassifyCapability>,
    summarizer: Arc<dyn SummarizeCapability>,
    generator: Arc<dyn GenerateCapability>,
    knowledge: Arc<dyn RetrieveKnowledge>,
    invoker: RateLimitedInvoker,
    firewall: ContentFirewall,
    policy: FallbackPolicy,
    scorer: ConfidenceScorer,
    metrics: Arc<dyn MetricsSink>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        classifier: Arc<dyn ClassifyCapability>,
        summarizer: Arc<dyn SummarizeCapability>,
        generator: Arc<dyn GenerateCapability>,
        knowledge: Arc<dyn RetrieveKnowledge>,
        selector: Arc<dyn KeySelector>,
        metrics: Arc<dyn MetricsSink>,
        config: PipelineConfig,
    ) -> Self {
        let invoker = RateLimitedInvoker::new(
            Arc::clone(&selector),
            config.retry.clone(),
            Arc::clone(&metrics),
        );
        let firewall = ContentFirewall::new(Arc::clone(&metrics));
        let scorer = ConfidenceScorer::new(config.min_response_length);
        Self {
            classifier,
            summarizer,
            generator,
            knowledge,
            invoker,
            firewall,
            policy: FallbackPolicy::new(),
            scorer,
            metrics,
            config,
        }
    }

    /// Process one message to a terminal state. Never fails.
    pub async fn process(&self, email: InboundEmail) -> PipelineState {
        let mut state = PipelineState::new(email);
        self.run_contained(&mut state).await;
        state
    }

    /// Process with an overall deadline.
    ///
    /// On expiry the message still reaches a terminal state, with
    /// `processing_error = "cancelled"` and a safe default body. Stages that
    /// finished before the deadline keep their audit entries; only the stage
    /// in flight is dropped.
    pub async fn process_with_timeout(
        &self,
        email: InboundEmail,
        deadline: Duration,
    ) -> PipelineState {
        let mut state = PipelineState::new(email);

        if tokio::time::timeout(deadline, self.run_contained(&mut state))
            .await
            .is_err()
        {
            warn!(id = %state.email.id, stage = ?state.stage, "pipeline cancelled by deadline");
            state.classification.get_or_insert(Classification::Error);
            state.processing_error = Some("cancelled".to_string());
            state.response_body = Some(TemplateId::Default.text().to_string());
            state.response_provenance = Some(Provenance::TemplateDefault);
            state.flag_for_review();
            state.stage = Stage::Terminated;
            state.record_history(
                "cancelled",
                Some(Provenance::TemplateDefault),
                "deadline exceeded",
            );
        }

        state
    }

    /// Run the stage machine with panic containment, mutating `state` in
    /// place so partial progress survives even when the run is abandoned.
    async fn run_contained(&self, state: &mut PipelineState) {
        let outcome = std::panic::AssertUnwindSafe(self.run_stages(state))
            .catch_unwind()
            .await;

        if let Err(panic) = outcome {
            let reason = panic_message(panic.as_ref());
            error!(
                id = %state.email.id,
                reason = %reason,
                "pipeline fault, forcing safe terminal state"
            );
            state.classification = Some(Classification::Error);
            state.processing_error = Some(format!("pipeline fault: {reason}"));
            state.response_body = Some(TemplateId::Default.text().to_string());
            state.response_provenance = Some(Provenance::TemplateDefault);
            state.flag_for_review();
            state.stage = Stage::Terminated;
            state.record_history("pipeline_failed", Some(Provenance::TemplateDefault), reason);
        }
    }

    async fn run_stages(&self, state: &mut PipelineState) {
        self.filter_stage(state).await;

        if state.classification.is_some_and(Classification::is_early_exit)
            || state.processing_error.is_some()
        {
            info!(
                id = %state.email.id,
                classification = ?state.classification,
                "early exit, response will not be generated"
            );
            state.stage = Stage::Terminated;
            state.record_history("terminated_early", None, "spam/promotional/error routing");
            return;
        }

        self.summarize_stage(state).await;
        self.respond_stage(state).await;

        state.stage = Stage::Terminated;
        state.record_history("pipeline_complete", None, "success");
    }

    // ── Filter ──────────────────────────────────────────────────────

    async fn filter_stage(&self, state: &mut PipelineState) {
        let started = Instant::now();
        info!(id = %state.email.id, sender = %state.email.sender, "filter stage");

        let (classification, provenance, note) = if let Some(cls) =
            keyword_classification(&state.email.subject, &state.email.body)
        {
            debug!(id = %state.email.id, label = cls.as_str(), "keyword fast path");
            (
                cls,
                Some(Provenance::LocalFallback),
                format!("fast-path keyword match: {}", cls.as_str()),
            )
        } else if state.email.body.trim().is_empty() {
            (
                Classification::Neutral,
                Some(Provenance::LocalFallback),
                "empty body".to_string(),
            )
        } else {
            let cap = Arc::clone(&self.classifier);
            let email = state.email.clone();
            let result = self
                .invoker
                .invoke("filtering", move |key| {
                    let cap = Arc::clone(&cap);
                    let email = email.clone();
                    async move { cap.classify(&key, &email).await }
                })
                .await;

            match result {
                Ok(label) => {
                    let cls = Classification::from(label);
                    (cls, Some(Provenance::Primary), format!("class={}", cls.as_str()))
                }
                Err(e) => {
                    warn!(
                        id = %state.email.id,
                        error = %e,
                        "classification exhausted, using local fallback"
                    );
                    self.metrics.fallback_used("filtering");
                    let cls = local_classify(&state.email.body);
                    (
                        cls,
                        Some(Provenance::LocalFallback),
                        format!("local fallback ({})", e.reason()),
                    )
                }
            }
        };

        self.metrics.classification(classification.as_str());
        state.classification = Some(classification);
        state.stage = Stage::Filtered;
        state.record_history("filter", provenance, note);
        self.metrics.stage_latency("filter", started.elapsed());
    }

    // ── Summarize ───────────────────────────────────────────────────

    async fn summarize_stage(&self, state: &mut PipelineState) {
        let started = Instant::now();

        // Routing prevents reaching here on early exit; keep the guard so a
        // future caller of the stage in isolation cannot skip it.
        if state.classification.is_some_and(Classification::is_early_exit)
            || state.processing_error.is_some()
        {
            state.summary = Some(SUMMARY_SKIPPED.to_string());
            state.stage = Stage::Summarized;
            state.record_history("summarize_skipped", None, "early-exit routing");
            return;
        }

        info!(id = %state.email.id, "summarize stage");

        let cap = Arc::clone(&self.summarizer);
        let email = state.email.clone();
        let result = self
            .invoker
            .invoke("summarization", move |key| {
                let cap = Arc::clone(&cap);
                let email = email.clone();
                async move { cap.summarize(&key, &email).await }
            })
            .await;

        let (candidate, provenance, source_note) = match result {
            Ok(text) if !text.trim().is_empty() => {
                (text, Provenance::Primary, "primary".to_string())
            }
            Ok(_) => {
                warn!(id = %state.email.id, "summarizer returned nothing, using local fallback");
                self.metrics.fallback_used("summarization");
                (
                    local_summary(&state.email.body),
                    Provenance::LocalFallback,
                    "local fallback (empty-output)".to_string(),
                )
            }
            Err(e) => {
                warn!(
                    id = %state.email.id,
                    error = %e,
                    "summarization exhausted, using local fallback"
                );
                self.metrics.fallback_used("summarization");
                (
                    local_summary(&state.email.body),
                    Provenance::LocalFallback,
                    format!("local fallback ({})", e.reason()),
                )
            }
        };

        // The chosen summary is always firewalled before it is stored.
        let outcome = self.firewall.sanitize(
            &candidate,
            &state.email.body,
            FirewallStage::Summarize,
            &candidate,
        );
        let (provenance, note) = if outcome.was_sanitized {
            let reason = outcome.reason.as_deref().unwrap_or("unknown");
            (Provenance::Sanitized, format!("sanitized ({reason})"))
        } else {
            (provenance, source_note)
        };

        state.summary = Some(outcome.final_text);
        state.stage = Stage::Summarized;
        state.record_history("summarize", Some(provenance), note);
        self.metrics.stage_latency("summarize", started.elapsed());
    }

    // ── Respond ─────────────────────────────────────────────────────

    async fn respond_stage(&self, state: &mut PipelineState) {
        let started = Instant::now();
        info!(id = %state.email.id, "respond stage");

        let summary = state.summary.clone().unwrap_or_default();
        let body = state.email.body.clone();

        // Knowledge retrieval is best-effort: failures degrade to an empty
        // context and never fail the stage.
        let context = match self.knowledge.retrieve(&summary).await {
            Ok(ctx) if !ctx.trim().is_empty() => ctx,
            Ok(_) => {
                self.metrics.empty_context();
                String::new()
            }
            Err(e) => {
                warn!(id = %state.email.id, error = %e, "knowledge retrieval failed");
                self.metrics.empty_context();
                String::new()
            }
        };

        let composite = format!(
            "Intent Summary:\n{summary}\n\nKnowledge Context:\n{context}\n\nOriginal Email:\n{body}"
        );

        let cap = Arc::clone(&self.generator);
        let email = state.email.clone();
        let recipient = state.email.recipient_name().to_string();
        let agent = self.config.agent_name.clone();
        let result = self
            .invoker
            .invoke("response", move |key| {
                let cap = Arc::clone(&cap);
                let email = email.clone();
                let composite = composite.clone();
                let recipient = recipient.clone();
                let agent = agent.clone();
                async move {
                    cap.generate(&key, &email, &composite, &recipient, &agent)
                        .await
                }
            })
            .await;

        let (candidate, provenance, source_note) = match result {
            Ok(text) if !text.trim().is_empty() => {
                (text, Provenance::Primary, "primary".to_string())
            }
            Ok(_) => {
                warn!(id = %state.email.id, "generator returned nothing, using template");
                self.metrics.fallback_used("response");
                let template = self.policy.select_template(&summary, &body);
                (
                    template.text().to_string(),
                    Provenance::TemplateDefault,
                    "template (empty-output)".to_string(),
                )
            }
            Err(e) => {
                warn!(
                    id = %state.email.id,
                    error = %e,
                    "generation exhausted, using template"
                );
                self.metrics.fallback_used("response");
                let template = self.policy.select_template(&summary, &body);
                (
                    template.text().to_string(),
                    Provenance::TemplateDefault,
                    format!("template ({})", e.reason()),
                )
            }
        };

        let outcome = self
            .firewall
            .sanitize(&candidate, &body, FirewallStage::Respond, &summary);
        let (provenance, source_note) = if outcome.was_sanitized {
            self.metrics.fallback_used("response");
            state.flag_for_review();
            let reason = outcome.reason.as_deref().unwrap_or("unknown");
            (Provenance::Sanitized, format!("sanitized ({reason})"))
        } else {
            (provenance, source_note)
        };

        let confidence = self.scorer.score(provenance, &outcome.final_text);

        if confidence < self.config.review_threshold
            || state.classification == Some(Classification::Negative)
            || contains_urgency(&body)
        {
            state.flag_for_review();
        }

        state.response_body = Some(outcome.final_text);
        state.response_provenance = Some(provenance);
        state.confidence = Some(confidence);
        state.stage = Stage::Responded;
        state.record_history(
            "respond",
            Some(provenance),
            format!("{source_note}, confidence={confidence}"),
        );
        self.metrics.stage_latency("respond", started.elapsed());
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
