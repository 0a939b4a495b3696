//! End-to-end pipeline scenarios with scripted capability mocks.
//!
//! Every test drives a full `PipelineOrchestrator` and asserts on the
//! terminal state, the audit history, and the recorded metrics: the
//! surfaces a caller actually sees.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use mail_sentinel::capability::{
    ClassifyCapability, GenerateCapability, RetrieveKnowledge, SentimentLabel,
    SummarizeCapability,
};
use mail_sentinel::error::CapabilityError;
use mail_sentinel::invoker::FixedSelector;
use mail_sentinel::metrics::{InMemoryMetrics, MetricsSink};
use mail_sentinel::pipeline::types::{Classification, InboundEmail, Provenance, Stage};
use mail_sentinel::{PipelineConfig, PipelineOrchestrator, TemplateId};

// ── Scripted mocks ──────────────────────────────────────────────────

/// What a mocked capability does on every call.
#[derive(Clone)]
enum Script {
    Reply(&'static str),
    Fail(&'static str),
}

struct MockClassifier {
    script: Script,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl ClassifyCapability for MockClassifier {
    async fn classify(
        &self,
        _key: &SecretString,
        _email: &InboundEmail,
    ) -> Result<SentimentLabel, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Reply(label) => Ok(SentimentLabel::parse(label)),
            Script::Fail(msg) => Err(CapabilityError::new("gemini", *msg)),
        }
    }
}

struct MockSummarizer {
    script: Script,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl SummarizeCapability for MockSummarizer {
    async fn summarize(
        &self,
        _key: &SecretString,
        _email: &InboundEmail,
    ) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Reply(text) => Ok((*text).to_string()),
            Script::Fail(msg) => Err(CapabilityError::new("gemini", *msg)),
        }
    }
}

struct MockGenerator {
    script: Script,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl GenerateCapability for MockGenerator {
    async fn generate(
        &self,
        _key: &SecretString,
        _email: &InboundEmail,
        _contextual_summary: &str,
        _recipient_name: &str,
        _agent_name: &str,
    ) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Reply(text) => Ok((*text).to_string()),
            Script::Fail(msg) => Err(CapabilityError::new("gemini", *msg)),
        }
    }
}

struct StaticKnowledge(&'static str);

#[async_trait]
impl RetrieveKnowledge for StaticKnowledge {
    async fn retrieve(&self, _query: &str) -> Result<String, CapabilityError> {
        Ok(self.0.to_string())
    }
}

/// Orchestrator + metrics + per-capability call counters, with retry delays
/// shrunk so exhaustion paths run in milliseconds.
struct Harness {
    orchestrator: PipelineOrchestrator,
    metrics: Arc<InMemoryMetrics>,
    classify_calls: Arc<AtomicU32>,
    summarize_calls: Arc<AtomicU32>,
    generate_calls: Arc<AtomicU32>,
}

fn harness(classifier: Script, summarizer: Script, generator: Script) -> Harness {
    let metrics = Arc::new(InMemoryMetrics::new());
    let classify_calls = Arc::new(AtomicU32::new(0));
    let summarize_calls = Arc::new(AtomicU32::new(0));
    let generate_calls = Arc::new(AtomicU32::new(0));

    let mut config = PipelineConfig::default();
    config.retry.initial_cooldown = Duration::from_millis(1);
    config.retry.max_backoff = Duration::from_millis(4);
    config.retry.transient_delay = Duration::from_millis(1);

    let orchestrator = PipelineOrchestrator::new(
        Arc::new(MockClassifier {
            script: classifier,
            calls: Arc::clone(&classify_calls),
        }),
        Arc::new(MockSummarizer {
            script: summarizer,
            calls: Arc::clone(&summarize_calls),
        }),
        Arc::new(MockGenerator {
            script: generator,
            calls: Arc::clone(&generate_calls),
        }),
        Arc::new(StaticKnowledge("Standard delivery takes 3-5 business days.")),
        Arc::new(FixedSelector(SecretString::from("test-key-000"))),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        config,
    );

    Harness {
        orchestrator,
        metrics,
        classify_calls,
        summarize_calls,
        generate_calls,
    }
}

const CLEAN_REPLY: &str =
    "Thank you for reaching out. Our support team is reviewing your request and will follow up shortly.";

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn spam_takes_the_fast_path_with_zero_capability_calls() {
    let h = harness(
        Script::Reply("neutral"),
        Script::Reply("A summary."),
        Script::Reply(CLEAN_REPLY),
    );

    let state = h
        .orchestrator
        .process(InboundEmail::new(
            "spammer@example.com",
            "You won the lottery!",
            "Claim prize now, click here.",
        ))
        .await;

    assert_eq!(state.stage, Stage::Terminated);
    assert_eq!(state.classification, Some(Classification::Spam));
    assert!(state.response_body.is_none());
    assert!(!state.is_sendable());
    assert_eq!(h.classify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.summarize_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.generate_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.metrics.counter("classification{spam}"), 1);

    let stages: Vec<&str> = state.history().iter().map(|e| e.stage.as_str()).collect();
    assert_eq!(stages, vec!["filter", "terminated_early"]);
    // The keyword decision is a local one and the audit trail says so.
    assert_eq!(
        state.history()[0].provenance,
        Some(Provenance::LocalFallback)
    );
}

#[tokio::test]
async fn fatal_summarizer_failure_degrades_to_local_summary() {
    let h = harness(
        Script::Reply("neutral"),
        Script::Fail("invalid request payload"),
        Script::Reply(CLEAN_REPLY),
    );

    let state = h
        .orchestrator
        .process(InboundEmail::new(
            "alice@example.com",
            "Order status",
            "Where is my order?",
        ))
        .await;

    assert_eq!(state.stage, Stage::Terminated);
    // Fatal errors abort retries after a single attempt.
    assert_eq!(h.summarize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        state.summary.as_deref(),
        Some("The customer is requesting: Where is my order?")
    );
    assert_eq!(h.metrics.counter("fallback_used{summarization}"), 1);

    let summarize_entry = state
        .history()
        .iter()
        .find(|e| e.stage == "summarize")
        .unwrap();
    assert_eq!(summarize_entry.provenance, Some(Provenance::LocalFallback));

    // A degraded summary does not poison the rest of the pipeline.
    assert_eq!(state.response_body.as_deref(), Some(CLEAN_REPLY));
    assert_eq!(state.response_provenance, Some(Provenance::Primary));
    assert!(state.is_sendable());
}

#[tokio::test]
async fn fabricated_tracking_details_are_firewalled_and_flagged() {
    let h = harness(
        Script::Reply("neutral"),
        Script::Reply("The customer reports a damaged parcel."),
        Script::Reply("Your AWB 123456 will arrive by 12 March."),
    );

    let state = h
        .orchestrator
        .process(InboundEmail::new(
            "bob@example.com",
            "Broken on arrival",
            "My parcel showed up damaged, please advise.",
        ))
        .await;

    assert_eq!(state.stage, Stage::Terminated);
    assert_eq!(state.response_provenance, Some(Provenance::Sanitized));
    assert_eq!(state.response_body.as_deref(), Some(TemplateId::Damaged.text()));
    assert!(state.requires_human_review());
    assert_eq!(h.metrics.counter("sanitization_triggered{respond}"), 1);

    // The review flag set at sanitization survives pipeline completion.
    let last = state.history().last().unwrap();
    assert_eq!(last.stage, "pipeline_complete");
    assert!(last.requires_human_review);
}

#[tokio::test]
async fn quota_exhaustion_is_bounded_and_falls_back_locally() {
    let h = harness(
        Script::Fail("429 quota exceeded for project"),
        Script::Reply("The customer reports a delivery problem."),
        Script::Reply(CLEAN_REPLY),
    );

    let state = h
        .orchestrator
        .process(InboundEmail::new(
            "carol@example.com",
            "Delivery",
            "There is a problem with my delivery",
        ))
        .await;

    // Exactly max_attempts calls, then the local classifier takes over.
    assert_eq!(h.classify_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.metrics.counter("call_attempts{filtering}"), 3);
    assert_eq!(h.metrics.counter("call_failures{filtering,rate_limit}"), 3);
    assert_eq!(h.metrics.counter("fallback_used{filtering}"), 1);

    // "problem" is a negative signal, and negative mail is always reviewed.
    assert_eq!(state.classification, Some(Classification::Negative));
    assert!(state.requires_human_review());
    assert_eq!(state.stage, Stage::Terminated);
    assert!(state.response_body.is_some());
}

#[tokio::test]
async fn total_capability_outage_still_yields_a_safe_reply() {
    let h = harness(
        Script::Fail("connection timed out"),
        Script::Fail("connection timed out"),
        Script::Fail("connection timed out"),
    );

    let state = h
        .orchestrator
        .process(InboundEmail::new(
            "dave@example.com",
            "Question",
            "Can you confirm you received my documents yesterday",
        ))
        .await;

    assert_eq!(state.stage, Stage::Terminated);
    assert_eq!(state.classification, Some(Classification::Neutral));
    assert_eq!(state.response_provenance, Some(Provenance::TemplateDefault));
    let body = state.response_body.as_deref().unwrap();
    assert!(!body.trim().is_empty());
    assert!(state.is_sendable());
    assert_eq!(h.metrics.counter("fallback_used{filtering}"), 1);
    assert_eq!(h.metrics.counter("fallback_used{summarization}"), 1);
    assert!(h.metrics.counter("fallback_used{response}") >= 1);
}

#[tokio::test]
async fn empty_generator_output_resolves_to_intent_template() {
    let h = harness(
        Script::Reply("negative"),
        Script::Reply("The customer says the shipment arrived damaged."),
        Script::Reply("   "),
    );

    let state = h
        .orchestrator
        .process(InboundEmail::new(
            "erin@example.com",
            "Damaged box",
            "The box was crushed and the contents are broken.",
        ))
        .await;

    // Damage intent is read from the summary, not the default floor.
    assert_eq!(state.response_body.as_deref(), Some(TemplateId::Damaged.text()));
    assert_eq!(state.response_provenance, Some(Provenance::TemplateDefault));
    // Negative classification forces review regardless of confidence.
    assert!(state.requires_human_review());
    assert_eq!(h.metrics.counter("fallback_used{response}"), 1);
}

#[tokio::test]
async fn urgent_mail_is_flagged_even_when_everything_succeeds() {
    let h = harness(
        Script::Reply("neutral"),
        Script::Reply("The customer asks for an update."),
        Script::Reply(CLEAN_REPLY),
    );

    let state = h
        .orchestrator
        .process(InboundEmail::new(
            "frank@example.com",
            "Update",
            "Please send an update immediately, this is urgent.",
        ))
        .await;

    assert_eq!(state.response_provenance, Some(Provenance::Primary));
    assert!(state.requires_human_review());
    assert!(state.is_sendable());
}

#[tokio::test]
async fn clean_run_records_full_history_and_latencies() {
    let h = harness(
        Script::Reply("positive"),
        Script::Reply("The customer thanks the team for a smooth delivery."),
        Script::Reply(CLEAN_REPLY),
    );

    let state = h
        .orchestrator
        .process(InboundEmail::new(
            "grace@example.com",
            "Thanks!",
            "Everything arrived in perfect shape, thank you.",
        ))
        .await;

    assert_eq!(state.stage, Stage::Terminated);
    assert_eq!(state.classification, Some(Classification::Positive));
    assert_eq!(state.confidence, Some(1.0));
    assert!(!state.requires_human_review());
    assert!(state.is_sendable());

    let stages: Vec<&str> = state.history().iter().map(|e| e.stage.as_str()).collect();
    assert_eq!(
        stages,
        vec!["filter", "summarize", "respond", "pipeline_complete"]
    );
    for stage in ["filter", "summarize", "respond"] {
        assert_eq!(h.metrics.latency_samples(stage), 1);
    }
}

#[tokio::test]
async fn empty_body_is_routed_without_a_classifier_call() {
    let h = harness(
        Script::Reply("neutral"),
        Script::Reply("ignored"),
        Script::Reply(CLEAN_REPLY),
    );

    let state = h
        .orchestrator
        .process(InboundEmail::new("mute@example.com", "", "   "))
        .await;

    assert_eq!(h.classify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(state.classification, Some(Classification::Neutral));
    assert_eq!(
        state
            .history()
            .iter()
            .find(|e| e.stage == "filter")
            .unwrap()
            .provenance,
        Some(Provenance::LocalFallback)
    );
    assert_eq!(state.stage, Stage::Terminated);
    assert!(state.response_body.is_some());
}

#[tokio::test]
async fn concurrent_messages_do_not_share_state() {
    let h = Arc::new(harness(
        Script::Reply("neutral"),
        Script::Reply("The customer asks about an order."),
        Script::Reply(CLEAN_REPLY),
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            h.orchestrator
                .process(InboundEmail::new(
                    format!("user{i}@example.com"),
                    format!("Question {i}"),
                    "Could you check the status for me please",
                ))
                .await
        }));
    }

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let state = handle.await.unwrap();
        assert_eq!(state.stage, Stage::Terminated);
        assert!(state.is_sendable());
        assert!(ids.insert(state.email.id.clone()));
    }
    assert_eq!(h.metrics.counter("classification{neutral}"), 8);
}
