//! Local deterministic heuristics.
//!
//! Fast keyword paths that run before any remote capability, plus the
//! always-succeeding local fallbacks used when remote calls are exhausted.
//! Everything here is pure and infallible.

use crate::pipeline::types::Classification;

/// Keywords that classify a message as spam without any remote call.
const SPAM_KEYWORDS: &[&str] = &[
    "lottery",
    "win cash",
    "claim prize",
    "free money",
    "work from home",
    "viagra",
    "buy now",
    "act now",
    "limited time",
    "click here",
    "buy direct",
];

/// Keywords that classify a message as promotional without any remote call.
const PROMOTIONAL_KEYWORDS: &[&str] = &[
    "sale",
    "discount",
    "promo",
    "subscribe",
    "newsletter",
    "offer",
    "deal",
    "new arrival",
];

/// Keywords that route the terminal state to human review regardless of
/// confidence.
const URGENCY_KEYWORDS: &[&str] = &["urgent", "asap", "immediately", "escalate", "emergency"];

/// Negative-signal words for the local fallback classifier.
const NEGATIVE_SIGNALS: &[&str] = &["not", "issue", "problem", "wrong"];

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|kw| lower.contains(kw))
}

/// Spam/promotional fast path over subject + body.
///
/// Returns `None` when neither list matches and remote classification should
/// run. Spam is checked first, so a message matching both lists is spam.
pub fn keyword_classification(subject: &str, body: &str) -> Option<Classification> {
    let combined = format!("{subject}\n\n{body}");
    if contains_any(&combined, SPAM_KEYWORDS) {
        Some(Classification::Spam)
    } else if contains_any(&combined, PROMOTIONAL_KEYWORDS) {
        Some(Classification::Promotional)
    } else {
        None
    }
}

/// Local fallback classifier. Always succeeds.
pub fn local_classify(body: &str) -> Classification {
    if body.trim().is_empty() {
        return Classification::Neutral;
    }
    if contains_any(body, NEGATIVE_SIGNALS) {
        Classification::Negative
    } else {
        Classification::Neutral
    }
}

/// Local fallback summarizer: a templated sentence keyed on word count.
pub fn local_summary(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "No content to summarize.".to_string();
    }
    if trimmed.split_whitespace().count() < 8 {
        format!("The customer is requesting: {trimmed}")
    } else {
        "The customer needs assistance.".to_string()
    }
}

/// Whether the original body signals urgency.
pub fn contains_urgency(body: &str) -> bool {
    contains_any(body, URGENCY_KEYWORDS)
}
