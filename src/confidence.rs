//! Confidence scoring for terminal responses.
//!
//! Pure function of provenance and output shape; no capability calls, no
//! side effects. The orchestrator compares the score against the review
//! threshold to decide on human routing.

use crate::pipeline::types::Provenance;

const NON_PRIMARY_PENALTY: f32 = 0.25;
const SHORT_OUTPUT_PENALTY: f32 = 0.10;
const OPEN_QUESTION_PENALTY: f32 = 0.05;

/// Derives a confidence score in [0,1] from how a response was produced.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceScorer {
    min_length: usize,
}

impl ConfidenceScorer {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    /// Score a respond-stage output.
    ///
    /// Base 1.0; any non-primary provenance costs the most, a too-short body
    /// and an unresolved question mark cost less. Clamped to [0,1] and
    /// rounded to two decimals for determinism.
    pub fn score(&self, provenance: Provenance, output: &str) -> f32 {
        let mut score = 1.0_f32;
        if provenance != Provenance::Primary {
            score -= NON_PRIMARY_PENALTY;
        }
        if output.chars().count() < self.min_length {
            score -= SHORT_OUTPUT_PENALTY;
        }
        // A declarative reply should not leave questions open.
        if output.contains('?') {
            score -= OPEN_QUESTION_PENALTY;
        }
        (score.clamp(0.0, 1.0) * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(40)
    }

    const LONG_DECLARATIVE: &str =
        "Thank you for reaching out. Our team is reviewing your request and will respond soon.";

    #[test]
    fn primary_long_declarative_is_full_confidence() {
        assert_eq!(scorer().score(Provenance::Primary, LONG_DECLARATIVE), 1.0);
    }

    #[test]
    fn non_primary_takes_fixed_penalty() {
        assert_eq!(
            scorer().score(Provenance::LocalFallback, LONG_DECLARATIVE),
            0.75
        );
        assert_eq!(scorer().score(Provenance::Sanitized, LONG_DECLARATIVE), 0.75);
        assert_eq!(
            scorer().score(Provenance::TemplateDefault, LONG_DECLARATIVE),
            0.75
        );
    }

    #[test]
    fn short_output_takes_smaller_penalty() {
        assert_eq!(scorer().score(Provenance::Primary, "Noted, thank you."), 0.9);
    }

    #[test]
    fn length_is_counted_in_characters_not_bytes() {
        // 26 characters but well over 40 bytes; still short.
        let text = "Спасибо за ваше сообщение!";
        assert!(text.len() >= 40 && text.chars().count() < 40);
        assert_eq!(scorer().score(Provenance::Primary, text), 0.9);
    }

    #[test]
    fn open_question_takes_smallest_penalty() {
        let text = "We received your message. Could you confirm the order reference please?";
        assert_eq!(scorer().score(Provenance::Primary, text), 0.95);
    }

    #[test]
    fn penalties_stack_and_clamp() {
        let score = scorer().score(Provenance::TemplateDefault, "Why?");
        // 1.0 - 0.25 - 0.10 - 0.05
        assert_eq!(score, 0.6);
        assert!(score >= 0.0 && score <= 1.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let s = scorer();
        let first = s.score(Provenance::Sanitized, "short?");
        for _ in 0..5 {
            assert_eq!(s.score(Provenance::Sanitized, "short?"), first);
        }
    }
}
