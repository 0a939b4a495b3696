//! Shared hallucination/safety pattern registry.
//!
//! One registry serves both the content firewall and the test suite, so the
//! "templates never re-trigger the firewall" invariant can be checked against
//! the exact same patterns production uses.
//!
//! `scan` is pure and deterministic: same text, same match set. The result is
//! a set, so check order is irrelevant.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Registry revision. Bump when patterns change so audit records can be
/// replayed against the rules that produced them.
pub const REGISTRY_VERSION: u32 = 1;

/// Categories of unsafe content the registry detects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    /// Order/tracking/invoice code present in the candidate but absent from
    /// the source message. The only *relative* category.
    FabricatedIdentifier,
    /// Concrete delivery date or ETA the model has no basis for.
    FabricatedEta,
    /// Ten or more consecutive digits (phone-like).
    LongDigitRun,
    /// Operational promises ("will deliver", "will arrive").
    PromiseLanguage,
    /// Phishing-style calls to action.
    PhishingLanguage,
    /// PII-adjacent keywords (addresses, phone numbers).
    PiiMention,
}

impl PatternCategory {
    pub const ALL: [PatternCategory; 6] = [
        Self::FabricatedIdentifier,
        Self::FabricatedEta,
        Self::LongDigitRun,
        Self::PromiseLanguage,
        Self::PhishingLanguage,
        Self::PiiMention,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FabricatedIdentifier => "fabricated-identifier",
            Self::FabricatedEta => "fabricated-eta",
            Self::LongDigitRun => "long-digit-run",
            Self::PromiseLanguage => "promise-language",
            Self::PhishingLanguage => "phishing-language",
            Self::PiiMention => "pii-mention",
        }
    }
}

// Shipment-style identifier codes: known prefix + alphanumeric tail that
// contains at least one digit ("invoice details" must not match).
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:SC|PO|ORDER|INVOICE|AWB)[-\s]?[A-Z0-9]*\d[A-Z0-9]*\b").unwrap()
});

static ETA_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\beta\b[\s:\-]*\d",
        r"(?i)\b(?:by|on)\s+\d{1,2}(?:st|nd|rd|th)?\s+(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|jul(?:y)?|aug(?:ust)?|sep(?:tember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b",
        r"(?i)\b(?:by|on)\s+(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|jul(?:y)?|aug(?:ust)?|sep(?:tember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\s+\d{1,2}(?:st|nd|rd|th)?\b",
        r"(?i)\bby\s+(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|tomorrow)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static LONG_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{10,}").unwrap());

static PROMISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bwill\s+(?:deliver|arrive|ship|be\s+delivered|be\s+shipped)\b",
        r"(?i)\bguaranteed\s+delivery\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static PHISHING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bclick\s+here\b",
        r"(?i)\bverify\s+your\s+account\b",
        r"(?i)\bprovide\s+your\s+card\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static PII_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(?:home|client|shipping|billing)\s+address\b",
        r"(?i)\bphone\s+number\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Normalize an identifier for the relative comparison: uppercase, strip
/// separators ("SC 123" == "sc-123").
fn normalize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

fn identifiers_in(text: &str) -> BTreeSet<String> {
    IDENTIFIER
        .find_iter(text)
        .map(|m| normalize_identifier(m.as_str()))
        .collect()
}

/// Stateless scanner over the static pattern tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternRegistry;

impl PatternRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Scan `text` for every category.
    ///
    /// `source_text` feeds the relative identifier check: an identifier in
    /// `text` is fabricated only if it does not also appear (normalized) in
    /// the source. With no source, every identifier counts as fabricated.
    pub fn scan(&self, text: &str, source_text: Option<&str>) -> BTreeSet<PatternCategory> {
        self.scan_with(&PatternCategory::ALL, text, source_text)
    }

    /// Scan `text` for the given categories only.
    pub fn scan_with(
        &self,
        categories: &[PatternCategory],
        text: &str,
        source_text: Option<&str>,
    ) -> BTreeSet<PatternCategory> {
        let mut matched = BTreeSet::new();
        if text.trim().is_empty() {
            return matched;
        }

        for &category in categories {
            let hit = match category {
                PatternCategory::FabricatedIdentifier => {
                    let candidate_ids = identifiers_in(text);
                    if candidate_ids.is_empty() {
                        false
                    } else {
                        let known = source_text.map(identifiers_in).unwrap_or_default();
                        candidate_ids.iter().any(|id| !known.contains(id))
                    }
                }
                PatternCategory::FabricatedEta => {
                    ETA_PATTERNS.iter().any(|r| r.is_match(text))
                }
                PatternCategory::LongDigitRun => LONG_DIGITS.is_match(text),
                PatternCategory::PromiseLanguage => {
                    PROMISE_PATTERNS.iter().any(|r| r.is_match(text))
                }
                PatternCategory::PhishingLanguage => {
                    PHISHING_PATTERNS.iter().any(|r| r.is_match(text))
                }
                PatternCategory::PiiMention => PII_PATTERNS.iter().any(|r| r.is_match(text)),
            };
            if hit {
                matched.insert(category);
            }
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str, source: Option<&str>) -> BTreeSet<PatternCategory> {
        PatternRegistry::new().scan(text, source)
    }

    #[test]
    fn clean_text_matches_nothing() {
        let result = scan(
            "Thank you for reaching out. Our team will look into this.",
            None,
        );
        assert!(result.is_empty());
    }

    #[test]
    fn empty_text_matches_nothing() {
        assert!(scan("", None).is_empty());
        assert!(scan("   \n ", None).is_empty());
    }

    #[test]
    fn detects_fabricated_identifier_without_source() {
        let result = scan("Your order SC-12345 has been located.", None);
        assert!(result.contains(&PatternCategory::FabricatedIdentifier));
    }

    #[test]
    fn identifier_present_in_source_is_not_fabricated() {
        let result = scan(
            "We are checking on order SC-12345 now.",
            Some("Hi, where is my order sc 12345? It was due last week."),
        );
        assert!(!result.contains(&PatternCategory::FabricatedIdentifier));
    }

    #[test]
    fn identifier_absent_from_source_is_fabricated() {
        let result = scan(
            "Your AWB 778899 is in transit.",
            Some("Where is my package? I have no tracking information."),
        );
        assert!(result.contains(&PatternCategory::FabricatedIdentifier));
    }

    #[test]
    fn identifier_comparison_is_case_and_space_insensitive() {
        let result = scan("Reference INVOICE 4421A.", Some("see invoice-4421a attached"));
        assert!(!result.contains(&PatternCategory::FabricatedIdentifier));
    }

    #[test]
    fn plain_word_invoice_is_not_an_identifier() {
        // No digit in the tail; "invoice details" is prose, not a code.
        let result = scan("We have forwarded the invoice details to Finance.", None);
        assert!(!result.contains(&PatternCategory::FabricatedIdentifier));
    }

    #[test]
    fn detects_eta_with_digits() {
        let result = scan("Current ETA: 3 days.", None);
        assert!(result.contains(&PatternCategory::FabricatedEta));
    }

    #[test]
    fn detects_date_promise() {
        let result = scan("It will arrive by 12 March at the latest.", None);
        assert!(result.contains(&PatternCategory::FabricatedEta));
        assert!(result.contains(&PatternCategory::PromiseLanguage));
    }

    #[test]
    fn detects_weekday_promise() {
        let result = scan("Expect the shipment by Tuesday.", None);
        assert!(result.contains(&PatternCategory::FabricatedEta));
    }

    #[test]
    fn detects_long_digit_run() {
        let result = scan("Call 9876543210 for updates.", None);
        assert!(result.contains(&PatternCategory::LongDigitRun));
    }

    #[test]
    fn nine_digits_is_not_a_long_run() {
        let result = scan("Ref 987654321.", None);
        assert!(!result.contains(&PatternCategory::LongDigitRun));
    }

    #[test]
    fn detects_phishing_language() {
        let result = scan("Please click here to verify your account.", None);
        assert!(result.contains(&PatternCategory::PhishingLanguage));
    }

    #[test]
    fn detects_pii_mention() {
        let result = scan("Please confirm your shipping address and phone number.", None);
        assert!(result.contains(&PatternCategory::PiiMention));
    }

    #[test]
    fn category_toggling_limits_the_scan() {
        let registry = PatternRegistry::new();
        let text = "Your order SC-999111 will arrive by Tuesday. Click here.";
        let limited =
            registry.scan_with(&[PatternCategory::PhishingLanguage], text, None);
        assert_eq!(limited.len(), 1);
        assert!(limited.contains(&PatternCategory::PhishingLanguage));
    }

    #[test]
    fn scan_is_deterministic() {
        let text = "AWB 445566 will be delivered by 3 June. Call 1234567890.";
        let first = scan(text, None);
        for _ in 0..5 {
            assert_eq!(scan(text, None), first);
        }
    }
}
