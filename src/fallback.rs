//! Deterministic fallback template selection.
//!
//! When the primary generation path is unusable (capability failure, empty
//! output, or a firewall hit), the pipeline falls back to one of a fixed set
//! of pre-approved templates. Templates are static strings with no dynamic
//! interpolation; they must never introduce new hallucination surface, and
//! a test runs the full pattern registry against every one of them.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Customer intent, in ascending priority order.
///
/// When several intents match the same message, the highest-priority one
/// wins: physical damage is more actionable than a delay, a delay more than
/// a thank-you note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Appreciation,
    Security,
    Customs,
    Billing,
    Delayed,
    WrongAddress,
    MissingItems,
    Damaged,
}

impl Intent {
    pub fn template(self) -> TemplateId {
        match self {
            Self::Appreciation => TemplateId::Appreciation,
            Self::Security => TemplateId::Security,
            Self::Customs => TemplateId::Customs,
            Self::Billing => TemplateId::Billing,
            Self::Delayed => TemplateId::Delayed,
            Self::WrongAddress => TemplateId::WrongAddress,
            Self::MissingItems => TemplateId::MissingItems,
            Self::Damaged => TemplateId::Damaged,
        }
    }
}

/// Identifier of a pre-approved response template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    Appreciation,
    Security,
    Customs,
    Billing,
    Delayed,
    WrongAddress,
    MissingItems,
    Damaged,
    Default,
}

impl TemplateId {
    /// Every template, for closed-world verification in tests.
    pub const ALL: [TemplateId; 9] = [
        Self::Appreciation,
        Self::Security,
        Self::Customs,
        Self::Billing,
        Self::Delayed,
        Self::WrongAddress,
        Self::MissingItems,
        Self::Damaged,
        Self::Default,
    ];

    /// Render the static, pre-approved message text.
    pub fn text(self) -> &'static str {
        match self {
            Self::Appreciation => {
                "Thank you for your kind message. We're glad to hear the good news, and \
                 your feedback has been shared with our team. We appreciate your business \
                 and look forward to serving you again."
            }
            Self::Security => {
                "This message looks suspicious. For your safety, do not share login or \
                 payment information over email. Please confirm the sender and we will \
                 investigate further."
            }
            Self::Customs => {
                "Thanks for the heads up. Our export team is re-checking the documentation \
                 and will share the required paperwork with you shortly."
            }
            Self::Billing => {
                "Thanks for raising this billing concern. We have passed the details to \
                 our finance team; they will verify the charge and follow up with a \
                 correction if one is needed."
            }
            Self::Delayed => {
                "Thank you for reaching out. We understand the urgency; our operations \
                 team is checking the shipment status and will provide an update shortly."
            }
            Self::WrongAddress => {
                "We're sorry for the inconvenience. The operations team has been notified \
                 and is investigating the delivery details. We will update you as soon as \
                 we know more."
            }
            Self::MissingItems => {
                "Thanks for letting us know, and we're sorry to hear items are missing. \
                 We've forwarded your message to our operations team for verification; \
                 they will review the dispatch records and get back to you with next steps."
            }
            Self::Damaged => {
                "We apologize for the damaged items. Please share photos and any shipment \
                 details you have; our returns and claims team will review them and advise \
                 on the replacement or claims process."
            }
            Self::Default => {
                "Thank you for reaching out. We've received your message and our team \
                 will get back to you shortly."
            }
        }
    }
}

static INTENT_TRIGGERS: LazyLock<Vec<(Intent, Vec<Regex>)>> = LazyLock::new(|| {
    let compile = |patterns: &[&str]| -> Vec<Regex> {
        patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
    };
    vec![
        (
            Intent::Damaged,
            compile(&[r"\bdamag", r"\bbroken\b", r"\bcrush(?:ed)?\b", r"\bshattered\b"]),
        ),
        (
            Intent::MissingItems,
            compile(&[r"\bmissing\b", r"\bshortage\b", r"\bnot received\b"]),
        ),
        (
            Intent::WrongAddress,
            compile(&[
                r"\bwrong address\b",
                r"\bdelivered to another\b",
                r"\bwrongly delivered\b",
            ]),
        ),
        (
            Intent::Delayed,
            compile(&[
                r"\bdelay",
                r"\bnot arrived\b",
                r"\bover a week\b",
                r"\bstill waiting\b",
            ]),
        ),
        (
            Intent::Billing,
            compile(&[r"\binvoice\b", r"\bbilling\b", r"\bcharge", r"\bovercharged\b"]),
        ),
        (
            Intent::Customs,
            compile(&[r"\bcustoms\b", r"\bdocumentation\b", r"\bcommercial invoice\b"]),
        ),
        (
            Intent::Security,
            compile(&[
                r"\bclick the link\b",
                r"\bprovide your card\b",
                r"\bphish",
                r"\bcard details\b",
            ]),
        ),
        (
            Intent::Appreciation,
            compile(&[r"\bthank(?:s| you)\b", r"\bappreciat", r"\bexcellent\b", r"\bdelight"]),
        ),
    ]
});

/// Looser single-keyword second pass, tried only when no regex trigger fires.
static KEYWORD_PASS: &[(Intent, &[&str])] = &[
    (Intent::Damaged, &["damag", "broken", "crush"]),
    (Intent::MissingItems, &["missing", "short", "not received"]),
    (Intent::Delayed, &["delay", "late", "waiting"]),
    (Intent::Billing, &["invoice", "billing", "duplicate"]),
    (Intent::Appreciation, &["thank", "appreciate", "delighted"]),
];

/// Maps a (summary, original body) pair to a safe response template.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPolicy;

impl FallbackPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Pick a template. Never fails; [`TemplateId::Default`] is the floor.
    ///
    /// All matching intents are collected first and the highest-priority one
    /// wins, so a message that is both delayed and damaged resolves to the
    /// damage template regardless of trigger order.
    pub fn select_template(&self, summary: &str, original_body: &str) -> TemplateId {
        let combined = format!("{summary} {original_body}").to_lowercase();

        let best = INTENT_TRIGGERS
            .iter()
            .filter(|(_, triggers)| triggers.iter().any(|r| r.is_match(&combined)))
            .map(|(intent, _)| *intent)
            .max();
        if let Some(intent) = best {
            debug!(intent = ?intent, "fallback intent matched");
            return intent.template();
        }

        let keyword_hit = KEYWORD_PASS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| combined.contains(kw)))
            .map(|(intent, _)| *intent)
            .max();
        if let Some(intent) = keyword_hit {
            debug!(intent = ?intent, "fallback keyword matched");
            return intent.template();
        }

        TemplateId::Default
    }
}
