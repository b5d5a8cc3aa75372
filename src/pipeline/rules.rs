//! Override rules engine for deterministic priority labels.
//!
//! Runs before the statistical classifier to short-circuit known patterns:
//! - High keywords (deadlines, assignments, security alerts) → High
//! - Low-priority sender domains and brands → Low
//! - Low keywords (promotions, receipts, digests) → Low
//!
//! If a rule matches, the classifier is skipped entirely. Lists are ordered:
//! the first matching term is the one reported in the reason code.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pipeline::normalize::domain_of;
use crate::pipeline::types::PriorityLabel;

const DEFAULT_HIGH_KEYWORDS: &[&str] = &[
    "task completion",
    "task complete",
    "assignment",
    "assignment submission",
    "submit assignment",
    "submit",
    "deadline",
    "due",
    "urgent",
    "project report",
    "interview",
    "action required",
    "complete the task",
    "submit your assignment",
    "submission",
    "password",
    "reset your password",
    "unusual activity",
    "security alert",
    "login attempt",
    "api token",
    "token expire",
    "verify your account",
    "account suspended",
    "account locked",
    "sign-in attempt",
    "account activity",
];

const DEFAULT_LOW_KEYWORDS: &[&str] = &[
    "unsubscribe",
    "offer",
    "promotion",
    "discount",
    "newsletter",
    "receipt",
    "order confirmation",
    "welcome to",
    "verify email",
    "password reset link",
    "no-reply",
    "daily digest",
];

const DEFAULT_LOW_DOMAIN_KEYWORDS: &[&str] = &[
    "pushbullet.com",
    "udemy",
    "e.udemymail.com",
    "amazon",
    "newsletter",
    "mailer",
];

/// Ordered, lower-cased list of match terms.
///
/// Empty terms are dropped and duplicates keep their first position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct KeywordList(Vec<String>);

impl KeywordList {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for term in terms {
            let term = term.as_ref().trim().to_lowercase();
            if !term.is_empty() && !list.contains(&term) {
                list.push(term);
            }
        }
        Self(list)
    }

    /// First term contained in `haystack` (already lower-cased).
    pub fn first_in(&self, haystack: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| haystack.contains(t.as_str()))
            .map(String::as_str)
    }

    /// Built-in High keyword list.
    pub fn default_high() -> Self {
        Self::new(DEFAULT_HIGH_KEYWORDS)
    }

    /// Built-in Low-domain list.
    pub fn default_low_domain() -> Self {
        Self::new(DEFAULT_LOW_DOMAIN_KEYWORDS)
    }

    /// Built-in Low keyword list.
    pub fn default_low() -> Self {
        Self::new(DEFAULT_LOW_KEYWORDS)
    }

    pub fn terms(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for KeywordList {
    fn from(terms: Vec<String>) -> Self {
        Self::new(terms)
    }
}

impl From<KeywordList> for Vec<String> {
    fn from(list: KeywordList) -> Self {
        list.0
    }
}

/// Which rule set produced an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    HighKeyword,
    LowDomain,
    LowKeyword,
}

/// A matched override rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideMatch {
    pub label: PriorityLabel,
    pub kind: RuleKind,
    pub term: String,
}

impl OverrideMatch {
    /// Reason code without the `override:` prefix, e.g. `kw:submit`.
    pub fn reason(&self) -> String {
        match self.kind {
            RuleKind::HighKeyword | RuleKind::LowKeyword => format!("kw:{}", self.term),
            RuleKind::LowDomain => format!("domain-low:{}", self.term),
        }
    }
}

/// Ordered override rule sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRules {
    high: KeywordList,
    low_domain: KeywordList,
    low: KeywordList,
}

impl Default for OverrideRules {
    fn default() -> Self {
        Self::default_rules()
    }
}

impl OverrideRules {
    /// Rule sets with the built-in keyword lists.
    pub fn default_rules() -> Self {
        Self {
            high: KeywordList::default_high(),
            low_domain: KeywordList::default_low_domain(),
            low: KeywordList::default_low(),
        }
    }

    /// Rule sets that never match (for testing).
    pub fn empty() -> Self {
        Self {
            high: KeywordList::default(),
            low_domain: KeywordList::default(),
            low: KeywordList::default(),
        }
    }

    pub fn new(high: KeywordList, low_domain: KeywordList, low: KeywordList) -> Self {
        Self {
            high,
            low_domain,
            low,
        }
    }

    /// Evaluate the rule sets in order: High, Low-domain, Low.
    ///
    /// Returns `None` when nothing matches (fall through to the classifier).
    pub fn apply(&self, combined_text: &str, sender: &str) -> Option<OverrideMatch> {
        let text = combined_text.to_lowercase();

        if let Some(term) = self.high.first_in(&text) {
            return Some(self.matched(PriorityLabel::High, RuleKind::HighKeyword, term, sender));
        }

        let domain = domain_of(sender);
        if let Some(term) = self
            .low_domain
            .terms()
            .iter()
            .find(|t| domain.contains(t.as_str()) || text.contains(t.as_str()))
        {
            return Some(self.matched(PriorityLabel::Low, RuleKind::LowDomain, term, sender));
        }

        if let Some(term) = self.low.first_in(&text) {
            return Some(self.matched(PriorityLabel::Low, RuleKind::LowKeyword, term, sender));
        }

        None
    }

    fn matched(&self, label: PriorityLabel, kind: RuleKind, term: &str, sender: &str) -> OverrideMatch {
        debug!(sender = %sender, label = %label, term = %term, "Message matched override rule");
        OverrideMatch {
            label,
            kind,
            term: term.to_string(),
        }
    }
}
