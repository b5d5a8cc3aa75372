//! Text normalization and sender domain extraction.
//!
//! Everything the rules engine and the classifier see goes through here:
//! subject, sender and body are cleaned and joined into one lower-cased
//! "combined text".

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([A-Za-z0-9.-]+)").unwrap());

/// Clean a raw text fragment.
///
/// Unescapes HTML entities, replaces `<...>` tags with a space, collapses
/// whitespace runs and trims. Malformed markup is left as text.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let unescaped = html_escape::decode_html_entities(raw);
    let stripped = TAG_RE.replace_all(&unescaped, " ");
    collapse_whitespace(&stripped)
}

/// Strip tags from an HTML body without touching entities.
pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, " ").into_owned()
}

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RE.replace_all(s, " ").trim().to_string()
}

/// Lower-cased domain of a sender address, or "" when there is no `@`.
///
/// Works on display forms too: `"Prof <prof@School.edu>"` → `school.edu`.
pub fn domain_of(sender: &str) -> String {
    DOMAIN_RE
        .captures(sender)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default()
}

/// Build the lower-cased unit of classification from a message's parts.
///
/// The sender only has its whitespace collapsed: tag stripping would remove
/// the `<addr>` of a display-form sender.
pub fn combined_text(subject: &str, sender: &str, body: &str) -> String {
    let parts = [normalize(subject), collapse_whitespace(sender), normalize(body)];
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
