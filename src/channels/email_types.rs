//! MIME → `Message` decoding: headers, sender display form, body extraction.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::debug;

use crate::error::ChannelError;
use crate::pipeline::normalize::{normalize, strip_tags};
use crate::pipeline::types::Message;

/// Parse raw RFC 822 bytes into a pipeline `Message`.
pub fn parse_message(id: &str, raw: &[u8]) -> Result<Message, ChannelError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(ChannelError::Malformed {
            id: id.to_string(),
            reason: "empty message".into(),
        });
    }
    let parsed = MessageParser::default()
        .parse(raw)
        .filter(|p| !p.parts.is_empty())
        .ok_or_else(|| ChannelError::Malformed {
            id: id.to_string(),
            reason: "not a MIME message".into(),
        })?;

    Ok(Message {
        id: id.to_string(),
        date: parsed.date().and_then(to_chrono),
        raw_date: raw_header_value(raw, "Date").unwrap_or_default(),
        subject: parsed.subject().unwrap_or_default().to_string(),
        sender: sender_display(&parsed),
        body: extract_body(id, &parsed),
    })
}

/// `Name <addr>` when the From header has a display name, bare address
/// otherwise, `Unknown` when there is no From header.
fn sender_display(parsed: &mail_parser::Message) -> String {
    let Some(addr) = parsed.from().and_then(|a| a.first()) else {
        return "Unknown".into();
    };
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => "Unknown".into(),
    }
}

/// Convert a mail-parser date, keeping the sender's UTC offset.
fn to_chrono(d: &mail_parser::DateTime) -> Option<DateTime<FixedOffset>> {
    let offset_secs = (i32::from(d.tz_hour) * 3600 + i32::from(d.tz_minute) * 60)
        * if d.tz_before_gmt { -1 } else { 1 };
    let offset = FixedOffset::east_opt(offset_secs)?;
    let naive = NaiveDate::from_ymd_opt(i32::from(d.year), u32::from(d.month), u32::from(d.day))?
        .and_hms_opt(u32::from(d.hour), u32::from(d.minute), u32::from(d.second))?;
    offset.from_local_datetime(&naive).single()
}

/// Unfolded value of the first header called `name` in the header block.
pub fn raw_header_value(raw: &[u8], name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let prefix = format!("{}:", name.to_ascii_lowercase());
    let mut value: Option<String> = None;

    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        match value.as_mut() {
            Some(v) if line.starts_with([' ', '\t']) => {
                v.push(' ');
                v.push_str(line.trim());
            }
            Some(_) => break,
            None if line.to_ascii_lowercase().starts_with(&prefix) => {
                value = Some(line[prefix.len()..].trim().to_string());
            }
            None => {}
        }
    }
    value
}

// ── Body extraction ─────────────────────────────────────────────────

fn has_type(part: &MessagePart, ctype: &str, subtype: &str) -> bool {
    match MimeHeaders::content_type(part) {
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case(ctype)
                && ct.subtype().is_some_and(|s| s.eq_ignore_ascii_case(subtype))
        }
        // RFC 2045 default
        None => ctype == "text" && subtype == "plain" && !matches!(part.body, PartType::Multipart(_)),
    }
}

fn is_attachment(part: &MessagePart) -> bool {
    MimeHeaders::content_disposition(part).is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"))
}

/// Decoded text of a part. Undecodable binary payloads are an error.
///
/// The parser already decodes text parts lossily in their declared charset,
/// so only parts it kept as raw bytes can fail here.
fn decode_part(part: &MessagePart) -> Result<String, String> {
    match &part.body {
        PartType::Text(text) | PartType::Html(text) => Ok(text.to_string()),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| format!("invalid UTF-8 payload: {e}")),
        PartType::Message(_) | PartType::Multipart(_) => Err("not a leaf text part".into()),
    }
}

/// Plain-text body of a message, normalized.
///
/// Multipart: the first non-attachment `text/plain` part with a non-empty
/// payload, else the first such `text/html` part with tags stripped.
/// Single-part: the payload itself. A part that fails to decode is skipped.
/// A whitespace-only plain part still wins over html and yields "".
pub fn extract_body(id: &str, parsed: &mail_parser::Message) -> String {
    let Some(root) = parsed.parts.first() else {
        return String::new();
    };

    if !matches!(root.body, PartType::Multipart(_)) {
        let text = decode_part(root)
            .unwrap_or_else(|_| String::from_utf8_lossy(root.contents()).into_owned());
        return normalize(&text);
    }

    let leaves = || parsed.parts.iter().skip(1);

    for part in leaves().filter(|p| has_type(p, "text", "plain") && !is_attachment(p)) {
        match decode_part(part) {
            Ok(text) if !text.is_empty() => return normalize(&text),
            Ok(_) => continue,
            Err(reason) => {
                debug!(id = %id, reason = %reason, "Skipping undecodable text/plain part");
            }
        }
    }

    for part in leaves().filter(|p| has_type(p, "text", "html")) {
        match decode_part(part) {
            Ok(html) if !html.is_empty() => return normalize(&strip_tags(&html)),
            Ok(_) => continue,
            Err(reason) => {
                debug!(id = %id, reason = %reason, "Skipping undecodable text/html part");
            }
        }
    }

    String::new()
}
