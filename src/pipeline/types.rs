//! Shared types for the triage pipeline.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, ClassifierError};

/// Display format for message dates in reports and summaries.
pub const DATE_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

// ── Message ─────────────────────────────────────────────────────────

/// One inbound mail message, already decoded from MIME.
///
/// Built once by the mail adapter and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Source id (IMAP sequence number or Message-ID).
    pub id: String,
    /// Parsed `Date:` header. `None` when absent or unparsable.
    pub date: Option<DateTime<FixedOffset>>,
    /// `Date:` header exactly as received.
    pub raw_date: String,
    /// Decoded subject line.
    pub subject: String,
    /// Sender in display form (`Name <addr>` or `addr`).
    pub sender: String,
    /// Extracted plain-text body.
    pub body: String,
}

impl Message {
    /// Date as shown in reports: formatted when parsed, raw header otherwise.
    pub fn date_display(&self) -> String {
        match self.date {
            Some(date) => date.format(DATE_DISPLAY_FORMAT).to_string(),
            None => self.raw_date.clone(),
        }
    }
}

// ── Priority label ──────────────────────────────────────────────────

/// Priority tier assigned to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityLabel {
    High,
    Medium,
    Low,
    Others,
}

impl PriorityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Others => "Others",
        }
    }
}

impl fmt::Display for PriorityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityLabel {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "High" => Ok(Self::High),
            "Medium" => Ok(Self::Medium),
            "Low" => Ok(Self::Low),
            "Others" => Ok(Self::Others),
            other => Err(ClassifierError::UnknownLabel(other.to_string())),
        }
    }
}

// ── Classification result ───────────────────────────────────────────

/// Priority decision for one message.
///
/// Override results always carry `confidence == 1.0`. Statistical results
/// carry the model's top probability, with the label forced to `Others`
/// when that probability is below the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: PriorityLabel,
    pub confidence: f64,
    /// Provenance: `override:kw:<term>`, `model:<label>:<p>`, ...
    pub reason_code: String,
}

// ── Ranked message ──────────────────────────────────────────────────

/// A message paired with its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMessage {
    pub message: Message,
    pub result: ClassificationResult,
}

impl RankedMessage {
    /// One report line: `[High] 2024-01-03 09:00 - subject - sender (p=1.00) note=...`.
    pub fn report_line(&self) -> String {
        format!(
            "[{}] {} - {} - {} (p={:.2}) note={}",
            self.result.label,
            self.message.date_display(),
            self.message.subject,
            self.message.sender,
            self.result.confidence,
            self.result.reason_code,
        )
    }
}

// ── Per-message outcome ─────────────────────────────────────────────

/// Pipeline stage at which a message failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Parse,
    Classify,
}

impl FailureStage {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Classify => "classify",
        }
    }
}

/// Outcome of running one message through the pipeline.
#[derive(Debug, Clone)]
pub enum MessageOutcome {
    Classified(RankedMessage),
    Failed {
        id: String,
        stage: FailureStage,
        reason: String,
    },
}

impl MessageOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

// ── Mail collaborators ──────────────────────────────────────────────

/// Source of raw inbound mail. Pure I/O, no triage logic.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Ids of messages received on or after `since`, oldest first.
    async fn search(&self, since: NaiveDate) -> Result<Vec<String>, ChannelError>;

    /// Raw RFC 822 bytes of one message.
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, ChannelError>;
}

/// Outbound mail used for escalation summaries.
#[async_trait]
pub trait MailSink: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ChannelError>;
}
