//! Batch driver — fetch, parse and classify each message, then rank.
//!
//! Each message produces a tagged [`MessageOutcome`]. One message's failure
//! never stops the others unless the policy says to abort.

use chrono::{Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::channels::email_types::parse_message;
use crate::config::TriageConfig;
use crate::error::PipelineError;
use crate::pipeline::processor::PriorityEngine;
use crate::pipeline::ranking::rank;
use crate::pipeline::types::{FailureStage, MailSource, MessageOutcome, RankedMessage};

/// What to do when a message fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Log and drop the message, keep going.
    #[default]
    SkipFailed,
    /// Stop the batch at the first failure.
    AbortOnFailure,
}

/// Parameters for one run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Search for messages on or after this date.
    pub since: NaiveDate,
    /// Only the most recent `max_messages` ids are processed.
    pub max_messages: usize,
    pub policy: BatchPolicy,
}

impl BatchOptions {
    pub fn from_config(config: &TriageConfig) -> Self {
        // Saturates at the earliest representable date instead of overflowing
        let since = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(config.lookback_days)))
            .map_or(NaiveDate::MIN, |t| t.date_naive());
        Self {
            since,
            max_messages: config.max_messages,
            policy: config.batch_policy,
        }
    }
}

/// Result of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Successfully classified messages, most recent first.
    pub ranked: Vec<RankedMessage>,
    /// Messages attempted.
    pub total: usize,
    /// Messages that failed and were skipped.
    pub failed: usize,
}

/// Turn one raw message into an outcome: parse, then classify.
pub fn classify_raw(engine: &PriorityEngine, id: &str, raw: &[u8]) -> MessageOutcome {
    let message = match parse_message(id, raw) {
        Ok(message) => message,
        Err(e) => {
            return MessageOutcome::Failed {
                id: id.to_string(),
                stage: FailureStage::Parse,
                reason: e.to_string(),
            };
        }
    };

    match engine.classify(&message) {
        Ok(result) => MessageOutcome::Classified(RankedMessage { message, result }),
        Err(e) => MessageOutcome::Failed {
            id: id.to_string(),
            stage: FailureStage::Classify,
            reason: e.to_string(),
        },
    }
}

/// Run one batch against a mail source.
///
/// Mailbox search failure fails the whole batch. Per-message failures are
/// handled according to `options.policy`.
pub async fn run_batch(
    source: &dyn MailSource,
    engine: &PriorityEngine,
    options: &BatchOptions,
) -> Result<BatchReport, PipelineError> {
    let all_ids = source.search(options.since).await.map_err(PipelineError::Search)?;
    let skip = all_ids.len().saturating_sub(options.max_messages);
    let ids = &all_ids[skip..];

    info!(
        run_id = %engine.context().run_id,
        found = all_ids.len(),
        processing = ids.len(),
        since = %options.since,
        "Starting triage batch"
    );

    let mut outcomes = Vec::with_capacity(ids.len());
    for id in ids {
        let outcome = match source.fetch(id).await {
            Ok(raw) => classify_raw(engine, id, &raw),
            Err(e) => MessageOutcome::Failed {
                id: id.clone(),
                stage: FailureStage::Fetch,
                reason: e.to_string(),
            },
        };

        if let MessageOutcome::Failed { id, stage, reason } = &outcome {
            if options.policy == BatchPolicy::AbortOnFailure {
                return Err(PipelineError::Aborted {
                    id: id.clone(),
                    stage: stage.label().to_string(),
                    reason: reason.clone(),
                });
            }
            warn!(id = %id, stage = stage.label(), reason = %reason, "Skipping message");
        } else {
            debug!(id = %id, "Message classified");
        }
        outcomes.push(outcome);
    }

    let report = collect_report(outcomes);
    info!(
        run_id = %engine.context().run_id,
        elapsed_ms = (Utc::now() - engine.context().started_at).num_milliseconds(),
        classified = report.ranked.len(),
        failed = report.failed,
        total = report.total,
        "Triage batch complete"
    );
    Ok(report)
}

/// Keep the classified outcomes, ranked; count the failures.
pub fn collect_report(outcomes: Vec<MessageOutcome>) -> BatchReport {
    let total = outcomes.len();
    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    let classified = outcomes
        .into_iter()
        .filter_map(|o| match o {
            MessageOutcome::Classified(ranked) => Some(ranked),
            MessageOutcome::Failed { .. } => None,
        })
        .collect();

    BatchReport {
        ranked: rank(classified),
        total,
        failed,
    }
}
