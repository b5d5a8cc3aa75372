//! Escalation — pick confident High-priority messages and summarize them
//! for the escalation recipient.

use tracing::{error, info};

use crate::pipeline::types::{MailSink, PriorityLabel, RankedMessage};

/// Subject line of the escalation mail.
pub const SUMMARY_SUBJECT: &str = "High-Priority Emails Summary";

/// Rendered escalation mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationSummary {
    pub subject: String,
    pub body: String,
}

/// Results that should be escalated: High label at or above `threshold`.
pub fn select_escalations(results: &[RankedMessage], threshold: f64) -> Vec<&RankedMessage> {
    results
        .iter()
        .filter(|r| r.result.label == PriorityLabel::High && r.result.confidence >= threshold)
        .collect()
}

/// Render the summary mail. `None` when there is nothing to escalate.
pub fn render_summary(selected: &[&RankedMessage], lookback_days: u32) -> Option<EscalationSummary> {
    if selected.is_empty() {
        return None;
    }

    let mut body = format!("High-Priority Emails (last {lookback_days} days):\n\n");
    for item in selected {
        body.push_str(&item.report_line());
        body.push('\n');
    }

    Some(EscalationSummary {
        subject: SUMMARY_SUBJECT.to_string(),
        body,
    })
}

/// Send the summary. Failures are logged and reported as `false`; they
/// never fail the run.
pub async fn dispatch(sink: &dyn MailSink, recipient: &str, summary: &EscalationSummary) -> bool {
    match sink.send(recipient, &summary.subject, &summary.body).await {
        Ok(()) => {
            info!(recipient = %recipient, "High-priority summary sent");
            true
        }
        Err(e) => {
            error!(recipient = %recipient, error = %e, "Could not send high-priority summary");
            false
        }
    }
}
