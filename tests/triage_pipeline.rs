//! Integration tests for the triage batch.
//!
//! Each test drives `run_batch` against an in-memory mailbox, then checks
//! ranking, escalation and failure handling end to end.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use inbox_triage::context::TriageContext;
use inbox_triage::error::{ChannelError, ClassifierError, PipelineError};
use inbox_triage::model::{Distribution, StatisticalClassifier, load_classifier};
use inbox_triage::pipeline::batch::{BatchOptions, BatchPolicy, run_batch};
use inbox_triage::pipeline::escalation::{
    SUMMARY_SUBJECT, dispatch, render_summary, select_escalations,
};
use inbox_triage::pipeline::processor::PriorityEngine;
use inbox_triage::pipeline::types::{MailSink, MailSource, PriorityLabel};

// ── Stubs ───────────────────────────────────────────────────────────

/// In-memory mailbox. Ids listed in `broken` fail to fetch.
#[derive(Default)]
struct StubMailbox {
    order: Vec<String>,
    messages: HashMap<String, Vec<u8>>,
    broken: Vec<String>,
    search_fails: bool,
    fetched: Mutex<Vec<String>>,
}

impl StubMailbox {
    fn with(mut self, id: &str, raw: &str) -> Self {
        self.order.push(id.to_string());
        self.messages.insert(id.to_string(), raw.as_bytes().to_vec());
        self
    }

    fn with_broken(mut self, id: &str) -> Self {
        self.order.push(id.to_string());
        self.broken.push(id.to_string());
        self
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSource for StubMailbox {
    async fn search(&self, _since: NaiveDate) -> Result<Vec<String>, ChannelError> {
        if self.search_fails {
            return Err(ChannelError::CommandFailed {
                command: "SEARCH".into(),
                reason: "NO mailbox unavailable".into(),
            });
        }
        Ok(self.order.clone())
    }

    async fn fetch(&self, id: &str) -> Result<Vec<u8>, ChannelError> {
        self.fetched.lock().unwrap().push(id.to_string());
        if self.broken.iter().any(|b| b == id) {
            return Err(ChannelError::FetchFailed {
                id: id.into(),
                reason: "connection reset".into(),
            });
        }
        Ok(self.messages.get(id).cloned().unwrap_or_default())
    }
}

/// Records sent mail, or fails every send.
#[derive(Default)]
struct RecordingSink {
    fail: bool,
    sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl MailSink for RecordingSink {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ChannelError> {
        if self.fail {
            return Err(ChannelError::SendFailed {
                recipient: recipient.into(),
                reason: "535 authentication rejected".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.into(), subject.into(), body.into()));
        Ok(())
    }
}

/// Keyword-driven classifier so test messages get predictable verdicts.
struct StubClassifier;

impl StatisticalClassifier for StubClassifier {
    fn name(&self) -> &str {
        "stub"
    }

    fn predict_distribution(&self, text: &str) -> Result<Distribution, ClassifierError> {
        if text.contains("explode") {
            return Err(ClassifierError::PredictionFailed("stub failure".into()));
        }
        let entries = if text.contains("outage") {
            vec![(PriorityLabel::High, 0.82), (PriorityLabel::Medium, 0.18)]
        } else if text.contains("standup") {
            vec![(PriorityLabel::Medium, 0.9), (PriorityLabel::Others, 0.1)]
        } else {
            vec![
                (PriorityLabel::High, 0.45),
                (PriorityLabel::Others, 0.35),
                (PriorityLabel::Low, 0.20),
            ]
        };
        Ok(Distribution::new(entries))
    }
}

fn engine() -> PriorityEngine {
    PriorityEngine::new(TriageContext::new(Arc::new(StubClassifier)))
}

fn options(policy: BatchPolicy, max_messages: usize) -> BatchOptions {
    BatchOptions {
        since: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        max_messages,
        policy,
    }
}

fn raw(from: &str, subject: &str, date: &str, body: &str) -> String {
    format!("From: {from}\r\nSubject: {subject}\r\nDate: {date}\r\n\r\n{body}\r\n")
}

fn mixed_mailbox() -> StubMailbox {
    StubMailbox::default()
        .with(
            "1",
            &raw(
                "Prof X <prof@school.edu>",
                "Submit assignment today evening 7:00 pm",
                "Mon, 1 Jan 2024 10:00:00 +0000",
                "Upload the report before class.",
            ),
        )
        .with(
            "2",
            &raw(
                "deals@shop.com",
                "50% off only today",
                "Tue, 2 Jan 2024 08:00:00 +0000",
                "Discount offers on everything",
            ),
        )
        .with(
            "3",
            &raw(
                "Lead <lead@example.com>",
                "Team standup moved",
                "Wed, 3 Jan 2024 09:00:00 +0000",
                "Same room, new time.",
            ),
        )
        .with(
            "4",
            &raw(
                "Ops <ops@infra.example.com>",
                "Database outage",
                "not a real date",
                "Primary cluster is down.",
            ),
        )
        .with(
            "5",
            &raw(
                "friend@gmail.com",
                "Hi",
                "Thu, 4 Jan 2024 12:00:00 +0000",
                "Can we talk later?",
            ),
        )
}

// ── Batch tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn mixed_batch_is_classified_and_ranked() {
    let mailbox = mixed_mailbox();
    let report = run_batch(&mailbox, &engine(), &options(BatchPolicy::SkipFailed, 100))
        .await
        .unwrap();

    assert_eq!(report.total, 5);
    assert_eq!(report.failed, 0);

    let ids: Vec<&str> = report.ranked.iter().map(|r| r.message.id.as_str()).collect();
    // Unparsable date ranks as "now", then newest first
    assert_eq!(ids, vec!["4", "5", "3", "2", "1"]);

    let by_id = |id: &str| {
        report
            .ranked
            .iter()
            .find(|r| r.message.id == id)
            .map(|r| r.result.clone())
            .unwrap()
    };

    let assignment = by_id("1");
    assert_eq!(assignment.label, PriorityLabel::High);
    assert_eq!(assignment.confidence, 1.0);
    assert!(assignment.reason_code.starts_with("override:kw:"));

    let promo = by_id("2");
    assert_eq!(promo.label, PriorityLabel::Low);
    assert_eq!(promo.confidence, 1.0);

    assert_eq!(by_id("3").reason_code, "model:Medium:0.90");
    assert_eq!(by_id("4").reason_code, "model:High:0.82");

    let chat = by_id("5");
    assert_eq!(chat.label, PriorityLabel::Others);
    assert_eq!(chat.reason_code, "low_confidence:0.45");
}

#[tokio::test]
async fn escalation_summary_lists_confident_high() {
    let mailbox = mixed_mailbox();
    let engine = engine();
    let report = run_batch(&mailbox, &engine, &options(BatchPolicy::SkipFailed, 100))
        .await
        .unwrap();

    let selected = select_escalations(&report.ranked, engine.threshold());
    let ids: Vec<&str> = selected.iter().map(|r| r.message.id.as_str()).collect();
    assert_eq!(ids, vec!["4", "1"]);

    let summary = render_summary(&selected, 30).unwrap();
    assert_eq!(summary.subject, SUMMARY_SUBJECT);
    assert!(summary.body.starts_with("High-Priority Emails (last 30 days):\n\n"));
    assert!(summary.body.contains(
        "[High] not a real date - Database outage - Ops <ops@infra.example.com> (p=0.82) note=model:High:0.82\n"
    ));
    assert!(summary.body.contains(
        "[High] 2024-01-01 10:00 - Submit assignment today evening 7:00 pm - Prof X <prof@school.edu> (p=1.00)"
    ));

    let sink = RecordingSink::default();
    assert!(dispatch(&sink, "me@phone.example", &summary).await);
    let sent = sink.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "me@phone.example");
    assert_eq!(sent[0].1, SUMMARY_SUBJECT);
    assert_eq!(sent[0].2, summary.body);
}

#[tokio::test]
async fn send_failure_is_not_fatal() {
    let mailbox = mixed_mailbox();
    let engine = engine();
    let report = run_batch(&mailbox, &engine, &options(BatchPolicy::SkipFailed, 100))
        .await
        .unwrap();
    let selected = select_escalations(&report.ranked, engine.threshold());
    let summary = render_summary(&selected, 30).unwrap();

    let sink = RecordingSink {
        fail: true,
        ..Default::default()
    };
    assert!(!dispatch(&sink, "me@phone.example", &summary).await);
    // The ranked results are still intact
    assert_eq!(report.ranked.len(), 5);
}

#[tokio::test]
async fn failed_messages_are_skipped_by_default() {
    let mailbox = StubMailbox::default()
        .with(
            "1",
            &raw("Lead <lead@example.com>", "Standup notes", "Mon, 1 Jan 2024 10:00:00 +0000", "ok"),
        )
        .with_broken("2")
        .with("3", "")
        .with(
            "4",
            &raw("friend@gmail.com", "Will this explode", "Tue, 2 Jan 2024 10:00:00 +0000", "?"),
        );

    let report = run_batch(&mailbox, &engine(), &options(BatchPolicy::SkipFailed, 100))
        .await
        .unwrap();

    assert_eq!(report.total, 4);
    assert_eq!(report.failed, 3);
    assert_eq!(report.ranked.len(), 1);
    assert_eq!(report.ranked[0].message.id, "1");
    assert_eq!(mailbox.fetched(), vec!["1", "2", "3", "4"]);
}

#[tokio::test]
async fn abort_policy_stops_at_first_failure() {
    let mailbox = StubMailbox::default()
        .with(
            "1",
            &raw("Lead <lead@example.com>", "Standup notes", "Mon, 1 Jan 2024 10:00:00 +0000", "ok"),
        )
        .with_broken("2")
        .with(
            "3",
            &raw("Lead <lead@example.com>", "Standup again", "Tue, 2 Jan 2024 10:00:00 +0000", "ok"),
        );

    let err = run_batch(&mailbox, &engine(), &options(BatchPolicy::AbortOnFailure, 100))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Aborted { ref id, ref stage, .. } if id == "2" && stage == "fetch"
    ));
    assert_eq!(mailbox.fetched(), vec!["1", "2"]);
}

#[tokio::test]
async fn only_most_recent_ids_are_processed() {
    let mut mailbox = StubMailbox::default();
    for id in 1..=5 {
        mailbox = mailbox.with(
            &id.to_string(),
            &raw(
                "Lead <lead@example.com>",
                &format!("Standup {id}"),
                &format!("{id} Jan 2024 10:00:00 +0000"),
                "notes",
            ),
        );
    }

    let report = run_batch(&mailbox, &engine(), &options(BatchPolicy::SkipFailed, 2))
        .await
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(mailbox.fetched(), vec!["4", "5"]);
    let ids: Vec<&str> = report.ranked.iter().map(|r| r.message.id.as_str()).collect();
    assert_eq!(ids, vec!["5", "4"]);
}

#[tokio::test]
async fn search_failure_fails_the_batch() {
    let mailbox = StubMailbox {
        search_fails: true,
        ..Default::default()
    };
    let err = run_batch(&mailbox, &engine(), &options(BatchPolicy::SkipFailed, 100))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Search(ChannelError::CommandFailed { .. })));
    assert!(mailbox.fetched().is_empty());
}

#[tokio::test]
async fn empty_mailbox_yields_empty_report() {
    let mailbox = StubMailbox::default();
    let report = run_batch(&mailbox, &engine(), &options(BatchPolicy::SkipFailed, 100))
        .await
        .unwrap();
    assert_eq!(report.total, 0);
    assert!(report.ranked.is_empty());
    assert!(render_summary(&select_escalations(&report.ranked, 0.6), 30).is_none());
}

// ── Shipped model format ────────────────────────────────────────────

#[tokio::test]
async fn batch_with_model_file() {
    let (hi, lo) = (0.8f64.ln(), 0.2f64.ln());
    let model = serde_json::json!({
        "classes": ["High", "Medium"],
        "vocabulary": {"outage": 0, "standup": 1},
        "idf": [1.0, 1.0],
        "class_log_prior": [0.5f64.ln(), 0.5f64.ln()],
        "feature_log_prob": [[hi, lo], [lo, hi]],
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{model}").unwrap();

    let classifier = load_classifier(file.path()).unwrap();
    let engine = PriorityEngine::new(TriageContext::new(classifier));

    let mailbox = StubMailbox::default()
        .with(
            "1",
            &raw("Ops <ops@infra.example.com>", "Database outage", "Mon, 1 Jan 2024 10:00:00 +0000", "Cluster down."),
        )
        .with(
            "2",
            &raw("friend@gmail.com", "Hi", "Tue, 2 Jan 2024 10:00:00 +0000", "Talk later?"),
        );

    let report = run_batch(&mailbox, &engine, &options(BatchPolicy::SkipFailed, 100))
        .await
        .unwrap();

    let ids: Vec<&str> = report.ranked.iter().map(|r| r.message.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "1"]);
    assert_eq!(report.ranked[1].result.reason_code, "model:High:0.80");
    assert_eq!(report.ranked[0].result.label, PriorityLabel::Others);
    assert_eq!(report.ranked[0].result.reason_code, "low_confidence:0.50");
}
