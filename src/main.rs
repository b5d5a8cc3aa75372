use std::path::PathBuf;

use anyhow::Context;

use inbox_triage::channels::{ImapMailSource, MailboxConfig, SmtpMailSink};
use inbox_triage::config::{DEFAULT_CONFIG_PATH, TriageConfig};
use inbox_triage::context::TriageContext;
use inbox_triage::model::load_classifier;
use inbox_triage::pipeline::batch::{BatchOptions, run_batch};
use inbox_triage::pipeline::escalation::{dispatch, render_summary, select_escalations};
use inbox_triage::pipeline::processor::PriorityEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config_path = std::env::var("TRIAGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = TriageConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    // The model is loaded once and shared read-only for the whole batch
    let classifier = load_classifier(&config.model_path)
        .with_context(|| format!("loading model from {}", config.model_path.display()))?;
    let engine = PriorityEngine::new(TriageContext::from_config(&config, classifier));
    tracing::info!(
        run_id = %engine.context().run_id,
        threshold = engine.threshold(),
        "Triage run starting"
    );

    let mailbox = MailboxConfig::from_config(&config);
    let source = ImapMailSource::connect(&mailbox)
        .await
        .context("connecting to the mailbox")?;

    let batch = run_batch(&source, &engine, &BatchOptions::from_config(&config)).await;
    source.logout().await;
    let report = batch.context("running the triage batch")?;

    for item in &report.ranked {
        println!("{}", item.report_line());
    }

    let selected = select_escalations(&report.ranked, engine.threshold());
    match render_summary(&selected, config.lookback_days) {
        Some(summary) => {
            let sink = SmtpMailSink::new(&mailbox).context("setting up SMTP")?;
            dispatch(&sink, &config.mobile_email, &summary).await;
        }
        None => tracing::info!("No high-priority emails to send."),
    }

    Ok(())
}
