//! Configuration types.
//!
//! Loaded from a JSON file, then overridden by environment variables:
//! `TRIAGE_EMAIL`, `TRIAGE_PASSWORD`, `TRIAGE_MOBILE_EMAIL`, `TRIAGE_MODEL_PATH`.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::pipeline::batch::BatchPolicy;
use crate::pipeline::rules::{KeywordList, OverrideRules};

/// Minimum top-class probability for accepting a model verdict.
pub const DEFAULT_PROBABILITY_THRESHOLD: f64 = 0.60;

/// Upper bound on messages processed per run.
pub const DEFAULT_MAX_MESSAGES: usize = 100;

/// Mailbox search window.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Longest accepted search window (about a century).
pub const MAX_LOOKBACK_DAYS: u32 = 36_500;

/// Default config file, overridable with `TRIAGE_CONFIG`.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Optional replacement rule lists. Missing lists keep the built-ins.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RulesSection {
    high: Option<KeywordList>,
    low_domain: Option<KeywordList>,
    low: Option<KeywordList>,
}

/// Config file as written on disk. Everything optional until validated.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    email: Option<String>,
    password: Option<String>,
    #[serde(rename = "mobile_email", alias = "mobileEmail")]
    mobile_email: Option<String>,
    probability_threshold: Option<f64>,
    max_messages: Option<usize>,
    lookback_days: Option<u32>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    model_path: Option<PathBuf>,
    #[serde(default)]
    abort_on_failure: bool,
    rules: Option<RulesSection>,
}

impl RawConfig {
    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("TRIAGE_EMAIL") {
            self.email = Some(v);
        }
        if let Some(v) = lookup("TRIAGE_PASSWORD") {
            self.password = Some(v);
        }
        if let Some(v) = lookup("TRIAGE_MOBILE_EMAIL") {
            self.mobile_email = Some(v);
        }
        if let Some(v) = lookup("TRIAGE_MODEL_PATH") {
            self.model_path = Some(PathBuf::from(v));
        }
        self
    }
}

/// Validated triage configuration.
#[derive(Debug)]
pub struct TriageConfig {
    /// Account identity: IMAP/SMTP user and From address.
    pub email: String,
    pub password: SecretString,
    /// Escalation recipient. Defaults to `email`.
    pub mobile_email: String,
    pub probability_threshold: f64,
    pub max_messages: usize,
    pub lookback_days: u32,
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub model_path: PathBuf,
    pub batch_policy: BatchPolicy,
    pub rules: OverrideRules,
}

impl TriageConfig {
    /// Read the config file at `path` and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_with(&raw, |key| std::env::var(key).ok())
    }

    /// Parse a config document without consulting the environment.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Self::from_json_with(raw, |_| None)
    }

    fn from_json_with(
        raw: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let parsed: RawConfig =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::validate(parsed.with_overrides(lookup))
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let email = raw
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "email".into(),
                hint: "Set it in the config file or TRIAGE_EMAIL.".into(),
            })?;

        let password = raw
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "password".into(),
                hint: "Set it in the config file or TRIAGE_PASSWORD.".into(),
            })?;

        let mobile_email = raw
            .mobile_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| email.clone());

        let probability_threshold = raw
            .probability_threshold
            .unwrap_or(DEFAULT_PROBABILITY_THRESHOLD);
        if !(0.0..=1.0).contains(&probability_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "probabilityThreshold".into(),
                message: format!("{probability_threshold} is outside [0, 1]"),
            });
        }

        let max_messages = raw.max_messages.unwrap_or(DEFAULT_MAX_MESSAGES);
        if max_messages == 0 {
            return Err(ConfigError::InvalidValue {
                key: "maxMessages".into(),
                message: "must be greater than zero".into(),
            });
        }

        let lookback_days = raw.lookback_days.unwrap_or(DEFAULT_LOOKBACK_DAYS);
        if !(1..=MAX_LOOKBACK_DAYS).contains(&lookback_days) {
            return Err(ConfigError::InvalidValue {
                key: "lookbackDays".into(),
                message: format!("{lookback_days} is outside [1, {MAX_LOOKBACK_DAYS}]"),
            });
        }

        let rules = match raw.rules {
            Some(section) => OverrideRules::new(
                section.high.unwrap_or_else(KeywordList::default_high),
                section.low_domain.unwrap_or_else(KeywordList::default_low_domain),
                section.low.unwrap_or_else(KeywordList::default_low),
            ),
            None => OverrideRules::default_rules(),
        };

        Ok(Self {
            email,
            password: SecretString::from(password),
            mobile_email,
            probability_threshold,
            max_messages,
            lookback_days,
            imap_host: raw.imap_host.unwrap_or_else(|| "imap.gmail.com".to_string()),
            imap_port: raw.imap_port.unwrap_or(993),
            smtp_host: raw.smtp_host.unwrap_or_else(|| "smtp.gmail.com".to_string()),
            smtp_port: raw.smtp_port.unwrap_or(465),
            model_path: raw.model_path.unwrap_or_else(|| PathBuf::from("model.json")),
            batch_policy: if raw.abort_on_failure {
                BatchPolicy::AbortOnFailure
            } else {
                BatchPolicy::SkipFailed
            },
            rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = TriageConfig::from_json(r#"{"email": "me@example.com", "password": "pw"}"#).unwrap();
        assert_eq!(cfg.email, "me@example.com");
        assert_eq!(cfg.mobile_email, "me@example.com");
        assert_eq!(cfg.probability_threshold, DEFAULT_PROBABILITY_THRESHOLD);
        assert_eq!(cfg.max_messages, DEFAULT_MAX_MESSAGES);
        assert_eq!(cfg.lookback_days, DEFAULT_LOOKBACK_DAYS);
        assert_eq!(cfg.imap_host, "imap.gmail.com");
        assert_eq!(cfg.smtp_port, 465);
        assert_eq!(cfg.batch_policy, BatchPolicy::SkipFailed);
        assert_eq!(cfg.rules, OverrideRules::default_rules());
        assert_eq!(cfg.password.expose_secret(), "pw");
    }

    #[test]
    fn recognized_keys_are_read() {
        let cfg = TriageConfig::from_json(
            r#"{
                "email": "me@example.com",
                "password": "pw",
                "mobile_email": "phone@example.com",
                "probabilityThreshold": 0.75,
                "maxMessages": 20,
                "lookbackDays": 7,
                "abortOnFailure": true
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.mobile_email, "phone@example.com");
        assert_eq!(cfg.probability_threshold, 0.75);
        assert_eq!(cfg.max_messages, 20);
        assert_eq!(cfg.lookback_days, 7);
        assert_eq!(cfg.batch_policy, BatchPolicy::AbortOnFailure);
    }

    #[test]
    fn missing_email_is_rejected() {
        let err = TriageConfig::from_json(r#"{"password": "pw"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { key, .. } if key == "email"));
    }

    #[test]
    fn missing_password_is_rejected() {
        let err = TriageConfig::from_json(r#"{"email": "me@example.com"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { key, .. } if key == "password"));
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let err = TriageConfig::from_json(
            r#"{"email": "me@example.com", "password": "pw", "probabilityThreshold": 1.5}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "probabilityThreshold"));
    }

    #[test]
    fn zero_max_messages_is_rejected() {
        let err = TriageConfig::from_json(
            r#"{"email": "me@example.com", "password": "pw", "maxMessages": 0}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "maxMessages"));
    }

    #[test]
    fn lookback_out_of_range_is_rejected() {
        for days in ["0", "36501", "4000000000"] {
            let err = TriageConfig::from_json(&format!(
                r#"{{"email": "me@example.com", "password": "pw", "lookbackDays": {days}}}"#
            ))
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "lookbackDays"));
        }
    }

    #[test]
    fn longest_lookback_is_accepted() {
        let cfg = TriageConfig::from_json(
            r#"{"email": "me@example.com", "password": "pw", "lookbackDays": 36500}"#,
        )
        .unwrap();
        assert_eq!(cfg.lookback_days, MAX_LOOKBACK_DAYS);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(
            TriageConfig::from_json("{not json"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let cfg = TriageConfig::from_json_with(
            r#"{"email": "me@example.com"}"#,
            |key| match key {
                "TRIAGE_PASSWORD" => Some("from-env".into()),
                "TRIAGE_MOBILE_EMAIL" => Some("pager@example.com".into()),
                _ => None,
            },
        )
        .unwrap();
        assert_eq!(cfg.password.expose_secret(), "from-env");
        assert_eq!(cfg.mobile_email, "pager@example.com");
    }

    #[test]
    fn partial_rules_keep_defaults() {
        let cfg = TriageConfig::from_json(
            r#"{"email": "me@example.com", "password": "pw", "rules": {"high": ["Board Meeting"]}}"#,
        )
        .unwrap();
        let expected = OverrideRules::new(
            KeywordList::new(["board meeting"]),
            KeywordList::default_low_domain(),
            KeywordList::default_low(),
        );
        assert_eq!(cfg.rules, expected);
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let cfg = TriageConfig::from_json(r#"{"email": "me@example.com", "password": "hunter2"}"#).unwrap();
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"email": "file@example.com", "password": "pw"}}"#).unwrap();
        let cfg = TriageConfig::load(file.path()).unwrap();
        assert!(!cfg.email.is_empty());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        assert!(matches!(
            TriageConfig::load(Path::new("/nonexistent/config.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
