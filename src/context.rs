//! Run context — the read-only capabilities a triage run is built from.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::{DEFAULT_PROBABILITY_THRESHOLD, TriageConfig};
use crate::model::StatisticalClassifier;
use crate::pipeline::rules::OverrideRules;

/// Everything the decision engine needs, fixed for the whole run.
///
/// The classifier is loaded once before the batch starts and shared
/// read-only; it is never reloaded mid-batch.
#[derive(Clone)]
pub struct TriageContext {
    /// Unique run ID, attached to log lines.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    pub classifier: Arc<dyn StatisticalClassifier>,
    pub rules: OverrideRules,
    pub probability_threshold: f64,
}

impl TriageContext {
    /// Context with the built-in rules and default threshold.
    pub fn new(classifier: Arc<dyn StatisticalClassifier>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            classifier,
            rules: OverrideRules::default_rules(),
            probability_threshold: DEFAULT_PROBABILITY_THRESHOLD,
        }
    }

    /// Context using the rules and threshold from a validated config.
    pub fn from_config(config: &TriageConfig, classifier: Arc<dyn StatisticalClassifier>) -> Self {
        Self {
            rules: config.rules.clone(),
            probability_threshold: config.probability_threshold,
            ..Self::new(classifier)
        }
    }

    pub fn with_rules(mut self, rules: OverrideRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.probability_threshold = threshold;
        self
    }
}

impl fmt::Debug for TriageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriageContext")
            .field("run_id", &self.run_id)
            .field("started_at", &self.started_at)
            .field("classifier", &self.classifier.name())
            .field("probability_threshold", &self.probability_threshold)
            .finish_non_exhaustive()
    }
}
