//! Statistical fallback classifier.
//!
//! The decision engine only depends on the [`StatisticalClassifier`] trait.
//! [`NaiveBayesModel`] is the shipped implementation: an exported
//! TF-IDF + multinomial naive Bayes pipeline loaded from JSON.

pub mod naive_bayes;

pub use naive_bayes::NaiveBayesModel;

use std::path::Path;
use std::sync::Arc;

use crate::error::ClassifierError;
use crate::pipeline::types::PriorityLabel;

/// Probability distribution over priority labels, in model class order.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution(Vec<(PriorityLabel, f64)>);

impl Distribution {
    pub fn new(entries: Vec<(PriorityLabel, f64)>) -> Self {
        Self(entries)
    }

    /// Highest-probability label. The earliest entry wins ties.
    pub fn top(&self) -> Option<(PriorityLabel, f64)> {
        let mut best: Option<(PriorityLabel, f64)> = None;
        for &(label, p) in &self.0 {
            match best {
                Some((_, best_p)) if p <= best_p => {}
                _ => best = Some((label, p)),
            }
        }
        best
    }

    pub fn probability(&self, label: PriorityLabel) -> Option<f64> {
        self.0.iter().find(|(l, _)| *l == label).map(|(_, p)| *p)
    }

    pub fn entries(&self) -> &[(PriorityLabel, f64)] {
        &self.0
    }
}

/// Black-box text classifier consumed by the decision engine.
///
/// Implementations are loaded once and must be read-only afterwards.
pub trait StatisticalClassifier: Send + Sync {
    /// Classifier name for logging.
    fn name(&self) -> &str;

    /// Probability of each known label for `text`; sums to ~1.0.
    fn predict_distribution(&self, text: &str) -> Result<Distribution, ClassifierError>;
}

/// Load the shipped model from a JSON file.
pub fn load_classifier(path: &Path) -> Result<Arc<dyn StatisticalClassifier>, ClassifierError> {
    let model = NaiveBayesModel::from_path(path)?;
    tracing::info!(
        path = %path.display(),
        classes = model.classes().len(),
        features = model.feature_count(),
        "Loaded classifier model"
    );
    Ok(Arc::new(model))
}
