//! TF-IDF + multinomial naive Bayes inference over an exported model.
//!
//! The model file is JSON:
//!
//! ```json
//! {
//!   "classes": ["High", "Low", "Medium", "Others"],
//!   "vocabulary": {"submit": 0, "due today": 1},
//!   "idf": [1.69, 2.09],
//!   "class_log_prior": [-1.2, -1.4, -1.7, -1.4],
//!   "feature_log_prob": [[-3.1, -3.3], [-4.0, -4.2], [-4.1, -4.1], [-4.0, -4.0]],
//!   "ngram_range": [1, 2],
//!   "stop_words": ["the", "and"],
//!   "sublinear_tf": false
//! }
//! ```
//!
//! Training happens elsewhere; this module only scores text.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{Distribution, StatisticalClassifier};
use crate::error::ClassifierError;
use crate::pipeline::types::PriorityLabel;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w\w+\b").unwrap());

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

/// On-disk model layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub classes: Vec<String>,
    pub vocabulary: HashMap<String, usize>,
    pub idf: Vec<f64>,
    pub class_log_prior: Vec<f64>,
    pub feature_log_prob: Vec<Vec<f64>>,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default)]
    pub stop_words: Vec<String>,
    #[serde(default)]
    pub sublinear_tf: bool,
}

/// Loaded, validated naive Bayes model. Immutable after load.
#[derive(Debug, Clone)]
pub struct NaiveBayesModel {
    classes: Vec<PriorityLabel>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    class_log_prior: Vec<f64>,
    feature_log_prob: Vec<Vec<f64>>,
    ngram_range: (usize, usize),
    stop_words: HashSet<String>,
    sublinear_tf: bool,
}

impl NaiveBayesModel {
    /// Read and validate a model file.
    pub fn from_path(path: &Path) -> Result<Self, ClassifierError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ClassifierError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            ClassifierError::InvalidModel(reason) => ClassifierError::LoadFailed {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a model from its JSON text.
    pub fn from_json(raw: &str) -> Result<Self, ClassifierError> {
        let file: ModelFile =
            serde_json::from_str(raw).map_err(|e| ClassifierError::InvalidModel(e.to_string()))?;
        Self::from_model_file(file)
    }

    pub fn from_model_file(file: ModelFile) -> Result<Self, ClassifierError> {
        if file.classes.is_empty() {
            return Err(ClassifierError::InvalidModel("no classes".into()));
        }
        let classes = file
            .classes
            .iter()
            .map(|c| c.parse::<PriorityLabel>())
            .collect::<Result<Vec<_>, _>>()?;

        let n_classes = classes.len();
        let n_features = file.idf.len();

        if file.class_log_prior.len() != n_classes {
            return Err(ClassifierError::InvalidModel(format!(
                "class_log_prior has {} entries, expected {n_classes}",
                file.class_log_prior.len()
            )));
        }
        if file.feature_log_prob.len() != n_classes {
            return Err(ClassifierError::InvalidModel(format!(
                "feature_log_prob has {} rows, expected {n_classes}",
                file.feature_log_prob.len()
            )));
        }
        if let Some(row) = file.feature_log_prob.iter().find(|r| r.len() != n_features) {
            return Err(ClassifierError::InvalidModel(format!(
                "feature_log_prob row has {} columns, expected {n_features}",
                row.len()
            )));
        }
        if let Some((term, idx)) = file.vocabulary.iter().find(|(_, idx)| **idx >= n_features) {
            return Err(ClassifierError::InvalidModel(format!(
                "vocabulary term {term:?} maps to column {idx}, only {n_features} features"
            )));
        }
        let (min_n, max_n) = file.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(ClassifierError::InvalidModel(format!(
                "invalid ngram_range ({min_n}, {max_n})"
            )));
        }

        Ok(Self {
            classes,
            vocabulary: file.vocabulary,
            idf: file.idf,
            class_log_prior: file.class_log_prior,
            feature_log_prob: file.feature_log_prob,
            ngram_range: file.ngram_range,
            stop_words: file.stop_words.into_iter().map(|w| w.to_lowercase()).collect(),
            sublinear_tf: file.sublinear_tf,
        })
    }

    pub fn classes(&self) -> &[PriorityLabel] {
        &self.classes
    }

    pub fn feature_count(&self) -> usize {
        self.idf.len()
    }

    /// Lower-cased word tokens with stop words removed, expanded to n-grams.
    fn analyze(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = TOKEN_RE
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|t| !self.stop_words.contains(*t))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut grams = Vec::new();
        for n in min_n..=max_n {
            if n > tokens.len() {
                break;
            }
            grams.extend(tokens.windows(n).map(|w| w.join(" ")));
        }
        grams
    }

    /// l2-normalised tf-idf vector as sparse (column, weight) pairs.
    fn features(&self, text: &str) -> BTreeMap<usize, f64> {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for gram in self.analyze(text) {
            if let Some(&idx) = self.vocabulary.get(&gram) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        for (idx, value) in counts.iter_mut() {
            let tf = if self.sublinear_tf { 1.0 + value.ln() } else { *value };
            *value = tf * self.idf[*idx];
        }

        let norm = counts.values().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in counts.values_mut() {
                *value /= norm;
            }
        }
        counts
    }
}

impl StatisticalClassifier for NaiveBayesModel {
    fn name(&self) -> &str {
        "naive-bayes"
    }

    fn predict_distribution(&self, text: &str) -> Result<Distribution, ClassifierError> {
        let features = self.features(text);

        let joint: Vec<f64> = self
            .class_log_prior
            .iter()
            .zip(&self.feature_log_prob)
            .map(|(prior, row)| prior + features.iter().map(|(idx, x)| x * row[*idx]).sum::<f64>())
            .collect();

        let max = joint.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(ClassifierError::PredictionFailed(
                "non-finite joint log likelihood".into(),
            ));
        }
        let exps: Vec<f64> = joint.iter().map(|j| (j - max).exp()).collect();
        let total: f64 = exps.iter().sum();

        Ok(Distribution::new(
            self.classes
                .iter()
                .zip(exps)
                .map(|(label, e)| (*label, e / total))
                .collect(),
        ))
    }
}
