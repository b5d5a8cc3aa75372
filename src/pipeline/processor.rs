//! Priority decision engine — override rules first, classifier second.
//!
//! Flow per message:
//! 1. Build the combined text (subject + sender + body)
//! 2. Override rules (fast, deterministic) → may short-circuit
//! 3. Statistical classifier → top label and probability
//! 4. Confidence threshold → below it the label is forced to `Others`

use tracing::debug;

use crate::context::TriageContext;
use crate::error::ClassifierError;
use crate::pipeline::normalize::combined_text;
use crate::pipeline::types::{ClassificationResult, Message, PriorityLabel};

/// Decision engine. Holds only read-only state, so classifying the same
/// message twice yields the same result.
#[derive(Debug, Clone)]
pub struct PriorityEngine {
    context: TriageContext,
}

impl PriorityEngine {
    pub fn new(context: TriageContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &TriageContext {
        &self.context
    }

    pub fn threshold(&self) -> f64 {
        self.context.probability_threshold
    }

    /// Classify one message.
    ///
    /// Classifier failures are returned to the caller; the batch driver
    /// decides whether to skip the message or abort.
    pub fn classify(&self, message: &Message) -> Result<ClassificationResult, ClassifierError> {
        let text = combined_text(&message.subject, &message.sender, &message.body);

        if let Some(matched) = self.context.rules.apply(&text, &message.sender) {
            debug!(
                id = %message.id,
                label = %matched.label,
                "Override rule matched, skipping classifier"
            );
            return Ok(ClassificationResult {
                label: matched.label,
                confidence: 1.0,
                reason_code: format!("override:{}", matched.reason()),
            });
        }

        let distribution = self.context.classifier.predict_distribution(&text)?;
        let (top_label, top_prob) = distribution
            .top()
            .ok_or(ClassifierError::EmptyDistribution)?;

        let result = if top_prob < self.threshold() {
            ClassificationResult {
                label: PriorityLabel::Others,
                confidence: top_prob,
                reason_code: format!("low_confidence:{top_prob:.2}"),
            }
        } else {
            ClassificationResult {
                label: top_label,
                confidence: top_prob,
                reason_code: format!("model:{top_label}:{top_prob:.2}"),
            }
        };

        debug!(
            id = %message.id,
            classifier = self.context.classifier.name(),
            label = %result.label,
            confidence = result.confidence,
            "Classified by model"
        );
        Ok(result)
    }
}
