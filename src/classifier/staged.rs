//! Staged strategy: keyword pass first, remote escalation on miss.
//!
//! Mirrors the cost-saving two-stage analysis of the original deployment:
//! obvious emergencies are flagged by the free keyword scan, everything
//! else gets the more nuanced remote verdict.

use super::{Classifier, ClassifyError, KeywordClassifier};
use async_trait::async_trait;
use tracing::debug;

/// Keyword pre-filter in front of an escalation classifier.
pub struct StagedClassifier {
    keyword: KeywordClassifier,
    escalation: Box<dyn Classifier>,
}

impl StagedClassifier {
    pub fn new(keyword: KeywordClassifier, escalation: Box<dyn Classifier>) -> Self {
        Self { keyword, escalation }
    }
}

#[async_trait]
impl Classifier for StagedClassifier {
    async fn classify(&self, text: &str) -> Result<bool, ClassifyError> {
        if self.keyword.matches(text) {
            debug!("Alarm term matched, skipping escalation");
            return Ok(true);
        }
        self.escalation.classify(text).await
    }

    fn name(&self) -> &str {
        "staged"
    }
}
