//! Keyword strategy: fast, free, deterministic.

use super::{Classifier, ClassifyError};
use async_trait::async_trait;

/// Case-insensitive substring match against a fixed alarm-term set.
pub struct KeywordClassifier {
    /// Terms lowercased once at construction.
    terms: Vec<String>,
}

impl KeywordClassifier {
    /// Build from the configured term set. Blank terms are dropped.
    pub fn new(terms: &[String]) -> Self {
        Self {
            terms: terms
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Synchronous core of the strategy, shared with the staged classifier.
    pub fn matches(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.terms.iter().any(|term| lowered.contains(term))
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<bool, ClassifyError> {
        Ok(self.matches(text))
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeywordConfig;

    fn default_classifier() -> KeywordClassifier {
        KeywordClassifier::new(&KeywordConfig::default().terms)
    }

    #[tokio::test]
    async fn alarm_term_substring_flags_emergency() {
        let c = default_classifier();
        assert!(c.classify("Building on fire, people trapped").await.unwrap());
        assert!(c.classify("URGENT: send an ambulance").await.unwrap());
    }

    #[tokio::test]
    async fn match_is_case_insensitive() {
        let c = default_classifier();
        assert!(c.matches("FIRE on the second floor"));
        assert!(c.matches("my father is Unconscious"));
    }

    #[tokio::test]
    async fn no_term_means_no_emergency() {
        let c = default_classifier();
        assert!(!c.classify("Routine supply request").await.unwrap());
        assert!(!c.classify("When will the power be back on?").await.unwrap());
    }

    #[tokio::test]
    async fn empty_and_whitespace_are_non_emergency() {
        let c = default_classifier();
        assert!(!c.classify("").await.unwrap());
        assert!(!c.classify("   ").await.unwrap());
    }

    #[test]
    fn configured_terms_replace_defaults() {
        let c = KeywordClassifier::new(&["flood".to_string(), "rescue".to_string()]);
        assert!(c.matches("flood rising fast, need rescue"));
        assert!(!c.matches("there is a fire")); // "fire" not in this term set
    }

    #[test]
    fn blank_terms_are_ignored() {
        let c = KeywordClassifier::new(&["  ".to_string(), "flood".to_string()]);
        assert!(!c.matches("anything at all"));
        assert!(c.matches("street flooded")); // "flood" is a substring
    }
}
