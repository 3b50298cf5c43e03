//! Submission text classification.
//!
//! One capability, `classify(text) -> bool`, behind three interchangeable
//! strategies selected by configuration:
//!
//! - [`KeywordClassifier`] — case-insensitive substring match, free and
//!   deterministic;
//! - [`RemoteModelClassifier`] — remote language-model verdict with a
//!   bounded timeout;
//! - [`StagedClassifier`] — keyword first, remote escalation on miss.
//!
//! Classifier failures are record-local by contract: the pipeline leaves
//! the record unclassified so the next run retries it. A failure is never
//! silently turned into an `OK` verdict.

mod keyword;
mod remote;
mod staged;

pub use keyword::KeywordClassifier;
pub use remote::RemoteModelClassifier;
pub use staged::StagedClassifier;

use crate::config::{ClassifierConfig, Strategy};
use async_trait::async_trait;
use std::time::Duration;

/// Classification service errors. All record-local: skip and continue.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classification service timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classification service returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("unparseable verdict from classification service: {0:?}")]
    Verdict(String),

    #[error("credential environment variable '{0}' is not set")]
    MissingCredential(String),
}

/// Maps submission text to an emergency verdict.
///
/// Implementations must treat empty text as non-emergency and must not
/// guess on failure: an error here keeps the record unclassified.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// `true` when the text describes an emergency.
    async fn classify(&self, text: &str) -> Result<bool, ClassifyError>;

    /// Strategy name for logging (e.g. "keyword", "remote", "staged").
    fn name(&self) -> &str;
}

/// Resolve the configured strategy into a classifier instance.
///
/// Fails fast at startup when the remote strategy is selected but its
/// credential variable is unset.
pub fn build(config: &ClassifierConfig) -> Result<Box<dyn Classifier>, ClassifyError> {
    match config.strategy {
        Strategy::Keyword => Ok(Box::new(KeywordClassifier::new(&config.keyword.terms))),
        Strategy::Remote => Ok(Box::new(RemoteModelClassifier::new(&config.remote)?)),
        Strategy::Staged => {
            let keyword = KeywordClassifier::new(&config.keyword.terms);
            let remote = RemoteModelClassifier::new(&config.remote)?;
            Ok(Box::new(StagedClassifier::new(keyword, Box::new(remote))))
        }
    }
}
