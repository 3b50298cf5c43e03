//! Submission source abstraction.
//!
//! One trait for wherever unclassified submissions come from: the hosted
//! feature layer in production, an in-memory vector in tests and dry runs.
//! The processing loop only ever calls [`next_submission`].
//!
//! [`next_submission`]: SubmissionSource::next_submission

use crate::store::{FeatureLayerClient, StoreError};
use crate::types::Submission;
use async_trait::async_trait;
use tracing::info;

/// Events produced by a submission source.
pub enum SourceEvent {
    /// An unclassified submission to triage.
    Submission(Submission),
    /// Source exhausted; the run is complete.
    Eof,
}

/// Trait abstracting where submissions come from.
///
/// The sequence is finite and non-restartable: after `Eof` the source
/// yields nothing further.
#[async_trait]
pub trait SubmissionSource: Send {
    /// Yield the next submission, or `Eof` when the sequence is exhausted.
    ///
    /// Errors are fatal: the source cannot make further progress.
    async fn next_submission(&mut self) -> Result<SourceEvent, StoreError>;

    /// Human-readable name for logging (e.g. "feature-layer", "memory").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Feature layer source
// ============================================================================

/// Yields submissions fetched from the hosted feature layer.
///
/// The query is drained eagerly at construction, then records are yielded
/// from memory. Flag writes made while iterating would otherwise shift the
/// store's result offsets under the unset-flag predicate.
pub struct LayerSource {
    submissions: std::vec::IntoIter<Submission>,
}

impl LayerSource {
    /// Query every unclassified submission, up to `limit` when given.
    pub async fn fetch(
        client: &FeatureLayerClient,
        limit: Option<u64>,
    ) -> Result<Self, StoreError> {
        let submissions = client.query_unclassified(limit).await?;
        info!(
            count = submissions.len(),
            layer = %client.layer_url(),
            "Fetched unclassified submissions"
        );
        Ok(Self {
            submissions: submissions.into_iter(),
        })
    }

    /// Submissions remaining to be yielded.
    pub fn remaining(&self) -> usize {
        self.submissions.len()
    }
}

#[async_trait]
impl SubmissionSource for LayerSource {
    async fn next_submission(&mut self) -> Result<SourceEvent, StoreError> {
        match self.submissions.next() {
            Some(s) => Ok(SourceEvent::Submission(s)),
            None => Ok(SourceEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "feature-layer"
    }
}

// ============================================================================
// In-memory source
// ============================================================================

/// Yields a pre-built list of submissions. Used by tests and fixtures.
pub struct VecSource {
    submissions: std::vec::IntoIter<Submission>,
}

impl VecSource {
    pub fn new(submissions: Vec<Submission>) -> Self {
        Self {
            submissions: submissions.into_iter(),
        }
    }
}

#[async_trait]
impl SubmissionSource for VecSource {
    async fn next_submission(&mut self) -> Result<SourceEvent, StoreError> {
        match self.submissions.next() {
            Some(s) => Ok(SourceEvent::Submission(s)),
            None => Ok(SourceEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vec_source_yields_in_order_then_eof() {
        let mut source = VecSource::new(vec![
            Submission::new(1, "first"),
            Submission::new(2, "second"),
        ]);

        match source.next_submission().await.unwrap() {
            SourceEvent::Submission(s) => assert_eq!(s.object_id, 1),
            SourceEvent::Eof => panic!("expected a submission"),
        }
        match source.next_submission().await.unwrap() {
            SourceEvent::Submission(s) => assert_eq!(s.object_id, 2),
            SourceEvent::Eof => panic!("expected a submission"),
        }
        assert!(matches!(
            source.next_submission().await.unwrap(),
            SourceEvent::Eof
        ));
        // Non-restartable: still EOF afterwards.
        assert!(matches!(
            source.next_submission().await.unwrap(),
            SourceEvent::Eof
        ));
    }
}
