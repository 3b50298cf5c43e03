//! Classification write-back abstraction.

use crate::store::{FeatureLayerClient, StoreError};
use crate::types::Classification;
use async_trait::async_trait;
use tracing::info;

/// Trait abstracting where classifications are written.
///
/// A failed write is record-local: the caller logs it and moves on, and the
/// record stays unclassified in the store.
#[async_trait]
pub trait SubmissionSink: Send {
    /// Set one record's flag field to the given terminal classification.
    async fn write(
        &mut self,
        object_id: i64,
        classification: Classification,
    ) -> Result<(), StoreError>;

    /// Human-readable name for logging.
    fn sink_name(&self) -> &str;
}

// ============================================================================
// Feature layer sink
// ============================================================================

/// Writes flags back to the hosted feature layer, one `applyEdits` per
/// record so a rejection cannot take the rest of the batch with it.
pub struct LayerSink {
    client: FeatureLayerClient,
}

impl LayerSink {
    pub fn new(client: FeatureLayerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SubmissionSink for LayerSink {
    async fn write(
        &mut self,
        object_id: i64,
        classification: Classification,
    ) -> Result<(), StoreError> {
        self.client.update_flag(object_id, classification).await
    }

    fn sink_name(&self) -> &str {
        "feature-layer"
    }
}

// ============================================================================
// Null sink (dry runs)
// ============================================================================

/// Logs the would-be writes without touching the store. Backs `--dry-run`.
#[derive(Default)]
pub struct NullSink;

impl NullSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SubmissionSink for NullSink {
    async fn write(
        &mut self,
        object_id: i64,
        classification: Classification,
    ) -> Result<(), StoreError> {
        info!(object_id, flag = %classification, "Dry run, flag not written");
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "dry-run"
    }
}
