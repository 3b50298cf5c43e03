//! Hosted feature layer access.
//!
//! [`FeatureLayerClient`] wraps the feature service REST surface: token
//! generation, layer metadata, paginated queries, and per-record flag
//! updates. Errors are split by propagation policy — `Connection` and
//! `Query` abort a run, `Update` skips one record.

mod feature_layer;

pub use feature_layer::{FeatureLayerClient, LayerField};

/// Feature store errors.
///
/// `Connection` and `Query` are fatal: the run cannot make progress without
/// a reachable, queryable layer. `Update` is record-local: one rejected
/// write must not abort the batch.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store unreachable or credentials rejected. Fatal.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// Query rejected or a referenced field is absent. Fatal.
    #[error("query failed: {0}")]
    Query(String),

    /// The store rejected one record's flag write. Record-local.
    #[error("update rejected for object {object_id}: {reason}")]
    Update { object_id: i64, reason: String },
}
