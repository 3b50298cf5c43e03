//! Triage pipeline.
//!
//! ```text
//! FETCHING    query unclassified submissions (one eager paginated fetch)
//! CLASSIFYING keyword / remote / staged verdict per record
//! WRITING     flag write-back per record
//! DONE        source exhausted, summary logged
//! ```
//!
//! One record at a time, one task. Fatal errors (connection, query) abort
//! the run; classify and update failures skip the record, which stays
//! unclassified and is retried on the next run.

pub mod processing_loop;
pub mod sink;
pub mod source;

pub use processing_loop::ProcessingLoop;
pub use sink::{LayerSink, NullSink, SubmissionSink};
pub use source::{LayerSource, SourceEvent, SubmissionSource, VecSource};
