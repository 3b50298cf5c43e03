//! Unified submission processing loop.
//!
//! Runs the fetch → classify → write sequence for every record the source
//! yields, with per-record failure isolation: a classifier or writer
//! failure logs the object id and reason, leaves that record unclassified,
//! and moves on. Only source errors abort the run.

use crate::classifier::Classifier;
use crate::types::{Classification, RunStats};
use tracing::{info, warn};

use super::sink::SubmissionSink;
use super::source::{SourceEvent, SubmissionSource};
use crate::store::StoreError;

/// How often a progress line is logged while records stream through.
const PROGRESS_INTERVAL: u64 = 10;

/// Owns the classifier and statistics for one pipeline run.
///
/// Built with [`new()`](ProcessingLoop::new), then consumed by
/// [`run()`](ProcessingLoop::run).
pub struct ProcessingLoop {
    classifier: Box<dyn Classifier>,
}

impl ProcessingLoop {
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self { classifier }
    }

    /// Run until the source is exhausted. Returns run statistics.
    ///
    /// Errors only on fatal source failures; classify and write failures
    /// are absorbed into the statistics.
    pub async fn run<S, K>(self, source: &mut S, sink: &mut K) -> Result<RunStats, StoreError>
    where
        S: SubmissionSource + ?Sized,
        K: SubmissionSink + ?Sized,
    {
        let mut stats = RunStats::default();
        let started = chrono::Utc::now();

        info!(
            strategy = self.classifier.name(),
            source = source.source_name(),
            sink = sink.sink_name(),
            "Processing submissions"
        );

        loop {
            let submission = match source.next_submission().await? {
                SourceEvent::Submission(s) => s,
                SourceEvent::Eof => {
                    info!(
                        "Source exhausted ({} submissions fetched)",
                        stats.fetched
                    );
                    break;
                }
            };

            stats.fetched += 1;
            let object_id = submission.object_id;

            let is_emergency = match self.classifier.classify(submission.note_text()).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    stats.classify_skipped += 1;
                    warn!(
                        object_id,
                        reason = %e,
                        "Classification unavailable, leaving record unclassified for next run"
                    );
                    continue;
                }
            };
            stats.classified += 1;

            let classification = Classification::from_emergency(is_emergency);
            if is_emergency {
                info!(object_id, "Emergency detected");
            }

            match sink.write(object_id, classification).await {
                Ok(()) => {
                    stats.written += 1;
                    if classification.is_emergency() {
                        stats.flagged += 1;
                    }
                }
                Err(e) => {
                    stats.write_failures += 1;
                    warn!(
                        object_id,
                        reason = %e,
                        "Flag write rejected, record stays unclassified"
                    );
                }
            }

            if stats.fetched % PROGRESS_INTERVAL == 0 {
                info!(
                    "Progress: {} fetched | {} written | {} flagged | {} skipped",
                    stats.fetched,
                    stats.written,
                    stats.flagged,
                    stats.skipped()
                );
            }
        }

        let elapsed = chrono::Utc::now() - started;
        log_final_stats(&stats, elapsed.num_milliseconds());

        Ok(stats)
    }
}

/// Log the end-of-run statistics block.
fn log_final_stats(stats: &RunStats, elapsed_ms: i64) {
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("FINAL STATISTICS");
    info!("   Fetched:            {}", stats.fetched);
    info!("   Classified:         {}", stats.classified);
    info!("   Flags Written:      {}", stats.written);
    info!("   Emergencies:        {}", stats.flagged);
    info!("   Classify Skipped:   {}", stats.classify_skipped);
    info!("   Write Failures:     {}", stats.write_failures);
    info!("   Elapsed:            {}ms", elapsed_ms);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
