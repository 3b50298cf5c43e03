//! Pipeline Behavior Tests
//!
//! Exercises the full fetch → classify → write loop against an in-memory
//! store, asserting the batch semantics the triage run guarantees:
//! idempotence, per-record failure isolation, skip-on-classifier-failure,
//! and the terminal-state round trip.

use async_trait::async_trait;
use report_triage::classifier::{Classifier, ClassifyError, KeywordClassifier};
use report_triage::pipeline::{ProcessingLoop, SubmissionSink, VecSource};
use report_triage::store::StoreError;
use report_triage::types::{Classification, RunStats, Submission};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// In-memory store
// ============================================================================

/// Minimal stand-in for the feature layer: object id → (note, flag).
#[derive(Clone, Default)]
struct MemoryStore {
    records: Arc<Mutex<BTreeMap<i64, (Option<String>, Classification)>>>,
}

impl MemoryStore {
    fn with_notes(notes: &[(i64, &str)]) -> Self {
        let store = Self::default();
        {
            let mut records = store.records.lock().unwrap();
            for (id, note) in notes {
                records.insert(*id, (Some(note.to_string()), Classification::Unclassified));
            }
        }
        store
    }

    /// The unset-flag predicate, as the layer query would evaluate it.
    fn unclassified(&self) -> Vec<Submission> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, (_, flag))| *flag == Classification::Unclassified)
            .map(|(id, (note, _))| Submission {
                object_id: *id,
                note: note.clone(),
            })
            .collect()
    }

    fn flag_of(&self, object_id: i64) -> Classification {
        self.records.lock().unwrap()[&object_id].1
    }

    fn sink(&self) -> MemorySink {
        MemorySink {
            store: self.clone(),
            reject_ids: Vec::new(),
        }
    }

    fn sink_rejecting(&self, reject_ids: Vec<i64>) -> MemorySink {
        MemorySink {
            store: self.clone(),
            reject_ids,
        }
    }
}

struct MemorySink {
    store: MemoryStore,
    reject_ids: Vec<i64>,
}

#[async_trait]
impl SubmissionSink for MemorySink {
    async fn write(
        &mut self,
        object_id: i64,
        classification: Classification,
    ) -> Result<(), StoreError> {
        if self.reject_ids.contains(&object_id) {
            return Err(StoreError::Update {
                object_id,
                reason: "permission denied".into(),
            });
        }
        let mut records = self.store.records.lock().unwrap();
        let entry = records.get_mut(&object_id).ok_or(StoreError::Update {
            object_id,
            reason: "stale identifier".into(),
        })?;
        entry.1 = classification;
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Classifier stubs
// ============================================================================

/// Fails with a timeout whenever the text contains the trigger substring.
struct FlakyClassifier {
    inner: KeywordClassifier,
    timeout_on: String,
}

#[async_trait]
impl Classifier for FlakyClassifier {
    async fn classify(&self, text: &str) -> Result<bool, ClassifyError> {
        if text.contains(&self.timeout_on) {
            return Err(ClassifyError::Timeout(Duration::from_secs(20)));
        }
        self.inner.classify(text).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

fn keyword_classifier(terms: &[&str]) -> Box<dyn Classifier> {
    let terms: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
    Box::new(KeywordClassifier::new(&terms))
}

/// Run one full pipeline pass over everything the store still reports as
/// unclassified.
async fn run_once(
    store: &MemoryStore,
    classifier: Box<dyn Classifier>,
    sink: &mut MemorySink,
) -> RunStats {
    let mut source = VecSource::new(store.unclassified());
    ProcessingLoop::new(classifier)
        .run(&mut source, sink)
        .await
        .unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn end_to_end_flags_flood_and_clears_thanks() {
    let store = MemoryStore::with_notes(&[
        (1, "flood rising fast, need rescue"),
        (2, "thanks for the update"),
    ]);

    let stats = run_once(
        &store,
        keyword_classifier(&["flood", "rescue"]),
        &mut store.sink(),
    )
    .await;

    assert_eq!(store.flag_of(1), Classification::Emergency);
    assert_eq!(store.flag_of(2), Classification::Ok);
    assert_eq!(stats.written, 2);
    assert_eq!(stats.flagged, 1);
    assert_eq!(stats.summary_line(), "2 processed, 1 flagged");
}

#[tokio::test]
async fn second_run_processes_zero_records() {
    let store = MemoryStore::with_notes(&[(1, "house on fire"), (2, "all good here")]);

    let first = run_once(&store, keyword_classifier(&["fire"]), &mut store.sink()).await;
    assert_eq!(first.written, 2);

    // No external writes in between: every flag is now set.
    let second = run_once(&store, keyword_classifier(&["fire"]), &mut store.sink()).await;
    assert_eq!(second.fetched, 0);
    assert_eq!(second.written, 0);
}

#[tokio::test]
async fn rejected_write_does_not_abort_the_batch() {
    let store = MemoryStore::with_notes(&[
        (1, "trapped under debris"),
        (2, "need drinking water"),
        (3, "fire spreading"),
    ]);

    let stats = run_once(
        &store,
        keyword_classifier(&["trapped", "fire"]),
        &mut store.sink_rejecting(vec![2]),
    )
    .await;

    assert_eq!(store.flag_of(1), Classification::Emergency);
    assert_eq!(store.flag_of(2), Classification::Unclassified);
    assert_eq!(store.flag_of(3), Classification::Emergency);
    assert_eq!(stats.written, 2);
    assert_eq!(stats.write_failures, 1);

    // The failed record is still in the work queue for the next run.
    let remaining = store.unclassified();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].object_id, 2);
}

#[tokio::test]
async fn classifier_timeout_skips_record_and_continues() {
    let store = MemoryStore::with_notes(&[
        (1, "fire in the kitchen"),
        (2, "AMBIGUOUS report text"),
        (3, "power is back on"),
    ]);

    let classifier = Box::new(FlakyClassifier {
        inner: KeywordClassifier::new(&["fire".to_string()]),
        timeout_on: "AMBIGUOUS".to_string(),
    });
    let stats = run_once(&store, classifier, &mut store.sink()).await;

    // The timed-out record is never defaulted to OK.
    assert_eq!(store.flag_of(2), Classification::Unclassified);
    assert_eq!(store.flag_of(1), Classification::Emergency);
    assert_eq!(store.flag_of(3), Classification::Ok);
    assert_eq!(stats.classify_skipped, 1);
    assert_eq!(stats.written, 2);
}

#[tokio::test]
async fn processed_records_end_in_a_terminal_state() {
    let store = MemoryStore::with_notes(&[
        (1, "help, injured hiker"),
        (2, ""),
        (3, "road closure notice"),
    ]);

    run_once(&store, keyword_classifier(&["help", "injured"]), &mut store.sink()).await;

    for submission in [1, 2, 3] {
        let flag = store.flag_of(submission);
        assert!(
            flag == Classification::Emergency || flag == Classification::Ok,
            "record {submission} left in non-terminal state {flag:?}"
        );
    }
    assert!(store.unclassified().is_empty());
}

#[tokio::test]
async fn missing_note_classifies_as_ok() {
    let store = MemoryStore::default();
    store
        .records
        .lock()
        .unwrap()
        .insert(9, (None, Classification::Unclassified));

    let stats = run_once(&store, keyword_classifier(&["fire"]), &mut store.sink()).await;

    assert_eq!(store.flag_of(9), Classification::Ok);
    assert_eq!(stats.flagged, 0);
}

#[tokio::test]
async fn stale_identifier_is_reported_not_fatal() {
    let store = MemoryStore::with_notes(&[(1, "fire")]);

    // A second source yielding an id the store no longer knows.
    let mut source = VecSource::new(vec![
        Submission::new(1, "fire"),
        Submission::new(99, "also on fire"),
    ]);
    let stats = ProcessingLoop::new(keyword_classifier(&["fire"]))
        .run(&mut source, &mut store.sink())
        .await
        .unwrap();

    assert_eq!(stats.written, 1);
    assert_eq!(stats.write_failures, 1);
    assert_eq!(store.flag_of(1), Classification::Emergency);
}
