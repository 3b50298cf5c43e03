//! Core types shared across the triage pipeline.

use serde::{Deserialize, Serialize};

/// Wire value written to the flag field for emergencies.
pub const FLAG_EMERGENCY: &str = "EMERGENCY";

/// Wire value written to the flag field for non-emergencies.
pub const FLAG_OK: &str = "OK";

/// One citizen-submitted report read from the feature layer.
///
/// Carries only the attributes the pipeline needs: the store-assigned
/// identifier and the free-text note. Geometry is never requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Store-assigned object id, used for the write-back.
    pub object_id: i64,
    /// Free-text note. `None` when the field is absent or null in the store.
    pub note: Option<String>,
}

impl Submission {
    pub fn new(object_id: i64, note: impl Into<String>) -> Self {
        Self {
            object_id,
            note: Some(note.into()),
        }
    }

    /// The note text for classification. Absent and empty both normalize
    /// to the empty string, which every strategy treats as non-emergency.
    pub fn note_text(&self) -> &str {
        self.note.as_deref().unwrap_or("")
    }
}

/// Classification state of a submission's flag field.
///
/// Models the store's nullable string field as an explicit state machine:
/// records enter the pipeline `Unclassified` and leave it in exactly one of
/// the two terminal states. A set flag is never overwritten by a later run
/// because the query predicate only matches unset records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// Flag field is null or empty; the record is still pending triage.
    Unclassified,
    /// Text describes an emergency; flagged for immediate review.
    Emergency,
    /// Text reviewed, no emergency found.
    Ok,
}

impl Classification {
    /// Build a terminal classification from a classifier verdict.
    pub fn from_emergency(is_emergency: bool) -> Self {
        if is_emergency {
            Classification::Emergency
        } else {
            Classification::Ok
        }
    }

    /// Wire value for the flag field. `None` for `Unclassified`, which is
    /// never written back.
    pub fn flag_value(&self) -> Option<&'static str> {
        match self {
            Classification::Unclassified => None,
            Classification::Emergency => Some(FLAG_EMERGENCY),
            Classification::Ok => Some(FLAG_OK),
        }
    }

    /// Parse a stored flag value. Null and empty map to `Unclassified`.
    pub fn parse_flag(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Classification::Unclassified,
            Some(FLAG_EMERGENCY) => Classification::Emergency,
            _ => Classification::Ok,
        }
    }

    pub fn is_emergency(&self) -> bool {
        matches!(self, Classification::Emergency)
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Unclassified => write!(f, "unclassified"),
            Classification::Emergency => write!(f, "{}", FLAG_EMERGENCY),
            Classification::Ok => write!(f, "{}", FLAG_OK),
        }
    }
}

/// Counters accumulated over one pipeline run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunStats {
    /// Submissions yielded by the source.
    pub fetched: u64,
    /// Submissions that received a verdict from the classifier.
    pub classified: u64,
    /// Flags successfully written back to the store.
    pub written: u64,
    /// Emergencies among the written flags.
    pub flagged: u64,
    /// Records skipped because the classifier failed (left unclassified).
    pub classify_skipped: u64,
    /// Records whose flag write was rejected (left unclassified).
    pub write_failures: u64,
}

impl RunStats {
    /// One-line run summary printed on successful exit.
    pub fn summary_line(&self) -> String {
        format!("{} processed, {} flagged", self.written, self.flagged)
    }

    /// Records left unclassified for the next run.
    pub fn skipped(&self) -> u64 {
        self.classify_skipped + self.write_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_values_round_trip() {
        assert_eq!(
            Classification::parse_flag(Classification::Emergency.flag_value()),
            Classification::Emergency
        );
        assert_eq!(
            Classification::parse_flag(Classification::Ok.flag_value()),
            Classification::Ok
        );
        assert_eq!(
            Classification::parse_flag(None),
            Classification::Unclassified
        );
        assert_eq!(
            Classification::parse_flag(Some("")),
            Classification::Unclassified
        );
    }

    #[test]
    fn unclassified_has_no_wire_value() {
        assert_eq!(Classification::Unclassified.flag_value(), None);
    }

    #[test]
    fn verdict_maps_to_terminal_state() {
        assert_eq!(
            Classification::from_emergency(true),
            Classification::Emergency
        );
        assert_eq!(Classification::from_emergency(false), Classification::Ok);
        assert!(Classification::from_emergency(true).is_emergency());
    }

    #[test]
    fn missing_note_normalizes_to_empty() {
        let s = Submission {
            object_id: 7,
            note: None,
        };
        assert_eq!(s.note_text(), "");
    }

    #[test]
    fn summary_line_format() {
        let stats = RunStats {
            written: 2,
            flagged: 1,
            ..Default::default()
        };
        assert_eq!(stats.summary_line(), "2 processed, 1 flagged");
    }
}
