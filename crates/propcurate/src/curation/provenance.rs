//! Provenance trail entries recorded for every applied stage.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConversionJoinError, MalformedRecordError};
use crate::model::PropertyRecord;

use super::stage::{StageConfig, StageKind};

/// Why a record was removed by a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    /// The record failed a filter or selection criterion.
    Rejected { detail: String },

    /// Another record of the same duplicate group was retained.
    Duplicate { retained: String },

    /// The record was consumed to derive another record.
    Consumed { into: String },

    /// The record could not be converted and unconverted records are dropped.
    Unconverted,

    /// A converter could not find a counterpart the record requires.
    MissingCounterpart { error: ConversionJoinError },

    /// The record violates the stage's structural assumptions.
    Malformed { error: MalformedRecordError },
}

impl DropReason {
    /// Whether this drop stems from a per-record error rather than a
    /// criterion.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            DropReason::MissingCounterpart { .. } | DropReason::Malformed { .. }
        )
    }

    /// Short human-readable description.
    pub fn description(&self) -> String {
        match self {
            DropReason::Rejected { detail } => format!("Rejected: {}", detail),
            DropReason::Duplicate { retained } => format!("Duplicate of '{}'", retained),
            DropReason::Consumed { into } => format!("Consumed into '{}'", into),
            DropReason::Unconverted => "Not convertible".to_string(),
            DropReason::MissingCounterpart { error } => error.to_string(),
            DropReason::Malformed { error } => error.to_string(),
        }
    }
}

/// A record removed by a stage, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedRecord {
    /// Source identifier of the removed record.
    pub source_id: String,

    /// Reason for the removal.
    #[serde(flatten)]
    pub reason: DropReason,
}

/// One entry of a data set's provenance trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEntry {
    /// Name of the applied stage.
    pub stage: String,

    /// Kind of the applied stage.
    pub kind: StageKind,

    /// Configuration the stage was applied with.
    pub config: StageConfig,

    /// Number of records before the stage.
    pub count_before: usize,

    /// Number of records after the stage.
    pub count_after: usize,

    /// Number of input records not present in the output.
    pub removed: usize,

    /// Number of output records not present in the input.
    pub added: usize,

    /// Every removed record with its reason.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedRecord>,

    /// When the stage was applied.
    pub applied_at: DateTime<Utc>,
}

impl StageEntry {
    /// Build the entry describing the transition from `input` to `output`.
    pub fn new(
        config: &StageConfig,
        input: &[PropertyRecord],
        output: &[PropertyRecord],
        dropped: Vec<DroppedRecord>,
    ) -> Self {
        // Multiset difference, so records sharing an identifier still count.
        let mut balance: HashMap<&str, isize> = HashMap::new();
        for record in input {
            *balance.entry(record.source_id.as_str()).or_default() += 1;
        }
        for record in output {
            *balance.entry(record.source_id.as_str()).or_default() -= 1;
        }

        let removed = balance.values().filter(|n| **n > 0).sum::<isize>().unsigned_abs();
        let added = balance.values().filter(|n| **n < 0).sum::<isize>().unsigned_abs();

        let stage = config.stage();

        Self {
            stage: stage.name().to_string(),
            kind: stage.kind(),
            config: config.clone(),
            count_before: input.len(),
            count_after: output.len(),
            removed,
            added,
            dropped,
            applied_at: Utc::now(),
        }
    }

    /// Drops caused by per-record errors.
    pub fn issues(&self) -> impl Iterator<Item = &DroppedRecord> {
        self.dropped.iter().filter(|d| d.reason.is_error())
    }

    /// Join failures recorded by a converter.
    pub fn join_errors(&self) -> Vec<&ConversionJoinError> {
        self.dropped
            .iter()
            .filter_map(|d| match &d.reason {
                DropReason::MissingCounterpart { error } => Some(error),
                _ => None,
            })
            .collect()
    }

    /// Malformed records that were skipped.
    pub fn malformed(&self) -> Vec<&MalformedRecordError> {
        self.dropped
            .iter()
            .filter_map(|d| match &d.reason {
                DropReason::Malformed { error } => Some(error),
                _ => None,
            })
            .collect()
    }

    /// Reason a record was dropped by this stage, if it was.
    pub fn drop_reason(&self, source_id: &str) -> Option<&DropReason> {
        self.dropped
            .iter()
            .find(|d| d.source_id == source_id)
            .map(|d| &d.reason)
    }

    /// Human-readable one line summary.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} → {} records ({} removed, {} added)",
            self.stage, self.count_before, self.count_after, self.removed, self.added
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curation::filters::FilterByNComponents;
    use crate::model::{PropertyType, Substance, ThermodynamicState};

    fn record(id: &str) -> PropertyRecord {
        PropertyRecord::new(
            Substance::pure("O").unwrap(),
            ThermodynamicState::new(298.15, 101.325),
            PropertyType::Density,
            0.997,
        )
        .with_source_id(id)
    }

    #[test]
    fn test_entry_counts() {
        let config = StageConfig::FilterByNComponents(FilterByNComponents {
            minimum: Some(1),
            maximum: None,
        });
        let input = vec![record("a"), record("b"), record("c")];
        let output = vec![record("a"), record("d")];
        let dropped = vec![
            DroppedRecord {
                source_id: "b".to_string(),
                reason: DropReason::Unconverted,
            },
            DroppedRecord {
                source_id: "c".to_string(),
                reason: DropReason::Malformed {
                    error: MalformedRecordError::new("c", "bad"),
                },
            },
        ];

        let entry = StageEntry::new(&config, &input, &output, dropped);

        assert_eq!(entry.stage, "FilterByNComponents");
        assert_eq!(entry.count_before, 3);
        assert_eq!(entry.count_after, 2);
        assert_eq!(entry.removed, 2);
        assert_eq!(entry.added, 1);
        assert_eq!(entry.issues().count(), 1);
        assert_eq!(entry.malformed().len(), 1);
        assert!(entry.join_errors().is_empty());
        assert_eq!(entry.drop_reason("b"), Some(&DropReason::Unconverted));
        assert!(entry.summary().contains("2 removed"));
    }

    #[test]
    fn test_entry_counts_with_shared_identifiers() {
        let config = StageConfig::FilterByNComponents(FilterByNComponents::exactly(2));
        let input = vec![record(""), record(""), record("")];
        let output = vec![record("")];

        let entry = StageEntry::new(&config, &input, &output, Vec::new());

        assert_eq!(entry.removed, 2);
        assert_eq!(entry.added, 0);
    }

    #[test]
    fn test_drop_reason_serialization() {
        let dropped = DroppedRecord {
            source_id: "x".to_string(),
            reason: DropReason::Duplicate {
                retained: "y".to_string(),
            },
        };
        let json = serde_json::to_value(&dropped).unwrap();
        assert_eq!(json["reason"], "duplicate");
        assert_eq!(json["retained"], "y");

        let back: DroppedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, dropped);
    }
}
