//! Stable, deterministic identifiers for a final data set.
//!
//! Records are ordered by content alone (fingerprint, literal amounts, state,
//! property type, ingestion order) so the ordinal index of a record does not
//! depend on the order stages happened to leave the records in.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::curation::{DataSet, StageEntry};
use crate::model::{Amount, Fingerprint, PropertyRecord};

/// A record with its position and content identity in an indexed data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    /// Ordinal position in the indexed data set.
    pub index: usize,

    /// SHA-256 over fingerprint, literal amounts, state and property type.
    pub identity: String,

    /// Fingerprint of the record's substance.
    pub fingerprint: Fingerprint,

    /// The record.
    pub record: PropertyRecord,
}

/// A data set in canonical order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexedDataSet {
    /// Records in canonical order; `entries[i].index == i`.
    pub entries: Vec<IndexedRecord>,

    /// Provenance trail of the data set.
    pub provenance: Vec<StageEntry>,
}

impl IndexedDataSet {
    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record at an ordinal index.
    pub fn get(&self, index: usize) -> Option<&IndexedRecord> {
        self.entries.get(index)
    }

    /// First record with the given content identity.
    pub fn find_identity(&self, identity: &str) -> Option<&IndexedRecord> {
        self.entries.iter().find(|e| e.identity == identity)
    }

    /// Records in canonical order.
    pub fn records(&self) -> impl Iterator<Item = &PropertyRecord> {
        self.entries.iter().map(|e| &e.record)
    }
}

/// Assigns ordinal indexes and content identities.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reindexer;

impl Reindexer {
    /// Create a new re-indexer.
    pub fn new() -> Self {
        Self
    }

    /// Index a data set.
    pub fn index(&self, data_set: &DataSet) -> IndexedDataSet {
        let mut keyed: Vec<(Fingerprint, &PropertyRecord)> = data_set
            .records()
            .iter()
            .map(|record| (Fingerprint::of(&record.substance), record))
            .collect();

        keyed.sort_by(|(fa, a), (fb, b)| {
            fa.cmp(fb)
                .then_with(|| {
                    compare_amounts(
                        &a.substance.literal_amounts(),
                        &b.substance.literal_amounts(),
                    )
                })
                .then_with(|| a.state.temperature.total_cmp(&b.state.temperature))
                .then_with(|| a.state.pressure.total_cmp(&b.state.pressure))
                .then_with(|| a.state.phase.cmp(&b.state.phase))
                .then_with(|| a.property_type.cmp(&b.property_type))
                .then_with(|| a.ingestion_order.cmp(&b.ingestion_order))
                .then_with(|| a.source_id.cmp(&b.source_id))
        });

        let entries = keyed
            .into_iter()
            .enumerate()
            .map(|(index, (fingerprint, record))| IndexedRecord {
                index,
                identity: identity(&fingerprint, record),
                fingerprint,
                record: record.clone(),
            })
            .collect();

        IndexedDataSet {
            entries,
            provenance: data_set.provenance().to_vec(),
        }
    }
}

/// Exact counts order before mole fractions; values compare numerically.
fn compare_amounts(a: &[Amount], b: &[Amount]) -> Ordering {
    let rank = |amount: &Amount| match amount {
        Amount::ExactCount(n) => (0u8, f64::from(*n)),
        Amount::MoleFraction(x) => (1u8, *x),
    };

    for (x, y) in a.iter().zip(b) {
        let ((kx, vx), (ky, vy)) = (rank(x), rank(y));
        let ordering = kx.cmp(&ky).then_with(|| vx.total_cmp(&vy));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a.len().cmp(&b.len())
}

fn identity(fingerprint: &Fingerprint, record: &PropertyRecord) -> String {
    let canonical = format!(
        "{}|{:?}|{:?}|{:?}|{:?}|{:?}",
        fingerprint.as_str(),
        record.substance.literal_amounts(),
        record.state.temperature,
        record.state.pressure,
        record.state.phase,
        record.property_type,
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
