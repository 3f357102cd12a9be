//! The working collection of records handed from stage to stage.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::model::PropertyRecord;

use super::provenance::StageEntry;

/// An ordered collection of property records plus its provenance trail.
///
/// A data set is a value: applying a stage produces a new data set and
/// leaves the input untouched, so callers may keep any intermediate as a
/// snapshot. Two data sets are equal when their records are equal; the
/// trail does not take part in the comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSet {
    records: Vec<PropertyRecord>,
    #[serde(default)]
    provenance: Vec<StageEntry>,
}

impl DataSet {
    /// Ingest raw records keyed by their source identifier.
    ///
    /// Each record's `source_id` is set to its key and its `ingestion_order`
    /// to its position in the input.
    pub fn ingest<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PropertyRecord)>,
    {
        let records = entries
            .into_iter()
            .enumerate()
            .map(|(order, (key, record))| {
                record.with_source_id(key).with_ingestion_order(order)
            })
            .collect();

        Self {
            records,
            provenance: Vec::new(),
        }
    }

    /// Wrap records whose identifiers and ingestion order are already set.
    pub fn from_records(records: Vec<PropertyRecord>) -> Self {
        Self {
            records,
            provenance: Vec::new(),
        }
    }

    /// The records, in order.
    pub fn records(&self) -> &[PropertyRecord] {
        &self.records
    }

    /// The provenance trail, one entry per applied stage.
    pub fn provenance(&self) -> &[StageEntry] {
        &self.provenance
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the data set holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by its source identifier.
    pub fn get(&self, source_id: &str) -> Option<&PropertyRecord> {
        self.records.iter().find(|r| r.source_id == source_id)
    }

    /// Split into records and trail.
    pub fn into_parts(self) -> (Vec<PropertyRecord>, Vec<StageEntry>) {
        (self.records, self.provenance)
    }

    /// The data set produced by one more stage.
    pub(crate) fn with_stage(&self, records: Vec<PropertyRecord>, entry: StageEntry) -> Self {
        let mut provenance = self.provenance.clone();
        provenance.push(entry);

        Self {
            records,
            provenance,
        }
    }

    /// SHA-256 over the serialized records.
    pub fn content_hash(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.records)?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl PartialEq for DataSet {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl FromIterator<PropertyRecord> for DataSet {
    fn from_iter<T: IntoIterator<Item = PropertyRecord>>(iter: T) -> Self {
        Self::from_records(iter.into_iter().collect())
    }
}
