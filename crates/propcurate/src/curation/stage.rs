//! The stage abstraction shared by filters, converters and selectors.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConversionJoinError, MalformedRecordError, Result, StageConfigurationError};
use crate::model::PropertyRecord;
use crate::pipeline::MalformedPolicy;

use super::converters::ConvertToExcessMolarVolume;
use super::filters::{
    FilterByCharged, FilterByComponents, FilterByElements, FilterByIonicLiquid,
    FilterByMoleFraction, FilterByNComponents, FilterByPressure, FilterByPropertyTypes,
    FilterByRacemic, FilterByRoles, FilterBySubstances, FilterByTemperature,
};
use super::provenance::{DropReason, DroppedRecord};
use super::selectors::{FilterDuplicates, SelectPerSubstance, SelectStatePoints};

/// Broad category of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// Removes records by a per-record criterion.
    Filter,
    /// Replaces groups of records by derived records.
    Converter,
    /// Keeps representatives of groups of records.
    Selector,
}

impl StageKind {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            StageKind::Filter => "Filter",
            StageKind::Converter => "Converter",
            StageKind::Selector => "Selector",
        }
    }
}

/// A configured transformation of a record collection.
///
/// Implementations are deterministic: the same configuration applied to the
/// same records always yields the same output, in the same order. Applying a
/// stage to its own output changes nothing.
pub trait Stage {
    /// Name of the stage variant.
    fn name(&self) -> &'static str;

    /// Category of the stage.
    fn kind(&self) -> StageKind;

    /// Check the configuration before any record is processed.
    fn validate(&self) -> std::result::Result<(), StageConfigurationError> {
        Ok(())
    }

    /// Transform `records`, reporting every removed record to `context`.
    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>>;
}

/// Per-application state handed to [`Stage::apply`].
#[derive(Debug)]
pub struct StageContext {
    stage: &'static str,
    policy: MalformedPolicy,
    dropped: Vec<DroppedRecord>,
}

impl StageContext {
    /// Create a context for one application of the named stage.
    pub fn new(stage: &'static str, policy: MalformedPolicy) -> Self {
        Self {
            stage,
            policy,
            dropped: Vec::new(),
        }
    }

    /// How malformed records are handled.
    pub fn policy(&self) -> MalformedPolicy {
        self.policy
    }

    /// Record that `record` was removed.
    pub fn drop_record(&mut self, record: &PropertyRecord, reason: DropReason) {
        self.dropped.push(DroppedRecord {
            source_id: record.source_id.clone(),
            reason,
        });
    }

    /// Validate a record before it is processed.
    ///
    /// Returns `Ok(false)` when the record is malformed and has been skipped.
    pub fn admit(&mut self, record: &PropertyRecord) -> Result<bool> {
        match record.validate() {
            Ok(()) => Ok(true),
            Err(error) => {
                self.malformed(error)?;
                Ok(false)
            }
        }
    }

    /// Report a malformed record: skipped and logged, or fatal.
    pub fn malformed(&mut self, error: MalformedRecordError) -> Result<()> {
        match self.policy {
            MalformedPolicy::Fatal => Err(error.into()),
            MalformedPolicy::Skip => {
                warn!(
                    stage = self.stage,
                    source_id = %error.source_id,
                    message = %error.message,
                    "Skipping malformed record"
                );
                self.dropped.push(DroppedRecord {
                    source_id: error.source_id.clone(),
                    reason: DropReason::Malformed { error },
                });
                Ok(())
            }
        }
    }

    /// Report a record whose counterparts could not be found.
    pub fn join_failed(&mut self, error: ConversionJoinError) {
        warn!(
            stage = self.stage,
            source_id = %error.source_id,
            missing = ?error.missing,
            "No counterpart found, dropping record"
        );
        self.dropped.push(DroppedRecord {
            source_id: error.source_id.clone(),
            reason: DropReason::MissingCounterpart { error },
        });
    }

    /// Records removed so far.
    pub fn dropped(&self) -> &[DroppedRecord] {
        &self.dropped
    }

    /// Consume the context, returning every removed record.
    pub fn into_dropped(self) -> Vec<DroppedRecord> {
        self.dropped
    }
}

/// Order two records by preference when only one of them may be kept.
///
/// The record whose uncertainty has the higher decimal precision wins; on a
/// tie the earlier ingested record wins. `Ordering::Less` means `a` is
/// preferred.
pub fn preference(a: &PropertyRecord, b: &PropertyRecord) -> Ordering {
    b.uncertainty_precision()
        .cmp(&a.uncertainty_precision())
        .then(a.ingestion_order.cmp(&b.ingestion_order))
}

/// The preferred record of a group. The first of equally preferred records
/// wins, so the choice is stable for a fixed input order.
pub fn preferred<'a, I>(records: I) -> Option<&'a PropertyRecord>
where
    I: IntoIterator<Item = &'a PropertyRecord>,
{
    records.into_iter().min_by(|a, b| preference(a, b))
}

/// Configuration of a single pipeline stage.
///
/// Serialized with a `"type"` tag naming the variant, so an ordered list of
/// configurations reads back as a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StageConfig {
    FilterByTemperature(FilterByTemperature),
    FilterByPressure(FilterByPressure),
    FilterByPropertyTypes(FilterByPropertyTypes),
    FilterByRacemic(FilterByRacemic),
    FilterByMoleFraction(FilterByMoleFraction),
    FilterByNComponents(FilterByNComponents),
    FilterByRoles(FilterByRoles),
    FilterBySubstances(FilterBySubstances),
    FilterByComponents(FilterByComponents),
    FilterByElements(FilterByElements),
    FilterByCharged(FilterByCharged),
    FilterByIonicLiquid(FilterByIonicLiquid),
    ConvertToExcessMolarVolume(ConvertToExcessMolarVolume),
    FilterDuplicates(FilterDuplicates),
    SelectPerSubstance(SelectPerSubstance),
    SelectStatePoints(SelectStatePoints),
}

impl StageConfig {
    /// The stage this configuration describes.
    pub fn stage(&self) -> &dyn Stage {
        match self {
            StageConfig::FilterByTemperature(stage) => stage,
            StageConfig::FilterByPressure(stage) => stage,
            StageConfig::FilterByPropertyTypes(stage) => stage,
            StageConfig::FilterByRacemic(stage) => stage,
            StageConfig::FilterByMoleFraction(stage) => stage,
            StageConfig::FilterByNComponents(stage) => stage,
            StageConfig::FilterByRoles(stage) => stage,
            StageConfig::FilterBySubstances(stage) => stage,
            StageConfig::FilterByComponents(stage) => stage,
            StageConfig::FilterByElements(stage) => stage,
            StageConfig::FilterByCharged(stage) => stage,
            StageConfig::FilterByIonicLiquid(stage) => stage,
            StageConfig::ConvertToExcessMolarVolume(stage) => stage,
            StageConfig::FilterDuplicates(stage) => stage,
            StageConfig::SelectPerSubstance(stage) => stage,
            StageConfig::SelectStatePoints(stage) => stage,
        }
    }

    /// Name of the stage variant.
    pub fn name(&self) -> &'static str {
        self.stage().name()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), StageConfigurationError> {
        self.stage().validate()
    }
}

macro_rules! impl_from_stage {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for StageConfig {
                fn from(stage: $variant) -> Self {
                    StageConfig::$variant(stage)
                }
            }
        )*
    };
}

impl_from_stage!(
    FilterByTemperature,
    FilterByPressure,
    FilterByPropertyTypes,
    FilterByRacemic,
    FilterByMoleFraction,
    FilterByNComponents,
    FilterByRoles,
    FilterBySubstances,
    FilterByComponents,
    FilterByElements,
    FilterByCharged,
    FilterByIonicLiquid,
    ConvertToExcessMolarVolume,
    FilterDuplicates,
    SelectPerSubstance,
    SelectStatePoints,
);
