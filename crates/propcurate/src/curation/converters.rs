//! Converters: stages that join records and derive new quantities.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConversionJoinError, MalformedRecordError, Result, StageConfigurationError};
use crate::model::{Fingerprint, PropertyRecord, PropertyType, StateKey};

use super::provenance::DropReason;
use super::stage::{preference, Stage, StageContext, StageKind};

/// Largest supported rounding precision for state joins.
const MAX_PRECISION: u32 = 12;

fn default_temperature_precision() -> u32 {
    2
}

fn default_pressure_precision() -> u32 {
    3
}

/// Derive excess molar volumes from mixture and pure component densities.
///
/// Every fractional mixture density is joined to the pure density of each of
/// its components measured at the same state (rounded to the configured
/// precision), and replaced by
///
/// ```text
/// V^E = Σ xᵢMᵢ / ρ_mix − Σ xᵢMᵢ / ρᵢ
/// ```
///
/// in cm³/mol. The uncertainty is propagated to first order when every input
/// record carries one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertToExcessMolarVolume {
    /// Molar mass (g/mol) of every component that may appear in a mixture.
    pub molar_masses: BTreeMap<String, f64>,

    /// Keep records that were not converted instead of dropping them. Pure
    /// densities joined into a derived record are dropped either way.
    #[serde(default)]
    pub keep_unconverted: bool,

    /// Decimal places temperatures are matched to.
    #[serde(default = "default_temperature_precision")]
    pub temperature_precision: u32,

    /// Decimal places pressures are matched to.
    #[serde(default = "default_pressure_precision")]
    pub pressure_precision: u32,
}

impl Default for ConvertToExcessMolarVolume {
    fn default() -> Self {
        Self {
            molar_masses: BTreeMap::new(),
            keep_unconverted: false,
            temperature_precision: default_temperature_precision(),
            pressure_precision: default_pressure_precision(),
        }
    }
}

/// How a record takes part in the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Participation {
    /// Already of the output type.
    Converted,
    /// A pure component density.
    Pure,
    /// A mixture density to convert.
    Mixture,
    /// Anything else.
    Other,
}

impl ConvertToExcessMolarVolume {
    /// Create a converter with the given molar masses.
    pub fn new(molar_masses: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            molar_masses: molar_masses.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Add the molar mass of a component.
    pub fn with_molar_mass(mut self, identifier: impl Into<String>, molar_mass: f64) -> Self {
        self.molar_masses.insert(identifier.into(), molar_mass);
        self
    }

    /// Keep records that are not converted.
    pub fn with_keep_unconverted(mut self, keep: bool) -> Self {
        self.keep_unconverted = keep;
        self
    }

    fn state_key(&self, record: &PropertyRecord) -> StateKey {
        record
            .state
            .key(self.temperature_precision, self.pressure_precision)
    }

    fn classify(
        &self,
        record: &PropertyRecord,
    ) -> std::result::Result<Participation, MalformedRecordError> {
        let malformed = |message: String| MalformedRecordError::new(&record.source_id, message);

        match record.property_type {
            PropertyType::ExcessMolarVolume => return Ok(Participation::Converted),
            PropertyType::Density => {}
            _ => return Ok(Participation::Other),
        }

        if record.value <= 0.0 {
            return Err(malformed(format!("density {} is not positive", record.value)));
        }

        if record.n_components() == 1 {
            return Ok(Participation::Pure);
        }

        if !record.substance.is_fractional() {
            return Err(malformed(
                "mixture amounts must be given as mole fractions".to_string(),
            ));
        }

        if let Some(identifier) = record
            .substance
            .identifiers()
            .find(|id| !self.molar_masses.contains_key(*id))
        {
            return Err(malformed(format!("no molar mass for component '{}'", identifier)));
        }

        Ok(Participation::Mixture)
    }

    /// Build the excess molar volume record of `mixture`. `pures` holds the
    /// pure density of each component, in component order.
    fn excess_molar_volume(
        &self,
        mixture: &PropertyRecord,
        pures: &[&PropertyRecord],
    ) -> PropertyRecord {
        let ratios = mixture.substance.ratios();

        let mut mixture_mass = 0.0;
        let mut ideal_volume = 0.0;
        let mut ideal_variance = 0.0;
        let mut all_uncertain = mixture.uncertainty.is_some();

        for ((component, x), pure) in mixture.substance.components().iter().zip(&ratios).zip(pures)
        {
            let mass = x * self.molar_masses[&component.identifier];

            mixture_mass += mass;
            ideal_volume += mass / pure.value;

            match pure.uncertainty {
                Some(sigma) => ideal_variance += (mass / pure.value.powi(2) * sigma).powi(2),
                None => all_uncertain = false,
            }
        }

        let value = mixture_mass / mixture.value - ideal_volume;

        let uncertainty = match mixture.uncertainty {
            Some(sigma) if all_uncertain => {
                let mixture_term = mixture_mass / mixture.value.powi(2) * sigma;
                Some((mixture_term.powi(2) + ideal_variance).sqrt())
            }
            _ => None,
        };

        let mut derived_from = vec![mixture.source_id.clone()];
        derived_from.extend(pures.iter().map(|p| p.source_id.clone()));

        PropertyRecord {
            source_id: format!("{}:{:?}", mixture.source_id, PropertyType::ExcessMolarVolume),
            ingestion_order: mixture.ingestion_order,
            substance: mixture.substance.clone(),
            state: mixture.state,
            property_type: PropertyType::ExcessMolarVolume,
            value,
            uncertainty,
            source: mixture.source.clone(),
            tags: mixture.tags.clone(),
            derived_from,
        }
    }
}

fn preferred_index(records: &[PropertyRecord], indexes: &[usize]) -> Option<usize> {
    indexes
        .iter()
        .copied()
        .min_by(|&a, &b| preference(&records[a], &records[b]))
}

impl Stage for ConvertToExcessMolarVolume {
    fn name(&self) -> &'static str {
        "ConvertToExcessMolarVolume"
    }

    fn kind(&self) -> StageKind {
        StageKind::Converter
    }

    fn validate(&self) -> std::result::Result<(), StageConfigurationError> {
        if self.molar_masses.is_empty() {
            return Err(StageConfigurationError::new(
                self.name(),
                "molar_masses must not be empty",
            ));
        }

        if let Some((identifier, mass)) = self
            .molar_masses
            .iter()
            .find(|(_, mass)| !(mass.is_finite() && **mass > 0.0))
        {
            return Err(StageConfigurationError::new(
                self.name(),
                format!("molar mass {} of '{}' must be positive", mass, identifier),
            ));
        }

        if self.temperature_precision > MAX_PRECISION || self.pressure_precision > MAX_PRECISION {
            return Err(StageConfigurationError::new(
                self.name(),
                format!("precisions must not exceed {}", MAX_PRECISION),
            ));
        }

        Ok(())
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        let mut participation: Vec<Option<Participation>> = Vec::with_capacity(records.len());
        let mut pures: IndexMap<(String, StateKey), Vec<usize>> = IndexMap::new();
        let mut mixtures: IndexMap<(Fingerprint, StateKey), Vec<usize>> = IndexMap::new();

        for (index, record) in records.iter().enumerate() {
            if !context.admit(record)? {
                participation.push(None);
                continue;
            }

            let role = match self.classify(record) {
                Ok(role) => role,
                Err(error) => {
                    context.malformed(error)?;
                    participation.push(None);
                    continue;
                }
            };

            match role {
                Participation::Pure => {
                    let identifier = record.substance.components()[0].identifier.clone();
                    pures
                        .entry((identifier, self.state_key(record)))
                        .or_default()
                        .push(index);
                }
                Participation::Mixture => {
                    mixtures
                        .entry((Fingerprint::of(&record.substance), self.state_key(record)))
                        .or_default()
                        .push(index);
                }
                Participation::Converted | Participation::Other => {}
            }

            participation.push(Some(role));
        }

        let best_pure: HashMap<&(String, StateKey), usize> = pures
            .iter()
            .filter_map(|(key, indexes)| preferred_index(records, indexes).map(|i| (key, i)))
            .collect();

        let mut derived: HashMap<usize, PropertyRecord> = HashMap::new();
        let mut consumed: HashMap<usize, String> = HashMap::new();

        for ((_, state_key), members) in &mixtures {
            let Some(representative) = preferred_index(records, members) else {
                continue;
            };
            let mixture = &records[representative];

            let mut counterparts = Vec::new();
            let mut missing = Vec::new();

            for component in mixture.substance.components() {
                match best_pure.get(&(component.identifier.clone(), *state_key)) {
                    Some(&index) => counterparts.push(index),
                    None => missing.push(component.identifier.clone()),
                }
            }

            if !missing.is_empty() {
                for &member in members {
                    context.join_failed(ConversionJoinError {
                        source_id: records[member].source_id.clone(),
                        state: records[member].state.to_string(),
                        missing: missing.clone(),
                    });
                }
                continue;
            }

            let pure_records: Vec<&PropertyRecord> =
                counterparts.iter().map(|&i| &records[i]).collect();
            let record = self.excess_molar_volume(mixture, &pure_records);

            for &member in members {
                let reason = if member == representative {
                    DropReason::Consumed {
                        into: record.source_id.clone(),
                    }
                } else {
                    DropReason::Duplicate {
                        retained: mixture.source_id.clone(),
                    }
                };
                context.drop_record(&records[member], reason);
            }

            for index in counterparts {
                consumed
                    .entry(index)
                    .or_insert_with(|| record.source_id.clone());
            }

            derived.insert(representative, record);
        }

        debug!(
            mixtures = mixtures.len(),
            derived = derived.len(),
            "Joined mixture densities to pure densities"
        );

        let mut output = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            match participation[index] {
                None => {}
                Some(Participation::Converted) => output.push(record.clone()),
                Some(Participation::Mixture) => {
                    if let Some(converted) = derived.remove(&index) {
                        output.push(converted);
                    }
                }
                // Joined pures are consumed whatever `keep_unconverted` says.
                Some(Participation::Pure) | Some(Participation::Other) => match consumed.get(&index) {
                    Some(into) => {
                        context.drop_record(record, DropReason::Consumed { into: into.clone() })
                    }
                    None if self.keep_unconverted => output.push(record.clone()),
                    None => context.drop_record(record, DropReason::Unconverted),
                },
            }
        }

        Ok(output)
    }
}
