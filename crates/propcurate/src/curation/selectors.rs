//! Selectors: stages that keep representatives of groups of records.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StageConfigurationError};
use crate::model::{Amount, Fingerprint, PropertyRecord, PropertyType, StateKey, DEFAULT_PRECISION};

use super::provenance::DropReason;
use super::stage::{preference, Stage, StageContext, StageKind};

type ValidationResult = std::result::Result<(), StageConfigurationError>;

/// Largest supported rounding precision.
const MAX_PRECISION: u32 = 12;

/// Indexes of the well-formed records, in order.
fn admitted(records: &[PropertyRecord], context: &mut StageContext) -> Result<Vec<usize>> {
    let mut indexes = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        if context.admit(record)? {
            indexes.push(index);
        }
    }
    Ok(indexes)
}

/// Emit the selected records in input order and report the others.
fn emit(
    records: &[PropertyRecord],
    candidates: &[usize],
    mut reason: impl FnMut(usize) -> Option<DropReason>,
    context: &mut StageContext,
) -> Vec<PropertyRecord> {
    let mut output = Vec::with_capacity(candidates.len());

    for &index in candidates {
        match reason(index) {
            None => output.push(records[index].clone()),
            Some(reason) => context.drop_record(&records[index], reason),
        }
    }

    output
}

fn validate_precisions(stage: &str, precisions: &[u32]) -> ValidationResult {
    match precisions.iter().find(|p| **p > MAX_PRECISION) {
        Some(precision) => Err(StageConfigurationError::new(
            stage,
            format!("precision {} exceeds {}", precision, MAX_PRECISION),
        )),
        None => Ok(()),
    }
}

// =============================================================================
// DUPLICATES
// =============================================================================

/// Keep one record per group of semantically duplicate measurements.
///
/// Records are duplicates when they share a fingerprint (amounts rounded to
/// `mole_fraction_precision`), a rounded state including the phase and a
/// property type. When `distinguish_exact_amounts` is set, exact-count
/// substances must also share their literal counts, so (1, 1) and (2, 2) are
/// kept apart. A precision of zero compares exact values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterDuplicates {
    pub temperature_precision: u32,
    pub pressure_precision: u32,
    pub mole_fraction_precision: u32,
    pub distinguish_exact_amounts: bool,
}

impl Default for FilterDuplicates {
    fn default() -> Self {
        Self {
            temperature_precision: 0,
            pressure_precision: 0,
            mole_fraction_precision: DEFAULT_PRECISION,
            distinguish_exact_amounts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DuplicateKey {
    fingerprint: Fingerprint,
    exact_counts: Vec<Option<u32>>,
    state: StateKey,
    property_type: PropertyType,
}

impl FilterDuplicates {
    /// Compare temperatures and pressures to the given decimal places.
    pub fn with_state_precision(mut self, temperature: u32, pressure: u32) -> Self {
        self.temperature_precision = temperature;
        self.pressure_precision = pressure;
        self
    }

    fn key(&self, record: &PropertyRecord) -> DuplicateKey {
        let exact_counts = if self.distinguish_exact_amounts {
            record
                .substance
                .literal_amounts()
                .into_iter()
                .map(|amount| match amount {
                    Amount::ExactCount(n) => Some(n),
                    Amount::MoleFraction(_) => None,
                })
                .collect()
        } else {
            Vec::new()
        };

        DuplicateKey {
            fingerprint: Fingerprint::with_precision(
                &record.substance,
                self.mole_fraction_precision,
            ),
            exact_counts,
            state: record
                .state
                .key(self.temperature_precision, self.pressure_precision),
            property_type: record.property_type,
        }
    }
}

impl Stage for FilterDuplicates {
    fn name(&self) -> &'static str {
        "FilterDuplicates"
    }

    fn kind(&self) -> StageKind {
        StageKind::Selector
    }

    fn validate(&self) -> ValidationResult {
        validate_precisions(
            self.name(),
            &[
                self.temperature_precision,
                self.pressure_precision,
                self.mole_fraction_precision,
            ],
        )
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        let candidates = admitted(records, context)?;

        let mut groups: IndexMap<DuplicateKey, usize> = IndexMap::new();
        let mut group_of: HashMap<usize, usize> = HashMap::new();

        for &index in &candidates {
            let entry = groups.entry(self.key(&records[index]));
            let group = entry.index();
            let representative = entry.or_insert(index);

            if preference(&records[index], &records[*representative]).is_lt() {
                *representative = index;
            }
            group_of.insert(index, group);
        }

        Ok(emit(
            records,
            &candidates,
            |index| {
                let (_, &representative) = groups.get_index(group_of[&index])?;
                (representative != index).then(|| DropReason::Duplicate {
                    retained: records[representative].source_id.clone(),
                })
            },
            context,
        ))
    }
}

// =============================================================================
// CARDINALITY
// =============================================================================

fn default_max_per_group() -> usize {
    1
}

/// Keep at most `max_per_group` records per substance and property type, or
/// per substance, property type and rounded state when `per_state` is set.
///
/// The kept records are the most preferred ones of each group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectPerSubstance {
    #[serde(default = "default_max_per_group")]
    pub max_per_group: usize,
    #[serde(default)]
    pub per_state: bool,
    #[serde(default)]
    pub temperature_precision: u32,
    #[serde(default)]
    pub pressure_precision: u32,
}

impl Default for SelectPerSubstance {
    fn default() -> Self {
        Self {
            max_per_group: default_max_per_group(),
            per_state: false,
            temperature_precision: 0,
            pressure_precision: 0,
        }
    }
}

impl SelectPerSubstance {
    /// Keep at most `max_per_group` records per group.
    pub fn new(max_per_group: usize) -> Self {
        Self {
            max_per_group,
            ..Default::default()
        }
    }

    /// Also group by rounded state.
    pub fn with_per_state(mut self, per_state: bool) -> Self {
        self.per_state = per_state;
        self
    }
}

impl Stage for SelectPerSubstance {
    fn name(&self) -> &'static str {
        "SelectPerSubstance"
    }

    fn kind(&self) -> StageKind {
        StageKind::Selector
    }

    fn validate(&self) -> ValidationResult {
        if self.max_per_group == 0 {
            return Err(StageConfigurationError::new(
                self.name(),
                "max_per_group must be at least 1",
            ));
        }
        validate_precisions(
            self.name(),
            &[self.temperature_precision, self.pressure_precision],
        )
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        let candidates = admitted(records, context)?;

        let mut groups: IndexMap<(Fingerprint, PropertyType, Option<StateKey>), Vec<usize>> =
            IndexMap::new();

        for &index in &candidates {
            let record = &records[index];
            let state = self.per_state.then(|| {
                record
                    .state
                    .key(self.temperature_precision, self.pressure_precision)
            });
            groups
                .entry((Fingerprint::of(&record.substance), record.property_type, state))
                .or_default()
                .push(index);
        }

        let mut selected = BTreeSet::new();
        for members in groups.values_mut() {
            members.sort_by(|&a, &b| preference(&records[a], &records[b]));
            selected.extend(members.iter().take(self.max_per_group).copied());
        }

        let max_per_group = self.max_per_group;
        Ok(emit(
            records,
            &candidates,
            |index| {
                (!selected.contains(&index)).then(|| DropReason::Rejected {
                    detail: format!("more than {} records per substance", max_per_group),
                })
            },
            context,
        ))
    }
}

// =============================================================================
// STATE POINTS
// =============================================================================

/// A state records should be selected close to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePoint {
    /// Temperature in kelvin.
    pub temperature: f64,
    /// Pressure in kilopascal.
    pub pressure: f64,
    /// Mole fractions in component identifier order.
    #[serde(default)]
    pub mole_fractions: Vec<f64>,
}

impl StatePoint {
    /// Create a state point.
    pub fn new(temperature: f64, pressure: f64, mole_fractions: Vec<f64>) -> Self {
        Self {
            temperature,
            pressure,
            mole_fractions,
        }
    }

    /// Squared distance to a record: (ΔT)² + (ΔP/10)² + Σ(Δx)².
    fn distance(&self, record: &PropertyRecord) -> f64 {
        let dt = record.state.temperature - self.temperature;
        let dp = (record.state.pressure - self.pressure) / 10.0;

        let dx: f64 = record
            .substance
            .ratios()
            .iter()
            .zip(&self.mole_fractions)
            .map(|(x, target)| (x - target).powi(2))
            .sum();

        dt * dt + dp * dp + dx
    }
}

/// Property types to select for substances with a given number of components,
/// and the states to select them at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub property_types: Vec<PropertyType>,
    pub n_components: usize,
    pub states: Vec<StatePoint>,
}

/// For each substance and property type, keep the record nearest to each
/// target state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectStatePoints {
    pub target_states: Vec<TargetState>,
}

impl Stage for SelectStatePoints {
    fn name(&self) -> &'static str {
        "SelectStatePoints"
    }

    fn kind(&self) -> StageKind {
        StageKind::Selector
    }

    fn validate(&self) -> ValidationResult {
        let invalid = |message: String| Err(StageConfigurationError::new(self.name(), message));

        if self.target_states.is_empty() {
            return invalid("target_states must not be empty".to_string());
        }

        for target in &self.target_states {
            if target.property_types.is_empty() || target.states.is_empty() {
                return invalid("targets need property types and states".to_string());
            }
            if target.n_components == 0 {
                return invalid("n_components must be positive".to_string());
            }

            for state in &target.states {
                if !(state.temperature > 0.0 && state.pressure > 0.0) {
                    return invalid(format!(
                        "state {} K, {} kPa is not positive",
                        state.temperature, state.pressure
                    ));
                }
                if !state.mole_fractions.is_empty()
                    && state.mole_fractions.len() != target.n_components
                {
                    return invalid(format!(
                        "{} mole fractions given for {} components",
                        state.mole_fractions.len(),
                        target.n_components
                    ));
                }
            }
        }

        Ok(())
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        let candidates = admitted(records, context)?;

        // (composition, property type, target, state) -> nearest record
        let mut nearest: HashMap<(Fingerprint, PropertyType, usize, usize), (usize, f64)> =
            HashMap::new();

        for &index in &candidates {
            let record = &records[index];
            let composition = Fingerprint::composition(&record.substance);

            for (t, target) in self.target_states.iter().enumerate() {
                if target.n_components != record.n_components()
                    || !target.property_types.contains(&record.property_type)
                {
                    continue;
                }

                for (s, state) in target.states.iter().enumerate() {
                    let distance = state.distance(record);
                    let key = (composition.clone(), record.property_type, t, s);

                    let closer = match nearest.get(&key) {
                        None => true,
                        Some(&(best, best_distance)) => distance
                            .total_cmp(&best_distance)
                            .then_with(|| preference(record, &records[best]))
                            .is_lt(),
                    };
                    if closer {
                        nearest.insert(key, (index, distance));
                    }
                }
            }
        }

        let selected: BTreeSet<usize> = nearest.values().map(|&(index, _)| index).collect();

        Ok(emit(
            records,
            &candidates,
            |index| {
                (!selected.contains(&index)).then(|| DropReason::Rejected {
                    detail: "not nearest to a target state".to_string(),
                })
            },
            context,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, Phase, Substance, ThermodynamicState};
    use crate::pipeline::MalformedPolicy;

    fn record(id: &str, substance: Substance, temperature: f64) -> PropertyRecord {
        PropertyRecord::new(
            substance,
            ThermodynamicState::new(temperature, 101.325),
            PropertyType::Density,
            1.0,
        )
        .with_source_id(id)
    }

    fn water(id: &str, temperature: f64) -> PropertyRecord {
        record(id, Substance::pure("O").unwrap(), temperature)
    }

    fn binary(id: &str, x: f64, temperature: f64) -> PropertyRecord {
        let substance =
            Substance::new([Component::fraction("O", x), Component::fraction("CCO", 1.0 - x)])
                .unwrap();
        record(id, substance, temperature)
    }

    fn ids(stage: &dyn Stage, records: &[PropertyRecord]) -> Vec<String> {
        let mut context = StageContext::new(stage.name(), MalformedPolicy::Skip);
        stage
            .apply(records, &mut context)
            .unwrap()
            .into_iter()
            .map(|r| r.source_id)
            .collect()
    }

    #[test]
    fn test_identical_records_keep_one() {
        let records = vec![water("a", 298.15), water("b", 298.15)];
        assert_eq!(ids(&FilterDuplicates::default(), &records), vec!["a"]);
    }

    #[test]
    fn test_duplicates_prefer_precise_uncertainty() {
        let records = vec![
            water("coarse", 298.15).with_uncertainty(0.01),
            water("fine", 298.15).with_uncertainty(0.0001).with_ingestion_order(1),
        ];

        let stage = FilterDuplicates::default();
        let mut context = StageContext::new(stage.name(), MalformedPolicy::Skip);
        let output = stage.apply(&records, &mut context).unwrap();

        assert_eq!(output.len(), 1);
        assert_eq!(output[0].source_id, "fine");
        assert_eq!(
            context.dropped()[0].reason,
            DropReason::Duplicate {
                retained: "fine".to_string()
            }
        );
    }

    #[test]
    fn test_duplicates_state_precision() {
        let records = vec![water("a", 298.15), water("b", 298.151)];

        assert_eq!(ids(&FilterDuplicates::default(), &records).len(), 2);
        let rounded = FilterDuplicates::default().with_state_precision(2, 0);
        assert_eq!(ids(&rounded, &records), vec!["a"]);
    }

    #[test]
    fn test_duplicates_distinguish_phase_and_type() {
        let mut gas = water("gas", 298.15);
        gas.state = gas.state.with_phase(Phase::Gas);
        let mut hvap = water("hvap", 298.15);
        hvap.property_type = PropertyType::EnthalpyOfVaporization;

        let records = vec![water("liquid", 298.15), gas, hvap];
        assert_eq!(ids(&FilterDuplicates::default(), &records).len(), 3);
    }

    #[test]
    fn test_duplicates_exact_amounts() {
        let one = Substance::new([Component::exact("O", 1), Component::exact("CCO", 1)]).unwrap();
        let two = Substance::new([Component::exact("O", 2), Component::exact("CCO", 2)]).unwrap();
        let records = vec![record("one", one, 298.15), record("two", two, 298.15)];

        assert_eq!(ids(&FilterDuplicates::default(), &records).len(), 2);

        let merged = FilterDuplicates {
            distinguish_exact_amounts: false,
            ..Default::default()
        };
        assert_eq!(ids(&merged, &records), vec!["one"]);
    }

    #[test]
    fn test_duplicates_idempotent() {
        let records = vec![
            water("a", 298.15),
            water("b", 298.15).with_uncertainty(0.1),
            binary("c", 0.5, 298.15),
        ];
        let stage = FilterDuplicates::default();

        let mut context = StageContext::new(stage.name(), MalformedPolicy::Skip);
        let once = stage.apply(&records, &mut context).unwrap();
        let twice = stage.apply(&once, &mut context).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_duplicates_validation() {
        let stage = FilterDuplicates {
            mole_fraction_precision: 13,
            ..Default::default()
        };
        assert!(stage.validate().is_err());
        assert!(FilterDuplicates::default().validate().is_ok());
    }

    #[test]
    fn test_select_per_substance() {
        let records = vec![
            water("a", 298.15),
            water("b", 308.15).with_uncertainty(0.01),
            water("c", 318.15).with_uncertainty(0.001),
            binary("m", 0.5, 298.15),
        ];

        assert_eq!(ids(&SelectPerSubstance::default(), &records), vec!["c", "m"]);
        assert_eq!(ids(&SelectPerSubstance::new(2), &records), vec!["b", "c", "m"]);
        assert_eq!(
            ids(&SelectPerSubstance::default().with_per_state(true), &records).len(),
            4
        );
        assert!(SelectPerSubstance::new(0).validate().is_err());
    }

    #[test]
    fn test_select_state_points() {
        let stage = SelectStatePoints {
            target_states: vec![
                TargetState {
                    property_types: vec![PropertyType::Density],
                    n_components: 1,
                    states: vec![StatePoint::new(298.15, 101.325, vec![1.0])],
                },
                TargetState {
                    property_types: vec![PropertyType::Density],
                    n_components: 2,
                    states: vec![
                        StatePoint::new(298.15, 101.325, vec![0.25, 0.75]),
                        StatePoint::new(298.15, 101.325, vec![0.75, 0.25]),
                    ],
                },
            ],
        };
        assert!(stage.validate().is_ok());

        let records = vec![
            water("w1", 300.0),
            water("w2", 298.0),
            binary("x30", 0.3, 298.15),
            binary("x50", 0.5, 298.15),
            binary("x70", 0.7, 298.15),
        ];

        // Components sort as (CCO, O), so x30 has ratios (0.7, 0.3).
        assert_eq!(ids(&stage, &records), vec!["w2", "x30", "x70"]);
    }

    #[test]
    fn test_select_state_points_validation() {
        assert!(SelectStatePoints::default().validate().is_err());

        let stage = SelectStatePoints {
            target_states: vec![TargetState {
                property_types: vec![PropertyType::Density],
                n_components: 2,
                states: vec![StatePoint::new(298.15, 101.325, vec![1.0])],
            }],
        };
        assert!(stage.validate().is_err());
    }
}
