//! Filters: stages that keep or drop each record on its own merits.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StageConfigurationError};
use crate::model::{smiles, ComponentRole, Fingerprint, PropertyRecord, PropertyType};

use super::provenance::DropReason;
use super::stage::{Stage, StageContext, StageKind};

type ValidationResult = std::result::Result<(), StageConfigurationError>;

/// A per-record criterion.
trait RecordFilter {
    /// Why the record is rejected, or `None` when it is retained.
    fn reject(&self, record: &PropertyRecord) -> Option<String>;
}

/// Keep every well-formed record the filter does not reject, in order.
fn retain<F: RecordFilter>(
    filter: &F,
    records: &[PropertyRecord],
    context: &mut StageContext,
) -> Result<Vec<PropertyRecord>> {
    let mut retained = Vec::with_capacity(records.len());

    for record in records {
        if !context.admit(record)? {
            continue;
        }

        match filter.reject(record) {
            None => retained.push(record.clone()),
            Some(detail) => context.drop_record(record, DropReason::Rejected { detail }),
        }
    }

    Ok(retained)
}

fn validate_bounds(stage: &str, minimum: Option<f64>, maximum: Option<f64>) -> ValidationResult {
    if minimum.is_none() && maximum.is_none() {
        return Err(StageConfigurationError::new(
            stage,
            "at least one of minimum and maximum must be set",
        ));
    }

    for bound in [minimum, maximum].into_iter().flatten() {
        if !(bound.is_finite() && bound > 0.0) {
            return Err(StageConfigurationError::new(
                stage,
                format!("bound {} must be positive and finite", bound),
            ));
        }
    }

    if let (Some(minimum), Some(maximum)) = (minimum, maximum) {
        if maximum <= minimum {
            return Err(StageConfigurationError::new(
                stage,
                format!("maximum {} must be greater than minimum {}", maximum, minimum),
            ));
        }
    }

    Ok(())
}

/// Exactly one of two mutually exclusive options must be set.
fn validate_exclusive<T>(
    stage: &str,
    include: &Option<T>,
    exclude: &Option<T>,
    include_name: &str,
    exclude_name: &str,
) -> ValidationResult {
    match (include, exclude) {
        (Some(_), Some(_)) => Err(StageConfigurationError::new(
            stage,
            format!("{} and {} are mutually exclusive", include_name, exclude_name),
        )),
        (None, None) => Err(StageConfigurationError::new(
            stage,
            format!("one of {} and {} must be set", include_name, exclude_name),
        )),
        _ => Ok(()),
    }
}

fn outside_range(minimum: Option<f64>, maximum: Option<f64>, value: f64) -> bool {
    minimum.is_some_and(|minimum| value <= minimum)
        || maximum.is_some_and(|maximum| value >= maximum)
}

// =============================================================================
// STATE FILTERS
// =============================================================================

/// Retain records measured strictly between two temperatures (K).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterByTemperature {
    /// Exclusive lower bound.
    pub minimum: Option<f64>,
    /// Exclusive upper bound.
    pub maximum: Option<f64>,
}

impl RecordFilter for FilterByTemperature {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        let temperature = record.state.temperature;
        outside_range(self.minimum, self.maximum, temperature)
            .then(|| format!("temperature {} K out of range", temperature))
    }
}

impl Stage for FilterByTemperature {
    fn name(&self) -> &'static str {
        "FilterByTemperature"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn validate(&self) -> ValidationResult {
        validate_bounds(self.name(), self.minimum, self.maximum)
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        retain(self, records, context)
    }
}

/// Retain records measured strictly between two pressures (kPa).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterByPressure {
    /// Exclusive lower bound.
    pub minimum: Option<f64>,
    /// Exclusive upper bound.
    pub maximum: Option<f64>,
}

impl RecordFilter for FilterByPressure {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        let pressure = record.state.pressure;
        outside_range(self.minimum, self.maximum, pressure)
            .then(|| format!("pressure {} kPa out of range", pressure))
    }
}

impl Stage for FilterByPressure {
    fn name(&self) -> &'static str {
        "FilterByPressure"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn validate(&self) -> ValidationResult {
        validate_bounds(self.name(), self.minimum, self.maximum)
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        retain(self, records, context)
    }
}

// =============================================================================
// PROPERTY TYPE FILTER
// =============================================================================

/// Retain records of the listed property types.
///
/// `n_components` optionally restricts a property type to substances with one
/// of the given numbers of components. With `strict` set, a substance (compared
/// without its amounts) is only retained when it has records for every property
/// type required for its number of components. When `n_components` is also set,
/// every component must additionally appear in a fully measured substance at
/// each component count with data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterByPropertyTypes {
    /// Property types to retain.
    pub property_types: Vec<PropertyType>,
    /// Allowed component counts per property type.
    pub n_components: BTreeMap<PropertyType, Vec<usize>>,
    /// Require each substance to have data for every listed type.
    pub strict: bool,
}

impl FilterByPropertyTypes {
    /// Retain only the given property types.
    pub fn new(property_types: impl IntoIterator<Item = PropertyType>) -> Self {
        Self {
            property_types: property_types.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Restrict a property type to the given component counts.
    pub fn with_n_components(mut self, property_type: PropertyType, counts: Vec<usize>) -> Self {
        self.n_components.insert(property_type, counts);
        self
    }

    /// Enable strict mode.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Types a substance with `n_components` components needs in strict mode.
    ///
    /// Without per-type counts every listed type is required. With them, only
    /// the types whose counts include `n_components` are.
    fn required_types(&self, n_components: usize) -> BTreeSet<PropertyType> {
        if self.n_components.is_empty() {
            return self.property_types.iter().copied().collect();
        }

        self.n_components
            .iter()
            .filter(|(_, counts)| counts.contains(&n_components))
            .map(|(property_type, _)| *property_type)
            .collect()
    }

    /// Why each record fails one strict pass, or `None` when it passes.
    fn incomplete(&self, records: &[PropertyRecord]) -> Vec<Option<String>> {
        let mut measured: HashMap<Fingerprint, MeasuredSubstance> = HashMap::new();
        for record in records {
            measured
                .entry(Fingerprint::composition(&record.substance))
                .or_insert_with(|| MeasuredSubstance {
                    n_components: record.n_components(),
                    identifiers: record.substance.identifiers().map(str::to_owned).collect(),
                    types: BTreeSet::new(),
                })
                .types
                .insert(record.property_type);
        }

        // Substances with every required type, and their components per count.
        let mut complete: HashSet<Fingerprint> = HashSet::new();
        let mut components_by_count: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();

        let counts: BTreeSet<usize> = measured.values().map(|s| s.n_components).collect();
        for n in counts {
            let required = self.required_types(n);
            let present: BTreeSet<PropertyType> = measured
                .values()
                .filter(|s| s.n_components == n)
                .flat_map(|s| s.types.iter().copied())
                .collect();

            if required.is_empty() || !required.is_subset(&present) {
                continue;
            }

            let components = components_by_count.entry(n).or_default();
            for (fingerprint, substance) in &measured {
                if substance.n_components == n && required.is_subset(&substance.types) {
                    complete.insert(fingerprint.clone());
                    components.extend(substance.identifiers.iter().cloned());
                }
            }
        }

        // With per-type counts, a component must have full data at every count.
        let shared = (!self.n_components.is_empty()).then(|| {
            let mut sets = components_by_count.into_values();
            let first = sets.next().unwrap_or_default();
            sets.fold(first, |acc, set| acc.intersection(&set).cloned().collect::<BTreeSet<_>>())
        });

        records
            .iter()
            .map(|record| {
                let fingerprint = Fingerprint::composition(&record.substance);

                if !complete.contains(&fingerprint) {
                    let required = self.required_types(record.n_components());
                    let missing: Vec<_> = match measured.get(&fingerprint) {
                        Some(substance) => required.difference(&substance.types).collect(),
                        None => required.iter().collect(),
                    };
                    return Some(format!(
                        "{}-component substance has no data for {:?}",
                        record.n_components(),
                        missing
                    ));
                }

                shared.as_ref().and_then(|shared| {
                    record
                        .substance
                        .identifiers()
                        .find(|id| !shared.contains(*id))
                        .map(|id| format!("component '{}' lacks data at every component count", id))
                })
            })
            .collect()
    }
}

/// Property types measured for one substance, compared without amounts.
struct MeasuredSubstance {
    n_components: usize,
    identifiers: Vec<String>,
    types: BTreeSet<PropertyType>,
}

impl RecordFilter for FilterByPropertyTypes {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        if !self.property_types.contains(&record.property_type) {
            return Some(format!("property type {:?} not retained", record.property_type));
        }

        match self.n_components.get(&record.property_type) {
            Some(counts) if !counts.contains(&record.n_components()) => Some(format!(
                "{:?} not retained for {} components",
                record.property_type,
                record.n_components()
            )),
            _ => None,
        }
    }
}

impl Stage for FilterByPropertyTypes {
    fn name(&self) -> &'static str {
        "FilterByPropertyTypes"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn validate(&self) -> ValidationResult {
        if self.property_types.is_empty() {
            return Err(StageConfigurationError::new(
                self.name(),
                "property_types must not be empty",
            ));
        }

        for (property_type, counts) in &self.n_components {
            if !self.property_types.contains(property_type) {
                return Err(StageConfigurationError::new(
                    self.name(),
                    format!("n_components lists unretained type {:?}", property_type),
                ));
            }
            if counts.is_empty() || counts.contains(&0) {
                return Err(StageConfigurationError::new(
                    self.name(),
                    format!("component counts for {:?} must be positive", property_type),
                ));
            }
        }

        Ok(())
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        let mut kept = retain(self, records, context)?;
        if !self.strict {
            return Ok(kept);
        }

        // Dropping a component can leave another without data at some count.
        loop {
            let rejections = self.incomplete(&kept);
            if rejections.iter().all(Option::is_none) {
                return Ok(kept);
            }

            let mut next = Vec::with_capacity(kept.len());
            for (record, rejection) in kept.into_iter().zip(rejections) {
                match rejection {
                    Some(detail) => context.drop_record(&record, DropReason::Rejected { detail }),
                    None => next.push(record),
                }
            }
            kept = next;
        }
    }
}

// =============================================================================
// COMPOSITION FILTERS
// =============================================================================

fn default_racemic_ratio() -> f64 {
    1.0
}

/// Drop racemic mixtures: a stereoisomer and its mirror image present in the
/// given amount ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterByRacemic {
    /// Amount ratio that counts as racemic.
    #[serde(default = "default_racemic_ratio")]
    pub ratio: f64,
}

impl Default for FilterByRacemic {
    fn default() -> Self {
        Self {
            ratio: default_racemic_ratio(),
        }
    }
}

impl RecordFilter for FilterByRacemic {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        record
            .substance
            .is_racemic_mixture_with_ratio(self.ratio)
            .then(|| "racemic mixture".to_string())
    }
}

impl Stage for FilterByRacemic {
    fn name(&self) -> &'static str {
        "FilterByRacemic"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn validate(&self) -> ValidationResult {
        if !(self.ratio.is_finite() && self.ratio > 0.0) {
            return Err(StageConfigurationError::new(
                self.name(),
                "ratio must be positive and finite",
            ));
        }
        Ok(())
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        retain(self, records, context)
    }
}

/// Retain mixtures whose mole fractions all lie in an inclusive range.
///
/// Pure substances and exact-count components are not checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterByMoleFraction {
    /// Inclusive lower bound.
    pub minimum: f64,
    /// Inclusive upper bound.
    pub maximum: f64,
}

impl Default for FilterByMoleFraction {
    fn default() -> Self {
        Self {
            minimum: 0.0,
            maximum: 1.0,
        }
    }
}

impl RecordFilter for FilterByMoleFraction {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        if record.n_components() < 2 {
            return None;
        }

        record
            .substance
            .components()
            .iter()
            .filter_map(|c| record.substance.mole_fraction(&c.identifier).map(|x| (c, x)))
            .find(|(_, x)| *x < self.minimum || *x > self.maximum)
            .map(|(c, x)| format!("mole fraction {} of '{}' out of range", x, c.identifier))
    }
}

impl Stage for FilterByMoleFraction {
    fn name(&self) -> &'static str {
        "FilterByMoleFraction"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn validate(&self) -> ValidationResult {
        let in_unit = |x: f64| (0.0..=1.0).contains(&x);
        if !(in_unit(self.minimum) && in_unit(self.maximum) && self.minimum <= self.maximum) {
            return Err(StageConfigurationError::new(
                self.name(),
                "bounds must satisfy 0 <= minimum <= maximum <= 1",
            ));
        }
        Ok(())
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        retain(self, records, context)
    }
}

/// Retain substances with an inclusive range of component counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterByNComponents {
    /// Inclusive lower bound.
    pub minimum: Option<usize>,
    /// Inclusive upper bound.
    pub maximum: Option<usize>,
}

impl FilterByNComponents {
    /// Retain exactly `n` component substances.
    pub fn exactly(n: usize) -> Self {
        Self {
            minimum: Some(n),
            maximum: Some(n),
        }
    }
}

impl RecordFilter for FilterByNComponents {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        let n = record.n_components();
        let below = self.minimum.is_some_and(|minimum| n < minimum);
        let above = self.maximum.is_some_and(|maximum| n > maximum);

        (below || above).then(|| format!("{} components out of range", n))
    }
}

impl Stage for FilterByNComponents {
    fn name(&self) -> &'static str {
        "FilterByNComponents"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn validate(&self) -> ValidationResult {
        match (self.minimum, self.maximum) {
            (None, None) => Err(StageConfigurationError::new(
                self.name(),
                "at least one of minimum and maximum must be set",
            )),
            (Some(0), _) | (_, Some(0)) => Err(StageConfigurationError::new(
                self.name(),
                "component counts must be positive",
            )),
            (Some(minimum), Some(maximum)) if maximum < minimum => {
                Err(StageConfigurationError::new(
                    self.name(),
                    format!("maximum {} is below minimum {}", maximum, minimum),
                ))
            }
            _ => Ok(()),
        }
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        retain(self, records, context)
    }
}

/// Gate substances by the roles of their components.
///
/// With `roles_to_include`, every component must have a listed role. With
/// `roles_to_exclude`, no component may have a listed role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterByRoles {
    pub roles_to_include: Option<Vec<ComponentRole>>,
    pub roles_to_exclude: Option<Vec<ComponentRole>>,
}

impl RecordFilter for FilterByRoles {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        let components = record.substance.components();

        if let Some(include) = &self.roles_to_include {
            if let Some(c) = components.iter().find(|c| !include.contains(&c.role)) {
                return Some(format!("role {} not included", c.role.label()));
            }
        }
        if let Some(exclude) = &self.roles_to_exclude {
            if let Some(c) = components.iter().find(|c| exclude.contains(&c.role)) {
                return Some(format!("role {} excluded", c.role.label()));
            }
        }

        None
    }
}

impl Stage for FilterByRoles {
    fn name(&self) -> &'static str {
        "FilterByRoles"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn validate(&self) -> ValidationResult {
        validate_exclusive(
            self.name(),
            &self.roles_to_include,
            &self.roles_to_exclude,
            "roles_to_include",
            "roles_to_exclude",
        )
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        retain(self, records, context)
    }
}

/// Retain or drop whole substances given by their component identifiers.
///
/// Each listed substance is a set of identifiers; order does not matter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterBySubstances {
    pub substances_to_include: Option<Vec<Vec<String>>>,
    pub substances_to_exclude: Option<Vec<Vec<String>>>,
}

fn canonical_sets(substances: &[Vec<String>]) -> Vec<BTreeSet<&str>> {
    substances
        .iter()
        .map(|ids| ids.iter().map(String::as_str).collect())
        .collect()
}

impl RecordFilter for FilterBySubstances {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        let identifiers: BTreeSet<&str> = record.substance.identifiers().collect();

        if let Some(include) = &self.substances_to_include {
            if !canonical_sets(include).contains(&identifiers) {
                return Some("substance not included".to_string());
            }
        }
        if let Some(exclude) = &self.substances_to_exclude {
            if canonical_sets(exclude).contains(&identifiers) {
                return Some("substance excluded".to_string());
            }
        }

        None
    }
}

impl Stage for FilterBySubstances {
    fn name(&self) -> &'static str {
        "FilterBySubstances"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn validate(&self) -> ValidationResult {
        validate_exclusive(
            self.name(),
            &self.substances_to_include,
            &self.substances_to_exclude,
            "substances_to_include",
            "substances_to_exclude",
        )
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        retain(self, records, context)
    }
}

/// Retain or drop substances by individual component identifiers.
///
/// With `components_to_include`, every component must be listed, or only one
/// when `allow_partial_inclusion` is set. With `components_to_exclude`, no
/// component may be listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterByComponents {
    pub components_to_include: Option<Vec<String>>,
    pub components_to_exclude: Option<Vec<String>>,
    pub allow_partial_inclusion: bool,
}

impl RecordFilter for FilterByComponents {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        let mut identifiers = record.substance.identifiers();

        if let Some(exclude) = &self.components_to_exclude {
            return identifiers
                .find(|id| exclude.iter().any(|x| x == id))
                .map(|id| format!("component '{}' excluded", id));
        }

        let include = self.components_to_include.as_ref()?;
        let listed = |id: &str| include.iter().any(|x| x == id);

        let retained = if self.allow_partial_inclusion {
            identifiers.any(listed)
        } else {
            identifiers.all(listed)
        };

        (!retained).then(|| "components not included".to_string())
    }
}

impl Stage for FilterByComponents {
    fn name(&self) -> &'static str {
        "FilterByComponents"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn validate(&self) -> ValidationResult {
        validate_exclusive(
            self.name(),
            &self.components_to_include,
            &self.components_to_exclude,
            "components_to_include",
            "components_to_exclude",
        )
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        retain(self, records, context)
    }
}

// =============================================================================
// STRUCTURE FILTERS
// =============================================================================

/// Gate substances by the elements of their components.
///
/// Hydrogen counts as an element: it is inferred for atoms left below their
/// default valence, as well as read from bracket atoms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterByElements {
    /// The only elements a substance may contain.
    pub allowed_elements: Option<Vec<String>>,
    /// Elements a substance must not contain.
    pub forbidden_elements: Option<Vec<String>>,
}

impl RecordFilter for FilterByElements {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        let elements: BTreeSet<String> = record
            .substance
            .identifiers()
            .flat_map(smiles::elements)
            .collect();

        if let Some(allowed) = &self.allowed_elements {
            if let Some(element) = elements.iter().find(|e| !allowed.contains(e)) {
                return Some(format!("element {} not allowed", element));
            }
        }
        if let Some(forbidden) = &self.forbidden_elements {
            if let Some(element) = elements.iter().find(|e| forbidden.contains(e)) {
                return Some(format!("element {} forbidden", element));
            }
        }

        None
    }
}

impl Stage for FilterByElements {
    fn name(&self) -> &'static str {
        "FilterByElements"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn validate(&self) -> ValidationResult {
        validate_exclusive(
            self.name(),
            &self.allowed_elements,
            &self.forbidden_elements,
            "allowed_elements",
            "forbidden_elements",
        )
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        retain(self, records, context)
    }
}

/// Drop substances with a component carrying a net formal charge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterByCharged {}

impl RecordFilter for FilterByCharged {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        record
            .substance
            .identifiers()
            .find(|id| smiles::formal_charge(id) != 0)
            .map(|id| format!("component '{}' is charged", id))
    }
}

impl Stage for FilterByCharged {
    fn name(&self) -> &'static str {
        "FilterByCharged"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        retain(self, records, context)
    }
}

/// Drop substances containing an ionic liquid (a multi-fragment component).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterByIonicLiquid {}

impl RecordFilter for FilterByIonicLiquid {
    fn reject(&self, record: &PropertyRecord) -> Option<String> {
        record
            .substance
            .identifiers()
            .find(|id| smiles::is_multi_fragment(id))
            .map(|id| format!("component '{}' is an ionic liquid", id))
    }
}

impl Stage for FilterByIonicLiquid {
    fn name(&self) -> &'static str {
        "FilterByIonicLiquid"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn apply(
        &self,
        records: &[PropertyRecord],
        context: &mut StageContext,
    ) -> Result<Vec<PropertyRecord>> {
        retain(self, records, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, Substance, ThermodynamicState};
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

    fn pure(id: &str, smiles: &str) -> PropertyRecord {
        record(id, Substance::pure(smiles).unwrap(), 298.15)
    }

    fn binary(id: &str, a: &str, xa: f64, b: &str, xb: f64) -> PropertyRecord {
        let substance =
            Substance::new([Component::fraction(a, xa), Component::fraction(b, xb)]).unwrap();
        record(id, substance, 298.15)
    }

    fn run(stage: &dyn Stage, records: &[PropertyRecord]) -> Vec<String> {
        let mut context = StageContext::new(stage.name(), MalformedPolicy::Skip);
        stage
            .apply(records, &mut context)
            .unwrap()
            .into_iter()
            .map(|r| r.source_id)
            .collect()
    }

    #[test]
    fn test_temperature_bounds_are_exclusive() {
        let filter = FilterByTemperature {
            minimum: Some(290.0),
            maximum: Some(300.0),
        };
        let records = vec![
            record("low", Substance::pure("O").unwrap(), 290.0),
            record("mid", Substance::pure("O").unwrap(), 298.15),
            record("high", Substance::pure("O").unwrap(), 300.0),
        ];

        assert_eq!(run(&filter, &records), vec!["mid"]);
    }

    #[test]
    fn test_temperature_validation() {
        assert!(FilterByTemperature::default().validate().is_err());
        assert!(FilterByTemperature {
            minimum: Some(300.0),
            maximum: Some(290.0)
        }
        .validate()
        .is_err());
        assert!(FilterByPressure {
            minimum: Some(-1.0),
            maximum: None
        }
        .validate()
        .is_err());
        assert!(FilterByPressure {
            minimum: None,
            maximum: Some(200.0)
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_property_types_with_n_components() {
        let filter = FilterByPropertyTypes::new([PropertyType::Density])
            .with_n_components(PropertyType::Density, vec![2]);

        let mut enthalpy = pure("h", "O");
        enthalpy.property_type = PropertyType::EnthalpyOfVaporization;

        let records = vec![pure("p", "O"), binary("b", "O", 0.5, "CCO", 0.5), enthalpy];
        assert_eq!(run(&filter, &records), vec!["b"]);
    }

    #[test]
    fn test_property_types_validation() {
        assert!(FilterByPropertyTypes::default().validate().is_err());

        let filter = FilterByPropertyTypes::new([PropertyType::Density])
            .with_n_components(PropertyType::EnthalpyOfMixing, vec![2]);
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_property_types_strict() {
        let filter =
            FilterByPropertyTypes::new([PropertyType::Density, PropertyType::EnthalpyOfVaporization])
                .with_strict(true);

        let mut water_hvap = pure("wh", "O");
        water_hvap.property_type = PropertyType::EnthalpyOfVaporization;

        let records = vec![pure("wd", "O"), water_hvap, pure("ed", "CCO")];
        assert_eq!(run(&filter, &records), vec!["wd", "wh"]);
    }

    #[test]
    fn test_property_types_strict_requires_components_at_every_count() {
        let filter =
            FilterByPropertyTypes::new([PropertyType::Density, PropertyType::EnthalpyOfMixing])
                .with_n_components(PropertyType::Density, vec![1])
                .with_n_components(PropertyType::EnthalpyOfMixing, vec![2])
                .with_strict(true);

        let mut hmix = binary("hmix", "O", 0.5, "CCO", 0.5);
        hmix.property_type = PropertyType::EnthalpyOfMixing;

        let records = vec![
            pure("water", "O"),
            pure("ethanol", "CCO"),
            pure("methanol", "CO"),
            hmix,
        ];
        assert_eq!(run(&filter, &records), vec!["water", "ethanol", "hmix"]);
    }

    #[test]
    fn test_property_types_strict_prunes_until_stable() {
        let filter =
            FilterByPropertyTypes::new([PropertyType::Density, PropertyType::EnthalpyOfMixing])
                .with_n_components(PropertyType::Density, vec![1])
                .with_n_components(PropertyType::EnthalpyOfMixing, vec![2])
                .with_strict(true);

        let mut hmix = binary("hmix", "O", 0.5, "CCO", 0.5);
        hmix.property_type = PropertyType::EnthalpyOfMixing;
        let mut orphan = binary("orphan", "CO", 0.5, "CCCO", 0.5);
        orphan.property_type = PropertyType::EnthalpyOfMixing;

        // Propanol has no pure density, which removes the only binary holding methanol.
        let records = vec![
            pure("water", "O"),
            pure("ethanol", "CCO"),
            pure("methanol", "CO"),
            hmix,
            orphan,
        ];
        let once = run(&filter, &records);
        assert_eq!(once, vec!["water", "ethanol", "hmix"]);

        let kept: Vec<PropertyRecord> = records
            .into_iter()
            .filter(|r| once.contains(&r.source_id))
            .collect();
        assert_eq!(run(&filter, &kept), once);
    }

    #[test]
    fn test_property_types_strict_without_mixture_data() {
        let filter =
            FilterByPropertyTypes::new([PropertyType::Density, PropertyType::EnthalpyOfMixing])
                .with_n_components(PropertyType::Density, vec![1])
                .with_n_components(PropertyType::EnthalpyOfMixing, vec![2])
                .with_strict(true);

        // No binary data at all, so only the pure count constrains components.
        let records = vec![pure("water", "O"), pure("methanol", "CO")];
        assert_eq!(run(&filter, &records), vec!["water", "methanol"]);
    }

    #[test]
    fn test_racemic() {
        let records = vec![
            binary("rac", "C[C@H](O)CC", 0.5, "C[C@@H](O)CC", 0.5),
            binary("enriched", "C[C@H](O)CC", 0.75, "C[C@@H](O)CC", 0.25),
        ];

        assert_eq!(run(&FilterByRacemic::default(), &records), vec!["enriched"]);
        assert_eq!(run(&FilterByRacemic { ratio: 3.0 }, &records), vec!["rac"]);
        assert!(FilterByRacemic { ratio: 0.0 }.validate().is_err());
    }

    #[test]
    fn test_mole_fraction_inclusive_and_pure_pass() {
        let filter = FilterByMoleFraction {
            minimum: 0.25,
            maximum: 0.75,
        };
        let records = vec![
            pure("p", "O"),
            binary("edge", "O", 0.25, "CCO", 0.75),
            binary("out", "O", 0.1, "CCO", 0.9),
        ];

        assert_eq!(run(&filter, &records), vec!["p", "edge"]);
        assert!(FilterByMoleFraction {
            minimum: 0.8,
            maximum: 0.2
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_n_components() {
        let records = vec![pure("p", "O"), binary("b", "O", 0.5, "CCO", 0.5)];

        let filter = FilterByNComponents {
            minimum: Some(2),
            maximum: None,
        };
        assert_eq!(run(&filter, &records), vec!["b"]);
        assert_eq!(run(&FilterByNComponents::exactly(1), &records), vec!["p"]);
        assert!(FilterByNComponents::default().validate().is_err());
        assert!(FilterByNComponents {
            minimum: Some(3),
            maximum: Some(2)
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_roles() {
        let solution = Substance::new([
            Component::fraction("O", 1.0),
            Component::exact("CCO", 1).with_role(ComponentRole::Solute),
        ])
        .unwrap();
        let records = vec![pure("p", "O"), record("s", solution, 298.15)];

        let include = FilterByRoles {
            roles_to_include: Some(vec![ComponentRole::Solvent]),
            roles_to_exclude: None,
        };
        assert_eq!(run(&include, &records), vec!["p"]);

        let exclude = FilterByRoles {
            roles_to_include: None,
            roles_to_exclude: Some(vec![ComponentRole::Solvent]),
        };
        assert!(run(&exclude, &records).is_empty());

        assert!(FilterByRoles::default().validate().is_err());
    }

    #[test]
    fn test_substances_are_order_free() {
        let records = vec![pure("w", "O"), binary("m", "O", 0.5, "CCO", 0.5)];

        let include = FilterBySubstances {
            substances_to_include: Some(vec![vec!["O".into(), "CCO".into()]]),
            substances_to_exclude: None,
        };
        assert_eq!(run(&include, &records), vec!["m"]);

        let exclude = FilterBySubstances {
            substances_to_include: None,
            substances_to_exclude: Some(vec![vec!["O".into()]]),
        };
        assert_eq!(run(&exclude, &records), vec!["m"]);

        let both = FilterBySubstances {
            substances_to_include: Some(vec![]),
            substances_to_exclude: Some(vec![]),
        };
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_components_partial_inclusion() {
        let records = vec![pure("w", "O"), binary("m", "O", 0.5, "CCO", 0.5)];

        let mut filter = FilterByComponents {
            components_to_include: Some(vec!["O".into()]),
            ..Default::default()
        };
        assert_eq!(run(&filter, &records), vec!["w"]);

        filter.allow_partial_inclusion = true;
        assert_eq!(run(&filter, &records), vec!["w", "m"]);

        let exclude = FilterByComponents {
            components_to_exclude: Some(vec!["CCO".into()]),
            ..Default::default()
        };
        assert_eq!(run(&exclude, &records), vec!["w"]);
    }

    #[test]
    fn test_elements() {
        let records = vec![
            pure("w", "O"),
            pure("c", "ClC(Cl)Cl"),
            pure("e", "CCO"),
            pure("t", "ClC(Cl)(Cl)Cl"),
        ];

        let allowed = FilterByElements {
            allowed_elements: Some(vec!["C".into(), "H".into(), "O".into()]),
            forbidden_elements: None,
        };
        assert_eq!(run(&allowed, &records), vec!["w", "e"]);

        let forbidden = FilterByElements {
            allowed_elements: None,
            forbidden_elements: Some(vec!["Cl".into()]),
        };
        assert_eq!(run(&forbidden, &records), vec!["w", "e"]);
    }

    #[test]
    fn test_elements_include_implicit_hydrogen() {
        let records = vec![pure("e", "CCO"), pure("t", "ClC(Cl)(Cl)Cl")];

        let carbon_and_oxygen = FilterByElements {
            allowed_elements: Some(vec!["C".into(), "O".into()]),
            forbidden_elements: None,
        };
        assert!(run(&carbon_and_oxygen, &records).is_empty());

        let no_hydrogen = FilterByElements {
            allowed_elements: None,
            forbidden_elements: Some(vec!["H".into()]),
        };
        assert_eq!(run(&no_hydrogen, &records), vec!["t"]);
    }

    #[test]
    fn test_charged_and_ionic_liquid() {
        let records = vec![
            pure("w", "O"),
            pure("il", "C[n+]1ccn(C)c1.[Cl-]"),
            pure("ion", "[NH4+]"),
        ];

        assert_eq!(run(&FilterByCharged::default(), &records), vec!["w", "il"]);
        assert_eq!(run(&FilterByIonicLiquid::default(), &records), vec!["w", "ion"]);
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let mut bad = pure("bad", "O");
        bad.state.pressure = 0.0;

        let filter = FilterByNComponents::exactly(1);
        let mut context = StageContext::new(filter.name(), MalformedPolicy::Skip);
        let output = filter.apply(&[bad, pure("ok", "O")], &mut context).unwrap();

        assert_eq!(output.len(), 1);
        assert!(matches!(
            context.dropped()[0].reason,
            DropReason::Malformed { .. }
        ));
    }
}
