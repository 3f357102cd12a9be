//! Measured property records and the thermodynamic states they refer to.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::MalformedRecordError;

use super::substance::Substance;

/// Type of measured physical property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Density,
    DielectricConstant,
    EnthalpyOfMixing,
    EnthalpyOfVaporization,
    ExcessMolarVolume,
    SolvationFreeEnergy,
}

impl PropertyType {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            PropertyType::Density => "Density",
            PropertyType::DielectricConstant => "Dielectric Constant",
            PropertyType::EnthalpyOfMixing => "Enthalpy of Mixing",
            PropertyType::EnthalpyOfVaporization => "Enthalpy of Vaporization",
            PropertyType::ExcessMolarVolume => "Excess Molar Volume",
            PropertyType::SolvationFreeEnergy => "Solvation Free Energy",
        }
    }

    /// Canonical unit that record values of this type are stored in.
    pub fn unit(&self) -> &'static str {
        match self {
            PropertyType::Density => "g / ml",
            PropertyType::DielectricConstant => "",
            PropertyType::EnthalpyOfMixing
            | PropertyType::EnthalpyOfVaporization
            | PropertyType::SolvationFreeEnergy => "kJ / mol",
            PropertyType::ExcessMolarVolume => "cm ** 3 / mol",
        }
    }
}

/// Phase a property was measured in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Phase {
    #[default]
    Liquid,
    Gas,
    Solid,
}

/// Temperature (K), pressure (kPa) and phase of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermodynamicState {
    /// Temperature in kelvin.
    pub temperature: f64,
    /// Pressure in kilopascal.
    pub pressure: f64,
    /// Measured phase.
    #[serde(default)]
    pub phase: Phase,
}

impl ThermodynamicState {
    /// Create a liquid phase state.
    pub fn new(temperature: f64, pressure: f64) -> Self {
        Self {
            temperature,
            pressure,
            phase: Phase::Liquid,
        }
    }

    /// Set the phase.
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Hashable key of this state rounded to the given number of decimal
    /// places. A precision of zero compares the exact values.
    pub fn key(&self, temperature_precision: u32, pressure_precision: u32) -> StateKey {
        StateKey {
            temperature: quantize(self.temperature, temperature_precision),
            pressure: quantize(self.pressure, pressure_precision),
            phase: self.phase,
        }
    }
}

impl std::fmt::Display for ThermodynamicState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} K, {} kPa ({:?})", self.temperature, self.pressure, self.phase)
    }
}

/// A rounded, hashable view of a [`ThermodynamicState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey {
    temperature: u64,
    pressure: u64,
    phase: Phase,
}

/// Round a value to `precision` decimal places and return a hashable
/// representation. Precision zero keeps the exact value.
fn quantize(value: f64, precision: u32) -> u64 {
    let rounded = if precision == 0 {
        value
    } else {
        let scale = 10f64.powi(precision as i32);
        (value * scale).round()
    };

    // Collapse -0.0 onto 0.0 so both hash alike.
    if rounded == 0.0 { 0.0f64.to_bits() } else { rounded.to_bits() }
}

/// A single measured value of a physical property.
///
/// Records are values: stages never modify a record, they emit new ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Identifier of the raw source entry this record was ingested from.
    pub source_id: String,

    /// Position of the record in the ingested collection.
    pub ingestion_order: usize,

    /// The measured substance.
    pub substance: Substance,

    /// State the measurement was made at.
    pub state: ThermodynamicState,

    /// Type of the measured property.
    pub property_type: PropertyType,

    /// Value in the canonical unit of the property type.
    pub value: f64,

    /// Standard uncertainty in the same unit as the value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<f64>,

    /// Citation (usually a DOI) of the measurement.
    pub source: String,

    /// Free-form category tags.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Source identifiers of the records this record was derived from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_from: Vec<String>,
}

impl PropertyRecord {
    /// Create a record without uncertainty or citation.
    pub fn new(
        substance: Substance,
        state: ThermodynamicState,
        property_type: PropertyType,
        value: f64,
    ) -> Self {
        Self {
            source_id: String::new(),
            ingestion_order: 0,
            substance,
            state,
            property_type,
            value,
            uncertainty: None,
            source: String::new(),
            tags: BTreeSet::new(),
            derived_from: Vec::new(),
        }
    }

    /// Set the uncertainty.
    pub fn with_uncertainty(mut self, uncertainty: f64) -> Self {
        self.uncertainty = Some(uncertainty);
        self
    }

    /// Set the citation.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Add a category tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set the source identifier.
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// Set the ingestion order.
    pub fn with_ingestion_order(mut self, order: usize) -> Self {
        self.ingestion_order = order;
        self
    }

    /// Number of components of the measured substance.
    pub fn n_components(&self) -> usize {
        self.substance.n_components()
    }

    /// Decimal position of the leading significant digit of the uncertainty.
    ///
    /// Larger means more precise: 0.001 gives 3, 0.05 gives 2, 1.2 gives 0.
    /// Records without an uncertainty rank below every record with one.
    pub fn uncertainty_precision(&self) -> i32 {
        match self.uncertainty {
            None => i32::MIN,
            Some(u) if u <= 0.0 => i32::MAX,
            Some(u) => -(u.log10().floor() as i32),
        }
    }

    /// Check the structural assumptions every stage relies on.
    pub fn validate(&self) -> Result<(), MalformedRecordError> {
        let malformed = |message: &str| MalformedRecordError::new(&self.source_id, message);

        if !self.value.is_finite() {
            return Err(malformed("value is not finite"));
        }
        if !(self.state.temperature.is_finite() && self.state.temperature > 0.0) {
            return Err(malformed("temperature must be positive and finite"));
        }
        if !(self.state.pressure.is_finite() && self.state.pressure > 0.0) {
            return Err(malformed("pressure must be positive and finite"));
        }
        if let Some(u) = self.uncertainty {
            if !(u.is_finite() && u >= 0.0) {
                return Err(malformed("uncertainty must be non-negative and finite"));
            }
        }

        Ok(())
    }
}
