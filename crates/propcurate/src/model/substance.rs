//! Substances: validated, immutable chemical compositions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::InvalidSubstanceError;

use super::smiles;

/// Default tolerance used when checking that mole fractions sum to one.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Tolerance used when comparing amounts of two substances.
const AMOUNT_TOLERANCE: f64 = 1e-6;

/// Role a component plays in the measured system.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ComponentRole {
    #[default]
    Solvent,
    Solute,
    Ligand,
    Receptor,
}

impl ComponentRole {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ComponentRole::Solvent => "Solvent",
            ComponentRole::Solute => "Solute",
            ComponentRole::Ligand => "Ligand",
            ComponentRole::Receptor => "Receptor",
        }
    }
}

/// How much of a component is present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Amount {
    /// Mole fraction in [0, 1].
    MoleFraction(f64),
    /// Exact number of molecules.
    ExactCount(u32),
}

impl Amount {
    /// Numeric value of the amount.
    pub fn value(&self) -> f64 {
        match self {
            Amount::MoleFraction(x) => *x,
            Amount::ExactCount(n) => f64::from(*n),
        }
    }

    /// Whether this is an exact count.
    pub fn is_exact(&self) -> bool {
        matches!(self, Amount::ExactCount(_))
    }

    /// Whether this is a mole fraction.
    pub fn is_fractional(&self) -> bool {
        matches!(self, Amount::MoleFraction(_))
    }

    fn approx_eq(&self, other: &Amount) -> bool {
        match (self, other) {
            (Amount::MoleFraction(a), Amount::MoleFraction(b)) => (a - b).abs() <= AMOUNT_TOLERANCE,
            (Amount::ExactCount(a), Amount::ExactCount(b)) => a == b,
            _ => false,
        }
    }
}

/// One component of a substance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// SMILES identifier of the component.
    pub identifier: String,
    /// Role of the component in the system.
    #[serde(default)]
    pub role: ComponentRole,
    /// Amount of the component.
    pub amount: Amount,
}

impl Component {
    /// Create a component present as a mole fraction.
    pub fn fraction(identifier: impl Into<String>, mole_fraction: f64) -> Self {
        Self {
            identifier: identifier.into(),
            role: ComponentRole::default(),
            amount: Amount::MoleFraction(mole_fraction),
        }
    }

    /// Create a component present as an exact number of molecules.
    pub fn exact(identifier: impl Into<String>, count: u32) -> Self {
        Self {
            identifier: identifier.into(),
            role: ComponentRole::default(),
            amount: Amount::ExactCount(count),
        }
    }

    /// Set the role.
    pub fn with_role(mut self, role: ComponentRole) -> Self {
        self.role = role;
        self
    }
}

/// An immutable chemical composition.
///
/// Components are kept sorted by identifier, so two substances built from the
/// same components in a different order are indistinguishable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<Component>", into = "Vec<Component>")]
pub struct Substance {
    components: Vec<Component>,
}

impl Substance {
    /// Create a substance, checking mole fractions with [`DEFAULT_TOLERANCE`].
    pub fn new(
        components: impl IntoIterator<Item = Component>,
    ) -> Result<Self, InvalidSubstanceError> {
        Self::with_tolerance(components, DEFAULT_TOLERANCE)
    }

    /// Create a pure substance with a mole fraction of one.
    pub fn pure(identifier: impl Into<String>) -> Result<Self, InvalidSubstanceError> {
        Self::new([Component::fraction(identifier, 1.0)])
    }

    /// Create a substance, checking mole fractions with a custom tolerance.
    pub fn with_tolerance(
        components: impl IntoIterator<Item = Component>,
        tolerance: f64,
    ) -> Result<Self, InvalidSubstanceError> {
        let mut components: Vec<Component> = components.into_iter().collect();

        if components.is_empty() {
            return Err(InvalidSubstanceError::Empty);
        }

        components.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        for pair in components.windows(2) {
            if pair[0].identifier == pair[1].identifier {
                return Err(InvalidSubstanceError::DuplicateComponent(
                    pair[0].identifier.clone(),
                ));
            }
        }

        let mut fraction_sums: BTreeMap<ComponentRole, f64> = BTreeMap::new();

        for component in &components {
            if component.identifier.trim().is_empty() {
                return Err(InvalidSubstanceError::EmptyIdentifier);
            }

            match component.amount {
                Amount::MoleFraction(x) => {
                    if !(0.0..=1.0).contains(&x) {
                        return Err(InvalidSubstanceError::FractionOutOfRange {
                            component: component.identifier.clone(),
                            fraction: x,
                        });
                    }
                    *fraction_sums.entry(component.role).or_insert(0.0) += x;
                }
                Amount::ExactCount(0) => {
                    return Err(InvalidSubstanceError::NonPositiveCount(
                        component.identifier.clone(),
                    ));
                }
                Amount::ExactCount(_) => {}
            }
        }

        for (role, sum) in fraction_sums {
            if (sum - 1.0).abs() > tolerance {
                return Err(InvalidSubstanceError::FractionSum {
                    role: role.label().to_string(),
                    sum,
                });
            }
        }

        Ok(Self { components })
    }

    /// Components, sorted by identifier.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Component identifiers, sorted.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.identifier.as_str())
    }

    /// Look up a component by identifier.
    pub fn component(&self, identifier: &str) -> Option<&Component> {
        self.components
            .binary_search_by(|c| c.identifier.as_str().cmp(identifier))
            .ok()
            .map(|index| &self.components[index])
    }

    /// Amount of a component.
    pub fn amount(&self, identifier: &str) -> Option<Amount> {
        self.component(identifier).map(|c| c.amount)
    }

    /// Mole fraction of a component, if it is specified as one.
    pub fn mole_fraction(&self, identifier: &str) -> Option<f64> {
        match self.amount(identifier)? {
            Amount::MoleFraction(x) => Some(x),
            Amount::ExactCount(_) => None,
        }
    }

    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Whether any component is given as an exact count.
    pub fn has_exact_amounts(&self) -> bool {
        self.components.iter().any(|c| c.amount.is_exact())
    }

    /// Whether every component is given as a mole fraction.
    pub fn is_fractional(&self) -> bool {
        self.components.iter().all(|c| c.amount.is_fractional())
    }

    /// Literal amounts in component order.
    pub fn literal_amounts(&self) -> Vec<Amount> {
        self.components.iter().map(|c| c.amount).collect()
    }

    /// Amounts normalized within each amount kind, in component order.
    ///
    /// Exact counts of (1, 1) and (2, 2) and mole fractions of (0.5, 0.5)
    /// all normalize to (0.5, 0.5).
    pub fn ratios(&self) -> Vec<f64> {
        let total_fraction: f64 = self
            .components
            .iter()
            .filter(|c| c.amount.is_fractional())
            .map(|c| c.amount.value())
            .sum();
        let total_count: f64 = self
            .components
            .iter()
            .filter(|c| c.amount.is_exact())
            .map(|c| c.amount.value())
            .sum();

        self.components
            .iter()
            .map(|c| {
                let total = if c.amount.is_exact() { total_count } else { total_fraction };
                if total > 0.0 { c.amount.value() / total } else { 0.0 }
            })
            .collect()
    }

    /// Whether this is a single component substance.
    pub fn is_pure(&self) -> bool {
        self.components.len() == 1 && (self.ratios()[0] - 1.0).abs() <= AMOUNT_TOLERANCE
    }

    /// Whether the substance contains a stereoisomer and its mirror image in
    /// equal amounts.
    pub fn is_racemic_mixture(&self) -> bool {
        self.is_racemic_mixture_with_ratio(1.0)
    }

    /// Whether the substance contains a stereoisomer and its mirror image with
    /// amounts in the given ratio (in either order).
    pub fn is_racemic_mixture_with_ratio(&self, ratio: f64) -> bool {
        for (i, first) in self.components.iter().enumerate() {
            if !smiles::has_stereocenters(&first.identifier) {
                continue;
            }

            let mirror = smiles::mirror_image(&first.identifier);

            for second in &self.components[i + 1..] {
                if second.identifier != mirror
                    || first.amount.is_exact() != second.amount.is_exact()
                {
                    continue;
                }

                let (a, b) = (first.amount.value(), second.amount.value());
                if b > 0.0 && ((a / b) - ratio).abs() <= AMOUNT_TOLERANCE {
                    return true;
                }
                if a > 0.0 && ((b / a) - ratio).abs() <= AMOUNT_TOLERANCE {
                    return true;
                }
            }
        }

        false
    }
}

impl PartialEq for Substance {
    fn eq(&self, other: &Self) -> bool {
        self.components.len() == other.components.len()
            && self.components.iter().zip(&other.components).all(|(a, b)| {
                a.identifier == b.identifier && a.role == b.role && a.amount.approx_eq(&b.amount)
            })
    }
}

impl TryFrom<Vec<Component>> for Substance {
    type Error = InvalidSubstanceError;

    fn try_from(components: Vec<Component>) -> Result<Self, Self::Error> {
        Self::new(components)
    }
}

impl From<Substance> for Vec<Component> {
    fn from(substance: Substance) -> Self {
        substance.components
    }
}
