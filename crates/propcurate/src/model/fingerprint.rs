//! Structural fingerprints of substances.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::substance::Substance;

/// Number of decimal places normalized amounts are rounded to by default.
pub const DEFAULT_PRECISION: u32 = 6;

/// A comparable key describing the structural composition of a substance.
///
/// Substances with equal fingerprints are treated as chemically equivalent,
/// even when one specifies exact counts and the other mole fractions of the
/// same ratio. Fingerprints are used for grouping only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a substance with amounts rounded to [`DEFAULT_PRECISION`].
    pub fn of(substance: &Substance) -> Self {
        Self::with_precision(substance, DEFAULT_PRECISION)
    }

    /// Fingerprint of a substance with normalized amounts rounded to
    /// `precision` decimal places. Zero compares the exact ratios.
    pub fn with_precision(substance: &Substance, precision: u32) -> Self {
        let canonical: Vec<String> = substance
            .components()
            .iter()
            .zip(substance.ratios())
            .map(|(component, ratio)| {
                let ratio = if precision == 0 {
                    format!("{:?}", ratio)
                } else {
                    format!("{:.*}", precision as usize, ratio)
                };
                format!("{}|{}|{}", component.identifier, component.role.label(), ratio)
            })
            .collect();

        Self(digest(&canonical.join(";")))
    }

    /// Amount-free fingerprint: only component identifiers and roles.
    pub fn composition(substance: &Substance) -> Self {
        let canonical: Vec<String> = substance
            .components()
            .iter()
            .map(|component| format!("{}|{}", component.identifier, component.role.label()))
            .collect();

        Self(digest(&canonical.join(";")))
    }

    /// Full hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0[..12.min(self.0.len())])
    }
}

fn digest(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
