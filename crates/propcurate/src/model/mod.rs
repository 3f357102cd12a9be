//! Value types describing what was measured: substances, states and records.

mod fingerprint;
mod record;
pub mod smiles;
mod substance;

pub use fingerprint::{Fingerprint, DEFAULT_PRECISION};
pub use record::{Phase, PropertyRecord, PropertyType, StateKey, ThermodynamicState};
pub use substance::{Amount, Component, ComponentRole, Substance, DEFAULT_TOLERANCE};
