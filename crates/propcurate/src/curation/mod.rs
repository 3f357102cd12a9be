//! Curation stages and the data sets they transform.
//!
//! A stage is one configured transformation of a record collection:
//!
//! - **Filters** keep or drop each record on its own merits.
//! - **Converters** join records and derive new quantities.
//! - **Selectors** keep representatives of groups of records.
//!
//! Every application of a stage appends a [`StageEntry`] to the data set's
//! provenance trail, listing every dropped record and why.
//!
//! # Usage
//!
//! ```
//! use propcurate::curation::{FilterByNComponents, Stage, StageContext};
//! use propcurate::pipeline::MalformedPolicy;
//!
//! let stage = FilterByNComponents::exactly(1);
//! stage.validate().unwrap();
//!
//! let mut context = StageContext::new(stage.name(), MalformedPolicy::Skip);
//! let output = stage.apply(&[], &mut context).unwrap();
//! assert!(output.is_empty());
//! ```

mod converters;
mod dataset;
mod filters;
mod provenance;
mod selectors;
mod stage;

pub use converters::ConvertToExcessMolarVolume;
pub use dataset::DataSet;
pub use filters::{
    FilterByCharged, FilterByComponents, FilterByElements, FilterByIonicLiquid,
    FilterByMoleFraction, FilterByNComponents, FilterByPressure, FilterByPropertyTypes,
    FilterByRacemic, FilterByRoles, FilterBySubstances, FilterByTemperature,
};
pub use provenance::{DropReason, DroppedRecord, StageEntry};
pub use selectors::{FilterDuplicates, SelectPerSubstance, SelectStatePoints, StatePoint, TargetState};
pub use stage::{preference, preferred, Stage, StageConfig, StageContext, StageKind};
