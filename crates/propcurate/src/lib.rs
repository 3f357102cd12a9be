//! Propcurate: curation of measured physical-property data sets.
//!
//! Raw collections of measured properties (densities, enthalpies of mixing,
//! dielectric constants and the like) are turned into clean, de-duplicated
//! and selected data sets by an ordered pipeline of configurable stages.
//!
//! # Core Principles
//!
//! - **Order matters**: stages run strictly in the order they are given
//! - **Non-destructive**: every stage returns a new data set
//! - **Full provenance**: every dropped record is listed with a reason
//!
//! # Example
//!
//! ```
//! use propcurate::curation::{ConvertToExcessMolarVolume, DataSet, FilterByNComponents};
//! use propcurate::model::{Component, PropertyRecord, PropertyType, Substance, ThermodynamicState};
//! use propcurate::pipeline::WorkflowSchema;
//! use propcurate::CurationPipeline;
//!
//! let state = ThermodynamicState::new(298.15, 101.325);
//! let density = |substance: Substance, value: f64| {
//!     PropertyRecord::new(substance, state, PropertyType::Density, value)
//! };
//!
//! let mixture = Substance::new([
//!     Component::fraction("O", 0.5),
//!     Component::fraction("CCO", 0.5),
//! ])
//! .unwrap();
//!
//! let input = DataSet::ingest([
//!     ("water", density(Substance::pure("O").unwrap(), 0.997)),
//!     ("ethanol", density(Substance::pure("CCO").unwrap(), 0.785)),
//!     ("mixture", density(mixture, 0.89)),
//! ]);
//!
//! let workflow = WorkflowSchema::default()
//!     .with_stage(
//!         ConvertToExcessMolarVolume::default()
//!             .with_molar_mass("O", 18.015)
//!             .with_molar_mass("CCO", 46.069),
//!     )
//!     .with_stage(FilterByNComponents::exactly(2));
//!
//! let output = CurationPipeline::new().run_workflow(input, &workflow).unwrap();
//!
//! assert_eq!(output.len(), 1);
//! assert_eq!(output.records()[0].property_type, PropertyType::ExcessMolarVolume);
//! ```

pub mod curation;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod reindex;

pub use curation::{DataSet, Stage, StageConfig, StageEntry};
pub use error::{CurationError, Result};
pub use model::{Component, PropertyRecord, PropertyType, Substance, ThermodynamicState};
pub use pipeline::{CurationPipeline, CurationResult, PipelineConfig, WorkflowSchema};
pub use reindex::{IndexedDataSet, Reindexer};
