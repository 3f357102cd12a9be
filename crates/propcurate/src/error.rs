//! Error types for the propcurate library.
//!
//! Only configuration-level problems are fatal. Per-record problems
//! ([`ConversionJoinError`], [`MalformedRecordError`]) are normally recorded in
//! the provenance trail and the offending record is excluded.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A substance composition that cannot be constructed.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum InvalidSubstanceError {
    /// No components were given.
    #[error("A substance must contain at least one component")]
    Empty,

    /// A component was given without an identifier.
    #[error("Component identifiers must not be empty")]
    EmptyIdentifier,

    /// The same component identifier appears more than once.
    #[error("Component '{0}' appears more than once")]
    DuplicateComponent(String),

    /// A mole fraction lies outside of [0, 1].
    #[error("Mole fraction {fraction} of '{component}' is outside of [0, 1]")]
    FractionOutOfRange { component: String, fraction: f64 },

    /// The mole fractions of one role do not sum to one.
    #[error("Mole fractions of the {role} components sum to {sum}, expected 1")]
    FractionSum { role: String, sum: f64 },

    /// An exact amount of zero was given.
    #[error("Exact amount of '{0}' must be a positive integer")]
    NonPositiveCount(String),
}

/// A stage was configured with invalid options.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Invalid configuration for stage '{stage}': {message}")]
pub struct StageConfigurationError {
    /// Name of the stage variant.
    pub stage: String,
    /// What is wrong with the options.
    pub message: String,
}

impl StageConfigurationError {
    /// Create a new configuration error for a stage.
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// A converter could not find every counterpart a record requires.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("No counterpart for {missing:?} found for record '{source_id}' at {state}")]
pub struct ConversionJoinError {
    /// Source identifier of the record that could not be converted.
    pub source_id: String,
    /// Human-readable state the join was attempted at.
    pub state: String,
    /// Component identifiers with no matching counterpart record.
    pub missing: Vec<String>,
}

/// A record violates the structural assumptions of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Malformed record '{source_id}': {message}")]
pub struct MalformedRecordError {
    /// Source identifier of the record.
    pub source_id: String,
    /// What is wrong with it.
    pub message: String,
}

impl MalformedRecordError {
    /// Create a new malformed record error.
    pub fn new(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            message: message.into(),
        }
    }
}

/// Main error type for curation operations.
#[derive(Debug, Error)]
pub enum CurationError {
    /// Invalid substance composition.
    #[error(transparent)]
    InvalidSubstance(#[from] InvalidSubstanceError),

    /// Invalid stage configuration, raised before any record is processed.
    #[error(transparent)]
    StageConfiguration(#[from] StageConfigurationError),

    /// Malformed record encountered while malformed input is treated as fatal.
    #[error(transparent)]
    MalformedRecord(#[from] MalformedRecordError),

    /// Error reading or writing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cache collaborator failure.
    #[error("Cache error: {0}")]
    Cache(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for curation operations.
pub type Result<T> = std::result::Result<T, CurationError>;
