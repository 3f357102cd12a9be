//! Pipeline configuration and serialized workflows.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::curation::StageConfig;
use crate::error::{CurationError, Result, StageConfigurationError};

/// What to do with a record that violates a stage's structural assumptions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Log the record, note it in the trail and exclude it.
    #[default]
    Skip,
    /// Abort the run.
    Fatal,
}

/// Configuration for a curation pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Handling of malformed records.
    #[serde(default)]
    pub malformed_records: MalformedPolicy,
}

impl PipelineConfig {
    /// Set the malformed record policy.
    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.malformed_records = policy;
        self
    }
}

/// An ordered list of stage configurations.
///
/// # Example
///
/// ```
/// use propcurate::pipeline::WorkflowSchema;
///
/// let workflow = WorkflowSchema::from_json_str(r#"{
///     "stages": [
///         {"type": "FilterByTemperature", "minimum": 290.0, "maximum": 320.0},
///         {"type": "FilterDuplicates"}
///     ]
/// }"#).unwrap();
///
/// assert_eq!(workflow.stages.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSchema {
    /// Stages, in application order.
    pub stages: Vec<StageConfig>,
}

impl WorkflowSchema {
    /// Create a workflow from stage configurations.
    pub fn new(stages: impl IntoIterator<Item = StageConfig>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
        }
    }

    /// Append a stage.
    pub fn with_stage(mut self, stage: impl Into<StageConfig>) -> Self {
        self.stages.push(stage.into());
        self
    }

    /// Parse a workflow from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the workflow to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a workflow from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let file = File::open(path).map_err(|source| CurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Save the workflow to a JSON file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let io_error = |source: std::io::Error| CurationError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
        }

        let file = File::create(path).map_err(io_error)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;

        Ok(())
    }

    /// Validate every stage, returning the first configuration error.
    pub fn validate(&self) -> std::result::Result<(), StageConfigurationError> {
        self.stages.iter().try_for_each(StageConfig::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curation::{FilterByNComponents, FilterDuplicates};
    use tempfile::TempDir;

    #[test]
    fn test_default_policy_is_skip() {
        assert_eq!(PipelineConfig::default().malformed_records, MalformedPolicy::Skip);
        let config = PipelineConfig::default().with_malformed_policy(MalformedPolicy::Fatal);
        assert_eq!(config.malformed_records, MalformedPolicy::Fatal);
    }

    #[test]
    fn test_workflow_defaults_from_json() {
        let workflow = WorkflowSchema::from_json_str(
            r#"{"stages": [{"type": "FilterDuplicates"}, {"type": "SelectPerSubstance"}]}"#,
        )
        .unwrap();

        assert_eq!(
            workflow.stages[0],
            StageConfig::FilterDuplicates(FilterDuplicates::default())
        );
        assert!(workflow.validate().is_ok());
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        let result = WorkflowSchema::from_json_str(r#"{"stages": [{"type": "Nope"}]}"#);
        assert!(matches!(result, Err(CurationError::Json(_))));
    }

    #[test]
    fn test_validate_reports_first_error() {
        let workflow = WorkflowSchema::default()
            .with_stage(FilterDuplicates::default())
            .with_stage(FilterByNComponents::default());

        let error = workflow.validate().unwrap_err();
        assert_eq!(error.stage, "FilterByNComponents");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("workflow.json");

        let workflow = WorkflowSchema::default()
            .with_stage(FilterByNComponents::exactly(2))
            .with_stage(FilterDuplicates::default());
        workflow.save(&path).unwrap();

        let loaded = WorkflowSchema::load(&path).unwrap();
        assert_eq!(loaded, workflow);
    }

    #[test]
    fn test_load_missing_file() {
        let result = WorkflowSchema::load("/nonexistent/workflow.json");
        assert!(matches!(result, Err(CurationError::Io { .. })));
    }
}
