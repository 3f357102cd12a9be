//! The curation pipeline: ordered application of stages to a data set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::curation::{DataSet, StageConfig, StageContext, StageEntry};
use crate::error::Result;
use crate::reindex::{IndexedDataSet, Reindexer};

use super::cache::{CacheKey, CurationCache};
use super::config::{PipelineConfig, WorkflowSchema};

/// Output of [`CurationPipeline::curate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationResult {
    /// The final data set with its provenance trail.
    pub data_set: DataSet,
    /// The final data set in canonical order.
    pub indexed: IndexedDataSet,
}

/// Runs an ordered list of stages over a data set.
///
/// Stages run strictly in the given order, one after another. Every stage
/// configuration is validated before any record is processed.
///
/// # Example
///
/// ```
/// use propcurate::curation::{DataSet, FilterByNComponents, StageConfig};
/// use propcurate::model::{PropertyRecord, PropertyType, Substance, ThermodynamicState};
/// use propcurate::pipeline::CurationPipeline;
///
/// let water = PropertyRecord::new(
///     Substance::pure("O").unwrap(),
///     ThermodynamicState::new(298.15, 101.325),
///     PropertyType::Density,
///     0.997,
/// );
/// let input = DataSet::ingest([("water", water)]);
///
/// let stages = [StageConfig::from(FilterByNComponents::exactly(1))];
/// let output = CurationPipeline::new().run(input, &stages).unwrap();
///
/// assert_eq!(output.len(), 1);
/// assert_eq!(output.provenance().len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct CurationPipeline {
    config: PipelineConfig,
    cache: Option<Arc<dyn CurationCache>>,
    reindexer: Reindexer,
}

impl CurationPipeline {
    /// Create a pipeline with default configuration and no cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pipeline with custom configuration.
    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Cache intermediate data sets.
    pub fn with_cache(mut self, cache: impl CurationCache + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Cache intermediate data sets in a shared cache.
    pub fn with_shared_cache(mut self, cache: Arc<dyn CurationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Apply `stages` to `input` in order.
    pub fn run(&self, input: DataSet, stages: &[StageConfig]) -> Result<DataSet> {
        for stage in stages {
            stage.validate()?;
        }

        info!(
            stages = stages.len(),
            records = input.len(),
            "Running curation pipeline"
        );

        let input_hash = match self.cache {
            Some(_) => Some(input.content_hash()?),
            None => None,
        };

        let (mut current, start) = match &input_hash {
            Some(hash) => self.resume(input, hash, stages)?,
            None => (input, 0),
        };

        for (position, config) in stages.iter().enumerate().skip(start) {
            current = self.apply_validated(&current, config)?;

            if let (Some(cache), Some(hash)) = (&self.cache, &input_hash) {
                let key = CacheKey::from_input_hash(hash, &self.config, &stages[..=position])?;
                cache.put(&key, &current)?;
            }
        }

        Ok(current)
    }

    /// Apply the stages of a workflow to `input`.
    pub fn run_workflow(&self, input: DataSet, workflow: &WorkflowSchema) -> Result<DataSet> {
        self.run(input, &workflow.stages)
    }

    /// Run the stages, then index the final data set.
    pub fn curate(&self, input: DataSet, stages: &[StageConfig]) -> Result<CurationResult> {
        let data_set = self.run(input, stages)?;
        let indexed = self.reindexer.index(&data_set);

        info!(records = indexed.len(), "Curation finished");

        Ok(CurationResult { data_set, indexed })
    }

    /// Apply a single stage.
    pub fn apply_stage(&self, data_set: &DataSet, config: &StageConfig) -> Result<DataSet> {
        config.validate()?;
        self.apply_validated(data_set, config)
    }

    fn apply_validated(&self, data_set: &DataSet, config: &StageConfig) -> Result<DataSet> {
        let stage = config.stage();
        let mut context = StageContext::new(stage.name(), self.config.malformed_records);

        let records = stage.apply(data_set.records(), &mut context)?;
        let entry = StageEntry::new(config, data_set.records(), &records, context.into_dropped());

        if entry.removed > 0 || entry.added > 0 {
            info!(
                stage = %entry.stage,
                removed = entry.removed,
                added = entry.added,
                remaining = entry.count_after,
                "{} data points were removed and {} added after applying the {} stage",
                entry.removed,
                entry.added,
                entry.stage
            );
        } else {
            debug!(stage = %entry.stage, records = entry.count_after, "Stage left data unchanged");
        }

        Ok(data_set.with_stage(records, entry))
    }

    /// Longest cached prefix of `stages` for this input, and its length.
    fn resume(
        &self,
        input: DataSet,
        input_hash: &str,
        stages: &[StageConfig],
    ) -> Result<(DataSet, usize)> {
        let Some(cache) = &self.cache else {
            return Ok((input, 0));
        };

        for end in (1..=stages.len()).rev() {
            let key = CacheKey::from_input_hash(input_hash, &self.config, &stages[..end])?;
            if let Some(cached) = cache.get(&key)? {
                debug!(key = %key, stages = end, "Resuming from cached data set");
                return Ok((cached, end));
            }
        }

        debug!("No cached data set found");
        Ok((input, 0))
    }
}

impl std::fmt::Debug for CurationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurationPipeline")
            .field("config", &self.config)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}
