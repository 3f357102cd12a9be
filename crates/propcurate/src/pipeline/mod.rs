//! Pipeline execution: ordered stage application, workflows and caching.

mod cache;
mod config;
mod engine;

pub use cache::{CacheKey, CurationCache, DirectoryCache, MemoryCache};
pub use config::{MalformedPolicy, PipelineConfig, WorkflowSchema};
pub use engine::{CurationPipeline, CurationResult};
