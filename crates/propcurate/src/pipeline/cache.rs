//! Content-addressed caching of intermediate data sets.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::curation::{DataSet, StageConfig};
use crate::error::{CurationError, Result};

use super::config::PipelineConfig;

/// Key of a cached data set: SHA-256 over the content of the input records,
/// the pipeline configuration and the applied stage prefix.
///
/// The configuration is part of the key because it changes how a stage
/// treats malformed records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key of the data set produced by applying `stages` to `input`.
    pub fn new(input: &DataSet, config: &PipelineConfig, stages: &[StageConfig]) -> Result<Self> {
        Self::from_input_hash(&input.content_hash()?, config, stages)
    }

    /// Key from a precomputed [`DataSet::content_hash`].
    pub fn from_input_hash(
        input_hash: &str,
        config: &PipelineConfig,
        stages: &[StageConfig],
    ) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(input_hash.as_bytes());
        hasher.update(b"\n");
        hasher.update(serde_json::to_vec(config)?);
        hasher.update(b"\n");
        hasher.update(serde_json::to_vec(stages)?);
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Full hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0[..12.min(self.0.len())])
    }
}

/// Storage for intermediate data sets, injected into a pipeline.
pub trait CurationCache: Send + Sync {
    /// Look up a cached data set.
    fn get(&self, key: &CacheKey) -> Result<Option<DataSet>>;

    /// Store a data set.
    fn put(&self, key: &CacheKey, data_set: &DataSet) -> Result<()>;
}

/// In-process cache backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, DataSet>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached data sets.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> CurationError {
    CurationError::Cache("memory cache lock poisoned".to_string())
}

impl CurationCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<DataSet>> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &CacheKey, data_set: &DataSet) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(key.clone(), data_set.clone());
        Ok(())
    }
}

/// Cache storing one pretty-printed JSON file per key in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
}

impl DirectoryCache {
    /// Create a cache rooted at `root`. The directory is created on first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.json", key.as_str()))
    }
}

impl CurationCache for DirectoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<DataSet>> {
        let path = self.path(key);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CurationError::Io { path, source }),
        };

        let data_set = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(data_set))
    }

    fn put(&self, key: &CacheKey, data_set: &DataSet) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|source| CurationError::Io {
            path: self.root.clone(),
            source,
        })?;

        let path = self.path(key);
        let file = File::create(&path).map_err(|source| CurationError::Io {
            path: path.clone(),
            source,
        })?;

        serde_json::to_writer_pretty(BufWriter::new(file), data_set)?;
        Ok(())
    }
}
