//! Fetch caches keyed by dataset, flag and effective config.
//!
//! Two backends ship with the crate: [`MemoryCache`] for the lifetime of a
//! process and [`FileCache`], which persists tables as JSON files so a study
//! can be reopened without re-reading its sources.

mod file;
mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dataset::{DatasetConfig, Flag};
use crate::error::Result;
use crate::table::Table;

pub use file::FileCache;
pub use memory::MemoryCache;

/// Identifies one cached fetch result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    dataset: String,
    flag: Flag,
    config_digest: String,
}

impl CacheKey {
    pub fn new(dataset: &str, flag: &Flag, config: &DatasetConfig) -> Self {
        Self {
            dataset: dataset.to_string(),
            flag: flag.clone(),
            config_digest: config_digest(config),
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn flag(&self) -> &Flag {
        &self.flag
    }

    /// `true` if the key belongs to `dataset` and `flag` (`None` matches anything).
    pub fn matches(&self, dataset: Option<&str>, flag: Option<&Flag>) -> bool {
        dataset.is_none_or(|d| d == self.dataset) && flag.is_none_or(|f| *f == self.flag)
    }

    /// Filesystem-safe name: sanitized dataset and flag plus the config digest.
    pub fn file_stem(&self) -> String {
        format!(
            "{}__{}__{}",
            sanitize(&self.dataset),
            sanitize(self.flag.as_str()),
            self.config_digest
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.dataset, self.flag, self.config_digest)
    }
}

/// Storage for fetched tables.
///
/// Implementations must be safe to share between threads; the API layer
/// serves concurrent requests against the same study.
pub trait FetchCache: Send + Sync + fmt::Debug {
    /// Returns a copy of the cached table, if present.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StudyError::Cache`] when the backend cannot be read.
    fn get(&self, key: &CacheKey) -> Result<Option<Table>>;

    /// Stores a copy of `table` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StudyError::Cache`] when the backend cannot be written.
    fn set(&self, key: &CacheKey, table: &Table) -> Result<()>;

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Keys stored for `dataset` and `flag`; `None` matches anything.
    fn list_keys(&self, dataset: Option<&str>, flag: Option<&Flag>) -> Result<Vec<CacheKey>>;

    /// Removes the entries [`FetchCache::list_keys`] would return and reports
    /// how many were dropped.
    fn delete(&self, dataset: Option<&str>, flag: Option<&Flag>) -> Result<usize>;

    /// Drops every entry.
    fn clear(&self) -> Result<()> {
        self.delete(None, None).map(|_| ())
    }
}

fn config_digest(config: &DatasetConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update([
        u8::from(config.use_cache),
        u8::from(config.auto_sort_datetime_index),
        u8::from(config.remove_duplicate_indices),
    ]);
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}
