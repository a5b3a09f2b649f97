use std::collections::HashMap;

use parking_lot::RwLock;

use super::{CacheKey, FetchCache};
use crate::dataset::Flag;
use crate::error::Result;
use crate::table::Table;

/// In-process cache. Entries live until deleted or the cache is dropped.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, Table>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl FetchCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Table>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &CacheKey, table: &Table) -> Result<()> {
        self.entries.write().insert(key.clone(), table.clone());
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    fn list_keys(&self, dataset: Option<&str>, flag: Option<&Flag>) -> Result<Vec<CacheKey>> {
        let mut keys: Vec<CacheKey> = self
            .entries
            .read()
            .keys()
            .filter(|k| k.matches(dataset, flag))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, dataset: Option<&str>, flag: Option<&Flag>) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !k.matches(dataset, flag));
        Ok(before - entries.len())
    }
}
