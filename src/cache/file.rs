use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{CacheKey, FetchCache};
use crate::dataset::Flag;
use crate::error::{Result, StudyError};
use crate::table::Table;

/// Persists each entry as `<folder>/<key stem>.json`, holding the key and
/// the table.
#[derive(Debug, Clone)]
pub struct FileCache {
    folder: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct Entry {
    key: CacheKey,
    table: Table,
}

impl FileCache {
    /// Opens (and creates if needed) a cache folder.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the folder cannot be created.
    pub fn open(folder: impl AsRef<Path>) -> Result<Self> {
        let folder = folder.as_ref().to_path_buf();
        fs::create_dir_all(&folder)?;
        Ok(Self { folder })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.folder.join(format!("{}.json", key.file_stem()))
    }

    fn read_entry(path: &Path) -> Result<Entry> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| StudyError::Cache(format!("{}: {e}", path.display())))
    }

    /// Every `(path, key)` pair stored in the folder.
    fn entries(&self) -> Result<Vec<(PathBuf, CacheKey)>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.folder)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let key = Self::read_entry(&path)?.key;
                out.push((path, key));
            }
        }
        Ok(out)
    }
}

impl FetchCache for FileCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Table>> {
        let path = self.path_for(key);
        let entry = match Self::read_entry(&path) {
            Ok(entry) => entry,
            Err(StudyError::Io(e)) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        entry.table.validate()?;
        Ok(Some(entry.table))
    }

    fn set(&self, key: &CacheKey, table: &Table) -> Result<()> {
        let entry = Entry {
            key: key.clone(),
            table: table.clone(),
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| StudyError::Cache(format!("serialize {key}: {e}")))?;
        fs::write(self.path_for(key), json)?;
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.path_for(key).exists())
    }

    fn list_keys(&self, dataset: Option<&str>, flag: Option<&Flag>) -> Result<Vec<CacheKey>> {
        let mut keys: Vec<CacheKey> = self
            .entries()?
            .into_iter()
            .map(|(_, key)| key)
            .filter(|k| k.matches(dataset, flag))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, dataset: Option<&str>, flag: Option<&Flag>) -> Result<usize> {
        let mut removed = 0;
        for (path, key) in self.entries()? {
            if key.matches(dataset, flag) {
                fs::remove_file(path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
