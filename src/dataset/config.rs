//! Per-dataset fetch behaviour and per-call overrides.

use serde::{Deserialize, Serialize};

/// Controls caching and post-processing of fetched tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetConfig {
    /// Consult and fill the attached cache, if any.
    pub use_cache: bool,
    /// Sort rows chronologically when every row label is a timestamp.
    pub auto_sort_datetime_index: bool,
    /// Drop repeated row labels, keeping the first.
    pub remove_duplicate_indices: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            auto_sort_datetime_index: true,
            remove_duplicate_indices: true,
        }
    }
}

/// Partial config applied on top of a [`DatasetConfig`]; `None` keeps the base value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub use_cache: Option<bool>,
    pub auto_sort_datetime_index: Option<bool>,
    pub remove_duplicate_indices: Option<bool>,
}

impl DatasetConfig {
    /// Returns `self` with every set override applied.
    pub fn merge(&self, overrides: &ConfigOverrides) -> Self {
        Self {
            use_cache: overrides.use_cache.unwrap_or(self.use_cache),
            auto_sort_datetime_index: overrides
                .auto_sort_datetime_index
                .unwrap_or(self.auto_sort_datetime_index),
            remove_duplicate_indices: overrides
                .remove_duplicate_indices
                .unwrap_or(self.remove_duplicate_indices),
        }
    }
}

impl From<DatasetConfig> for ConfigOverrides {
    fn from(config: DatasetConfig) -> Self {
        Self {
            use_cache: Some(config.use_cache),
            auto_sort_datetime_index: Some(config.auto_sort_datetime_index),
            remove_duplicate_indices: Some(config.remove_duplicate_indices),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_everything() {
        let cfg = DatasetConfig::default();
        assert!(cfg.use_cache && cfg.auto_sort_datetime_index && cfg.remove_duplicate_indices);
    }

    #[test]
    fn merge_only_touches_set_fields() {
        let base = DatasetConfig::default();
        let merged = base.merge(&ConfigOverrides {
            use_cache: Some(false),
            ..ConfigOverrides::default()
        });
        assert!(!merged.use_cache);
        assert!(merged.auto_sort_datetime_index);
    }

    #[test]
    fn full_overrides_replace_base() {
        let parent = DatasetConfig {
            use_cache: false,
            auto_sort_datetime_index: false,
            remove_duplicate_indices: false,
        };
        let child = DatasetConfig::default().merge(&parent.into());
        assert_eq!(child, parent);
    }
}
