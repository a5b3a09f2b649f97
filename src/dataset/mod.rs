//! Datasets: named sources that turn a [`Flag`] into a [`Table`].
//!
//! Every dataset implements [`Dataset::fetch_raw`]; the provided
//! [`Dataset::fetch`] wraps it in the shared pipeline (flag check, cache
//! lookup, post-processing, cache fill). Collections and comparisons are
//! datasets themselves, so they nest freely.

mod attributes;
pub mod collection;
pub mod comparison;
mod config;
mod flag;
pub mod platform;
pub mod query;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{CacheKey, FetchCache};
use crate::error::{Result, StudyError};
use crate::table::Table;

pub use attributes::{AttributeValue, Attributes, intersect_attributes};
pub use collection::{
    ConcatCollection, DATASET_LEVEL, LinkCollection, MergeCollection, SumCollection, group_by_attribute,
};
pub use comparison::DatasetComparison;
pub use config::{ConfigOverrides, DatasetConfig};
pub use flag::{Flag, FlagIndex};
pub use platform::{CsvDirDataset, DerivedFlag, PlatformBuilder, TableDataset};
pub use query::{GroupAggregation, ModelPropertyFilter};

pub(crate) static EMPTY_FLAG_INDEX: FlagIndex = FlagIndex::empty();

/// Shared handle to any dataset.
pub type DatasetRef = Arc<dyn Dataset>;

/// Context handed to [`Dataset::fetch_raw`].
#[derive(Clone, Copy)]
pub struct FetchContext<'a> {
    /// Effective config for this fetch.
    pub config: &'a DatasetConfig,
    /// Enclosing dataset, when fetched through a collection. Interpreters use
    /// it to fetch sibling flags.
    pub parent: Option<&'a dyn Dataset>,
}

impl fmt::Debug for FetchContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("config", self.config)
            .field("parent", &self.parent.map(|p| p.name()))
            .finish()
    }
}

/// Name, metadata, config and cache shared by every concrete dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetMeta {
    pub name: String,
    pub attributes: Attributes,
    pub flag_index: Option<FlagIndex>,
    pub config: DatasetConfig,
    pub cache: Option<Arc<dyn FetchCache>>,
}

impl DatasetMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Builder-style setters for anything holding a [`DatasetMeta`].
pub trait DatasetSetup: Sized {
    fn meta_mut(&mut self) -> &mut DatasetMeta;

    fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set_attribute(key, value);
        self
    }

    fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.meta_mut().attributes.extend(attributes);
        self
    }

    fn with_config(mut self, config: DatasetConfig) -> Self {
        self.meta_mut().config = config;
        self
    }

    fn with_cache(mut self, cache: Arc<dyn FetchCache>) -> Self {
        self.meta_mut().cache = Some(cache);
        self
    }

    fn with_flag_index(mut self, index: FlagIndex) -> Self {
        self.meta_mut().flag_index = Some(index);
        self
    }

    fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.meta_mut().attributes.insert(key.into(), value.into());
    }
}

/// A named source of tables.
pub trait Dataset: Send + Sync {
    fn name(&self) -> &str;

    /// Short type label (`"csv"`, `"concat"`, `"comparison"`, ...).
    fn kind(&self) -> &'static str;

    /// Every flag this dataset can serve.
    fn accepted_flags(&self) -> BTreeSet<Flag>;

    fn flag_is_accepted(&self, flag: &Flag) -> bool {
        self.accepted_flags().contains(flag)
    }

    fn attributes(&self) -> Attributes;

    fn flag_index(&self) -> &FlagIndex;

    fn config(&self) -> &DatasetConfig;

    fn cache(&self) -> Option<&dyn FetchCache> {
        None
    }

    /// Produces the unprocessed table for an accepted flag.
    ///
    /// # Errors
    ///
    /// Source-specific; see the implementing type.
    fn fetch_raw(&self, flag: &Flag, ctx: &FetchContext<'_>) -> Result<Table>;

    /// Child datasets, for collections and comparisons.
    fn members(&self) -> &[DatasetRef] {
        &[]
    }

    fn as_comparison(&self) -> Option<&DatasetComparison> {
        None
    }

    /// Fetches `flag` with the dataset's own config.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::UnknownFlag`] for flags outside
    /// [`Dataset::accepted_flags`], plus any error raised by the source or cache.
    fn fetch(&self, flag: &Flag) -> Result<Table> {
        run_fetch(self, flag, &ConfigOverrides::default(), None)
    }

    /// Fetches `flag` with per-call overrides of the dataset config.
    fn fetch_with(&self, flag: &Flag, overrides: &ConfigOverrides) -> Result<Table> {
        run_fetch(self, flag, overrides, None)
    }

    /// Fetch on behalf of an enclosing dataset; `parent` is exposed to
    /// [`Dataset::fetch_raw`] through the [`FetchContext`].
    fn fetch_in(
        &self,
        flag: &Flag,
        overrides: &ConfigOverrides,
        parent: Option<&dyn Dataset>,
    ) -> Result<Table> {
        run_fetch(self, flag, overrides, parent)
    }

    /// Accepted flags containing `needle`.
    fn flags_containing(&self, needle: &str, match_case: bool) -> BTreeSet<Flag> {
        let needle_lower = needle.to_lowercase();
        self.accepted_flags()
            .into_iter()
            .filter(|flag| {
                if match_case {
                    flag.as_str().contains(needle)
                } else {
                    flag.as_str().to_lowercase().contains(&needle_lower)
                }
            })
            .collect()
    }

    /// Fetches several flags and stacks them under a new top column level
    /// named `level_name`.
    fn fetch_many(&self, flags: &[Flag], level_name: &str) -> Result<Table> {
        let parts = flags
            .iter()
            .map(|flag| Ok((flag.to_string(), self.fetch(flag)?)))
            .collect::<Result<Vec<_>>>()?;
        Table::concat_columns(&parts, level_name, true)
    }

    /// Fetches `flag` and keeps only objects whose model properties pass `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::Kpi`] when no model flag is linked to `flag`.
    fn fetch_filtered(&self, flag: &Flag, filter: &ModelPropertyFilter) -> Result<Table> {
        let data = self.fetch(flag)?;
        let model = self.fetch(&linked_model_flag(self, flag)?)?;
        query::filter_by_model_properties(&data, &model, filter)
    }

    /// Fetches `flag` and aggregates object columns sharing a model property value.
    fn fetch_grouped(
        &self,
        flag: &Flag,
        property: &str,
        aggregation: GroupAggregation,
    ) -> Result<Table> {
        let data = self.fetch(flag)?;
        let model = self.fetch(&linked_model_flag(self, flag)?)?;
        query::group_by_model_property(&data, &model, property, aggregation)
    }
}

impl fmt::Debug for dyn Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

fn linked_model_flag<D: Dataset + ?Sized>(dataset: &D, flag: &Flag) -> Result<Flag> {
    dataset.flag_index().linked_model_flag(flag).ok_or_else(|| {
        StudyError::Kpi(format!(
            "no model flag linked to `{flag}` in dataset `{}`",
            dataset.name()
        ))
    })
}

/// Shared fetch pipeline behind [`Dataset::fetch`].
fn run_fetch<D: Dataset + ?Sized>(
    dataset: &D,
    flag: &Flag,
    overrides: &ConfigOverrides,
    parent: Option<&dyn Dataset>,
) -> Result<Table> {
    if !dataset.flag_is_accepted(flag) {
        return Err(StudyError::UnknownFlag {
            dataset: dataset.name().to_string(),
            flag: flag.to_string(),
        });
    }

    let config = dataset.config().merge(overrides);
    let cache = dataset.cache().filter(|_| config.use_cache);
    let key = CacheKey::new(dataset.name(), flag, &config);

    if let Some(cache) = cache {
        if let Some(hit) = cache.get(&key)? {
            debug!(dataset = dataset.name(), %flag, "cache hit");
            return Ok(hit);
        }
    }

    let ctx = FetchContext {
        config: &config,
        parent,
    };
    let mut table = dataset.fetch_raw(flag, &ctx)?;
    post_process(dataset.name(), flag, &mut table, &config);

    if let Some(cache) = cache {
        cache.set(&key, &table)?;
    }
    Ok(table)
}

fn post_process(dataset: &str, flag: &Flag, table: &mut Table, config: &DatasetConfig) {
    if config.remove_duplicate_indices && table.has_duplicate_index() {
        let dropped = table.drop_duplicate_index();
        warn!(dataset, %flag, dropped, "removed duplicate row labels");
    }
    if config.auto_sort_datetime_index && table.sort_index_if_datetime() {
        debug!(dataset, %flag, "sorted datetime index");
    }
}
