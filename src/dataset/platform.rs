//! Concrete data sources and the platform builder that routes flags across
//! them.
//!
//! A platform dataset is a [`LinkCollection`] of interpreters: each interpreter
//! serves a handful of flags and may fetch sibling flags through the parent
//! handed to it in the [`FetchContext`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{
    Attributes, Dataset, DatasetMeta, DatasetRef, DatasetSetup, EMPTY_FLAG_INDEX, FetchContext,
    Flag, FlagIndex, LinkCollection,
};
use crate::cache::FetchCache;
use crate::dataset::DatasetConfig;
use crate::error::{Result, StudyError};
use crate::io::csv_table::read_table_from_path;
use crate::table::Table;

/// Dataset backed by tables held in memory.
#[derive(Debug, Clone)]
pub struct TableDataset {
    meta: DatasetMeta,
    tables: BTreeMap<Flag, Table>,
}

impl TableDataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: DatasetMeta::new(name),
            tables: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, flag: impl Into<Flag>, table: Table) -> Self {
        self.insert(flag, table);
        self
    }

    pub fn insert(&mut self, flag: impl Into<Flag>, table: Table) {
        self.tables.insert(flag.into(), table);
    }
}

impl DatasetSetup for TableDataset {
    fn meta_mut(&mut self) -> &mut DatasetMeta {
        &mut self.meta
    }
}

impl Dataset for TableDataset {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn kind(&self) -> &'static str {
        "table"
    }

    fn accepted_flags(&self) -> BTreeSet<Flag> {
        self.tables.keys().cloned().collect()
    }

    fn flag_is_accepted(&self, flag: &Flag) -> bool {
        self.tables.contains_key(flag)
    }

    fn attributes(&self) -> Attributes {
        self.meta.attributes.clone()
    }

    fn flag_index(&self) -> &FlagIndex {
        self.meta.flag_index.as_ref().unwrap_or(&EMPTY_FLAG_INDEX)
    }

    fn config(&self) -> &DatasetConfig {
        &self.meta.config
    }

    fn cache(&self) -> Option<&dyn FetchCache> {
        self.meta.cache.as_deref()
    }

    fn fetch_raw(&self, flag: &Flag, _ctx: &FetchContext<'_>) -> Result<Table> {
        self.tables
            .get(flag)
            .cloned()
            .ok_or_else(|| StudyError::UnknownFlag {
                dataset: self.meta.name.clone(),
                flag: flag.to_string(),
            })
    }
}

/// Dataset reading `<flag>.csv` files from a folder.
///
/// Flags are discovered once, when the folder is opened. Every file is read
/// with a single header row unless overridden per flag.
#[derive(Debug, Clone)]
pub struct CsvDirDataset {
    meta: DatasetMeta,
    folder: PathBuf,
    flags: BTreeSet<Flag>,
    header_rows: BTreeMap<Flag, usize>,
}

impl CsvDirDataset {
    /// Scans `folder` for `*.csv` files.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the folder cannot be listed.
    pub fn open(name: impl Into<String>, folder: impl AsRef<Path>) -> Result<Self> {
        let folder = folder.as_ref().to_path_buf();
        let mut flags = BTreeSet::new();
        for entry in fs::read_dir(&folder)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    flags.insert(Flag::from(stem));
                }
            }
        }
        let meta = DatasetMeta::new(name);
        debug!(dataset = %meta.name, folder = %folder.display(), flags = flags.len(), "opened csv folder");
        Ok(Self {
            meta,
            folder,
            flags,
            header_rows: BTreeMap::new(),
        })
    }

    pub fn with_header_rows(mut self, flag: impl Into<Flag>, rows: usize) -> Self {
        self.header_rows.insert(flag.into(), rows);
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

impl DatasetSetup for CsvDirDataset {
    fn meta_mut(&mut self) -> &mut DatasetMeta {
        &mut self.meta
    }
}

impl Dataset for CsvDirDataset {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn kind(&self) -> &'static str {
        "csv"
    }

    fn accepted_flags(&self) -> BTreeSet<Flag> {
        self.flags.clone()
    }

    fn flag_is_accepted(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    fn attributes(&self) -> Attributes {
        self.meta.attributes.clone()
    }

    fn flag_index(&self) -> &FlagIndex {
        self.meta.flag_index.as_ref().unwrap_or(&EMPTY_FLAG_INDEX)
    }

    fn config(&self) -> &DatasetConfig {
        &self.meta.config
    }

    fn cache(&self) -> Option<&dyn FetchCache> {
        self.meta.cache.as_deref()
    }

    fn fetch_raw(&self, flag: &Flag, _ctx: &FetchContext<'_>) -> Result<Table> {
        let path = self.folder.join(format!("{flag}.csv"));
        let rows = self.header_rows.get(flag).copied().unwrap_or(1);
        read_table_from_path(&path, rows)
    }
}

type DeriveFn = dyn Fn(&dyn Dataset, &FetchContext<'_>) -> Result<Table> + Send + Sync;

/// Interpreter computing one flag from other flags of its parent dataset.
pub struct DerivedFlag {
    meta: DatasetMeta,
    flag: Flag,
    inputs: Vec<Flag>,
    derive: Box<DeriveFn>,
}

impl DerivedFlag {
    /// # Arguments
    ///
    /// * `flag` - Flag this interpreter serves
    /// * `inputs` - Sibling flags the derivation reads (informational)
    /// * `derive` - Receives the parent dataset and the fetch context
    pub fn new<F>(flag: impl Into<Flag>, inputs: Vec<Flag>, derive: F) -> Self
    where
        F: Fn(&dyn Dataset, &FetchContext<'_>) -> Result<Table> + Send + Sync + 'static,
    {
        let flag = flag.into();
        Self {
            meta: DatasetMeta::new(format!("derived:{flag}")),
            flag,
            inputs,
            derive: Box::new(derive),
        }
    }

    pub fn inputs(&self) -> &[Flag] {
        &self.inputs
    }
}

impl fmt::Debug for DerivedFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedFlag")
            .field("flag", &self.flag)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl Dataset for DerivedFlag {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn kind(&self) -> &'static str {
        "derived"
    }

    fn accepted_flags(&self) -> BTreeSet<Flag> {
        BTreeSet::from([self.flag.clone()])
    }

    fn flag_is_accepted(&self, flag: &Flag) -> bool {
        *flag == self.flag
    }

    fn attributes(&self) -> Attributes {
        Attributes::new()
    }

    fn flag_index(&self) -> &FlagIndex {
        &EMPTY_FLAG_INDEX
    }

    fn config(&self) -> &DatasetConfig {
        &self.meta.config
    }

    /// # Errors
    ///
    /// Returns [`StudyError::MissingParent`] when fetched directly rather than
    /// through a platform.
    fn fetch_raw(&self, _flag: &Flag, ctx: &FetchContext<'_>) -> Result<Table> {
        let parent = ctx
            .parent
            .ok_or_else(|| StudyError::MissingParent(self.meta.name.clone()))?;
        (self.derive)(parent, ctx)
    }
}

/// Assembles a platform dataset from interpreters.
///
/// The result routes each flag to the first interpreter accepting it and
/// hands interpreters the platform as their parent.
#[derive(Debug)]
pub struct PlatformBuilder {
    name: String,
    interpreters: Vec<DatasetRef>,
    flag_index: FlagIndex,
    attributes: Attributes,
    config: DatasetConfig,
    cache: Option<Arc<dyn FetchCache>>,
}

impl PlatformBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interpreters: Vec::new(),
            flag_index: FlagIndex::default(),
            attributes: Attributes::new(),
            config: DatasetConfig::default(),
            cache: None,
        }
    }

    pub fn interpreter(mut self, interpreter: impl Dataset + 'static) -> Self {
        self.interpreters.push(Arc::new(interpreter));
        self
    }

    pub fn interpreter_ref(mut self, interpreter: DatasetRef) -> Self {
        self.interpreters.push(interpreter);
        self
    }

    /// Registers a [`DerivedFlag`] interpreter.
    pub fn derived<F>(self, flag: impl Into<Flag>, inputs: Vec<Flag>, derive: F) -> Self
    where
        F: Fn(&dyn Dataset, &FetchContext<'_>) -> Result<Table> + Send + Sync + 'static,
    {
        self.interpreter(DerivedFlag::new(flag, inputs, derive))
    }

    pub fn flag_index(mut self, index: FlagIndex) -> Self {
        self.flag_index = index;
        self
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn config(mut self, config: DatasetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn FetchCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// # Errors
    ///
    /// Returns [`StudyError::DuplicateDataset`] when two interpreters share a name.
    pub fn build(self) -> Result<LinkCollection> {
        let mut seen = BTreeSet::new();
        for interpreter in &self.interpreters {
            if !seen.insert(interpreter.name().to_string()) {
                return Err(StudyError::DuplicateDataset(interpreter.name().to_string()));
            }
        }
        let mut platform = LinkCollection::new(self.name, self.interpreters)
            .with_flag_index(self.flag_index)
            .with_attributes(self.attributes)
            .with_config(self.config)
            .with_kind("platform");
        if let Some(cache) = self.cache {
            platform = platform.with_cache(cache);
        }
        Ok(platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(values: Vec<f64>) -> Table {
        let index = (0..values.len()).map(|i| i.to_string()).collect();
        Table::from_numeric("t", index, vec![("n1", values)]).expect("table")
    }

    #[test]
    fn derived_flag_reads_siblings_through_parent() {
        let platform = PlatformBuilder::new("base")
            .interpreter(
                TableDataset::new("raw")
                    .with_table("Node.Price", numeric(vec![10.0, 20.0]))
                    .with_table("Node.Load", numeric(vec![1.0, 2.0])),
            )
            .derived(
                "Node.Cost",
                vec!["Node.Price".into(), "Node.Load".into()],
                |parent, _ctx| {
                    let price = parent.fetch(&"Node.Price".into())?;
                    let load = parent.fetch(&"Node.Load".into())?;
                    let cost: Vec<f64> = price
                        .numeric_column(&"n1".into())?
                        .iter()
                        .zip(load.numeric_column(&"n1".into())?)
                        .map(|(p, l)| p * l)
                        .collect();
                    Ok(numeric(cost))
                },
            )
            .build()
            .expect("platform");

        let cost = platform.fetch(&"Node.Cost".into()).expect("cost");
        assert_eq!(cost.numeric_column(&"n1".into()).expect("col"), vec![10.0, 40.0]);
        assert_eq!(platform.kind(), "platform");
        assert_eq!(platform.accepted_flags().len(), 3);
    }

    #[test]
    fn derived_flag_without_parent_fails() {
        let derived = DerivedFlag::new("x", Vec::new(), |_, _| Ok(numeric(vec![1.0])));
        let err = derived.fetch(&"x".into()).expect_err("no parent");
        assert!(matches!(err, StudyError::MissingParent(_)));
    }

    #[test]
    fn duplicate_interpreter_names_rejected() {
        let err = PlatformBuilder::new("p")
            .interpreter(TableDataset::new("a"))
            .interpreter(TableDataset::new("a"))
            .build()
            .expect_err("duplicate");
        assert!(matches!(err, StudyError::DuplicateDataset(_)));
    }

    #[test]
    fn csv_folder_discovers_flags() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("Node.Price.csv"), "time,n1\nt0,5\n").expect("write");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let ds = CsvDirDataset::open("base", dir.path()).expect("open");
        assert_eq!(ds.accepted_flags(), BTreeSet::from([Flag::from("Node.Price")]));
        let table = ds.fetch(&"Node.Price".into()).expect("fetch");
        assert_eq!(table.numeric_column(&"n1".into()).expect("col"), vec![5.0]);
    }
}
