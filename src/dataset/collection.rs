//! Collections: datasets composed of other datasets.
//!
//! - [`LinkCollection`] routes each flag to the first member accepting it.
//! - [`MergeCollection`] combines the fragments every accepting member returns.
//! - [`ConcatCollection`] stacks member tables under a new column level.
//! - [`SumCollection`] adds member tables element-wise.
//!
//! Members receive the collection's effective config and see the collection
//! as their parent.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::{
    Attributes, ConfigOverrides, Dataset, DatasetConfig, DatasetMeta, DatasetRef, DatasetSetup,
    EMPTY_FLAG_INDEX, FetchContext, Flag, FlagIndex, intersect_attributes,
};
use crate::cache::FetchCache;
use crate::error::{Result, StudyError};
use crate::table::{Cell, ColumnKey, Table};

/// Default column level name for [`ConcatCollection`].
pub const DATASET_LEVEL: &str = "dataset";

/// Ordered, name-unique member list.
#[derive(Debug, Clone, Default)]
struct Members {
    items: Vec<DatasetRef>,
}

impl Members {
    fn new(collection: &str, items: Vec<DatasetRef>) -> Self {
        let mut members = Self::default();
        for item in items {
            members.add(collection, item);
        }
        members
    }

    /// Adds `item`, replacing a member with the same name in place.
    fn add(&mut self, collection: &str, item: DatasetRef) {
        if let Some(slot) = self.items.iter_mut().find(|m| m.name() == item.name()) {
            warn!(collection, dataset = item.name(), "replacing member with the same name");
            *slot = item;
        } else {
            self.items.push(item);
        }
    }

    fn get(&self, name: &str) -> Option<&DatasetRef> {
        self.items.iter().find(|m| m.name() == name)
    }

    fn flags(&self) -> BTreeSet<Flag> {
        self.items.iter().flat_map(|m| m.accepted_flags()).collect()
    }

    fn accepting<'a>(&'a self, flag: &'a Flag) -> impl Iterator<Item = &'a DatasetRef> + 'a {
        self.items.iter().filter(move |m| m.flag_is_accepted(flag))
    }

    /// Member attributes they all agree on, overlaid with `own`.
    fn attributes(&self, own: &Attributes) -> Attributes {
        let member_attrs: Vec<Attributes> = self.items.iter().map(|m| m.attributes()).collect();
        let mut attrs = intersect_attributes(&member_attrs);
        attrs.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
        attrs
    }

    fn flag_index<'a>(&'a self, own: Option<&'a FlagIndex>) -> &'a FlagIndex {
        own.or_else(|| self.items.first().map(|m| m.flag_index()))
            .unwrap_or(&EMPTY_FLAG_INDEX)
    }

    /// Fetches `flag` from every accepting member, keyed by member name.
    fn fetch_each(
        &self,
        flag: &Flag,
        ctx: &FetchContext<'_>,
        parent: &dyn Dataset,
    ) -> Result<Vec<(String, Table)>> {
        let overrides = ConfigOverrides::from(*ctx.config);
        self.accepting(flag)
            .map(|m| Ok((m.name().to_string(), m.fetch_in(flag, &overrides, Some(parent))?)))
            .collect()
    }
}

fn no_member(collection: &str, flag: &Flag) -> StudyError {
    StudyError::UnknownFlag {
        dataset: collection.to_string(),
        flag: flag.to_string(),
    }
}

/// Routes each flag to the first member that accepts it.
#[derive(Debug, Clone)]
pub struct LinkCollection {
    meta: DatasetMeta,
    members: Members,
    kind: &'static str,
}

impl LinkCollection {
    pub fn new(name: impl Into<String>, members: Vec<DatasetRef>) -> Self {
        let meta = DatasetMeta::new(name);
        let members = Members::new(&meta.name, members);
        let link = Self {
            meta,
            members,
            kind: "link",
        };
        link.warn_overlaps();
        link
    }

    fn warn_overlaps(&self) {
        let mut owners: BTreeMap<Flag, &str> = BTreeMap::new();
        for member in &self.members.items {
            for flag in member.accepted_flags() {
                match owners.get(&flag) {
                    Some(first) => warn!(
                        collection = %self.meta.name,
                        %flag,
                        first,
                        shadowed = member.name(),
                        "flag served by several members, first wins"
                    ),
                    None => {
                        owners.insert(flag, member.name());
                    }
                }
            }
        }
    }

    /// Overrides the reported [`Dataset::kind`].
    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    pub fn add(&mut self, member: DatasetRef) {
        self.members.add(&self.meta.name, member);
    }

    pub fn get(&self, name: &str) -> Option<&DatasetRef> {
        self.members.get(name)
    }
}

impl DatasetSetup for LinkCollection {
    fn meta_mut(&mut self) -> &mut DatasetMeta {
        &mut self.meta
    }
}

impl Dataset for LinkCollection {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn accepted_flags(&self) -> BTreeSet<Flag> {
        self.members.flags()
    }

    fn flag_is_accepted(&self, flag: &Flag) -> bool {
        self.members.items.iter().any(|m| m.flag_is_accepted(flag))
    }

    fn attributes(&self) -> Attributes {
        self.members.attributes(&self.meta.attributes)
    }

    fn flag_index(&self) -> &FlagIndex {
        self.members.flag_index(self.meta.flag_index.as_ref())
    }

    fn config(&self) -> &DatasetConfig {
        &self.meta.config
    }

    fn cache(&self) -> Option<&dyn FetchCache> {
        self.meta.cache.as_deref()
    }

    fn members(&self) -> &[DatasetRef] {
        &self.members.items
    }

    fn fetch_raw(&self, flag: &Flag, ctx: &FetchContext<'_>) -> Result<Table> {
        let member = self
            .members
            .accepting(flag)
            .next()
            .ok_or_else(|| no_member(&self.meta.name, flag))?;
        debug!(collection = %self.meta.name, member = member.name(), %flag, "routing fetch");
        member.fetch_in(flag, &ConfigOverrides::from(*ctx.config), Some(self as &dyn Dataset))
    }
}

/// Combines the fragments returned by every member accepting a flag.
///
/// Fragments sharing rows but not columns are joined side by side; fragments
/// sharing columns but not rows are stacked; otherwise earlier members win
/// (`keep_first`) or later members win.
#[derive(Debug, Clone)]
pub struct MergeCollection {
    meta: DatasetMeta,
    members: Members,
    keep_first: bool,
}

impl MergeCollection {
    pub fn new(name: impl Into<String>, members: Vec<DatasetRef>) -> Self {
        let meta = DatasetMeta::new(name);
        let members = Members::new(&meta.name, members);
        Self {
            meta,
            members,
            keep_first: true,
        }
    }

    pub fn with_keep_first(mut self, keep_first: bool) -> Self {
        self.keep_first = keep_first;
        self
    }

    pub fn add(&mut self, member: DatasetRef) {
        self.members.add(&self.meta.name, member);
    }
}

impl DatasetSetup for MergeCollection {
    fn meta_mut(&mut self) -> &mut DatasetMeta {
        &mut self.meta
    }
}

impl Dataset for MergeCollection {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn kind(&self) -> &'static str {
        "merge"
    }

    fn accepted_flags(&self) -> BTreeSet<Flag> {
        self.members.flags()
    }

    fn flag_is_accepted(&self, flag: &Flag) -> bool {
        self.members.items.iter().any(|m| m.flag_is_accepted(flag))
    }

    fn attributes(&self) -> Attributes {
        self.members.attributes(&self.meta.attributes)
    }

    fn flag_index(&self) -> &FlagIndex {
        self.members.flag_index(self.meta.flag_index.as_ref())
    }

    fn config(&self) -> &DatasetConfig {
        &self.meta.config
    }

    fn cache(&self) -> Option<&dyn FetchCache> {
        self.meta.cache.as_deref()
    }

    fn members(&self) -> &[DatasetRef] {
        &self.members.items
    }

    fn fetch_raw(&self, flag: &Flag, ctx: &FetchContext<'_>) -> Result<Table> {
        let fragments: Vec<Table> = self
            .members
            .fetch_each(flag, ctx, self)?
            .into_iter()
            .map(|(_, table)| table)
            .collect();
        if fragments.is_empty() {
            return Err(no_member(&self.meta.name, flag));
        }
        Table::combine(fragments, self.keep_first)
    }
}

/// Stacks member tables under a new column level holding member names.
#[derive(Debug, Clone)]
pub struct ConcatCollection {
    meta: DatasetMeta,
    members: Members,
    level_name: String,
    on_top: bool,
}

impl ConcatCollection {
    pub fn new(name: impl Into<String>, members: Vec<DatasetRef>) -> Self {
        let meta = DatasetMeta::new(name);
        let members = Members::new(&meta.name, members);
        Self {
            meta,
            members,
            level_name: DATASET_LEVEL.to_string(),
            on_top: true,
        }
    }

    /// Name of the added column level (default `"dataset"`).
    pub fn with_level_name(mut self, level_name: impl Into<String>) -> Self {
        self.level_name = level_name.into();
        self
    }

    /// Place the member level at the bottom instead of the top.
    pub fn with_level_at_bottom(mut self) -> Self {
        self.on_top = false;
        self
    }

    pub fn level_name(&self) -> &str {
        &self.level_name
    }

    pub fn add(&mut self, member: DatasetRef) {
        self.members.add(&self.meta.name, member);
    }

    pub fn get(&self, name: &str) -> Option<&DatasetRef> {
        self.members.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.members.items.iter().map(|m| m.name()).collect()
    }

    /// Fetches `flag` from the members and merges the results instead of
    /// stacking them.
    ///
    /// # Errors
    ///
    /// See [`MergeCollection`].
    pub fn fetch_merged(&self, flag: &Flag, keep_first: bool) -> Result<Table> {
        let merged = MergeCollection::new(self.meta.name.clone(), self.members.items.clone())
            .with_config(self.meta.config)
            .with_keep_first(keep_first);
        merged.fetch(flag)
    }

    /// One row per member, one column per attribute key (missing keys stay empty).
    pub fn attributes_table(&self) -> Result<Table> {
        let index = self.names().into_iter().map(str::to_string).collect();
        let mut table = Table::new(self.level_name.clone(), index);

        let per_member: Vec<Attributes> = self.members.items.iter().map(|m| m.attributes()).collect();
        let mut keys: Vec<&String> = Vec::new();
        for attrs in &per_member {
            for key in attrs.keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        for key in keys {
            let cells = per_member
                .iter()
                .map(|attrs| attrs.get(key).map_or(Cell::Empty, Cell::from))
                .collect();
            table.push_column(ColumnKey::single(key.clone()), cells)?;
        }
        table.set_level_names(vec!["attribute".to_string()])?;
        Ok(table)
    }
}

impl DatasetSetup for ConcatCollection {
    fn meta_mut(&mut self) -> &mut DatasetMeta {
        &mut self.meta
    }
}

impl Dataset for ConcatCollection {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn kind(&self) -> &'static str {
        "concat"
    }

    fn accepted_flags(&self) -> BTreeSet<Flag> {
        self.members.flags()
    }

    fn flag_is_accepted(&self, flag: &Flag) -> bool {
        self.members.items.iter().any(|m| m.flag_is_accepted(flag))
    }

    fn attributes(&self) -> Attributes {
        self.members.attributes(&self.meta.attributes)
    }

    fn flag_index(&self) -> &FlagIndex {
        self.members.flag_index(self.meta.flag_index.as_ref())
    }

    fn config(&self) -> &DatasetConfig {
        &self.meta.config
    }

    fn cache(&self) -> Option<&dyn FetchCache> {
        self.meta.cache.as_deref()
    }

    fn members(&self) -> &[DatasetRef] {
        &self.members.items
    }

    fn fetch_raw(&self, flag: &Flag, ctx: &FetchContext<'_>) -> Result<Table> {
        let parts = self.members.fetch_each(flag, ctx, self)?;
        if parts.is_empty() {
            return Err(no_member(&self.meta.name, flag));
        }
        Table::concat_columns(&parts, &self.level_name, self.on_top)
    }
}

/// Adds member tables element-wise; a value missing in one member counts as zero.
#[derive(Debug, Clone)]
pub struct SumCollection {
    meta: DatasetMeta,
    members: Members,
}

impl SumCollection {
    pub fn new(name: impl Into<String>, members: Vec<DatasetRef>) -> Self {
        let meta = DatasetMeta::new(name);
        let members = Members::new(&meta.name, members);
        Self { meta, members }
    }

    pub fn add(&mut self, member: DatasetRef) {
        self.members.add(&self.meta.name, member);
    }
}

impl DatasetSetup for SumCollection {
    fn meta_mut(&mut self) -> &mut DatasetMeta {
        &mut self.meta
    }
}

impl Dataset for SumCollection {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn kind(&self) -> &'static str {
        "sum"
    }

    fn accepted_flags(&self) -> BTreeSet<Flag> {
        self.members.flags()
    }

    fn flag_is_accepted(&self, flag: &Flag) -> bool {
        self.members.items.iter().any(|m| m.flag_is_accepted(flag))
    }

    fn attributes(&self) -> Attributes {
        self.members.attributes(&self.meta.attributes)
    }

    fn flag_index(&self) -> &FlagIndex {
        self.members.flag_index(self.meta.flag_index.as_ref())
    }

    fn config(&self) -> &DatasetConfig {
        &self.meta.config
    }

    fn cache(&self) -> Option<&dyn FetchCache> {
        self.meta.cache.as_deref()
    }

    fn members(&self) -> &[DatasetRef] {
        &self.members.items
    }

    fn fetch_raw(&self, flag: &Flag, ctx: &FetchContext<'_>) -> Result<Table> {
        let mut parts = self.members.fetch_each(flag, ctx, self)?.into_iter();
        let (_, mut total) = parts.next().ok_or_else(|| no_member(&self.meta.name, flag))?;
        for (_, table) in parts {
            total = total.add(&table, Some(0.0))?;
        }
        Ok(total)
    }
}

/// Groups datasets by the value of one attribute. Groups are sorted by
/// label; datasets keep their input order within a group. Datasets without
/// the attribute fall under the empty label.
pub fn group_by_attribute<'a>(
    datasets: &'a [DatasetRef],
    key: &str,
) -> BTreeMap<String, Vec<&'a DatasetRef>> {
    let mut groups: BTreeMap<String, Vec<&DatasetRef>> = BTreeMap::new();
    for ds in datasets {
        let label = ds
            .attributes()
            .get(key)
            .map_or_else(String::new, ToString::to_string);
        groups.entry(label).or_default().push(ds);
    }
    groups
}
