//! Delta between two datasets.

use std::collections::BTreeSet;

use super::{
    Attributes, ConfigOverrides, Dataset, DatasetConfig, DatasetMeta, DatasetRef, DatasetSetup,
    FetchContext, Flag, FlagIndex, intersect_attributes,
};
use crate::cache::FetchCache;
use crate::error::{Result, StudyError};
use crate::table::Table;

/// Fetches `variation − reference`, aligned on row and column labels.
///
/// A value present on only one side is compared against `fill_value`
/// (default `0.0`); with no fill value such cells stay empty.
#[derive(Debug, Clone)]
pub struct DatasetComparison {
    meta: DatasetMeta,
    /// `[reference, variation]`
    pair: [DatasetRef; 2],
    fill_value: Option<f64>,
}

impl DatasetComparison {
    /// Builds a comparison named `"<variation> vs <reference>"`.
    pub fn new(variation: DatasetRef, reference: DatasetRef) -> Self {
        let name = format!("{} vs {}", variation.name(), reference.name());
        Self {
            meta: DatasetMeta::new(name),
            pair: [reference, variation],
            fill_value: Some(0.0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }

    pub fn with_fill_value(mut self, fill_value: Option<f64>) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn variation(&self) -> &DatasetRef {
        &self.pair[1]
    }

    pub fn reference(&self) -> &DatasetRef {
        &self.pair[0]
    }

    pub fn fill_value(&self) -> Option<f64> {
        self.fill_value
    }
}

impl DatasetSetup for DatasetComparison {
    fn meta_mut(&mut self) -> &mut DatasetMeta {
        &mut self.meta
    }
}

impl Dataset for DatasetComparison {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn kind(&self) -> &'static str {
        "comparison"
    }

    fn accepted_flags(&self) -> BTreeSet<Flag> {
        let reference = self.reference().accepted_flags();
        self.variation()
            .accepted_flags()
            .into_iter()
            .filter(|f| reference.contains(f))
            .collect()
    }

    fn flag_is_accepted(&self, flag: &Flag) -> bool {
        self.variation().flag_is_accepted(flag) && self.reference().flag_is_accepted(flag)
    }

    fn attributes(&self) -> Attributes {
        let sides = [self.reference().attributes(), self.variation().attributes()];
        let mut attrs = intersect_attributes(&sides);
        attrs.extend(self.meta.attributes.clone());
        attrs
    }

    fn flag_index(&self) -> &FlagIndex {
        self.meta
            .flag_index
            .as_ref()
            .unwrap_or_else(|| self.variation().flag_index())
    }

    fn config(&self) -> &DatasetConfig {
        &self.meta.config
    }

    fn cache(&self) -> Option<&dyn FetchCache> {
        self.meta.cache.as_deref()
    }

    fn members(&self) -> &[DatasetRef] {
        &self.pair
    }

    fn as_comparison(&self) -> Option<&DatasetComparison> {
        Some(self)
    }

    /// # Errors
    ///
    /// Returns [`StudyError::NonNumeric`] when either side holds text cells.
    fn fetch_raw(&self, flag: &Flag, ctx: &FetchContext<'_>) -> Result<Table> {
        let overrides = ConfigOverrides::from(*ctx.config);
        let parent = Some(self as &dyn Dataset);
        let var = self.variation().fetch_in(flag, &overrides, parent)?;
        let reference = self.reference().fetch_in(flag, &overrides, parent)?;
        if !var.is_numeric() || !reference.is_numeric() {
            return Err(StudyError::NonNumeric(format!("{flag} in {}", self.meta.name)));
        }
        var.subtract(&reference, self.fill_value)
    }
}
