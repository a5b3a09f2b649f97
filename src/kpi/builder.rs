//! Bulk construction of definitions as cartesian products.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::aggregation::{Aggregation, ValueComparison};
use super::definition::{
    ComparisonDefinition, DefinitionRef, FlagAggDefinition, Labelled, Labels, ObjectSelection,
};
use super::units::Unit;
use crate::dataset::{AttributeValue, Flag, ModelPropertyFilter};

/// Builds one [`FlagAggDefinition`] per `(flag, aggregation)` pair.
#[derive(Debug, Clone, Default)]
pub struct FlagAggKpiBuilder {
    flags: Vec<Flag>,
    aggregations: Vec<Aggregation>,
    objects: ObjectSelection,
    model_flags: BTreeMap<Flag, Flag>,
    target_units: BTreeMap<Flag, Unit>,
    labels: Labels,
}

impl FlagAggKpiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_flag(mut self, flag: impl Into<Flag>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn for_flags<F: Into<Flag>>(mut self, flags: impl IntoIterator<Item = F>) -> Self {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    pub fn with_aggregations(mut self, aggregations: impl IntoIterator<Item = Aggregation>) -> Self {
        self.aggregations.extend(aggregations);
        self
    }

    pub fn for_all_objects(mut self) -> Self {
        self.objects = ObjectSelection::All;
        self
    }

    pub fn for_objects<S: Into<String>>(mut self, objects: impl IntoIterator<Item = S>) -> Self {
        self.objects = ObjectSelection::Named(objects.into_iter().map(Into::into).collect());
        self
    }

    pub fn for_objects_with_model_properties(mut self, filter: ModelPropertyFilter) -> Self {
        self.objects = ObjectSelection::ByModelProperties(filter);
        self
    }

    pub fn with_model_flag(mut self, flag: impl Into<Flag>, model_flag: impl Into<Flag>) -> Self {
        self.model_flags.insert(flag.into(), model_flag.into());
        self
    }

    pub fn with_target_unit(mut self, flag: impl Into<Flag>, unit: Unit) -> Self {
        self.target_units.insert(flag.into(), unit);
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.labels.name_prefix = prefix.into();
        self
    }

    pub fn with_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.labels.name_suffix = suffix.into();
        self
    }

    pub fn with_extra_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.labels.extra_attributes.insert(key.into(), value.into());
        self
    }

    /// Concrete definitions, flags outermost.
    pub fn build_definitions(&self) -> Vec<FlagAggDefinition> {
        let mut out = Vec::with_capacity(self.flags.len() * self.aggregations.len());
        for flag in &self.flags {
            for aggregation in &self.aggregations {
                let mut def = FlagAggDefinition::new(flag.clone(), *aggregation)
                    .with_objects(self.objects.clone())
                    .with_name_prefix(self.labels.name_prefix.clone())
                    .with_name_suffix(self.labels.name_suffix.clone());
                if let Some(model_flag) = self.model_flags.get(flag) {
                    def = def.with_model_flag(model_flag.clone());
                }
                if let Some(unit) = self.target_units.get(flag) {
                    def = def.with_target_unit(*unit);
                }
                for (key, value) in &self.labels.extra_attributes {
                    def = def.with_extra_attribute(key.clone(), value.clone());
                }
                out.push(def);
            }
        }
        out
    }

    pub fn build(&self) -> Vec<DefinitionRef> {
        self.build_definitions()
            .into_iter()
            .map(|d| Arc::new(d) as DefinitionRef)
            .collect()
    }
}

/// Wraps every base definition in a [`ComparisonDefinition`] per value comparison.
#[derive(Debug, Clone)]
pub struct ComparisonKpiBuilder {
    base: Vec<DefinitionRef>,
    comparisons: Vec<ValueComparison>,
    target_unit: Option<Unit>,
    labels: Labels,
}

impl ComparisonKpiBuilder {
    pub fn new(base: Vec<DefinitionRef>) -> Self {
        Self {
            base,
            comparisons: Vec::new(),
            target_unit: None,
            labels: Labels::default(),
        }
    }

    /// Display unit of every generated comparison KPI. Ignored for
    /// results whose dimension differs (percentages).
    pub fn with_target_unit(mut self, unit: Unit) -> Self {
        self.target_unit = Some(unit);
        self
    }

    pub fn with_comparison(mut self, comparison: ValueComparison) -> Self {
        self.comparisons.push(comparison);
        self
    }

    pub fn with_comparisons(mut self, comparisons: impl IntoIterator<Item = ValueComparison>) -> Self {
        self.comparisons.extend(comparisons);
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.labels.name_prefix = prefix.into();
        self
    }

    pub fn with_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.labels.name_suffix = suffix.into();
        self
    }

    /// Base definitions outermost, comparisons innermost.
    pub fn build(&self) -> Vec<DefinitionRef> {
        let mut out: Vec<DefinitionRef> = Vec::with_capacity(self.base.len() * self.comparisons.len());
        for base in &self.base {
            for comparison in &self.comparisons {
                let mut def = ComparisonDefinition::new(Arc::clone(base), *comparison)
                    .with_name_prefix(self.labels.name_prefix.clone())
                    .with_name_suffix(self.labels.name_suffix.clone());
                if let Some(unit) = self.target_unit {
                    def = def.with_target_unit(unit);
                }
                out.push(Arc::new(def));
            }
        }
        out
    }
}
