//! KPI definitions: recipes that turn a dataset into a list of [`Kpi`]s.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::aggregation::{Aggregation, ArithmeticOperation, ValueComparison};
use super::indicator::{Kpi, KpiAttributes};
use super::units::Unit;
use crate::dataset::{AttributeValue, Attributes, Dataset, Flag, ModelPropertyFilter};
use crate::error::{Result, StudyError};
use crate::table::{ColumnKey, Table};

/// Shared handle to a definition.
pub type DefinitionRef = Arc<dyn KpiDefinition>;

/// Generates KPIs for one dataset.
pub trait KpiDefinition: Send + Sync + fmt::Debug {
    /// Flags the dataset must accept for [`KpiDefinition::generate`] to run.
    fn required_flags(&self) -> BTreeSet<Flag>;

    /// Whether the definition only applies to [`DatasetComparison`](crate::dataset::DatasetComparison)s.
    fn requires_comparison(&self) -> bool {
        false
    }

    /// # Errors
    ///
    /// Propagates fetch errors and returns [`StudyError::Kpi`] when the
    /// dataset lacks what the definition needs (model flag, comparison pair).
    fn generate(&self, dataset: &dyn Dataset) -> Result<Vec<Kpi>>;
}

/// Which objects (last column level) a definition covers.
#[derive(Debug, Clone, Default)]
pub enum ObjectSelection {
    /// Every column of the fetched table.
    #[default]
    All,
    /// Listed objects, in this order; names absent from the data are skipped.
    Named(Vec<String>),
    /// Objects whose model row passes the filter.
    ByModelProperties(ModelPropertyFilter),
}

impl ObjectSelection {
    /// Keys of `data` covered by the selection.
    fn resolve(&self, dataset: &dyn Dataset, data: &Table, model_flag: Option<&Flag>) -> Result<Vec<ColumnKey>> {
        match self {
            Self::All => Ok(data.columns().to_vec()),
            Self::Named(names) => Ok(names
                .iter()
                .flat_map(|name| {
                    let found: Vec<ColumnKey> = data
                        .columns()
                        .iter()
                        .filter(|k| k.last() == Some(name.as_str()))
                        .cloned()
                        .collect();
                    if found.is_empty() {
                        debug!(dataset = dataset.name(), object = %name, "object not in data, skipped");
                    }
                    found
                })
                .collect()),
            Self::ByModelProperties(filter) => {
                let model_flag = model_flag.ok_or_else(|| {
                    StudyError::Kpi(format!(
                        "object filter needs a model flag in dataset `{}`",
                        dataset.name()
                    ))
                })?;
                let objects = filter.apply(&dataset.fetch(model_flag)?)?;
                Ok(data
                    .columns()
                    .iter()
                    .filter(|k| k.last().is_some_and(|o| objects.iter().any(|x| x == o)))
                    .cloned()
                    .collect())
            }
        }
    }
}

/// Naming and free-form attributes shared by every definition type.
#[derive(Debug, Clone, Default)]
pub struct Labels {
    pub name_prefix: String,
    pub name_suffix: String,
    pub custom_name: Option<String>,
    pub extra_attributes: Attributes,
}

impl Labels {
    /// Writes the labels into `attrs`. With several objects a custom name
    /// gets the object appended to stay unique.
    fn apply(&self, attrs: &mut KpiAttributes, several_objects: bool) {
        if !self.name_prefix.is_empty() {
            attrs.name_prefix = self.name_prefix.clone();
        }
        if !self.name_suffix.is_empty() {
            attrs.name_suffix = self.name_suffix.clone();
        }
        if let Some(custom) = &self.custom_name {
            attrs.custom_name = Some(match (&attrs.object_name, several_objects) {
                (Some(object), true) => format!("{custom} {object}"),
                _ => custom.clone(),
            });
        }
        attrs.extra_attributes.extend(self.extra_attributes.clone());
    }
}

/// Builder methods for the [`Labels`] of a definition.
pub trait Labelled: Sized {
    fn labels_mut(&mut self) -> &mut Labels;

    fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.labels_mut().name_prefix = prefix.into();
        self
    }

    fn with_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.labels_mut().name_suffix = suffix.into();
        self
    }

    fn with_custom_name(mut self, name: impl Into<String>) -> Self {
        self.labels_mut().custom_name = Some(name.into());
        self
    }

    fn with_extra_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.labels_mut()
            .extra_attributes
            .insert(key.into(), value.into());
        self
    }
}

/// Attributes every KPI computed on `dataset` for `flag` starts from.
fn dataset_attributes(dataset: &dyn Dataset, flag: &Flag, model_flag: Option<Flag>) -> KpiAttributes {
    let mut attrs = KpiAttributes::new(flag.clone());
    attrs.model_flag = model_flag;
    attrs.dataset_name = dataset.name().to_string();
    attrs.dataset_type = dataset.kind().to_string();
    attrs.dataset_attributes = dataset.attributes();
    attrs.unit = dataset.flag_index().unit(flag);
    if let Some(cmp) = dataset.as_comparison() {
        attrs.reference_dataset_name = Some(cmp.reference().name().to_string());
        attrs.variation_dataset_name = Some(cmp.variation().name().to_string());
    }
    attrs
}

/// Aggregates each selected object column of one flag.
#[derive(Debug, Clone)]
pub struct FlagAggDefinition {
    flag: Flag,
    aggregation: Aggregation,
    model_flag: Option<Flag>,
    objects: ObjectSelection,
    target_unit: Option<Unit>,
    labels: Labels,
}

impl FlagAggDefinition {
    pub fn new(flag: impl Into<Flag>, aggregation: Aggregation) -> Self {
        Self {
            flag: flag.into(),
            aggregation,
            model_flag: None,
            objects: ObjectSelection::All,
            target_unit: None,
            labels: Labels::default(),
        }
    }

    /// Overrides the model flag inferred from the dataset's flag index.
    pub fn with_model_flag(mut self, model_flag: impl Into<Flag>) -> Self {
        self.model_flag = Some(model_flag.into());
        self
    }

    pub fn with_objects(mut self, objects: ObjectSelection) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_target_unit(mut self, unit: Unit) -> Self {
        self.target_unit = Some(unit);
        self
    }

    pub fn flag(&self) -> &Flag {
        &self.flag
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }
}

impl Labelled for FlagAggDefinition {
    fn labels_mut(&mut self) -> &mut Labels {
        &mut self.labels
    }
}

impl KpiDefinition for FlagAggDefinition {
    fn required_flags(&self) -> BTreeSet<Flag> {
        BTreeSet::from([self.flag.clone()])
    }

    fn generate(&self, dataset: &dyn Dataset) -> Result<Vec<Kpi>> {
        let model_flag = self
            .model_flag
            .clone()
            .or_else(|| dataset.flag_index().linked_model_flag(&self.flag));
        let data = dataset.fetch(&self.flag)?;
        let keys = self.objects.resolve(dataset, &data, model_flag.as_ref())?;
        let values = self.aggregation.apply(&data.select_columns(&keys))?;

        let several = values.len() > 1;
        let base = dataset_attributes(dataset, &self.flag, model_flag);
        Ok(values
            .into_iter()
            .map(|(key, value)| {
                let mut attrs = base.clone();
                attrs.object_name = Some(key.to_string());
                attrs.aggregation = Some(self.aggregation);
                attrs.unit = self.aggregation.unit().or(attrs.unit);
                attrs.target_unit = self.target_unit;
                self.labels.apply(&mut attrs, several);
                Kpi::new(value, attrs)
            })
            .collect())
    }
}

/// Runs a base definition on both sides of a comparison and compares the
/// values object by object.
#[derive(Debug, Clone)]
pub struct ComparisonDefinition {
    base: DefinitionRef,
    comparison: ValueComparison,
    unit: Option<Unit>,
    target_unit: Option<Unit>,
    labels: Labels,
}

impl ComparisonDefinition {
    /// Names and units come from this definition only; the base
    /// definition's labels and target unit are not inherited.
    pub fn new(base: DefinitionRef, comparison: ValueComparison) -> Self {
        Self {
            base,
            comparison,
            unit: None,
            target_unit: None,
            labels: Labels::default(),
        }
    }

    pub fn with_target_unit(mut self, unit: Unit) -> Self {
        self.target_unit = Some(unit);
        self
    }

    /// Overrides the result unit (default: the comparison's unit, else the reference unit).
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn comparison(&self) -> ValueComparison {
        self.comparison
    }
}

impl Labelled for ComparisonDefinition {
    fn labels_mut(&mut self) -> &mut Labels {
        &mut self.labels
    }
}

impl KpiDefinition for ComparisonDefinition {
    fn required_flags(&self) -> BTreeSet<Flag> {
        self.base.required_flags()
    }

    fn requires_comparison(&self) -> bool {
        true
    }

    fn generate(&self, dataset: &dyn Dataset) -> Result<Vec<Kpi>> {
        let pair = dataset.as_comparison().ok_or_else(|| {
            StudyError::Kpi(format!(
                "value comparison `{}` needs a comparison dataset, got `{}`",
                self.comparison,
                dataset.name()
            ))
        })?;
        let references = self.base.generate(pair.reference().as_ref())?;
        let variations = self.base.generate(pair.variation().as_ref())?;

        let several = references.len() > 1;
        let mut out = Vec::with_capacity(references.len());
        for reference in &references {
            let Some(var) = variations
                .iter()
                .find(|v| v.attributes.object_name == reference.attributes.object_name)
            else {
                debug!(
                    comparison = dataset.name(),
                    object = ?reference.attributes.object_name,
                    "no variation KPI for object, skipped"
                );
                continue;
            };
            let base = &reference.attributes;
            let mut attrs = KpiAttributes::new(base.flag.clone());
            attrs.model_flag = base.model_flag.clone();
            attrs.object_name = base.object_name.clone();
            attrs.aggregation = base.aggregation;
            attrs.arithmetic_operation = base.arithmetic_operation;
            attrs.dataset_name = dataset.name().to_string();
            attrs.dataset_type = dataset.kind().to_string();
            attrs.dataset_attributes = dataset.attributes();
            attrs.value_comparison = Some(self.comparison);
            attrs.reference_dataset_name = Some(pair.reference().name().to_string());
            attrs.variation_dataset_name = Some(pair.variation().name().to_string());
            attrs.unit = self.unit.or(self.comparison.unit()).or(base.unit);
            attrs.target_unit = self.target_unit;
            self.labels.apply(&mut attrs, several);
            out.push(Kpi::new(self.comparison.apply(var.value, reference.value), attrs));
        }
        Ok(out)
    }
}

type BatchFn = dyn Fn(&dyn Dataset, &[String]) -> Result<Vec<(String, f64)>> + Send + Sync;
type ObjectFn = dyn Fn(&dyn Dataset, &str) -> Result<f64> + Send + Sync;

#[derive(Clone)]
enum Compute {
    Batch(Arc<BatchFn>),
    PerObject(Arc<ObjectFn>),
}

/// User-supplied computation, either one call for all objects or one per object.
#[derive(Clone)]
pub struct CustomDefinition {
    flag: Flag,
    compute: Compute,
    objects: ObjectSelection,
    required: BTreeSet<Flag>,
    aggregation: Option<Aggregation>,
    unit: Option<Unit>,
    labels: Labels,
}

impl CustomDefinition {
    /// `compute` receives the dataset and the selected object names and
    /// returns `(object, value)` pairs.
    pub fn batch<F>(flag: impl Into<Flag>, compute: F) -> Self
    where
        F: Fn(&dyn Dataset, &[String]) -> Result<Vec<(String, f64)>> + Send + Sync + 'static,
    {
        Self::with_compute(flag.into(), Compute::Batch(Arc::new(compute)))
    }

    pub fn per_object<F>(flag: impl Into<Flag>, compute: F) -> Self
    where
        F: Fn(&dyn Dataset, &str) -> Result<f64> + Send + Sync + 'static,
    {
        Self::with_compute(flag.into(), Compute::PerObject(Arc::new(compute)))
    }

    fn with_compute(flag: Flag, compute: Compute) -> Self {
        Self {
            required: BTreeSet::from([flag.clone()]),
            flag,
            compute,
            objects: ObjectSelection::All,
            aggregation: None,
            unit: None,
            labels: Labels::default(),
        }
    }

    pub fn with_objects(mut self, objects: ObjectSelection) -> Self {
        self.objects = objects;
        self
    }

    /// Declares additional flags the computation fetches.
    pub fn requiring(mut self, flags: impl IntoIterator<Item = Flag>) -> Self {
        self.required.extend(flags);
        self
    }

    /// Aggregation recorded in the KPI attributes; not applied.
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }
}

impl fmt::Debug for CustomDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.compute {
            Compute::Batch(_) => "batch",
            Compute::PerObject(_) => "per_object",
        };
        f.debug_struct("CustomDefinition")
            .field("flag", &self.flag)
            .field("mode", &mode)
            .field("objects", &self.objects)
            .field("unit", &self.unit)
            .finish_non_exhaustive()
    }
}

impl Labelled for CustomDefinition {
    fn labels_mut(&mut self) -> &mut Labels {
        &mut self.labels
    }
}

impl KpiDefinition for CustomDefinition {
    fn required_flags(&self) -> BTreeSet<Flag> {
        self.required.clone()
    }

    fn generate(&self, dataset: &dyn Dataset) -> Result<Vec<Kpi>> {
        let model_flag = dataset.flag_index().linked_model_flag(&self.flag);
        let data = dataset.fetch(&self.flag)?;
        let objects: Vec<String> = self
            .objects
            .resolve(dataset, &data, model_flag.as_ref())?
            .iter()
            .map(ToString::to_string)
            .collect();

        let values = match &self.compute {
            Compute::Batch(f) => f(dataset, &objects)?,
            Compute::PerObject(f) => objects
                .iter()
                .map(|o| Ok((o.clone(), f(dataset, o)?)))
                .collect::<Result<Vec<_>>>()?,
        };

        let several = values.len() > 1;
        let base = dataset_attributes(dataset, &self.flag, model_flag);
        Ok(values
            .into_iter()
            .map(|(object, value)| {
                let mut attrs = base.clone();
                attrs.object_name = Some(object);
                attrs.aggregation = self.aggregation;
                attrs.unit = self.unit.or(attrs.unit);
                self.labels.apply(&mut attrs, several);
                Kpi::new(value, attrs)
            })
            .collect())
    }
}

/// Combines two definitions object by object, e.g. revenue / generation.
#[derive(Debug, Clone)]
pub struct ArithmeticDefinition {
    left: DefinitionRef,
    right: DefinitionRef,
    operation: ArithmeticOperation,
    unit: Option<Unit>,
    labels: Labels,
}

impl ArithmeticDefinition {
    pub fn new(left: DefinitionRef, operation: ArithmeticOperation, right: DefinitionRef) -> Self {
        Self {
            left,
            right,
            operation,
            unit: None,
            labels: Labels::default(),
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }
}

impl Labelled for ArithmeticDefinition {
    fn labels_mut(&mut self) -> &mut Labels {
        &mut self.labels
    }
}

impl KpiDefinition for ArithmeticDefinition {
    fn required_flags(&self) -> BTreeSet<Flag> {
        let mut flags = self.left.required_flags();
        flags.extend(self.right.required_flags());
        flags
    }

    fn requires_comparison(&self) -> bool {
        self.left.requires_comparison() || self.right.requires_comparison()
    }

    /// Objects present on only one side are dropped. Without an explicit
    /// unit, sums and differences keep the left unit; products and
    /// divisions become unitless.
    fn generate(&self, dataset: &dyn Dataset) -> Result<Vec<Kpi>> {
        let left = self.left.generate(dataset)?;
        let right = self.right.generate(dataset)?;

        let several = left.len() > 1;
        let mut out = Vec::with_capacity(left.len());
        for l in left {
            let Some(r) = right
                .iter()
                .find(|r| r.attributes.object_name == l.attributes.object_name)
            else {
                continue;
            };
            let mut attrs = l.attributes.clone();
            attrs.arithmetic_operation = Some(self.operation);
            attrs.unit = self.unit.or(self.operation.unit()).or(if self.operation.preserves_unit() {
                l.attributes.unit
            } else {
                None
            });
            self.labels.apply(&mut attrs, several);
            out.push(Kpi::new(self.operation.apply(l.value, r.value), attrs));
        }
        Ok(out)
    }
}
