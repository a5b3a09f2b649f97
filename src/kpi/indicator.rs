//! A single computed KPI value and the attributes describing it.

use std::collections::BTreeMap;

use serde::Serialize;

use super::aggregation::{Aggregation, ArithmeticOperation, ValueComparison};
use super::units::{Unit, format_quantity};
use crate::dataset::{AttributeValue, Attributes, Flag};

/// Attribute keys that do not identify a KPI's data, only its label.
pub const NAMING_ATTRIBUTES: [&str; 3] = ["name_prefix", "name_suffix", "custom_name"];

/// Everything known about how a KPI value came to be.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiAttributes {
    pub flag: Flag,
    pub model_flag: Option<Flag>,
    pub object_name: Option<String>,
    pub aggregation: Option<Aggregation>,
    pub dataset_name: String,
    pub dataset_type: String,
    pub value_comparison: Option<ValueComparison>,
    pub arithmetic_operation: Option<ArithmeticOperation>,
    pub reference_dataset_name: Option<String>,
    pub variation_dataset_name: Option<String>,
    pub name_prefix: String,
    pub name_suffix: String,
    pub custom_name: Option<String>,
    pub unit: Option<Unit>,
    pub target_unit: Option<Unit>,
    pub dataset_attributes: Attributes,
    pub extra_attributes: Attributes,
}

impl KpiAttributes {
    pub fn new(flag: impl Into<Flag>) -> Self {
        Self {
            flag: flag.into(),
            model_flag: None,
            object_name: None,
            aggregation: None,
            dataset_name: String::new(),
            dataset_type: String::new(),
            value_comparison: None,
            arithmetic_operation: None,
            reference_dataset_name: None,
            variation_dataset_name: None,
            name_prefix: String::new(),
            name_suffix: String::new(),
            custom_name: None,
            unit: None,
            target_unit: None,
            dataset_attributes: Attributes::new(),
            extra_attributes: Attributes::new(),
        }
    }

    /// Flattened view: built-in fields first, then dataset attributes, then
    /// extra attributes. Unset optional fields are left out.
    pub fn as_map(&self) -> BTreeMap<String, AttributeValue> {
        let mut map = BTreeMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                map.insert(key.to_string(), AttributeValue::Text(v));
            }
        };
        put("flag", Some(self.flag.to_string()));
        put("model_flag", self.model_flag.as_ref().map(ToString::to_string));
        put("object_name", self.object_name.clone());
        put("aggregation", self.aggregation.map(|a| a.name()));
        put("dataset_name", Some(self.dataset_name.clone()));
        put("dataset_type", Some(self.dataset_type.clone()));
        put("value_comparison", self.value_comparison.map(|c| c.name().to_string()));
        put(
            "arithmetic_operation",
            self.arithmetic_operation.map(|o| o.name().to_string()),
        );
        put("reference_dataset_name", self.reference_dataset_name.clone());
        put("variation_dataset_name", self.variation_dataset_name.clone());
        put("name_prefix", Some(self.name_prefix.clone()).filter(|s| !s.is_empty()));
        put("name_suffix", Some(self.name_suffix.clone()).filter(|s| !s.is_empty()));
        put("custom_name", self.custom_name.clone());
        put("unit", self.unit.map(String::from));
        put("target_unit", self.target_unit.map(String::from));
        for (key, value) in self.dataset_attributes.iter().chain(&self.extra_attributes) {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
        map
    }

    /// Looks up one attribute of [`KpiAttributes::as_map`].
    pub fn get(&self, key: &str) -> Option<AttributeValue> {
        self.as_map().remove(key)
    }
}

/// A computed value with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub value: f64,
    pub attributes: KpiAttributes,
}

impl Kpi {
    pub fn new(value: f64, attributes: KpiAttributes) -> Self {
        Self { value, attributes }
    }

    /// Display name: the custom name if set, otherwise
    /// `[prefix] flag aggregation object [comparison] [operation] [suffix]`.
    pub fn name(&self) -> String {
        let a = &self.attributes;
        if let Some(custom) = &a.custom_name {
            return custom.clone();
        }
        let mut parts: Vec<String> = Vec::new();
        if !a.name_prefix.is_empty() {
            parts.push(a.name_prefix.clone());
        }
        parts.push(a.flag.to_string());
        if let Some(agg) = a.aggregation {
            parts.push(agg.name());
        }
        if let Some(object) = &a.object_name {
            parts.push(object.clone());
        }
        if let Some(cmp) = a.value_comparison {
            parts.push(cmp.name().to_string());
        }
        if let Some(op) = a.arithmetic_operation {
            parts.push(op.name().to_string());
        }
        if !a.name_suffix.is_empty() {
            parts.push(a.name_suffix.clone());
        }
        parts.join(" ")
    }

    /// Name followed by the dataset it was computed on.
    pub fn name_with_dataset(&self) -> String {
        format!("{} ({})", self.name(), self.attributes.dataset_name)
    }

    pub fn unit(&self) -> Unit {
        self.attributes.unit.unwrap_or(Unit::NaU)
    }

    /// Value in `unit`, or `None` if the dimensions differ.
    pub fn value_in(&self, unit: Unit) -> Option<f64> {
        self.unit().convert(self.value, unit)
    }

    /// Value in its target unit when one is set, else in the readable unit.
    pub fn pretty(&self) -> (f64, Unit) {
        match self.attributes.target_unit {
            Some(target) => match self.value_in(target) {
                Some(v) => (v, target),
                None => self.unit().pretty(self.value),
            },
            None => self.unit().pretty(self.value),
        }
    }

    /// Formatted pretty value with unit symbol, e.g. `"12.3 GWh"`.
    pub fn pretty_text(&self, decimals: Option<usize>) -> String {
        let (value, unit) = self.pretty();
        let signed = self.attributes.value_comparison.is_some();
        format_quantity(value, unit, decimals, signed)
    }
}
