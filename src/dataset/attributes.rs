//! Scenario metadata attached to datasets and propagated into KPIs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::table::Cell;

/// Primitive attribute value (`bool`, integer, float or text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Ordered attribute map.
pub type Attributes = BTreeMap<String, AttributeValue>;

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&AttributeValue> for Cell {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Bool(b) => Cell::Text(b.to_string()),
            AttributeValue::Int(i) => Cell::Number(*i as f64),
            AttributeValue::Float(x) => Cell::Number(*x),
            AttributeValue::Text(s) => Cell::Text(s.clone()),
        }
    }
}

/// Attributes every map agrees on (same key, same value).
pub fn intersect_attributes<'a>(maps: impl IntoIterator<Item = &'a Attributes>) -> Attributes {
    let mut iter = maps.into_iter();
    let Some(first) = iter.next() else {
        return Attributes::new();
    };
    let mut common = first.clone();
    for other in iter {
        common.retain(|k, v| other.get(k) == Some(v));
    }
    common
}
