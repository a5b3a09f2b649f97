//! Flags name the logical tables a dataset can serve, plus the index that
//! links variable flags to their model flags and units.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kpi::units::Unit;

/// Dotted key naming a logical table, e.g. `"Node.Price"` or
/// `"buses_t.marginal_price"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flag(String);

impl Flag {
    pub fn new(flag: impl Into<String>) -> Self {
        Self(flag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dot-separated components.
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// First dotted component, used as the object class (`"Node"` for `"Node.Price"`).
    pub fn object_class(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Flag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Flag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Flag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Flag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Maps variable flags to their linked model flag and physical unit.
///
/// Explicit links take precedence. With a class model suffix configured,
/// `"Node.Price"` falls back to `"Node.<suffix>"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagIndex {
    model_flags: BTreeMap<Flag, Flag>,
    units: BTreeMap<Flag, Unit>,
    class_model_suffix: Option<String>,
}

impl FlagIndex {
    pub const fn empty() -> Self {
        Self {
            model_flags: BTreeMap::new(),
            units: BTreeMap::new(),
            class_model_suffix: None,
        }
    }

    pub fn with_model_flag(mut self, flag: impl Into<Flag>, model_flag: impl Into<Flag>) -> Self {
        self.model_flags.insert(flag.into(), model_flag.into());
        self
    }

    pub fn with_unit(mut self, flag: impl Into<Flag>, unit: Unit) -> Self {
        self.units.insert(flag.into(), unit);
        self
    }

    pub fn with_class_model_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.class_model_suffix = Some(suffix.into());
        self
    }

    /// Model flag describing the objects of `flag`, if known.
    pub fn linked_model_flag(&self, flag: &Flag) -> Option<Flag> {
        if let Some(model) = self.model_flags.get(flag) {
            return Some(model.clone());
        }
        let suffix = self.class_model_suffix.as_deref()?;
        let candidate = Flag::new(format!("{}.{suffix}", flag.object_class()));
        (candidate != *flag).then_some(candidate)
    }

    pub fn unit(&self, flag: &Flag) -> Option<Unit> {
        self.units.get(flag).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.model_flags.is_empty() && self.units.is_empty() && self.class_model_suffix.is_none()
    }
}
