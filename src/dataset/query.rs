//! Object queries against model tables.
//!
//! A model table has one row per object (index = object name) and one column
//! per property. Variable tables name the object in the last level of each
//! column key, so a model row can be looked up for every data column.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};
use crate::table::{Cell, ColumnKey, Table, numeric_values};

type Predicate = Arc<dyn Fn(&Cell) -> bool + Send + Sync>;

#[derive(Clone)]
enum Condition {
    Equals(Cell),
    OneOf(Vec<Cell>),
    Matches(Predicate),
}

impl Condition {
    fn accepts(&self, cell: &Cell) -> bool {
        match self {
            Self::Equals(value) => cell == value,
            Self::OneOf(values) => values.contains(cell),
            Self::Matches(predicate) => predicate(cell),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => write!(f, "== {v}"),
            Self::OneOf(vs) => write!(f, "in {vs:?}"),
            Self::Matches(_) => f.write_str("matches <fn>"),
        }
    }
}

/// AND-combined property constraints selecting objects from a model table.
#[derive(Debug, Clone, Default)]
pub struct ModelPropertyFilter {
    conditions: Vec<(String, Condition)>,
}

impl ModelPropertyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Property must equal `value`.
    pub fn equals(mut self, property: impl Into<String>, value: impl Into<Cell>) -> Self {
        self.conditions
            .push((property.into(), Condition::Equals(value.into())));
        self
    }

    /// Property must be one of `values`.
    pub fn one_of<V: Into<Cell>>(
        mut self,
        property: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions
            .push((property.into(), Condition::OneOf(values)));
        self
    }

    /// Property must satisfy `predicate`.
    pub fn matching<F>(mut self, property: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Cell) -> bool + Send + Sync + 'static,
    {
        self.conditions
            .push((property.into(), Condition::Matches(Arc::new(predicate))));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Names of the model objects passing every condition, in model order.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::InvalidTable`] if a filtered property is not a
    /// column of `model`.
    pub fn apply(&self, model: &Table) -> Result<Vec<String>> {
        let mut columns = Vec::with_capacity(self.conditions.len());
        for (property, condition) in &self.conditions {
            columns.push((property_column(model, property)?, condition));
        }
        Ok(model
            .index()
            .iter()
            .enumerate()
            .filter(|(row, _)| columns.iter().all(|(cells, cond)| cond.accepts(&cells[*row])))
            .map(|(_, object)| object.clone())
            .collect())
    }
}

/// Row-wise reduction applied to columns sharing a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupAggregation {
    Sum,
    Mean,
    Min,
    Max,
    Count,
}

impl GroupAggregation {
    /// Reduces the non-missing values; `None` when there are none (except `Count`).
    fn reduce(self, values: &[f64]) -> Option<f64> {
        let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if present.is_empty() && self != Self::Count {
            return None;
        }
        Some(match self {
            Self::Sum => present.iter().sum(),
            Self::Mean => present.iter().sum::<f64>() / present.len() as f64,
            Self::Min => present.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Count => present.len() as f64,
        })
    }
}

impl std::str::FromStr for GroupAggregation {
    type Err = StudyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "count" => Ok(Self::Count),
            other => Err(StudyError::Kpi(format!("unknown group aggregation `{other}`"))),
        }
    }
}

fn property_column<'a>(model: &'a Table, property: &str) -> Result<&'a [Cell]> {
    model
        .iter_columns()
        .find(|(key, _)| key.last() == Some(property))
        .map(|(_, cells)| cells)
        .ok_or_else(|| StudyError::InvalidTable(format!("model has no property `{property}`")))
}

/// Property value of `object`, or `None` if the object is unknown or the value missing.
fn property_of<'a>(model: &Table, cells: &'a [Cell], object: &str) -> Option<&'a Cell> {
    let row = model.row_position(object)?;
    cells.get(row).filter(|c| !c.is_missing())
}

/// Keeps the data columns whose object passes `filter`.
///
/// # Errors
///
/// See [`ModelPropertyFilter::apply`].
pub fn filter_by_model_properties(
    data: &Table,
    model: &Table,
    filter: &ModelPropertyFilter,
) -> Result<Table> {
    let objects: HashSet<String> = filter.apply(model)?.into_iter().collect();
    let keys: Vec<ColumnKey> = data
        .columns()
        .iter()
        .filter(|key| key.last().is_some_and(|o| objects.contains(o)))
        .cloned()
        .collect();
    Ok(data.select_columns(&keys))
}

/// Adds the objects' `property` value as a new top column level.
/// Objects without a value get an empty label.
pub fn with_model_property_level(data: &Table, model: &Table, property: &str) -> Result<Table> {
    let cells = property_column(model, property)?;
    let mut out = Table::new(data.index_name(), data.index().to_vec());
    let mut level_names = vec![property.to_string()];
    level_names.extend(data.level_names().iter().cloned());
    out.set_level_names(level_names)?;
    for (key, column) in data.iter_columns() {
        let label = key
            .last()
            .and_then(|o| property_of(model, cells, o))
            .map_or_else(String::new, ToString::to_string);
        out.push_column(key.with_prefix(&label), column.to_vec())?;
    }
    Ok(out)
}

/// Replaces the object level with the objects' `property` value and reduces
/// columns that end up sharing a key. Objects without a value are dropped.
///
/// # Errors
///
/// Returns [`StudyError::NonNumeric`] for text data and
/// [`StudyError::InvalidTable`] if `property` is missing from `model`.
pub fn group_by_model_property(
    data: &Table,
    model: &Table,
    property: &str,
    aggregation: GroupAggregation,
) -> Result<Table> {
    let cells = property_column(model, property)?;

    let mut groups: Vec<(ColumnKey, Vec<Vec<f64>>)> = Vec::new();
    for (key, column) in data.iter_columns() {
        let Some(value) = key.last().and_then(|o| property_of(model, cells, o)) else {
            continue;
        };
        let mut levels = key.levels().to_vec();
        if let Some(last) = levels.last_mut() {
            *last = value.to_string();
        }
        let group_key = ColumnKey::new(levels);
        let values = numeric_values(key, column)?;
        match groups.iter_mut().find(|(k, _)| *k == group_key) {
            Some((_, members)) => members.push(values),
            None => groups.push((group_key, vec![values])),
        }
    }

    let mut out = Table::new(data.index_name(), data.index().to_vec());
    let mut level_names = data.level_names().to_vec();
    if let Some(last) = level_names.last_mut() {
        *last = property.to_string();
    }
    out.set_level_names(level_names)?;
    for (key, members) in groups {
        let reduced = (0..data.nrows())
            .map(|row| {
                let values: Vec<f64> = members.iter().map(|m| m[row]).collect();
                aggregation.reduce(&values).map_or(Cell::Empty, Cell::from_f64)
            })
            .collect();
        out.push_column(key, reduced)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Table {
        let mut model = Table::new("Generator", vec!["g1".into(), "g2".into(), "g3".into()]);
        model
            .push_column(
                "carrier".into(),
                vec![Cell::from("solar"), Cell::from("gas"), Cell::from("solar")],
            )
            .expect("push");
        model
            .push_column(
                "capacity".into(),
                vec![Cell::Number(10.0), Cell::Number(50.0), Cell::Number(5.0)],
            )
            .expect("push");
        model
    }

    fn generation() -> Table {
        Table::from_numeric(
            "time",
            vec!["t0".into(), "t1".into()],
            vec![("g1", vec![1.0, 2.0]), ("g2", vec![10.0, 20.0]), ("g3", vec![3.0, f64::NAN])],
        )
        .expect("table")
    }

    #[test]
    fn filter_combines_conditions() {
        let filter = ModelPropertyFilter::new()
            .equals("carrier", "solar")
            .matching("capacity", |c| c.as_f64().is_some_and(|v| v > 6.0));
        assert_eq!(filter.apply(&model()).expect("apply"), ["g1"]);

        let any = ModelPropertyFilter::new().one_of("carrier", ["gas", "wind"]);
        assert_eq!(any.apply(&model()).expect("apply"), ["g2"]);
    }

    #[test]
    fn unknown_property_is_an_error() {
        let filter = ModelPropertyFilter::new().equals("zone", "DE");
        assert!(matches!(filter.apply(&model()), Err(StudyError::InvalidTable(_))));
    }

    #[test]
    fn filtered_data_keeps_matching_objects() {
        let filter = ModelPropertyFilter::new().equals("carrier", "solar");
        let out = filter_by_model_properties(&generation(), &model(), &filter).expect("filter");
        assert_eq!(out.columns(), [ColumnKey::single("g1"), ColumnKey::single("g3")]);
    }

    #[test]
    fn group_sum_skips_missing() {
        let out = group_by_model_property(&generation(), &model(), "carrier", GroupAggregation::Sum)
            .expect("group");
        assert_eq!(out.level_names(), ["carrier"]);
        assert_eq!(out.numeric_column(&"solar".into()).expect("solar"), vec![4.0, 2.0]);
        assert_eq!(out.numeric_column(&"gas".into()).expect("gas"), vec![10.0, 20.0]);
    }

    #[test]
    fn property_level_is_prepended() {
        let out = with_model_property_level(&generation(), &model(), "carrier").expect("level");
        assert_eq!(out.level_names(), ["carrier", "column"]);
        assert_eq!(out.top_level_labels(), ["solar", "gas"]);
    }

    #[test]
    fn group_aggregation_parses() {
        assert_eq!("Mean".parse::<GroupAggregation>().expect("parse"), GroupAggregation::Mean);
        assert!("median".parse::<GroupAggregation>().is_err());
    }
}
