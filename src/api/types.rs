//! API response and query types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::{Attributes, Dataset};
use crate::table::{Cell, Table};

/// One scenario dataset.
#[derive(Debug, Serialize)]
pub struct ScenarioSummary {
    pub name: String,
    /// Dataset type label (`"platform"`, `"csv"`, ...).
    pub kind: String,
    pub attributes: Attributes,
    /// Number of accepted flags.
    pub flags: usize,
}

impl ScenarioSummary {
    pub fn from_dataset(dataset: &dyn Dataset) -> Self {
        Self {
            name: dataset.name().to_string(),
            kind: dataset.kind().to_string(),
            attributes: dataset.attributes(),
            flags: dataset.accepted_flags().len(),
        }
    }
}

/// One declared comparison.
#[derive(Debug, Serialize)]
pub struct ComparisonSummary {
    pub name: String,
    pub variation: String,
    pub reference: String,
}

/// A flag with the metadata known from scenario flag indexes.
#[derive(Debug, Serialize)]
pub struct FlagInfo {
    pub flag: String,
    pub unit: Option<String>,
    pub model_flag: Option<String>,
}

/// A fetched table in column-major form.
///
/// Numbers serialize as JSON numbers, text as strings and missing cells as
/// `null`.
#[derive(Debug, Serialize)]
pub struct TableResponse {
    pub index_name: String,
    pub level_names: Vec<String>,
    pub index: Vec<String>,
    pub columns: Vec<ColumnData>,
}

/// One column: its labels (one per level) and its values.
#[derive(Debug, Serialize)]
pub struct ColumnData {
    pub key: Vec<String>,
    pub values: Vec<Value>,
}

impl From<&Table> for TableResponse {
    fn from(table: &Table) -> Self {
        Self {
            index_name: table.index_name().to_string(),
            level_names: table.level_names().to_vec(),
            index: table.index().to_vec(),
            columns: table
                .iter_columns()
                .map(|(key, cells)| ColumnData {
                    key: key.levels().to_vec(),
                    values: cells.iter().map(cell_to_json).collect(),
                })
                .collect(),
        }
    }
}

fn cell_to_json(cell: &Cell) -> Value {
    match cell {
        Cell::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
        Cell::Text(s) => Value::String(s.clone()),
        Cell::Empty => Value::Null,
    }
}

/// Query parameters for `GET /kpis`. Every set parameter must match.
#[derive(Debug, Default, Deserialize)]
pub struct KpiQuery {
    pub dataset_name: Option<String>,
    pub flag: Option<String>,
    pub aggregation: Option<String>,
    pub dataset_type: Option<String>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
