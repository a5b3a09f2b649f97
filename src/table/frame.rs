//! Labelled, column-major table with multi-level column keys.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::cell::Cell;
use crate::error::{Result, StudyError};

/// Default name of the single column level of a freshly built table.
pub const DEFAULT_LEVEL_NAME: &str = "column";

/// Hierarchical column label; one entry per column level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnKey(Vec<String>);

impl ColumnKey {
    pub fn new(levels: Vec<String>) -> Self {
        Self(levels)
    }

    /// Single-level key.
    pub fn single(label: impl Into<String>) -> Self {
        Self(vec![label.into()])
    }

    pub fn levels(&self) -> &[String] {
        &self.0
    }

    pub fn nlevels(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Returns a copy with `label` inserted as the new top level.
    pub fn with_prefix(&self, label: &str) -> Self {
        let mut levels = Vec::with_capacity(self.0.len() + 1);
        levels.push(label.to_string());
        levels.extend(self.0.iter().cloned());
        Self(levels)
    }

    /// Returns a copy with `label` appended as the new bottom level.
    pub fn with_suffix(&self, label: &str) -> Self {
        let mut levels = self.0.clone();
        levels.push(label.to_string());
        Self(levels)
    }

    /// Returns a copy without the top level.
    pub fn without_first(&self) -> Self {
        Self(self.0.iter().skip(1).cloned().collect())
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl From<&str> for ColumnKey {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

impl From<String> for ColumnKey {
    fn from(value: String) -> Self {
        Self::single(value)
    }
}

/// Labelled 2-D data: row labels (`index`) × hierarchical column keys.
///
/// Invariants, checked by [`Table::validate`]:
/// - every column holds exactly `index.len()` cells
/// - every column key has `level_names.len()` levels
/// - column keys are unique
///
/// Row labels may repeat; [`Table::drop_duplicate_index`] removes repeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub(super) index_name: String,
    pub(super) index: Vec<String>,
    pub(super) level_names: Vec<String>,
    pub(super) columns: Vec<ColumnKey>,
    pub(super) data: Vec<Vec<Cell>>,
}

impl Table {
    /// Creates a table with the given row labels and no columns.
    pub fn new(index_name: impl Into<String>, index: Vec<String>) -> Self {
        Self {
            index_name: index_name.into(),
            index,
            level_names: vec![DEFAULT_LEVEL_NAME.to_string()],
            columns: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Assembles a table from raw parts and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::InvalidTable`] when any invariant is violated.
    pub fn from_parts(
        index_name: impl Into<String>,
        index: Vec<String>,
        level_names: Vec<String>,
        columns: Vec<ColumnKey>,
        data: Vec<Vec<Cell>>,
    ) -> Result<Self> {
        let table = Self {
            index_name: index_name.into(),
            index,
            level_names,
            columns,
            data,
        };
        table.validate()?;
        Ok(table)
    }

    /// Builds a single-level numeric table from `(label, values)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::InvalidTable`] if a column length differs from
    /// the index length or a label repeats.
    pub fn from_numeric(
        index_name: impl Into<String>,
        index: Vec<String>,
        columns: Vec<(&str, Vec<f64>)>,
    ) -> Result<Self> {
        let mut table = Self::new(index_name, index);
        for (label, values) in columns {
            table.push_column(
                ColumnKey::single(label),
                values.into_iter().map(Cell::from_f64).collect(),
            )?;
        }
        Ok(table)
    }

    /// Checks all structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.level_names.is_empty() {
            return Err(StudyError::InvalidTable(
                "at least one column level is required".into(),
            ));
        }
        if self.columns.len() != self.data.len() {
            return Err(StudyError::InvalidTable(format!(
                "{} column keys but {} data columns",
                self.columns.len(),
                self.data.len()
            )));
        }
        let mut seen = HashSet::with_capacity(self.columns.len());
        for (key, cells) in self.columns.iter().zip(&self.data) {
            if key.nlevels() != self.level_names.len() {
                return Err(StudyError::InvalidTable(format!(
                    "column `{key}` has {} levels, expected {}",
                    key.nlevels(),
                    self.level_names.len()
                )));
            }
            if cells.len() != self.index.len() {
                return Err(StudyError::InvalidTable(format!(
                    "column `{key}` has {} cells, expected {}",
                    cells.len(),
                    self.index.len()
                )));
            }
            if !seen.insert(key) {
                return Err(StudyError::InvalidTable(format!("duplicate column `{key}`")));
            }
        }
        Ok(())
    }

    /// Appends a column.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::InvalidTable`] on a length or level mismatch, or
    /// if the key already exists.
    pub fn push_column(&mut self, key: ColumnKey, cells: Vec<Cell>) -> Result<()> {
        if cells.len() != self.index.len() {
            return Err(StudyError::InvalidTable(format!(
                "column `{key}` has {} cells, expected {}",
                cells.len(),
                self.index.len()
            )));
        }
        if key.nlevels() != self.level_names.len() {
            return Err(StudyError::InvalidTable(format!(
                "column `{key}` has {} levels, expected {}",
                key.nlevels(),
                self.level_names.len()
            )));
        }
        if self.columns.contains(&key) {
            return Err(StudyError::InvalidTable(format!("duplicate column `{key}`")));
        }
        self.columns.push(key);
        self.data.push(cells);
        Ok(())
    }

    /// Replaces the column level names.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::InvalidTable`] if the level count changes while
    /// columns exist.
    pub fn set_level_names(&mut self, names: Vec<String>) -> Result<()> {
        if !self.columns.is_empty() && names.len() != self.level_names.len() {
            return Err(StudyError::InvalidTable(format!(
                "cannot rename {} levels with {} names",
                self.level_names.len(),
                names.len()
            )));
        }
        if names.is_empty() {
            return Err(StudyError::InvalidTable(
                "at least one column level is required".into(),
            ));
        }
        self.level_names = names;
        Ok(())
    }

    pub fn set_index_name(&mut self, name: impl Into<String>) {
        self.index_name = name.into();
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn level_names(&self) -> &[String] {
        &self.level_names
    }

    pub fn nlevels(&self) -> usize {
        self.level_names.len()
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    pub fn column_position(&self, key: &ColumnKey) -> Option<usize> {
        self.columns.iter().position(|k| k == key)
    }

    pub fn row_position(&self, label: &str) -> Option<usize> {
        self.index.iter().position(|l| l == label)
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&[Cell]> {
        self.column_position(key).map(|i| self.data[i].as_slice())
    }

    /// Cell at the first row labelled `row` in column `key`.
    pub fn get(&self, row: &str, key: &ColumnKey) -> Option<&Cell> {
        let c = self.column_position(key)?;
        let r = self.row_position(row)?;
        self.data[c].get(r)
    }

    /// Iterates `(key, cells)` in column order.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&ColumnKey, &[Cell])> {
        self.columns
            .iter()
            .zip(self.data.iter().map(Vec::as_slice))
    }

    /// Column as `f64`, missing cells mapped to `NaN`.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::NonNumeric`] if the column holds text, or
    /// [`StudyError::InvalidTable`] if it does not exist.
    pub fn numeric_column(&self, key: &ColumnKey) -> Result<Vec<f64>> {
        let cells = self
            .column(key)
            .ok_or_else(|| StudyError::InvalidTable(format!("no column `{key}`")))?;
        numeric_values(key, cells)
    }

    /// `true` when no cell holds text.
    pub fn is_numeric(&self) -> bool {
        self.data.iter().flatten().all(|c| !c.is_text())
    }

    /// Parses every row label as a timestamp; `None` if any label fails.
    pub fn datetime_index(&self) -> Option<Vec<NaiveDateTime>> {
        if self.index.is_empty() {
            return None;
        }
        self.index.iter().map(|l| parse_timestamp(l)).collect()
    }

    /// Cross-section on the top column level: keeps the columns whose first
    /// level equals `label` and drops that level.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::ShapeMismatch`] for single-level tables and
    /// [`StudyError::InvalidTable`] if no column matches.
    pub fn select_top_level(&self, label: &str) -> Result<Self> {
        if self.nlevels() < 2 {
            return Err(StudyError::ShapeMismatch(format!(
                "cannot select `{label}` from a single-level table"
            )));
        }
        let mut out = Self::new(self.index_name.clone(), self.index.clone());
        out.level_names = self.level_names[1..].to_vec();
        for (key, cells) in self.iter_columns() {
            if key.first() == Some(label) {
                out.columns.push(key.without_first());
                out.data.push(cells.to_vec());
            }
        }
        if out.columns.is_empty() {
            return Err(StudyError::InvalidTable(format!(
                "no columns under top-level label `{label}`"
            )));
        }
        Ok(out)
    }

    /// Distinct labels of the top column level, in first-seen order.
    pub fn top_level_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for key in &self.columns {
            if let Some(first) = key.first() {
                if !labels.iter().any(|l| l == first) {
                    labels.push(first.to_string());
                }
            }
        }
        labels
    }

    /// Keeps only the listed columns, in the given order; unknown keys are skipped.
    pub fn select_columns(&self, keys: &[ColumnKey]) -> Self {
        let mut out = Self::new(self.index_name.clone(), self.index.clone());
        out.level_names = self.level_names.clone();
        for key in keys {
            if let Some(i) = self.column_position(key) {
                if !out.columns.contains(key) {
                    out.columns.push(key.clone());
                    out.data.push(self.data[i].clone());
                }
            }
        }
        out
    }
}

pub(crate) fn numeric_values(key: &ColumnKey, cells: &[Cell]) -> Result<Vec<f64>> {
    cells
        .iter()
        .map(|c| match c {
            Cell::Number(n) => Ok(*n),
            Cell::Empty => Ok(f64::NAN),
            Cell::Text(_) => Err(StudyError::NonNumeric(key.to_string())),
        })
        .collect()
}

/// Parses the timestamp formats used for time-series row labels.
pub fn parse_timestamp(label: &str) -> Option<NaiveDateTime> {
    let label = label.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(label) {
        return Some(dt.naive_utc());
    }
    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(label, pattern) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(label, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn push_column_rejects_wrong_length() {
        let mut t = Table::new("time", labels(&["t0", "t1"]));
        let err = t.push_column(ColumnKey::single("a"), vec![Cell::Number(1.0)]);
        assert!(matches!(err, Err(StudyError::InvalidTable(_))));
    }

    #[test]
    fn push_column_rejects_duplicate_key() {
        let mut t = Table::new("time", labels(&["t0"]));
        t.push_column("a".into(), vec![Cell::Number(1.0)]).ok();
        let err = t.push_column("a".into(), vec![Cell::Number(2.0)]);
        assert!(err.is_err());
    }

    #[test]
    fn numeric_column_rejects_text() {
        let mut t = Table::new("object", labels(&["DE"]));
        t.push_column("country".into(), vec![Cell::from("DE")]).ok();
        assert!(matches!(
            t.numeric_column(&"country".into()),
            Err(StudyError::NonNumeric(_))
        ));
    }

    #[test]
    fn datetime_index_parses_common_formats() {
        let t = Table::new(
            "time",
            labels(&["2024-01-01 00:00:00", "2024-01-01T01:00:00", "2024-01-02"]),
        );
        assert_eq!(t.datetime_index().map(|v| v.len()), Some(3));

        let t = Table::new("object", labels(&["DE", "FR"]));
        assert!(t.datetime_index().is_none());
    }

    #[test]
    fn select_top_level_drops_level() {
        let t = Table::from_parts(
            "time",
            labels(&["t0"]),
            labels(&["dataset", "column"]),
            vec![
                ColumnKey::new(labels(&["base", "DE"])),
                ColumnKey::new(labels(&["high", "DE"])),
            ],
            vec![vec![Cell::Number(1.0)], vec![Cell::Number(2.0)]],
        )
        .expect("valid table");

        let high = t.select_top_level("high").expect("label exists");
        assert_eq!(high.level_names(), &["column".to_string()]);
        assert_eq!(high.get("t0", &"DE".into()), Some(&Cell::Number(2.0)));
        assert_eq!(t.top_level_labels(), labels(&["base", "high"]));
    }
}
