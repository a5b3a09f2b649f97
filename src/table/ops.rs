//! Label-aligned table operations: stacking, arithmetic and merging.

use std::collections::{HashMap, HashSet};

use super::cell::Cell;
use super::frame::{ColumnKey, Table};
use crate::error::{Result, StudyError};

/// Union of two label lists, keeping first-seen order.
fn union_labels(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(a.len() + b.len());
    let mut out = Vec::with_capacity(a.len().max(b.len()));
    for label in a.iter().chain(b) {
        if seen.insert(label.as_str()) {
            out.push(label.clone());
        }
    }
    out
}

fn union_keys(a: &[ColumnKey], b: &[ColumnKey]) -> Vec<ColumnKey> {
    let mut seen: HashSet<&ColumnKey> = HashSet::with_capacity(a.len() + b.len());
    let mut out = Vec::with_capacity(a.len().max(b.len()));
    for key in a.iter().chain(b) {
        if seen.insert(key) {
            out.push(key.clone());
        }
    }
    out
}

/// First position of each row label.
fn row_lookup(table: &Table) -> HashMap<&str, usize> {
    let mut map = HashMap::with_capacity(table.index.len());
    for (i, label) in table.index.iter().enumerate() {
        map.entry(label.as_str()).or_insert(i);
    }
    map
}

fn column_lookup(table: &Table) -> HashMap<&ColumnKey, usize> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(i, k)| (k, i))
        .collect()
}

fn ensure_same_levels(a: &Table, b: &Table) -> Result<()> {
    if a.nlevels() != b.nlevels() {
        return Err(StudyError::ShapeMismatch(format!(
            "column levels differ: {:?} vs {:?}",
            a.level_names, b.level_names
        )));
    }
    Ok(())
}

impl Table {
    /// Re-labels rows to `new_index`; rows missing from `self` become `Empty`.
    pub fn reindex_rows(&self, new_index: &[String]) -> Self {
        let rows = row_lookup(self);
        let data = self
            .data
            .iter()
            .map(|col| {
                new_index
                    .iter()
                    .map(|label| {
                        rows.get(label.as_str())
                            .map_or(Cell::Empty, |&r| col[r].clone())
                    })
                    .collect()
            })
            .collect();
        Self {
            index_name: self.index_name.clone(),
            index: new_index.to_vec(),
            level_names: self.level_names.clone(),
            columns: self.columns.clone(),
            data,
        }
    }

    /// Stacks tables side by side under a new column level holding each
    /// part's name. Rows are outer-joined in first-seen order.
    ///
    /// With `on_top` the new level becomes the first level, otherwise the last.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::ShapeMismatch`] if `parts` is empty, or if parts
    /// differ in column level count or index name.
    pub fn concat_columns(parts: &[(String, Table)], level_name: &str, on_top: bool) -> Result<Self> {
        let Some((_, first)) = parts.first() else {
            return Err(StudyError::ShapeMismatch("nothing to concatenate".into()));
        };
        for (name, part) in parts {
            if part.nlevels() != first.nlevels() {
                return Err(StudyError::ShapeMismatch(format!(
                    "`{name}` has {} column levels, expected {}",
                    part.nlevels(),
                    first.nlevels()
                )));
            }
            if part.index_name != first.index_name {
                return Err(StudyError::ShapeMismatch(format!(
                    "`{name}` is indexed by `{}`, expected `{}`",
                    part.index_name, first.index_name
                )));
            }
        }

        let mut index: Vec<String> = Vec::new();
        for (_, part) in parts {
            index = union_labels(&index, &part.index);
        }

        let mut level_names = Vec::with_capacity(first.nlevels() + 1);
        if on_top {
            level_names.push(level_name.to_string());
            level_names.extend(first.level_names.iter().cloned());
        } else {
            level_names.extend(first.level_names.iter().cloned());
            level_names.push(level_name.to_string());
        }

        let mut out = Self {
            index_name: first.index_name.clone(),
            index: index.clone(),
            level_names,
            columns: Vec::new(),
            data: Vec::new(),
        };
        for (name, part) in parts {
            let aligned = part.reindex_rows(&index);
            for (key, cells) in aligned.columns.into_iter().zip(aligned.data) {
                let key = if on_top {
                    key.with_prefix(name)
                } else {
                    key.with_suffix(name)
                };
                out.push_column(key, cells)?;
            }
        }
        Ok(out)
    }

    /// Appends the rows of `other` below `self`, outer-joining columns.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::ShapeMismatch`] if column levels differ.
    pub fn concat_rows(&self, other: &Self) -> Result<Self> {
        ensure_same_levels(self, other)?;
        let columns = union_keys(&self.columns, &other.columns);
        let mine = column_lookup(self);
        let theirs = column_lookup(other);
        let n_self = self.nrows();
        let n_other = other.nrows();

        let data = columns
            .iter()
            .map(|key| {
                let mut cells = Vec::with_capacity(n_self + n_other);
                match mine.get(key) {
                    Some(&c) => cells.extend(self.data[c].iter().cloned()),
                    None => cells.extend(std::iter::repeat_n(Cell::Empty, n_self)),
                }
                match theirs.get(key) {
                    Some(&c) => cells.extend(other.data[c].iter().cloned()),
                    None => cells.extend(std::iter::repeat_n(Cell::Empty, n_other)),
                }
                cells
            })
            .collect();

        let mut index = self.index.clone();
        index.extend(other.index.iter().cloned());
        Ok(Self {
            index_name: self.index_name.clone(),
            index,
            level_names: self.level_names.clone(),
            columns,
            data,
        })
    }

    /// Element-wise `self - other` over the union of rows and columns.
    ///
    /// A cell missing on one side is replaced by `fill_value`; when both
    /// sides are missing, or no fill value is given, the result is `Empty`.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::NonNumeric`] if either side holds text, or
    /// [`StudyError::ShapeMismatch`] if column levels differ.
    pub fn subtract(&self, other: &Self, fill_value: Option<f64>) -> Result<Self> {
        self.zip_numeric(other, fill_value, |a, b| a - b)
    }

    /// Element-wise `self + other`; same alignment rules as [`Table::subtract`].
    pub fn add(&self, other: &Self, fill_value: Option<f64>) -> Result<Self> {
        self.zip_numeric(other, fill_value, |a, b| a + b)
    }

    fn zip_numeric(
        &self,
        other: &Self,
        fill_value: Option<f64>,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<Self> {
        ensure_same_levels(self, other)?;
        let index = union_labels(&self.index, &other.index);
        let columns = union_keys(&self.columns, &other.columns);
        let rows_a = row_lookup(self);
        let rows_b = row_lookup(other);
        let cols_a = column_lookup(self);
        let cols_b = column_lookup(other);

        let mut data = Vec::with_capacity(columns.len());
        for key in &columns {
            let mut cells = Vec::with_capacity(index.len());
            for label in &index {
                let a = aligned_value(self, &rows_a, &cols_a, key, label)?;
                let b = aligned_value(other, &rows_b, &cols_b, key, label)?;
                let out = match (a, b) {
                    (Some(a), Some(b)) => Some(op(a, b)),
                    (Some(a), None) => fill_value.map(|f| op(a, f)),
                    (None, Some(b)) => fill_value.map(|f| op(f, b)),
                    (None, None) => None,
                };
                cells.push(out.map_or(Cell::Empty, Cell::from_f64));
            }
            data.push(cells);
        }

        Ok(Self {
            index_name: self.index_name.clone(),
            index,
            level_names: self.level_names.clone(),
            columns,
            data,
        })
    }

    /// Fills missing cells of `self` from `other` over the union of rows and
    /// columns. Values present in `self` always win.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::ShapeMismatch`] if column levels differ.
    pub fn combine_first(&self, other: &Self) -> Result<Self> {
        ensure_same_levels(self, other)?;
        let index = union_labels(&self.index, &other.index);
        let columns = union_keys(&self.columns, &other.columns);
        let rows_a = row_lookup(self);
        let rows_b = row_lookup(other);
        let cols_a = column_lookup(self);
        let cols_b = column_lookup(other);

        let data = columns
            .iter()
            .map(|key| {
                index
                    .iter()
                    .map(|label| {
                        let mine = cols_a
                            .get(key)
                            .zip(rows_a.get(label.as_str()))
                            .map(|(&c, &r)| &self.data[c][r])
                            .filter(|cell| !cell.is_missing());
                        let theirs = || {
                            cols_b
                                .get(key)
                                .zip(rows_b.get(label.as_str()))
                                .map(|(&c, &r)| other.data[c][r].clone())
                        };
                        mine.cloned().or_else(theirs).unwrap_or(Cell::Empty)
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            index_name: self.index_name.clone(),
            index,
            level_names: self.level_names.clone(),
            columns,
            data,
        })
    }

    /// Merges fragmented tables pairwise, left to right.
    ///
    /// For each pair: shared rows but no shared columns → columns are joined;
    /// shared columns but no shared rows → rows are appended; otherwise gaps
    /// are filled with [`Table::combine_first`], the earlier table winning
    /// when `keep_first` is set and the later one otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::ShapeMismatch`] for an empty input or mismatched
    /// column levels.
    pub fn combine(tables: Vec<Self>, keep_first: bool) -> Result<Self> {
        let mut iter = tables.into_iter();
        let Some(mut acc) = iter.next() else {
            return Err(StudyError::ShapeMismatch(
                "at least one table is required".into(),
            ));
        };
        for next in iter {
            acc = merge_pair(&acc, &next, keep_first)?;
        }
        Ok(acc)
    }

    /// `true` if any row label occurs more than once.
    pub fn has_duplicate_index(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.index.len());
        self.index.iter().any(|l| !seen.insert(l.as_str()))
    }

    /// Removes repeated row labels, keeping the first occurrence.
    ///
    /// Returns the number of rows removed.
    pub fn drop_duplicate_index(&mut self) -> usize {
        let mut seen = HashSet::with_capacity(self.index.len());
        let keep: Vec<bool> = self
            .index
            .iter()
            .map(|l| seen.insert(l.clone()))
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();
        if removed == 0 {
            return 0;
        }
        self.index = filter_by_mask(&self.index, &keep);
        for col in &mut self.data {
            *col = filter_by_mask(col, &keep);
        }
        removed
    }

    /// Sorts rows chronologically when every label is a timestamp.
    ///
    /// Returns `true` if the index was recognised as datetime.
    pub fn sort_index_if_datetime(&mut self) -> bool {
        let Some(times) = self.datetime_index() else {
            return false;
        };
        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by_key(|&i| times[i]);
        if order.iter().enumerate().all(|(pos, &i)| pos == i) {
            return true;
        }
        self.index = order.iter().map(|&i| self.index[i].clone()).collect();
        for col in &mut self.data {
            *col = order.iter().map(|&i| col[i].clone()).collect();
        }
        true
    }
}

fn aligned_value(
    table: &Table,
    rows: &HashMap<&str, usize>,
    cols: &HashMap<&ColumnKey, usize>,
    key: &ColumnKey,
    label: &str,
) -> Result<Option<f64>> {
    let (Some(&c), Some(&r)) = (cols.get(key), rows.get(label)) else {
        return Ok(None);
    };
    match &table.data[c][r] {
        Cell::Text(_) => Err(StudyError::NonNumeric(key.to_string())),
        cell => Ok(cell.as_f64()),
    }
}

fn filter_by_mask<T: Clone>(items: &[T], keep: &[bool]) -> Vec<T> {
    items
        .iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(item, _)| item.clone())
        .collect()
}

fn merge_pair(a: &Table, b: &Table, keep_first: bool) -> Result<Table> {
    let rows_a: HashSet<&str> = a.index.iter().map(String::as_str).collect();
    let shares_rows = b.index.iter().any(|l| rows_a.contains(l.as_str()));
    let cols_a: HashSet<&ColumnKey> = a.columns.iter().collect();
    let shares_columns = b.columns.iter().any(|k| cols_a.contains(k));

    if shares_rows && !shares_columns {
        ensure_same_levels(a, b)?;
        let index = union_labels(&a.index, &b.index);
        let mut out = a.reindex_rows(&index);
        let right = b.reindex_rows(&index);
        for (key, cells) in right.columns.into_iter().zip(right.data) {
            out.push_column(key, cells)?;
        }
        return Ok(out);
    }
    if shares_columns && !shares_rows {
        return a.concat_rows(b);
    }
    if keep_first {
        a.combine_first(b)
    } else {
        b.combine_first(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| (*s).to_string()).collect()
    }

    fn prices(values: &[(&str, Vec<f64>)], rows: &[&str]) -> Table {
        Table::from_numeric("time", labels(rows), values.to_vec()).expect("valid table")
    }

    fn num(t: &Table, row: &str, col: &str) -> Option<f64> {
        t.get(row, &ColumnKey::single(col)).and_then(Cell::as_f64)
    }

    #[test]
    fn subtract_fills_missing_side() {
        let var = prices(&[("DE", vec![12.0, 15.0]), ("FR", vec![5.0, 6.0])], &["t0", "t1"]);
        let reference = prices(&[("DE", vec![10.0, 10.0])], &["t0", "t1"]);

        let delta = var.subtract(&reference, Some(0.0)).expect("numeric");
        assert_eq!(num(&delta, "t0", "DE"), Some(2.0));
        assert_eq!(num(&delta, "t1", "DE"), Some(5.0));
        assert_eq!(num(&delta, "t1", "FR"), Some(6.0));
    }

    #[test]
    fn subtract_without_fill_leaves_gap() {
        let var = prices(&[("DE", vec![1.0])], &["t0"]);
        let reference = prices(&[("FR", vec![1.0])], &["t0"]);
        let delta = var.subtract(&reference, None).expect("numeric");
        assert_eq!(delta.get("t0", &"DE".into()), Some(&Cell::Empty));
    }

    #[test]
    fn subtract_rejects_text() {
        let mut model = Table::new("object", labels(&["n1"]));
        model.push_column("country".into(), vec![Cell::from("DE")]).ok();
        assert!(matches!(
            model.subtract(&model, Some(0.0)),
            Err(StudyError::NonNumeric(_))
        ));
    }

    #[test]
    fn concat_columns_outer_joins_rows_and_prefixes_keys() {
        let base = prices(&[("DE", vec![1.0, 2.0])], &["t0", "t1"]);
        let high = prices(&[("DE", vec![3.0])], &["t1"]);
        let stacked = Table::concat_columns(
            &[("base".to_string(), base), ("high".to_string(), high)],
            "dataset",
            true,
        )
        .expect("same shape");

        assert_eq!(stacked.index(), labels(&["t0", "t1"]).as_slice());
        assert_eq!(stacked.level_names(), labels(&["dataset", "column"]).as_slice());
        let high_de = ColumnKey::new(labels(&["high", "DE"]));
        assert_eq!(stacked.get("t0", &high_de), Some(&Cell::Empty));
        assert_eq!(stacked.get("t1", &high_de), Some(&Cell::Number(3.0)));
    }

    #[test]
    fn concat_columns_at_bottom_appends_level() {
        let base = prices(&[("DE", vec![1.0])], &["t0"]);
        let stacked =
            Table::concat_columns(&[("base".to_string(), base)], "dataset", false).expect("ok");
        assert_eq!(stacked.columns()[0], ColumnKey::new(labels(&["DE", "base"])));
    }

    #[test]
    fn concat_columns_rejects_level_mismatch() {
        let flat = prices(&[("DE", vec![1.0])], &["t0"]);
        let nested =
            Table::concat_columns(&[("x".to_string(), flat.clone())], "dataset", true).expect("ok");
        let err = Table::concat_columns(
            &[("a".to_string(), flat), ("b".to_string(), nested)],
            "dataset",
            true,
        );
        assert!(matches!(err, Err(StudyError::ShapeMismatch(_))));
    }

    #[test]
    fn combine_appends_disjoint_rows() {
        let week1 = prices(&[("DE", vec![1.0])], &["t0"]);
        let week2 = prices(&[("DE", vec![2.0])], &["t1"]);
        let merged = Table::combine(vec![week1, week2], true).expect("ok");
        assert_eq!(merged.nrows(), 2);
        assert_eq!(num(&merged, "t1", "DE"), Some(2.0));
    }

    #[test]
    fn combine_joins_disjoint_columns() {
        let a = prices(&[("DE", vec![1.0])], &["t0"]);
        let b = prices(&[("FR", vec![2.0])], &["t0"]);
        let merged = Table::combine(vec![a, b], true).expect("ok");
        assert_eq!(merged.ncols(), 2);
    }

    #[test]
    fn combine_overlap_respects_priority() {
        let a = prices(&[("DE", vec![1.0, f64::NAN])], &["t0", "t1"]);
        let b = prices(&[("DE", vec![9.0, 8.0])], &["t0", "t1"]);

        let first = Table::combine(vec![a.clone(), b.clone()], true).expect("ok");
        assert_eq!(num(&first, "t0", "DE"), Some(1.0));
        assert_eq!(num(&first, "t1", "DE"), Some(8.0));

        let last = Table::combine(vec![a, b], false).expect("ok");
        assert_eq!(num(&last, "t0", "DE"), Some(9.0));
    }

    #[test]
    fn drop_duplicate_index_keeps_first() {
        let mut t = prices(&[("DE", vec![1.0, 2.0, 3.0])], &["t0", "t0", "t1"]);
        assert!(t.has_duplicate_index());
        assert_eq!(t.drop_duplicate_index(), 1);
        assert_eq!(num(&t, "t0", "DE"), Some(1.0));
        assert_eq!(t.nrows(), 2);
    }

    #[test]
    fn sort_index_only_for_datetimes() {
        let mut t = prices(
            &[("DE", vec![2.0, 1.0])],
            &["2024-01-01 01:00:00", "2024-01-01 00:00:00"],
        );
        assert!(t.sort_index_if_datetime());
        assert_eq!(t.index()[0], "2024-01-01 00:00:00");
        assert_eq!(t.column(&"DE".into()).map(|c| c[0].clone()), Some(Cell::Number(1.0)));

        let mut objects = prices(&[("p", vec![1.0, 2.0])], &["b", "a"]);
        assert!(!objects.sort_index_if_datetime());
        assert_eq!(objects.index()[0], "b");
    }
}
