//! Single table cell.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One value in a [`Table`](super::Table).
///
/// Numbers carry `NaN` for missing numeric values; [`Cell::Empty`] marks a
/// cell that was never filled (e.g. introduced by aligning two tables).
///
/// Serialized as a plain number, string or `null`. Non-finite numbers,
/// which JSON cannot hold, are written as `{"number": "inf"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CellRepr", into = "CellRepr")]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CellRepr {
    Number(f64),
    Text(String),
    NonFinite { number: String },
    Empty,
}

impl From<Cell> for CellRepr {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Number(n) if n.is_finite() => Self::Number(n),
            Cell::Number(n) => Self::NonFinite { number: n.to_string() },
            Cell::Text(s) => Self::Text(s),
            Cell::Empty => Self::Empty,
        }
    }
}

impl From<CellRepr> for Cell {
    fn from(repr: CellRepr) -> Self {
        match repr {
            CellRepr::Number(n) => Self::Number(n),
            CellRepr::Text(s) => Self::Text(s),
            CellRepr::NonFinite { number } => Self::Number(number.parse().unwrap_or(f64::NAN)),
            CellRepr::Empty => Self::Empty,
        }
    }
}

impl Cell {
    /// Parses a raw CSV field: empty → `Empty`, numeric → `Number`, else `Text`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }

    /// Returns the numeric value, or `None` for missing, `NaN` and text cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// `true` for `Empty` and `NaN`.
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Number(n) => n.is_nan(),
            Self::Text(_) => false,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Builds a numeric cell, mapping `NaN` to [`Cell::Empty`].
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            Self::Empty
        } else {
            Self::Number(value)
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.is_nan() => Ok(()),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Empty => Ok(()),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_distinguishes_kinds() {
        assert_eq!(Cell::parse(""), Cell::Empty);
        assert_eq!(Cell::parse(" 4.5 "), Cell::Number(4.5));
        assert_eq!(Cell::parse("DE"), Cell::Text("DE".to_string()));
    }

    #[test]
    fn nan_counts_as_missing() {
        assert!(Cell::Number(f64::NAN).is_missing());
        assert!(Cell::Empty.is_missing());
        assert!(!Cell::Number(0.0).is_missing());
        assert_eq!(Cell::Number(f64::NAN).as_f64(), None);
    }

    #[test]
    fn non_finite_numbers_survive_json() {
        let cells = vec![
            Cell::Number(f64::INFINITY),
            Cell::Number(f64::NEG_INFINITY),
            Cell::Number(-1.5),
            Cell::from("inf"),
            Cell::Empty,
        ];
        let json = serde_json::to_string(&cells).expect("json");
        assert_eq!(json, r#"[{"number":"inf"},{"number":"-inf"},-1.5,"inf",null]"#);
        let back: Vec<Cell> = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, cells);

        let nan: Cell = serde_json::from_str(&serde_json::to_string(&Cell::Number(f64::NAN)).expect("json"))
            .expect("parse");
        assert!(matches!(nan, Cell::Number(n) if n.is_nan()));
    }

    #[test]
    fn display_leaves_missing_blank() {
        assert_eq!(Cell::Empty.to_string(), "");
        assert_eq!(Cell::Number(f64::NAN).to_string(), "");
        assert_eq!(Cell::Number(2.0).to_string(), "2");
    }
}
