//! Column reductions, value comparisons and arithmetic between KPI values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::units::Unit;
use crate::error::{Result, StudyError};
use crate::table::{ColumnKey, Table};

/// Hours represented by one row when the index carries no timestamps.
const DEFAULT_HOURS_PER_ROW: f64 = 1.0;
const HOURS_PER_YEAR: f64 = 8760.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Reduction of one column to a single value.
///
/// Missing cells are skipped. A plain sum over a column with no values is
/// `NaN`, so an absent series never masquerades as a zero total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Aggregation {
    Sum,
    Total,
    Mean,
    Max,
    Min,
    AnnualizedSum,
    DailySum,
    AbsSum,
    AbsMax,
    AbsMean,
    AbsMin,
    SumGeqZero,
    SumLeqZero,
    MeanGeqZero,
    MeanLeqZero,
    MtusWithNan,
    MtusNonZero,
    MtusEqZero,
    MtusAboveZero,
    MtusBelowZero,
    MtusAboveX(f64),
    MtusBelowX(f64),
}

impl Aggregation {
    /// Every aggregation without a threshold parameter.
    pub const BASIC: [Aggregation; 20] = [
        Self::Sum,
        Self::Total,
        Self::Mean,
        Self::Max,
        Self::Min,
        Self::AnnualizedSum,
        Self::DailySum,
        Self::AbsSum,
        Self::AbsMax,
        Self::AbsMean,
        Self::AbsMin,
        Self::SumGeqZero,
        Self::SumLeqZero,
        Self::MeanGeqZero,
        Self::MeanLeqZero,
        Self::MtusWithNan,
        Self::MtusNonZero,
        Self::MtusEqZero,
        Self::MtusAboveZero,
        Self::MtusBelowZero,
    ];

    pub fn name(&self) -> String {
        match self {
            Self::Sum => "Sum".into(),
            Self::Total => "Total".into(),
            Self::Mean => "Mean".into(),
            Self::Max => "Max".into(),
            Self::Min => "Min".into(),
            Self::AnnualizedSum => "AnnualizedSum".into(),
            Self::DailySum => "DailySum".into(),
            Self::AbsSum => "AbsSum".into(),
            Self::AbsMax => "AbsMax".into(),
            Self::AbsMean => "AbsMean".into(),
            Self::AbsMin => "AbsMin".into(),
            Self::SumGeqZero => "SumGeqZero".into(),
            Self::SumLeqZero => "SumLeqZero".into(),
            Self::MeanGeqZero => "MeanGeqZero".into(),
            Self::MeanLeqZero => "MeanLeqZero".into(),
            Self::MtusWithNan => "MTUsWithNaN".into(),
            Self::MtusNonZero => "MTUsNonZero".into(),
            Self::MtusEqZero => "MTUsEqZero".into(),
            Self::MtusAboveZero => "MTUsAboveZero".into(),
            Self::MtusBelowZero => "MTUsBelowZero".into(),
            Self::MtusAboveX(x) => format!("MTUsAbove{x:?}"),
            Self::MtusBelowX(x) => format!("MTUsBelow{x:?}"),
        }
    }

    /// Unit forced by the aggregation itself (MTU counts), if any.
    pub fn unit(&self) -> Option<Unit> {
        match self {
            Self::MtusWithNan
            | Self::MtusNonZero
            | Self::MtusEqZero
            | Self::MtusAboveZero
            | Self::MtusBelowZero
            | Self::MtusAboveX(_)
            | Self::MtusBelowX(_) => Some(Unit::Mtu),
            _ => None,
        }
    }

    /// Reduces one series; `hours` is the total duration covered by it.
    pub fn reduce(&self, values: &[f64], hours: f64) -> f64 {
        let present = || values.iter().copied().filter(|v| !v.is_nan());
        let count = |pred: &dyn Fn(f64) -> bool| values.iter().filter(|v| pred(**v)).count() as f64;
        match self {
            Self::Sum | Self::Total => strict_sum(present()),
            Self::Mean => mean(present()),
            Self::Max => present().fold(f64::NAN, f64::max),
            Self::Min => present().fold(f64::NAN, f64::min),
            Self::AnnualizedSum => present().sum::<f64>() / hours * HOURS_PER_YEAR,
            Self::DailySum => present().sum::<f64>() / hours * HOURS_PER_DAY,
            Self::AbsSum => present().map(f64::abs).sum(),
            Self::AbsMax => present().map(f64::abs).fold(f64::NAN, f64::max),
            Self::AbsMean => mean(present().map(f64::abs)),
            Self::AbsMin => present().map(f64::abs).fold(f64::NAN, f64::min),
            Self::SumGeqZero => present().map(|v| v.max(0.0)).sum(),
            Self::SumLeqZero => present().map(|v| v.min(0.0)).sum(),
            Self::MeanGeqZero => mean(present().map(|v| v.max(0.0))),
            Self::MeanLeqZero => mean(present().map(|v| v.min(0.0))),
            Self::MtusWithNan => count(&|v| v.is_nan()),
            Self::MtusNonZero => count(&|v| !v.is_nan() && v != 0.0),
            Self::MtusEqZero => count(&|v| v == 0.0),
            Self::MtusAboveZero => count(&|v| v > 0.0),
            Self::MtusBelowZero => count(&|v| v < 0.0),
            Self::MtusAboveX(x) => count(&|v| v > *x),
            Self::MtusBelowX(x) => count(&|v| v < *x),
        }
    }

    /// One value per column, in column order.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::NonNumeric`] if a column holds text.
    pub fn apply(&self, table: &Table) -> Result<Vec<(ColumnKey, f64)>> {
        let hours = total_hours(table);
        table
            .columns()
            .iter()
            .map(|key| {
                let values = table.numeric_column(key)?;
                Ok((key.clone(), self.reduce(&values, hours)))
            })
            .collect()
    }
}

fn strict_sum(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::NAN, |acc, v| if acc.is_nan() { v } else { acc + v })
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0_usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

/// Total hours covered by the rows of `table`.
///
/// With a datetime index each row lasts until the next timestamp and the last
/// row repeats the previous step; a single timestamp counts as one hour.
/// Without timestamps every row counts as one hour.
pub fn total_hours(table: &Table) -> f64 {
    let Some(stamps) = table.datetime_index() else {
        return table.nrows() as f64 * DEFAULT_HOURS_PER_ROW;
    };
    if stamps.len() < 2 {
        return stamps.len() as f64 * DEFAULT_HOURS_PER_ROW;
    }
    let steps: Vec<f64> = stamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds() as f64 / 3600.0)
        .collect();
    let last = steps.last().copied().unwrap_or(DEFAULT_HOURS_PER_ROW);
    steps.iter().sum::<f64>() + last
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Aggregation {
    type Err = StudyError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(found) = Self::BASIC.iter().find(|a| a.name().eq_ignore_ascii_case(s)) {
            return Ok(*found);
        }
        let threshold = |prefix: &str| {
            s.get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .and_then(|_| s[prefix.len()..].parse::<f64>().ok())
        };
        if let Some(x) = threshold("MTUsAbove") {
            return Ok(Self::MtusAboveX(x));
        }
        if let Some(x) = threshold("MTUsBelow") {
            return Ok(Self::MtusBelowX(x));
        }
        Err(StudyError::Kpi(format!("unknown aggregation `{s}`")))
    }
}

impl TryFrom<String> for Aggregation {
    type Error = StudyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Aggregation> for String {
    fn from(value: Aggregation) -> Self {
        value.name()
    }
}

/// `±inf` by the sign of `variation`; `NaN` when there is no sign.
fn signed_infinity(variation: f64) -> f64 {
    if variation > 0.0 {
        f64::INFINITY
    } else if variation < 0.0 {
        f64::NEG_INFINITY
    } else {
        f64::NAN
    }
}

/// How a variation value is compared against its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueComparison {
    Increase,
    Decrease,
    PercentageIncrease,
    PercentageDecrease,
    Share,
    Delta,
    Diff,
}

impl ValueComparison {
    pub const ALL: [ValueComparison; 7] = [
        Self::Increase,
        Self::Decrease,
        Self::PercentageIncrease,
        Self::PercentageDecrease,
        Self::Share,
        Self::Delta,
        Self::Diff,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Increase => "Increase",
            Self::Decrease => "Decrease",
            Self::PercentageIncrease => "PercentageIncrease",
            Self::PercentageDecrease => "PercentageDecrease",
            Self::Share => "Share",
            Self::Delta => "Delta",
            Self::Diff => "Diff",
        }
    }

    /// Percent-valued comparisons; the others keep the input unit.
    pub fn unit(self) -> Option<Unit> {
        match self {
            Self::PercentageIncrease | Self::PercentageDecrease | Self::Share => Some(Unit::Percent),
            _ => None,
        }
    }

    pub fn apply(self, variation: f64, reference: f64) -> f64 {
        match self {
            Self::Increase | Self::Delta | Self::Diff => variation - reference,
            Self::Decrease => reference - variation,
            Self::PercentageIncrease if reference == 0.0 => signed_infinity(variation),
            Self::PercentageIncrease => (variation - reference) / reference * 100.0,
            Self::PercentageDecrease if reference == 0.0 => signed_infinity(-variation),
            Self::PercentageDecrease => (reference - variation) / reference * 100.0,
            Self::Share if reference == 0.0 => signed_infinity(variation),
            Self::Share => variation / reference * 100.0,
        }
    }
}

impl fmt::Display for ValueComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueComparison {
    type Err = StudyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StudyError::Kpi(format!("unknown value comparison `{s}`")))
    }
}

/// Binary operation between two KPI values of the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOperation {
    Product,
    Division,
    Share,
    Sum,
    Diff,
    Delta,
}

impl ArithmeticOperation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Product => "Product",
            Self::Division => "Division",
            Self::Share => "Share",
            Self::Sum => "Sum",
            Self::Diff => "Diff",
            Self::Delta => "Delta",
        }
    }

    pub fn unit(self) -> Option<Unit> {
        match self {
            Self::Share => Some(Unit::Percent),
            _ => None,
        }
    }

    /// Whether the result keeps the unit of the left operand.
    pub fn preserves_unit(self) -> bool {
        matches!(self, Self::Sum | Self::Diff | Self::Delta)
    }

    pub fn apply(self, left: f64, right: f64) -> f64 {
        match self {
            Self::Product => left * right,
            Self::Division if right == 0.0 => signed_infinity(left),
            Self::Division => left / right,
            Self::Share if right == 0.0 => signed_infinity(left),
            Self::Share => left / right * 100.0,
            Self::Sum => left + right,
            Self::Diff | Self::Delta => left - right,
        }
    }
}

impl fmt::Display for ArithmeticOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly(values: Vec<f64>) -> Table {
        let index = (0..values.len())
            .map(|h| format!("2024-01-01 {h:02}:00:00"))
            .collect();
        Table::from_numeric("time", index, vec![("n1", values)]).expect("table")
    }

    #[test]
    fn basic_reductions() {
        let values = [10.0, 20.0, 30.0];
        assert_eq!(Aggregation::Mean.reduce(&values, 3.0), 20.0);
        assert_eq!(Aggregation::Sum.reduce(&values, 3.0), 60.0);
        assert_eq!(Aggregation::Max.reduce(&values, 3.0), 30.0);
        assert_eq!(Aggregation::Min.reduce(&values, 3.0), 10.0);
    }

    #[test]
    fn missing_values_are_skipped_but_empty_sum_is_nan() {
        assert_eq!(Aggregation::Sum.reduce(&[1.0, f64::NAN, 2.0], 3.0), 3.0);
        assert!(Aggregation::Sum.reduce(&[f64::NAN, f64::NAN], 2.0).is_nan());
        assert!(Aggregation::Mean.reduce(&[], 0.0).is_nan());
        assert_eq!(Aggregation::AbsSum.reduce(&[f64::NAN], 1.0), 0.0);
    }

    #[test]
    fn clipped_and_absolute_reductions() {
        let values = [-3.0, 1.0, 2.0, -1.0];
        assert_eq!(Aggregation::SumGeqZero.reduce(&values, 4.0), 3.0);
        assert_eq!(Aggregation::SumLeqZero.reduce(&values, 4.0), -4.0);
        assert_eq!(Aggregation::MeanLeqZero.reduce(&values, 4.0), -1.0);
        assert_eq!(Aggregation::AbsMax.reduce(&values, 4.0), 3.0);
        assert_eq!(Aggregation::AbsMean.reduce(&values, 4.0), 1.75);
    }

    #[test]
    fn mtu_counts() {
        let values = [0.0, 5.0, -2.0, f64::NAN, 60.0];
        assert_eq!(Aggregation::MtusAboveZero.reduce(&values, 5.0), 2.0);
        assert_eq!(Aggregation::MtusBelowZero.reduce(&values, 5.0), 1.0);
        assert_eq!(Aggregation::MtusEqZero.reduce(&values, 5.0), 1.0);
        assert_eq!(Aggregation::MtusNonZero.reduce(&values, 5.0), 3.0);
        assert_eq!(Aggregation::MtusWithNan.reduce(&values, 5.0), 1.0);
        assert_eq!(Aggregation::MtusAboveX(50.0).reduce(&values, 5.0), 1.0);
        assert_eq!(Aggregation::MtusAboveX(50.0).unit(), Some(Unit::Mtu));
        assert_eq!(Aggregation::Mean.unit(), None);
    }

    #[test]
    fn annualized_sum_scales_by_duration() {
        let table = hourly(vec![1.0; 24]);
        assert_eq!(total_hours(&table), 24.0);
        let out = Aggregation::AnnualizedSum.apply(&table).expect("apply");
        assert_eq!(out[0].1, 8760.0);
        let daily = Aggregation::DailySum.apply(&table).expect("apply");
        assert_eq!(daily[0].1, 24.0);
    }

    #[test]
    fn non_datetime_rows_count_one_hour() {
        let table = Table::from_numeric("row", vec!["a".into(), "b".into()], vec![("x", vec![1.0, 1.0])])
            .expect("table");
        assert_eq!(total_hours(&table), 2.0);
    }

    #[test]
    fn apply_returns_one_value_per_column() {
        let table = Table::from_numeric(
            "time",
            vec!["0".into(), "1".into()],
            vec![("a", vec![1.0, 2.0]), ("b", vec![f64::NAN, f64::NAN])],
        )
        .expect("table");
        let out = Aggregation::Sum.apply(&table).expect("apply");
        assert_eq!(out[0], (ColumnKey::single("a"), 3.0));
        assert!(out[1].1.is_nan());
    }

    #[test]
    fn names_round_trip_through_parse() {
        for agg in Aggregation::BASIC {
            assert_eq!(agg.name().parse::<Aggregation>().expect("parse"), agg);
        }
        assert_eq!(
            "MTUsAbove50".parse::<Aggregation>().expect("parse"),
            Aggregation::MtusAboveX(50.0)
        );
        assert_eq!(Aggregation::MtusBelowX(-2.5).name(), "MTUsBelow-2.5");
        assert_eq!(Aggregation::MtusAboveX(50.0).name(), "MTUsAbove50.0");
        assert_eq!(
            "MTUsAbove50.0".parse::<Aggregation>().expect("parse"),
            Aggregation::MtusAboveX(50.0)
        );
        assert!("Median".parse::<Aggregation>().is_err());
    }

    #[test]
    fn value_comparisons() {
        assert_eq!(ValueComparison::PercentageIncrease.apply(120.0, 100.0), 20.0);
        assert_eq!(ValueComparison::PercentageDecrease.apply(80.0, 100.0), 20.0);
        assert_eq!(ValueComparison::Increase.apply(120.0, 100.0), 20.0);
        assert_eq!(ValueComparison::Decrease.apply(120.0, 100.0), -20.0);
        assert_eq!(ValueComparison::Share.apply(50.0, 200.0), 25.0);
        assert_eq!(ValueComparison::PercentageIncrease.apply(5.0, 0.0), f64::INFINITY);
        assert_eq!(ValueComparison::PercentageIncrease.apply(-5.0, 0.0), f64::NEG_INFINITY);
        assert!(ValueComparison::PercentageIncrease.apply(0.0, 0.0).is_nan());
        assert_eq!(ValueComparison::Share.unit(), Some(Unit::Percent));
        assert_eq!(ValueComparison::Delta.unit(), None);
    }

    #[test]
    fn arithmetic_operations() {
        assert_eq!(ArithmeticOperation::Product.apply(3.0, 4.0), 12.0);
        assert_eq!(ArithmeticOperation::Division.apply(3.0, 4.0), 0.75);
        assert_eq!(ArithmeticOperation::Share.apply(1.0, 4.0), 25.0);
        assert_eq!(ArithmeticOperation::Division.apply(3.0, 0.0), f64::INFINITY);
        assert!(ArithmeticOperation::Diff.preserves_unit());
        assert!(!ArithmeticOperation::Product.preserves_unit());
    }
}
