//! Physical units for KPI values, with order-of-magnitude conversion and
//! "pretty" unit selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StudyError;

/// Physical dimension; only units of the same dimension convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    Energy,
    Power,
    Currency,
    PriceForEnergy,
    PriceForCapacity,
    Mtu,
    Percentage,
    PerUnit,
    Dimensionless,
}

/// Whether values of a dimension add up over time (extensive) or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityType {
    Intensive,
    Extensive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Unit {
    Wh,
    KWh,
    MWh,
    GWh,
    TWh,
    W,
    KW,
    MW,
    GW,
    TW,
    Eur,
    KEur,
    MEur,
    BEur,
    TEur,
    EurPerWh,
    EurPerMWh,
    EurPerW,
    EurPerMW,
    Mtu,
    Percent,
    PerUnit,
    /// Not a unit.
    NaU,
}

impl Unit {
    pub const ALL: [Unit; 23] = [
        Unit::Wh,
        Unit::KWh,
        Unit::MWh,
        Unit::GWh,
        Unit::TWh,
        Unit::W,
        Unit::KW,
        Unit::MW,
        Unit::GW,
        Unit::TW,
        Unit::Eur,
        Unit::KEur,
        Unit::MEur,
        Unit::BEur,
        Unit::TEur,
        Unit::EurPerWh,
        Unit::EurPerMWh,
        Unit::EurPerW,
        Unit::EurPerMW,
        Unit::Mtu,
        Unit::Percent,
        Unit::PerUnit,
        Unit::NaU,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Wh => "Wh",
            Self::KWh => "kWh",
            Self::MWh => "MWh",
            Self::GWh => "GWh",
            Self::TWh => "TWh",
            Self::W => "W",
            Self::KW => "kW",
            Self::MW => "MW",
            Self::GW => "GW",
            Self::TW => "TW",
            Self::Eur => "EUR",
            Self::KEur => "kEUR",
            Self::MEur => "MEUR",
            Self::BEur => "BEUR",
            Self::TEur => "TEUR",
            Self::EurPerWh => "EUR/Wh",
            Self::EurPerMWh => "EUR/MWh",
            Self::EurPerW => "EUR/W",
            Self::EurPerMW => "EUR/MW",
            Self::Mtu => "MTU",
            Self::Percent => "%",
            Self::PerUnit => "pu",
            Self::NaU => "NaU",
        }
    }

    /// Symbol for display, with the euro sign.
    pub fn pretty_symbol(self) -> String {
        self.symbol().replace("EUR", "€")
    }

    pub fn dimension(self) -> Dimension {
        match self {
            Self::Wh | Self::KWh | Self::MWh | Self::GWh | Self::TWh => Dimension::Energy,
            Self::W | Self::KW | Self::MW | Self::GW | Self::TW => Dimension::Power,
            Self::Eur | Self::KEur | Self::MEur | Self::BEur | Self::TEur => Dimension::Currency,
            Self::EurPerWh | Self::EurPerMWh => Dimension::PriceForEnergy,
            Self::EurPerW | Self::EurPerMW => Dimension::PriceForCapacity,
            Self::Mtu => Dimension::Mtu,
            Self::Percent => Dimension::Percentage,
            Self::PerUnit => Dimension::PerUnit,
            Self::NaU => Dimension::Dimensionless,
        }
    }

    /// Size of one unit in the base unit of its dimension.
    pub fn factor(self) -> f64 {
        match self {
            Self::Wh | Self::W | Self::Eur | Self::EurPerWh | Self::EurPerW => 1.0,
            Self::KWh | Self::KW | Self::KEur => 1e3,
            Self::MWh | Self::MW | Self::MEur => 1e6,
            Self::GWh | Self::GW | Self::BEur => 1e9,
            Self::TWh | Self::TW | Self::TEur => 1e12,
            Self::EurPerMWh | Self::EurPerMW => 1e-6,
            Self::Mtu | Self::Percent | Self::PerUnit | Self::NaU => 1.0,
        }
    }

    pub fn quantity_type(self) -> Option<QuantityType> {
        match self.dimension() {
            Dimension::Power
            | Dimension::PriceForEnergy
            | Dimension::PriceForCapacity
            | Dimension::Percentage
            | Dimension::PerUnit => Some(QuantityType::Intensive),
            Dimension::Energy | Dimension::Currency | Dimension::Mtu => Some(QuantityType::Extensive),
            Dimension::Dimensionless => None,
        }
    }

    /// Units sharing this unit's dimension, smallest first.
    pub fn family(self) -> Vec<Unit> {
        let mut units: Vec<Unit> = Self::ALL
            .into_iter()
            .filter(|u| u.dimension() == self.dimension())
            .collect();
        units.sort_by(|a, b| a.factor().total_cmp(&b.factor()));
        units
    }

    /// Converts `value` from `self` to `target`; `None` across dimensions.
    pub fn convert(self, value: f64, target: Unit) -> Option<f64> {
        (self.dimension() == target.dimension()).then(|| value * self.factor() / target.factor())
    }

    /// Smallest unit of the family in which `|value|` stays below 10 000,
    /// or the largest unit if none does.
    pub fn pretty(self, value: f64) -> (f64, Unit) {
        let family = self.family();
        for unit in &family {
            if let Some(converted) = self.convert(value, *unit) {
                if converted.abs() < 10_000.0 {
                    return (converted, *unit);
                }
            }
        }
        let largest = family.last().copied().unwrap_or(self);
        (self.convert(value, largest).unwrap_or(value), largest)
    }
}

/// Pretty unit shared by several values of one unit: the unit that keeps
/// the median magnitude readable. `None` for an empty list.
pub fn common_pretty_unit(unit: Unit, values: &[f64]) -> Option<Unit> {
    let mut magnitudes: Vec<f64> = values
        .iter()
        .map(|v| v.abs())
        .filter(|v| v.is_finite())
        .collect();
    if magnitudes.is_empty() {
        return None;
    }
    magnitudes.sort_by(f64::total_cmp);
    let median = magnitudes[magnitudes.len() / 2];
    Some(unit.pretty(median).1)
}

/// Formats `value` for reports, e.g. `"-1.23 GWh"` or `"+12.5 %"`.
///
/// Decimals default to the magnitude: 0 above 100, 1 above 10, 2 above 0.1,
/// 3 above 0.01, otherwise 5. `NaN` renders as `N/A`, infinities as `∞`.
pub fn format_quantity(value: f64, unit: Unit, decimals: Option<usize>, signed: bool) -> String {
    let suffix = match unit {
        Unit::NaU => String::new(),
        other => format!(" {}", other.pretty_symbol()),
    };
    if value.is_nan() {
        return format!("N/A{suffix}");
    }
    let sign = if value < 0.0 {
        "-"
    } else if signed && value > 0.0 {
        "+"
    } else {
        ""
    };
    if value.is_infinite() {
        return format!("{sign}∞{suffix}");
    }
    let magnitude = value.abs();
    let decimals = decimals.unwrap_or(if magnitude > 100.0 {
        0
    } else if magnitude > 10.0 {
        1
    } else if magnitude > 0.1 {
        2
    } else if magnitude > 0.01 {
        3
    } else {
        5
    });
    format!("{sign}{magnitude:.decimals$}{suffix}")
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = StudyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('€', "EUR").replace("_per_", "/");
        Self::ALL
            .into_iter()
            .find(|u| u.symbol().eq_ignore_ascii_case(&normalized))
            .or(match normalized.as_str() {
                "percent" => Some(Self::Percent),
                "per_unit" => Some(Self::PerUnit),
                _ => None,
            })
            .ok_or_else(|| StudyError::Kpi(format!("unknown unit `{s}`")))
    }
}

impl TryFrom<String> for Unit {
    type Error = StudyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.symbol().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_within_dimension_only() {
        assert_eq!(Unit::MWh.convert(1.5, Unit::KWh), Some(1500.0));
        let per_wh = Unit::EurPerMWh.convert(50.0, Unit::EurPerWh).expect("same dimension");
        assert!((per_wh - 50e-6).abs() < 1e-15);
        assert_eq!(Unit::MWh.convert(1.0, Unit::MW), None);
    }

    #[test]
    fn pretty_picks_readable_unit() {
        assert_eq!(Unit::MWh.pretty(25_000.0), (25.0, Unit::GWh));
        assert_eq!(Unit::MWh.pretty(0.5), (500.0, Unit::KWh));
        let (value, unit) = Unit::Eur.pretty(5e15);
        assert_eq!(unit, Unit::TEur);
        assert!((value - 5000.0).abs() < 1e-9);
    }

    #[test]
    fn common_unit_follows_median() {
        let unit = common_pretty_unit(Unit::MWh, &[100.0, 20_000.0, 30_000.0]);
        assert_eq!(unit, Some(Unit::GWh));
        assert_eq!(common_pretty_unit(Unit::MWh, &[]), None);
    }

    #[test]
    fn parses_symbols_and_aliases() {
        assert_eq!("MWh".parse::<Unit>().expect("unit"), Unit::MWh);
        assert_eq!("€/MWh".parse::<Unit>().expect("unit"), Unit::EurPerMWh);
        assert_eq!("EUR_per_MWh".parse::<Unit>().expect("unit"), Unit::EurPerMWh);
        assert_eq!("percent".parse::<Unit>().expect("unit"), Unit::Percent);
        assert!("furlong".parse::<Unit>().is_err());
    }

    #[test]
    fn formats_with_magnitude_decimals() {
        assert_eq!(format_quantity(1234.56, Unit::MWh, None, false), "1235 MWh");
        assert_eq!(format_quantity(-12.34, Unit::Eur, None, false), "-12.3 €");
        assert_eq!(format_quantity(0.5, Unit::Percent, None, true), "+0.50 %");
        assert_eq!(format_quantity(f64::NAN, Unit::NaU, None, false), "N/A");
        assert_eq!(format_quantity(f64::INFINITY, Unit::Percent, None, false), "∞ %");
    }

    #[test]
    fn serializes_as_symbol() {
        let json = serde_json::to_string(&Unit::EurPerMWh).expect("json");
        assert_eq!(json, "\"EUR/MWh\"");
        let back: Unit = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, Unit::EurPerMWh);
    }
}
