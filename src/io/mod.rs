//! File formats: labelled tables as CSV and KPI exports.

pub mod csv_table;
pub mod export;
