//! Labelled tabular data used for every fetch result.

mod cell;
mod frame;
mod ops;

pub use cell::Cell;
pub use frame::{ColumnKey, DEFAULT_LEVEL_NAME, Table, parse_timestamp};
pub(crate) use frame::numeric_values;
