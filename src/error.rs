//! Error types shared by tables, datasets, caches and the study manager.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StudyError>;

/// Errors raised while fetching, combining or caching study data.
#[derive(Debug, Error)]
pub enum StudyError {
    /// The dataset does not accept the requested flag.
    #[error("flag `{flag}` not accepted by dataset `{dataset}`")]
    UnknownFlag { dataset: String, flag: String },

    /// No dataset with this name exists in the collection.
    #[error("dataset `{0}` not found")]
    UnknownDataset(String),

    /// A dataset name was registered twice where uniqueness is required.
    #[error("dataset `{0}` already registered")]
    DuplicateDataset(String),

    /// The collection has no members to operate on.
    #[error("collection `{0}` is empty")]
    EmptyCollection(String),

    /// Tables could not be aligned or stacked.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A numeric operation hit a text cell.
    #[error("non-numeric data in `{0}`")]
    NonNumeric(String),

    /// A table violates its structural invariants.
    #[error("invalid table: {0}")]
    InvalidTable(String),

    /// A derived flag was fetched outside of a parent dataset.
    #[error("dataset `{0}` needs a parent dataset to resolve its inputs")]
    MissingParent(String),

    /// A KPI definition could not be evaluated.
    #[error("KPI error: {0}")]
    Kpi(String),

    /// Cache backend failure.
    #[error("cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
