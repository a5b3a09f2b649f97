//! Scenario studies for energy-market simulations.
//!
//! Load several scenarios as [`dataset::Dataset`]s, declare comparisons
//! between them, fetch stacked or differenced tables through a
//! [`study::StudyManager`] and compute KPIs with the [`kpi`] framework.

/// REST API (feature `api`).
#[cfg(feature = "api")]
pub mod api;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod io;
pub mod kpi;
pub mod mock;
pub mod reporting;
pub mod study;
pub mod table;

pub use error::{Result, StudyError};
