//! KPI framework: aggregations, units, definitions, builders and collections.

pub mod aggregation;
pub mod builder;
pub mod collection;
pub mod definition;
mod indicator;
pub mod units;

use tracing::debug;

pub use aggregation::{Aggregation, ArithmeticOperation, ValueComparison};
pub use builder::{ComparisonKpiBuilder, FlagAggKpiBuilder};
pub use collection::{KpiCollection, KpiRecord, UnitHandling};
pub use definition::{
    ArithmeticDefinition, ComparisonDefinition, CustomDefinition, DefinitionRef, FlagAggDefinition,
    KpiDefinition, Labelled, ObjectSelection,
};
pub use indicator::{Kpi, KpiAttributes, NAMING_ATTRIBUTES};
pub use units::Unit;

use crate::dataset::{Dataset, DatasetRef};
use crate::error::Result;

/// Runs every applicable definition on `dataset`.
///
/// A definition is skipped when the dataset does not accept one of its
/// required flags, or when it needs a comparison and the dataset is not one.
///
/// # Errors
///
/// Propagates the first error raised by a definition.
pub fn generate_for(dataset: &dyn Dataset, definitions: &[DefinitionRef]) -> Result<Vec<Kpi>> {
    let mut out = Vec::new();
    for def in definitions {
        if def.requires_comparison() && dataset.as_comparison().is_none() {
            continue;
        }
        if let Some(missing) = def
            .required_flags()
            .into_iter()
            .find(|f| !dataset.flag_is_accepted(f))
        {
            debug!(dataset = dataset.name(), flag = %missing, "flag not accepted, definition skipped");
            continue;
        }
        out.extend(def.generate(dataset)?);
    }
    Ok(out)
}

/// [`generate_for`] over several datasets, collected in dataset order.
pub fn compute_kpis(datasets: &[DatasetRef], definitions: &[DefinitionRef]) -> Result<KpiCollection> {
    let mut collection = KpiCollection::new();
    for dataset in datasets {
        collection.extend(generate_for(dataset.as_ref(), definitions)?);
    }
    Ok(collection)
}
