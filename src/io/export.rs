//! CSV export for computed KPIs.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use crate::error::Result;
use crate::kpi::{KpiCollection, KpiRecord, UnitHandling};

/// Leading columns of every KPI export.
const LEADING_COLUMNS: [&str; 4] = ["name", "dataset_name", "value", "unit"];

/// Exports KPIs to a CSV file at the given path.
///
/// Writes one row per KPI. The leading columns are `name, dataset_name,
/// value, unit`, followed by every attribute key present on any KPI in
/// alphabetical order. Produces deterministic output for identical inputs.
///
/// # Arguments
///
/// * `kpis` - Computed KPIs
/// * `handling` - Unit conversion applied to the values
/// * `path` - Output file path; parent folders are created
///
/// # Errors
///
/// Returns an I/O or CSV error if file creation or writing fails.
pub fn export_kpis_csv(kpis: &KpiCollection, handling: &UnitHandling, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_kpis_csv(&kpis.to_records(handling), io::BufWriter::new(file))
}

/// Writes KPI records as CSV to any writer.
///
/// # Arguments
///
/// * `records` - Flattened KPIs, see [`KpiCollection::to_records`]
/// * `writer` - Destination implementing `Write`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_kpis_csv(records: &[KpiRecord], writer: impl Write) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let attribute_keys: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.attributes.keys().map(String::as_str))
        .filter(|k| !LEADING_COLUMNS.contains(k))
        .collect();

    wtr.write_record(LEADING_COLUMNS.iter().copied().chain(attribute_keys.iter().copied()))?;

    for r in records {
        let mut row = vec![
            r.name.clone(),
            r.dataset_name.clone(),
            r.value.to_string(),
            r.unit.clone(),
        ];
        row.extend(
            attribute_keys
                .iter()
                .map(|k| r.attributes.get(*k).map(ToString::to_string).unwrap_or_default()),
        );
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
