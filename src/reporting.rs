//! Terminal rendering of KPI collections and fetched tables.

use comfy_table::{Attribute, Cell, CellAlignment, Table as TextTable, presets::UTF8_FULL};

use crate::kpi::KpiCollection;
use crate::table::Table;

/// Renders KPIs as one row per KPI: dataset, type, name and readable value.
pub fn render_kpi_table(kpis: &KpiCollection) -> String {
    let mut table = TextTable::new();
    table.load_preset(UTF8_FULL);
    table.set_header(
        ["Dataset", "Type", "KPI", "Value"]
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
    );

    for kpi in kpis {
        let a = &kpi.attributes;
        table.add_row(vec![
            Cell::new(&a.dataset_name),
            Cell::new(&a.dataset_type),
            Cell::new(kpi.name()),
            Cell::new(kpi.pretty_text(None)).set_alignment(CellAlignment::Right),
        ]);
    }
    table.to_string()
}

pub fn print_kpi_table(kpis: &KpiCollection) {
    println!("\n--- KPIs ({}) ---", kpis.len());
    println!("{}", render_kpi_table(kpis));
}

/// Renders the first `max_rows` rows of a table. Multi-level column keys
/// are shown as `level/level`.
pub fn render_table_preview(table: &Table, max_rows: usize) -> String {
    let mut text = TextTable::new();
    text.load_preset(UTF8_FULL);

    let mut header = vec![Cell::new(table.index_name()).add_attribute(Attribute::Bold)];
    header.extend(
        table
            .columns()
            .iter()
            .map(|key| Cell::new(key.to_string()).add_attribute(Attribute::Bold)),
    );
    text.set_header(header);

    let columns: Vec<&[crate::table::Cell]> = table.iter_columns().map(|(_, cells)| cells).collect();
    for (row, label) in table.index().iter().enumerate().take(max_rows) {
        let mut cells = vec![Cell::new(label)];
        cells.extend(columns.iter().map(|col| {
            let value = col.get(row).map(ToString::to_string).unwrap_or_default();
            Cell::new(value).set_alignment(CellAlignment::Right)
        }));
        text.add_row(cells);
    }

    let mut out = text.to_string();
    if table.nrows() > max_rows {
        out.push_str(&format!("\n... {} more rows", table.nrows() - max_rows));
    }
    out
}
