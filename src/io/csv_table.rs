//! CSV reading and writing for [`Table`].
//!
//! Layout: one header row per column level, then one row per index label.
//! The first field of the last header row holds the index name; the first
//! field of every other header row holds that level's name. The bottom level
//! is always named [`DEFAULT_LEVEL_NAME`] on read.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::{Result, StudyError};
use crate::table::{Cell, ColumnKey, DEFAULT_LEVEL_NAME, Table};

/// Reads a table with `header_rows` column levels.
///
/// # Arguments
///
/// * `reader` - CSV source
/// * `header_rows` - Number of header rows, i.e. column levels (at least 1)
///
/// # Errors
///
/// Returns [`StudyError::InvalidTable`] for a malformed layout and
/// [`StudyError::Csv`] if the input is not valid CSV.
pub fn read_table(reader: impl Read, header_rows: usize) -> Result<Table> {
    if header_rows == 0 {
        return Err(StudyError::InvalidTable("at least one header row is required".into()));
    }
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(reader);

    let mut records = Vec::new();
    for record in rdr.records() {
        records.push(record?);
    }
    if records.len() < header_rows {
        return Err(StudyError::InvalidTable(format!(
            "expected {header_rows} header rows, found {}",
            records.len()
        )));
    }
    let (header, body) = records.split_at(header_rows);
    let width = header[0].len();
    if width == 0 {
        return Err(StudyError::InvalidTable("empty header".into()));
    }

    let mut level_names: Vec<String> = header[..header_rows - 1]
        .iter()
        .map(|row| row.get(0).unwrap_or_default().to_string())
        .collect();
    level_names.push(DEFAULT_LEVEL_NAME.to_string());
    let index_name = header[header_rows - 1].get(0).unwrap_or_default().to_string();

    let columns: Vec<ColumnKey> = (1..width)
        .map(|j| {
            ColumnKey::new(
                header
                    .iter()
                    .map(|row| row.get(j).unwrap_or_default().to_string())
                    .collect(),
            )
        })
        .collect();

    let mut index = Vec::with_capacity(body.len());
    let mut data: Vec<Vec<Cell>> = vec![Vec::with_capacity(body.len()); columns.len()];
    for row in body {
        index.push(row.get(0).unwrap_or_default().to_string());
        for (j, column) in data.iter_mut().enumerate() {
            column.push(Cell::parse(row.get(j + 1).unwrap_or_default()));
        }
    }

    Table::from_parts(index_name, index, level_names, columns, data)
}

/// Reads a table from a CSV file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened, otherwise see [`read_table`].
pub fn read_table_from_path(path: &Path, header_rows: usize) -> Result<Table> {
    let file = File::open(path)?;
    read_table(io::BufReader::new(file), header_rows)
}

/// Writes a table in the layout [`read_table`] accepts.
///
/// # Errors
///
/// Returns [`StudyError::Csv`] if writing fails.
pub fn write_table(table: &Table, writer: impl Write) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    let nlevels = table.nlevels();

    for level in 0..nlevels {
        let first = if level + 1 == nlevels {
            table.index_name()
        } else {
            table.level_names()[level].as_str()
        };
        let mut record = vec![first.to_string()];
        record.extend(table.columns().iter().map(|k| k.levels()[level].clone()));
        wtr.write_record(&record)?;
    }

    for (r, label) in table.index().iter().enumerate() {
        let mut record = vec![label.clone()];
        record.extend(table.iter_columns().map(|(_, cells)| cells[r].to_string()));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes a table to a CSV file, creating parent folders as needed.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be created, otherwise see [`write_table`].
pub fn write_table_to_path(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_table(table, io::BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_single_level_with_mixed_cells() {
        let input = "Node,zone,capacity\nn1,DE,10\nn2,,2.5\n";
        let table = read_table(input.as_bytes(), 1).expect("read");

        assert_eq!(table.index_name(), "Node");
        assert_eq!(table.index(), ["n1", "n2"]);
        assert_eq!(table.get("n1", &"zone".into()), Some(&Cell::from("DE")));
        assert_eq!(table.get("n2", &"zone".into()), Some(&Cell::Empty));
        assert_eq!(table.get("n2", &"capacity".into()), Some(&Cell::Number(2.5)));
    }

    #[test]
    fn reads_two_level_header() {
        let input = "dataset,base,base,high\ntime,n1,n2,n1\nt0,1,2,3\n";
        let table = read_table(input.as_bytes(), 2).expect("read");

        assert_eq!(table.level_names(), ["dataset", "column"]);
        assert_eq!(table.index_name(), "time");
        assert_eq!(table.top_level_labels(), ["base", "high"]);
    }

    #[test]
    fn write_then_read_preserves_table() {
        let input = "dataset,base,high\ntime,n1,n1\nt0,1,\nt1,2,4\n";
        let table = read_table(input.as_bytes(), 2).expect("read");

        let mut buf = Vec::new();
        write_table(&table, &mut buf).expect("write");
        assert_eq!(String::from_utf8(buf.clone()).expect("utf8"), input);
        assert_eq!(read_table(buf.as_slice(), 2).expect("reread"), table);
    }

    #[test]
    fn rejects_missing_header() {
        assert!(read_table("".as_bytes(), 1).is_err());
        assert!(read_table("a,b\n".as_bytes(), 0).is_err());
    }

    #[test]
    fn duplicate_columns_are_invalid() {
        let err = read_table("i,a,a\n0,1,2\n".as_bytes(), 1).expect_err("dup");
        assert!(matches!(err, StudyError::InvalidTable(_)));
    }
}
