//! Datasets in the engine's bulk-load CSV format.
//!
//! The header row names every column as `db.table.column`; each following
//! row holds one integer per column. All columns of a file belong to one
//! table.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use colfix_error::{ColfixError, Result};
use colfix_types::{Column, ColumnRef, TableRef};

/// One table's worth of columns plus the file name it is written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    file_name: String,
    table: TableRef,
    columns: Vec<Column>,
}

impl Dataset {
    /// # Errors
    ///
    /// Fails if the columns differ in length, a name repeats, or a value does
    /// not fit the engine's 4-byte integers.
    pub fn new(
        file_name: impl Into<String>,
        table: TableRef,
        columns: Vec<(String, Vec<i64>)>,
    ) -> Result<Self> {
        let rows = columns.first().map_or(0, |c| c.1.len());
        for (i, (name, values)) in columns.iter().enumerate() {
            if values.len() != rows {
                return Err(ColfixError::LengthMismatch {
                    op: "dataset",
                    left: rows,
                    right: values.len(),
                });
            }
            if columns[..i].iter().any(|(n, _)| n == name) {
                return Err(ColfixError::AlreadyExists {
                    name: format!("{table}.{name}"),
                });
            }
            if let Some(v) = values.iter().find(|&&v| i32::try_from(v).is_err()) {
                return Err(ColfixError::invariant(format!(
                    "{table}.{name}: value {v} does not fit a 4-byte integer"
                )));
            }
        }
        Ok(Self {
            file_name: file_name.into(),
            table,
            columns: columns
                .into_iter()
                .map(|(name, values)| Column::new(name, values))
                .collect(),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// The same rows under another table and file name.
    pub fn renamed(&self, file_name: impl Into<String>, table: TableRef) -> Self {
        Self {
            file_name: file_name.into(),
            table,
            columns: self.columns.clone(),
        }
    }

    /// # Errors
    ///
    /// Propagates CSV and I/O errors.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = csv::Writer::from_writer(writer);
        let header: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{}.{}", self.table, c.name()))
            .collect();
        out.write_record(&header).map_err(csv_error)?;
        let mut row = Vec::with_capacity(self.columns.len());
        for r in 0..self.row_count() {
            row.clear();
            row.extend(self.columns.iter().map(|c| c.values()[r].to_string()));
            out.write_record(&row).map_err(csv_error)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Parse a dataset. `file_name` is recorded as given.
    ///
    /// # Errors
    ///
    /// A format error for a bad header, mixed tables, ragged rows or
    /// non-integer cells.
    pub fn read_csv<R: Read>(file_name: impl Into<String>, reader: R) -> Result<Self> {
        let mut input = csv::Reader::from_reader(reader);
        let header: Vec<ColumnRef> = input
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| {
                h.trim()
                    .parse::<ColumnRef>()
                    .map_err(|e| ColfixError::format("csv", format!("header {h:?}: {e}")))
            })
            .collect::<Result<_>>()?;
        let Some(first) = header.first() else {
            return Err(ColfixError::format("csv", "empty header"));
        };
        let table = first.table.clone();
        if let Some(other) = header.iter().find(|c| c.table != table) {
            return Err(ColfixError::format(
                "csv",
                format!("column {other} does not belong to {table}"),
            ));
        }

        let mut values: Vec<Vec<i64>> = vec![Vec::new(); header.len()];
        for (line, record) in input.records().enumerate() {
            let record = record.map_err(csv_error)?;
            if record.len() != header.len() {
                return Err(ColfixError::format(
                    "csv",
                    format!("row {}: {} cells, expected {}", line + 2, record.len(), header.len()),
                ));
            }
            for (col, cell) in values.iter_mut().zip(record.iter()) {
                let v = cell.trim().parse::<i64>().map_err(|e| {
                    ColfixError::format("csv", format!("row {}: {cell:?}: {e}", line + 2))
                })?;
                col.push(v);
            }
        }

        Self::new(
            file_name,
            table,
            header.into_iter().map(|c| c.column).zip(values).collect(),
        )
        .map_err(|e| ColfixError::format("csv", e))
    }

    /// The CSV file contents.
    ///
    /// # Errors
    ///
    /// Propagates CSV errors.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(buf)
    }

    /// # Errors
    ///
    /// Propagates I/O errors and [`Self::read_csv`] errors.
    pub fn read_from_dir(dir: &Path, file_name: &str) -> Result<Self> {
        Self::read_csv(file_name, File::open(dir.join(file_name))?)
    }
}

fn csv_error(err: csv::Error) -> ColfixError {
    if err.is_io_error() {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => ColfixError::Io(io),
            other => ColfixError::format("csv", format!("{other:?}")),
        }
    } else {
        ColfixError::format("csv", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tbl1() -> TableRef {
        TableRef::new("db1", "tbl1").expect("valid")
    }

    #[test]
    fn writes_qualified_header() {
        let ds = Dataset::new(
            "data1.csv",
            tbl1(),
            vec![("col1".into(), vec![0, 1]), ("col2".into(), vec![-5, 12])],
        )
        .expect("valid dataset");
        let mut buf = Vec::new();
        ds.write_csv(&mut buf).expect("write");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "db1.tbl1.col1,db1.tbl1.col2\n0,-5\n1,12\n"
        );
    }

    #[test]
    fn reads_back_what_it_writes() {
        let ds = Dataset::new(
            "d.csv",
            tbl1(),
            vec![("a".into(), vec![3, 2, 1]), ("b".into(), vec![i64::from(i32::MIN), 0, 9])],
        )
        .expect("valid dataset");
        let mut buf = Vec::new();
        ds.write_csv(&mut buf).expect("write");
        let back = Dataset::read_csv("d.csv", buf.as_slice()).expect("read");
        assert_eq!(back, ds);
    }

    #[test]
    fn rejects_values_outside_i32() {
        let err = Dataset::new("d.csv", tbl1(), vec![("a".into(), vec![1 << 31])]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_ragged_and_duplicate_columns() {
        assert!(Dataset::new(
            "d.csv",
            tbl1(),
            vec![("a".into(), vec![1]), ("b".into(), vec![])]
        )
        .is_err());
        assert!(Dataset::new(
            "d.csv",
            tbl1(),
            vec![("a".into(), vec![1]), ("a".into(), vec![2])]
        )
        .is_err());
    }

    #[test]
    fn rejects_mixed_tables_and_bad_cells() {
        let mixed = "db1.tbl1.a,db1.tbl2.b\n1,2\n";
        assert!(Dataset::read_csv("m.csv", mixed.as_bytes()).is_err());
        let bad = "db1.tbl1.a\nx\n";
        let err = Dataset::read_csv("b.csv", bad.as_bytes()).expect_err("bad cell");
        assert_eq!(err.kind(), colfix_error::ErrorKind::Format);
    }
}
