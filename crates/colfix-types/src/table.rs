//! Column tables and the database that holds them.
//!
//! A [`Table`] keeps all of its columns at the same length: every method
//! that changes rows either applies to all columns or fails before touching
//! any of them. Each successful row change bumps [`Table::version`], which is
//! how derived positions and vectors are recognised as stale.

use std::collections::BTreeMap;

use colfix_error::{ColfixError, Result};

use crate::vocab::IndexSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    values: Vec<i64>,
    index: Option<IndexSpec>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            values,
            index: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index(&self) -> Option<IndexSpec> {
        self.index
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    declared_columns: usize,
    columns: Vec<Column>,
    rows: usize,
    version: u64,
}

impl Table {
    /// An empty table that will hold `declared_columns` columns.
    pub fn new(name: impl Into<String>, declared_columns: usize) -> Self {
        Self {
            name: name.into(),
            declared_columns,
            columns: Vec::with_capacity(declared_columns),
            rows: 0,
            version: 0,
        }
    }

    /// Build a fully populated table in one step.
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` if the columns differ in length.
    pub fn from_columns(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map_or(0, Column::len);
        if let Some(bad) = columns.iter().find(|c| c.len() != rows) {
            return Err(ColfixError::LengthMismatch {
                op: "table",
                left: rows,
                right: bad.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            declared_columns: columns.len(),
            columns,
            rows,
            version: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_columns(&self) -> usize {
        self.declared_columns
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Mutation counter; starts at 0 and moves on every row change.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_fully_defined(&self) -> bool {
        self.columns.len() == self.declared_columns
    }

    /// Declare the next column. Only allowed while the table holds no rows.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken, all declared columns exist already, or
    /// rows were loaded.
    pub fn add_column(&mut self, name: &str) -> Result<()> {
        if self.columns.iter().any(|c| c.name == name) {
            return Err(ColfixError::AlreadyExists {
                name: format!("{}.{name}", self.name),
            });
        }
        if self.is_fully_defined() {
            return Err(ColfixError::invariant(format!(
                "table {} already has its {} columns",
                self.name, self.declared_columns
            )));
        }
        if self.rows > 0 {
            return Err(ColfixError::invariant(format!(
                "cannot add column {name} to populated table {}",
                self.name
            )));
        }
        self.columns.push(Column::new(name, Vec::new()));
        Ok(())
    }

    pub fn column_position(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| ColfixError::NoSuchColumn {
                name: format!("{}.{name}", self.name),
            })
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.column_position(name).map(|i| &self.columns[i])
    }

    pub fn set_index(&mut self, column: &str, spec: IndexSpec) -> Result<()> {
        let i = self.column_position(column)?;
        self.columns[i].index = Some(spec);
        Ok(())
    }

    /// Position of the clustered column, if any.
    pub fn primary_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| {
            c.index
                .is_some_and(|s| s.clustering == crate::vocab::Clustering::Clustered)
        })
    }

    /// Replace every column's values (bulk load). `data` is column-major in
    /// declaration order.
    ///
    /// # Errors
    ///
    /// Fails if the table is not fully defined, the column count differs, or
    /// the columns differ in length.
    pub fn load(&mut self, data: Vec<Vec<i64>>) -> Result<()> {
        if !self.is_fully_defined() {
            return Err(ColfixError::invariant(format!(
                "load into {} before all {} columns were created",
                self.name, self.declared_columns
            )));
        }
        if data.len() != self.columns.len() {
            return Err(ColfixError::ArityMismatch {
                table: self.name.clone(),
                expected: self.columns.len(),
                actual: data.len(),
            });
        }
        let rows = data.first().map_or(0, Vec::len);
        if let Some(bad) = data.iter().find(|c| c.len() != rows) {
            return Err(ColfixError::LengthMismatch {
                op: "load",
                left: rows,
                right: bad.len(),
            });
        }
        for (column, values) in self.columns.iter_mut().zip(data) {
            column.values = values;
        }
        self.rows = rows;
        self.version += 1;
        Ok(())
    }

    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns `ArityMismatch` if `values` does not have one entry per column.
    pub fn push_row(&mut self, values: &[i64]) -> Result<()> {
        if values.len() != self.declared_columns || !self.is_fully_defined() {
            return Err(ColfixError::ArityMismatch {
                table: self.name.clone(),
                expected: self.declared_columns,
                actual: values.len(),
            });
        }
        for (column, &v) in self.columns.iter_mut().zip(values) {
            column.values.push(v);
        }
        self.rows += 1;
        self.version += 1;
        Ok(())
    }

    /// Set `column` to `value` at every listed row.
    ///
    /// # Errors
    ///
    /// Fails on an unknown column or an out-of-range position; nothing is
    /// written in that case.
    pub fn overwrite(&mut self, column: usize, rows: &[usize], value: i64) -> Result<()> {
        self.check_positions(rows)?;
        let col = self
            .columns
            .get_mut(column)
            .ok_or_else(|| ColfixError::invariant(format!("column #{column} out of range")))?;
        for &r in rows {
            col.values[r] = value;
        }
        self.version += 1;
        Ok(())
    }

    /// Remove the listed rows; survivors keep their order and are renumbered
    /// from 0. Duplicate positions are tolerated.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range position; nothing is removed in that case.
    pub fn remove_rows(&mut self, rows: &[usize]) -> Result<()> {
        self.check_positions(rows)?;
        let mut doomed = vec![false; self.rows];
        for &r in rows {
            doomed[r] = true;
        }
        for column in &mut self.columns {
            let mut i = 0;
            column.values.retain(|_| {
                let keep = !doomed[i];
                i += 1;
                keep
            });
        }
        self.rows = self.columns.first().map_or(0, Column::len);
        self.version += 1;
        Ok(())
    }

    fn check_positions(&self, rows: &[usize]) -> Result<()> {
        match rows.iter().find(|&&r| r >= self.rows) {
            Some(&position) => Err(ColfixError::PositionOutOfRange {
                position,
                rows: self.rows,
            }),
            None => Ok(()),
        }
    }
}

/// The oracle's view of the engine catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Database {
    name: String,
    tables: BTreeMap<String, Table>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// # Errors
    ///
    /// Returns `AlreadyExists` if a table with this name exists.
    pub fn create_table(&mut self, name: &str, declared_columns: usize) -> Result<&mut Table> {
        if self.tables.contains_key(name) {
            return Err(ColfixError::AlreadyExists {
                name: format!("{}.{name}", self.name),
            });
        }
        Ok(self
            .tables
            .entry(name.to_owned())
            .or_insert_with(|| Table::new(name, declared_columns)))
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| ColfixError::NoSuchTable {
            name: format!("{}.{name}", self.name),
        })
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        let db = &self.name;
        self.tables
            .get_mut(name)
            .ok_or_else(|| ColfixError::NoSuchTable {
                name: format!("{db}.{name}"),
            })
    }
}
