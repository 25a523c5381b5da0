//! The engine's persisted catalog, for checking what an engine wrote to disk
//! against the oracle database.
//!
//! Layout of `__catalog__` (native endianness, word = `usize`):
//!
//! ```text
//! db name [64]  table count (word)  capacity (word)
//! per table:
//!   name [64]  columns (word)  initialized columns (word)  rows (word)
//!   capacity (word)  primary column (word, usize::MAX = none)
//!   per initialized column:
//!     name [64]  index tag (i32)
//! ```
//!
//! Names are NUL-padded. Each column lives in its own file `{table}.{column}`
//! as native-endian `i32`s in row order; the file may be longer than the row
//! count.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use colfix_error::{ColfixError, Result};
use colfix_types::{Database, IndexSpec, Table};
use tracing::{debug, info};

const TARGET: &str = "colfix.catalog";

/// Size of every name field, terminating NUL included.
pub const NAME_FIELD: usize = 64;

/// Catalog file name inside the persistence directory.
pub const CATALOG_FILE: &str = "__catalog__";

const WORD: usize = std::mem::size_of::<usize>();
const NO_PRIMARY: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnEntry {
    pub name: String,
    pub index: Option<IndexSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub name: String,
    pub columns: usize,
    pub rows: usize,
    pub capacity: usize,
    pub primary: Option<usize>,
    /// Initialized columns, in declaration order.
    pub initialized: Vec<ColumnEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub name: String,
    pub capacity: usize,
    pub tables: Vec<TableEntry>,
}

impl CatalogSnapshot {
    /// The catalog an engine holding `db` would persist. Capacities equal
    /// the current sizes.
    pub fn from_database(db: &Database) -> Self {
        let tables: Vec<TableEntry> = db.tables().map(table_entry).collect();
        Self {
            name: db.name().to_owned(),
            capacity: tables.len(),
            tables,
        }
    }

    /// # Errors
    ///
    /// A format error if a name does not fit its field.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        put_name(&mut out, &self.name)?;
        put_word(&mut out, self.tables.len());
        put_word(&mut out, self.capacity);
        for t in &self.tables {
            put_name(&mut out, &t.name)?;
            put_word(&mut out, t.columns);
            put_word(&mut out, t.initialized.len());
            put_word(&mut out, t.rows);
            put_word(&mut out, t.capacity);
            put_word(&mut out, t.primary.unwrap_or(NO_PRIMARY));
            for c in &t.initialized {
                put_name(&mut out, &c.name)?;
                let tag = c.index.map_or(0, IndexSpec::catalog_tag);
                out.extend_from_slice(&tag.to_ne_bytes());
            }
        }
        Ok(out)
    }

    /// # Errors
    ///
    /// A format error for truncated input, unterminated names, unknown index
    /// tags or trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader { bytes, pos: 0 };
        let name = r.name()?;
        let n_tables = r.word()?;
        let capacity = r.word()?;
        let mut tables = Vec::new();
        for _ in 0..n_tables {
            let name = r.name()?;
            let columns = r.word()?;
            let n_initialized = r.word()?;
            let rows = r.word()?;
            let capacity = r.word()?;
            let primary = match r.word()? {
                NO_PRIMARY => None,
                p => Some(p),
            };
            let mut initialized = Vec::new();
            for _ in 0..n_initialized {
                let name = r.name()?;
                let index = IndexSpec::from_catalog_tag(r.i32()?)?;
                initialized.push(ColumnEntry { name, index });
            }
            tables.push(TableEntry {
                name,
                columns,
                rows,
                capacity,
                primary,
                initialized,
            });
        }
        if r.pos != bytes.len() {
            return Err(ColfixError::format(
                "catalog",
                format!("{} trailing bytes", bytes.len() - r.pos),
            ));
        }
        Ok(Self {
            name,
            capacity,
            tables,
        })
    }
}

fn table_entry(t: &Table) -> TableEntry {
    TableEntry {
        name: t.name().to_owned(),
        columns: t.declared_columns(),
        rows: t.row_count(),
        capacity: t.row_count(),
        primary: t.primary_column(),
        initialized: t
            .columns()
            .iter()
            .map(|c| ColumnEntry {
                name: c.name().to_owned(),
                index: c.index(),
            })
            .collect(),
    }
}

fn put_name(out: &mut Vec<u8>, name: &str) -> Result<()> {
    if name.len() >= NAME_FIELD || name.contains('\0') {
        return Err(ColfixError::format(
            "catalog",
            format!("name {name:?} does not fit a {NAME_FIELD}-byte field"),
        ));
    }
    let mut field = [0_u8; NAME_FIELD];
    field[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&field);
    Ok(())
}

fn put_word(out: &mut Vec<u8>, value: usize) {
    out.extend_from_slice(&value.to_ne_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        let chunk = self.bytes.get(self.pos..end).ok_or_else(|| {
            ColfixError::format(
                "catalog",
                format!("truncated at byte {} (needed {n} more)", self.pos),
            )
        })?;
        self.pos = end;
        Ok(chunk)
    }

    fn word(&mut self) -> Result<usize> {
        let mut buf = [0_u8; WORD];
        buf.copy_from_slice(self.take(WORD)?);
        Ok(usize::from_ne_bytes(buf))
    }

    fn i32(&mut self) -> Result<i32> {
        let mut buf = [0_u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(i32::from_ne_bytes(buf))
    }

    fn name(&mut self) -> Result<String> {
        let field = self.take(NAME_FIELD)?;
        let len = field
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ColfixError::format("catalog", "name field is not NUL-terminated"))?;
        String::from_utf8(field[..len].to_vec()).map_err(|e| ColfixError::format("catalog", e))
    }
}

/// Column values as the engine stores them.
///
/// # Errors
///
/// A format error for a value outside `i32`.
pub fn encode_column(values: &[i64]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for &v in values {
        let v = i32::try_from(v)
            .map_err(|_| ColfixError::format("column", format!("{v} does not fit i32")))?;
        out.extend_from_slice(&v.to_ne_bytes());
    }
    Ok(out)
}

/// # Errors
///
/// A format error if the length is not a multiple of 4.
pub fn decode_column(bytes: &[u8]) -> Result<Vec<i64>> {
    if bytes.len() % 4 != 0 {
        return Err(ColfixError::format(
            "column",
            format!("{} bytes is not a whole number of i32s", bytes.len()),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i64::from(i32::from_ne_bytes([c[0], c[1], c[2], c[3]])))
        .collect())
}

/// Persist `db` the way the engine does, into `dir`.
///
/// # Errors
///
/// Format errors for names or values that do not fit, I/O errors.
pub fn write_snapshot(db: &Database, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(CATALOG_FILE), CatalogSnapshot::from_database(db).encode()?)?;
    for t in db.tables() {
        for c in t.columns() {
            fs::write(
                dir.join(format!("{}.{}", t.name(), c.name())),
                encode_column(c.values())?,
            )?;
        }
    }
    info!(target: TARGET, dir = %dir.display(), tables = db.table_count(), "snapshot written");
    Ok(())
}

/// Compare a persisted directory with the oracle database. Tables are
/// matched by name; capacities are not compared.
///
/// # Errors
///
/// `PersistedMismatch` describing the first difference, or the decode and
/// I/O errors of reading the directory.
pub fn verify_persisted(db: &Database, dir: &Path) -> Result<()> {
    let persisted = CatalogSnapshot::decode(&fs::read(dir.join(CATALOG_FILE))?)?;
    let expected = CatalogSnapshot::from_database(db);
    let mismatch = |detail: String| ColfixError::PersistedMismatch { detail };

    if persisted.name != expected.name {
        return Err(mismatch(format!(
            "database is {:?}, expected {:?}",
            persisted.name, expected.name
        )));
    }
    let mut on_disk: BTreeMap<&str, &TableEntry> = persisted
        .tables
        .iter()
        .map(|t| (t.name.as_str(), t))
        .collect();
    for want in &expected.tables {
        let got = on_disk
            .remove(want.name.as_str())
            .ok_or_else(|| mismatch(format!("table {} is missing", want.name)))?;
        let shape = |t: &TableEntry| (t.columns, t.rows, t.primary, t.initialized.clone());
        if shape(got) != shape(want) {
            return Err(mismatch(format!(
                "table {}: persisted {got:?}, expected {want:?}",
                want.name
            )));
        }
        let table = db.table(&want.name)?;
        for column in table.columns() {
            let file = format!("{}.{}", want.name, column.name());
            let values = decode_column(&fs::read(dir.join(&file))?)?;
            let stored = values.get(..want.rows).ok_or_else(|| {
                mismatch(format!("{file} holds {} values, expected {}", values.len(), want.rows))
            })?;
            if let Some(row) = stored.iter().zip(column.values()).position(|(a, b)| a != b) {
                return Err(mismatch(format!(
                    "{file} row {row}: persisted {}, expected {}",
                    stored[row],
                    column.values()[row]
                )));
            }
        }
        debug!(target: TARGET, table = %want.name, "table matches");
    }
    if let Some(extra) = on_disk.keys().next() {
        return Err(mismatch(format!("unexpected table {extra}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use colfix_types::{Clustering, IndexLayout};

    fn sample_db() -> Database {
        let mut db = Database::new("db1");
        let t = db.create_table("tbl4", 2).expect("create");
        t.add_column("col1").expect("col1");
        t.add_column("col2").expect("col2");
        t.set_index(
            "col2",
            IndexSpec {
                layout: IndexLayout::Btree,
                clustering: Clustering::Clustered,
            },
        )
        .expect("index");
        t.load(vec![vec![1, 2, 3], vec![-4, 5, -6]]).expect("load");
        db.create_table("pending", 3).expect("create");
        db
    }

    #[test]
    fn snapshot_encodes_and_decodes() {
        let snap = CatalogSnapshot::from_database(&sample_db());
        assert_eq!(snap.tables.len(), 2);
        let tbl4 = snap.tables.iter().find(|t| t.name == "tbl4").expect("tbl4");
        assert_eq!(tbl4.primary, Some(1));
        assert_eq!(tbl4.initialized[1].index.map(IndexSpec::catalog_tag), Some(4));
        let bytes = snap.encode().expect("encodes");
        assert_eq!(CatalogSnapshot::decode(&bytes).expect("decodes"), snap);
    }

    #[test]
    fn decode_rejects_truncation_and_trailing_bytes() {
        let bytes = CatalogSnapshot::from_database(&sample_db())
            .encode()
            .expect("encodes");
        assert!(CatalogSnapshot::decode(&bytes[..bytes.len() - 1]).is_err());
        let mut longer = bytes;
        longer.push(0);
        assert!(CatalogSnapshot::decode(&longer).is_err());
    }

    #[test]
    fn long_names_are_rejected() {
        let mut db = Database::new("db1");
        db.create_table(&"t".repeat(NAME_FIELD), 1).expect("oracle accepts");
        assert!(CatalogSnapshot::from_database(&db).encode().is_err());
        let mut ok = Database::new("db1");
        ok.create_table(&"t".repeat(NAME_FIELD - 1), 1).expect("create");
        assert!(CatalogSnapshot::from_database(&ok).encode().is_ok());
    }

    #[test]
    fn columns_are_native_i32() {
        let bytes = encode_column(&[1, -1]).expect("fits");
        assert_eq!(bytes.len(), 8);
        assert_eq!(decode_column(&bytes).expect("decodes"), vec![1, -1]);
        assert!(encode_column(&[i64::from(i32::MAX) + 1]).is_err());
        assert!(decode_column(&[0, 0, 0]).is_err());
    }

    #[test]
    fn verify_accepts_own_snapshot_and_finds_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = sample_db();
        write_snapshot(&db, dir.path()).expect("written");
        verify_persisted(&db, dir.path()).expect("matches");

        let mut changed = sample_db();
        changed
            .table_mut("tbl4")
            .expect("tbl4")
            .push_row(&[7, 8])
            .expect("insert");
        let err = verify_persisted(&changed, dir.path()).expect_err("row count differs");
        assert!(matches!(err, ColfixError::PersistedMismatch { .. }), "{err}");
    }

    #[test]
    fn verify_reports_changed_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = sample_db();
        write_snapshot(&db, dir.path()).expect("written");
        fs::write(dir.path().join("tbl4.col2"), encode_column(&[-4, 5, 6]).expect("fits"))
            .expect("overwrite");
        let err = verify_persisted(&db, dir.path()).expect_err("value differs");
        assert!(err.to_string().contains("tbl4.col2 row 2"), "{err}");
    }
}
