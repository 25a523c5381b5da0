//! Qualified names (`db.table`, `db.table.column`) and result handles.

use std::fmt;
use std::str::FromStr;

use colfix_error::ColfixError;
use serde::{Deserialize, Serialize};

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_identifier(s: &str, what: &str) -> Result<String, ColfixError> {
    if is_identifier(s) {
        Ok(s.to_owned())
    } else {
        Err(ColfixError::invariant(format!("invalid {what} name: {s:?}")))
    }
}

/// `db.table`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub db: String,
    pub table: String,
}

impl TableRef {
    /// # Errors
    ///
    /// Returns an invariant violation if either part is not an identifier.
    pub fn new(db: &str, table: &str) -> Result<Self, ColfixError> {
        Ok(Self {
            db: parse_identifier(db, "database")?,
            table: parse_identifier(table, "table")?,
        })
    }

    /// # Errors
    ///
    /// Returns an invariant violation if `column` is not an identifier.
    pub fn column(&self, column: &str) -> Result<ColumnRef, ColfixError> {
        Ok(ColumnRef {
            table: self.clone(),
            column: parse_identifier(column, "column")?,
        })
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.table)
    }
}

impl FromStr for TableRef {
    type Err = ColfixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('.').collect::<Vec<_>>().as_slice() {
            [db, table] => Self::new(db, table),
            _ => Err(ColfixError::invariant(format!(
                "expected db.table, got {s:?}"
            ))),
        }
    }
}

/// `db.table.column`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: TableRef,
    pub column: String,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

impl FromStr for ColumnRef {
    type Err = ColfixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('.').collect::<Vec<_>>().as_slice() {
            [db, table, column] => TableRef::new(db, table)?.column(column),
            _ => Err(ColfixError::invariant(format!(
                "expected db.table.column, got {s:?}"
            ))),
        }
    }
}

/// Name of a client-side result bound by a statement (`s1=select(...)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(String);

impl Handle {
    /// # Errors
    ///
    /// Returns an invariant violation if `name` is not an identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, ColfixError> {
        let name = name.into();
        if is_identifier(&name) {
            Ok(Self(name))
        } else {
            Err(ColfixError::invariant(format!(
                "invalid handle name: {name:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_ref_round_trips_through_display() {
        let c: ColumnRef = "db1.tbl2.col3".parse().expect("valid column ref");
        assert_eq!(c.table.db, "db1");
        assert_eq!(c.table.table, "tbl2");
        assert_eq!(c.column, "col3");
        assert_eq!(c.to_string(), "db1.tbl2.col3");
    }

    #[test]
    fn table_ref_rejects_wrong_arity() {
        assert!("db1".parse::<TableRef>().is_err());
        assert!("db1.tbl1.col1".parse::<TableRef>().is_err());
        assert!("db1.tbl3_batch".parse::<TableRef>().is_ok());
    }

    #[test]
    fn handles_must_be_identifiers() {
        assert!(Handle::new("s1").is_ok());
        assert!(Handle::new("col2joined").is_ok());
        assert!(Handle::new("1s").is_err());
        assert!(Handle::new("a,b").is_err());
        assert!(Handle::new("").is_err());
    }

    #[test]
    fn refs_serialize_as_structs() {
        let t = TableRef::new("db1", "tbl1").expect("valid");
        let json = serde_json::to_string(&t).expect("serialize");
        assert_eq!(json, r#"{"db":"db1","table":"tbl1"}"#);
    }
}
