use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for fixture generation and oracle evaluation.
///
/// Every variant belongs to one [`ErrorKind`]. Generation is offline and
/// never retried: any error aborts the scenario being generated before its
/// script or expected output is written.
#[derive(Error, Debug)]
pub enum ColfixError {
    // === Configuration Errors ===
    /// A configuration value is out of its accepted domain.
    #[error("invalid configuration: {field}: {detail}")]
    InvalidConfig { field: String, detail: String },

    /// Zipfian sampler parameters are unusable.
    #[error("invalid zipfian parameters: exponent {exponent}, distinct values {n_distinct}")]
    InvalidZipf { exponent: f64, n_distinct: usize },

    /// A directory required by the generator cannot be used.
    #[error("unusable directory '{path}': {detail}")]
    BadDirectory { path: PathBuf, detail: String },

    // === Scenario Invariant Violations ===
    /// A range predicate with neither a lower nor an upper bound.
    #[error("select requires at least one bound")]
    UnboundedSelect,

    /// Two inputs that must be aligned have different lengths.
    #[error("{op}: length mismatch ({left} vs {right})")]
    LengthMismatch {
        op: &'static str,
        left: usize,
        right: usize,
    },

    /// A position refers past the end of the table.
    #[error("position {position} out of range for {rows} rows")]
    PositionOutOfRange { position: usize, rows: usize },

    /// `min`/`max` over an empty vector.
    #[error("{kind} over an empty vector is undefined")]
    EmptyAggregate { kind: &'static str },

    /// Integer arithmetic left the 64-bit range.
    #[error("integer overflow in {op}")]
    Overflow { op: &'static str },

    /// A row with the wrong number of values for its table.
    #[error("table {table} has {expected} columns, got {actual} values")]
    ArityMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// A handle was referenced before being bound.
    #[error("unknown handle: {name}")]
    UnknownHandle { name: String },

    /// A handle name was bound twice within one scenario.
    #[error("handle {name} is already bound in this scenario")]
    DuplicateHandle { name: String },

    /// A handle holds a different kind of value than the statement needs.
    #[error("handle {name} holds {actual}, expected {expected}")]
    HandleKind {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A handle derived from a table that has since been mutated.
    #[error("handle {name} is stale: table {table} was mutated after it was bound")]
    StaleHandle { name: String, table: String },

    /// A statement is not allowed where it appears.
    #[error("{statement} is not allowed {context}")]
    IllegalStatement {
        statement: String,
        context: &'static str,
    },

    /// Any other precondition breach.
    #[error("scenario invariant violated: {0}")]
    Invariant(String),

    // === Catalog Errors ===
    /// No such table.
    #[error("no such table: {name}")]
    NoSuchTable { name: String },

    /// No such column.
    #[error("no such column: {name}")]
    NoSuchColumn { name: String },

    /// Table or column already exists.
    #[error("{name} already exists")]
    AlreadyExists { name: String },

    // === I/O and Format Errors ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset, manifest or catalog content could not be encoded or decoded.
    #[error("{format} error: {detail}")]
    Format {
        format: &'static str,
        detail: String,
    },

    /// A command script line could not be parsed.
    #[error("script line {line}: {detail}")]
    ScriptSyntax { line: usize, detail: String },

    /// Replayed output diverged from the persisted expected output.
    #[error("replay of scenario {scenario} diverged: {detail}")]
    ReplayMismatch { scenario: u32, detail: String },

    /// Persisted engine state diverged from the oracle.
    #[error("persisted state diverged: {detail}")]
    PersistedMismatch { detail: String },
}

/// Coarse error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    /// Bad size, seed, path or distribution parameters; nothing was generated.
    Configuration = 2,
    /// A scenario precondition failed; the scenario was aborted.
    ScenarioInvariant = 3,
    /// Filesystem failure.
    Io = 4,
    /// Malformed dataset, script, manifest or catalog content.
    Format = 5,
    /// Replay or persisted-state verification found a divergence.
    Mismatch = 6,
}

impl ColfixError {
    /// Map this error to its category.
    #[allow(clippy::match_same_arms)]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig { .. } | Self::InvalidZipf { .. } | Self::BadDirectory { .. } => {
                ErrorKind::Configuration
            }
            Self::UnboundedSelect
            | Self::LengthMismatch { .. }
            | Self::PositionOutOfRange { .. }
            | Self::EmptyAggregate { .. }
            | Self::Overflow { .. }
            | Self::ArityMismatch { .. }
            | Self::UnknownHandle { .. }
            | Self::DuplicateHandle { .. }
            | Self::HandleKind { .. }
            | Self::StaleHandle { .. }
            | Self::IllegalStatement { .. }
            | Self::Invariant(_)
            | Self::NoSuchTable { .. }
            | Self::NoSuchColumn { .. }
            | Self::AlreadyExists { .. } => ErrorKind::ScenarioInvariant,
            Self::Io(_) => ErrorKind::Io,
            Self::Format { .. } | Self::ScriptSyntax { .. } => ErrorKind::Format,
            Self::ReplayMismatch { .. } | Self::PersistedMismatch { .. } => ErrorKind::Mismatch,
        }
    }

    /// Whether this error was raised before any generation began.
    pub const fn is_configuration(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration)
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidZipf { .. } => {
                Some("Use a positive exponent and at least one distinct value")
            }
            Self::StaleHandle { .. } => {
                Some("Re-run the select after the mutation instead of reusing the old handle")
            }
            Self::EmptyAggregate { .. } => {
                Some("Widen the predicate or aggregate with sum/avg, which are defined on empty input")
            }
            Self::ReplayMismatch { .. } => {
                Some("Regenerate the suite; artifacts were edited or produced by another version")
            }
            _ => None,
        }
    }

    /// Get the process exit code for this error (for CLI use).
    pub const fn exit_code(&self) -> i32 {
        self.kind() as i32
    }

    /// Create a configuration error for `field`.
    pub fn config(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// Create a generic invariant violation.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Create a format error.
    pub fn format(format: &'static str, detail: impl ToString) -> Self {
        Self::Format {
            format,
            detail: detail.to_string(),
        }
    }

    /// Create a script syntax error.
    pub fn syntax(line: usize, detail: impl Into<String>) -> Self {
        Self::ScriptSyntax {
            line,
            detail: detail.into(),
        }
    }
}

/// Result type alias using `ColfixError`.
pub type Result<T> = std::result::Result<T, ColfixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ColfixError::LengthMismatch {
            op: "add",
            left: 3,
            right: 4,
        };
        assert_eq!(err.to_string(), "add: length mismatch (3 vs 4)");
        assert_eq!(
            ColfixError::UnboundedSelect.to_string(),
            "select requires at least one bound"
        );
    }

    #[test]
    fn stale_handle_display() {
        let err = ColfixError::StaleHandle {
            name: "s1".to_owned(),
            table: "tbl5".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "handle s1 is stale: table tbl5 was mutated after it was bound"
        );
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(
            ColfixError::config("size", "must be positive").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            ColfixError::InvalidZipf {
                exponent: 0.0,
                n_distinct: 10
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            ColfixError::UnboundedSelect.kind(),
            ErrorKind::ScenarioInvariant
        );
        assert_eq!(
            ColfixError::EmptyAggregate { kind: "min" }.kind(),
            ErrorKind::ScenarioInvariant
        );
        assert_eq!(ColfixError::syntax(3, "bad").kind(), ErrorKind::Format);
        assert_eq!(
            ColfixError::ReplayMismatch {
                scenario: 2,
                detail: String::new()
            }
            .kind(),
            ErrorKind::Mismatch
        );
    }

    #[test]
    fn configuration_errors_flagged() {
        assert!(ColfixError::config("seed", "zero").is_configuration());
        assert!(!ColfixError::invariant("x").is_configuration());
    }

    #[test]
    fn io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ColfixError = io_err.into();
        assert!(matches!(err, ColfixError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ColfixError::config("x", "y").exit_code(), 2);
        assert_eq!(ColfixError::UnboundedSelect.exit_code(), 3);
        assert_eq!(ColfixError::format("csv", "truncated").exit_code(), 5);
    }

    #[test]
    fn convenience_constructors() {
        let err = ColfixError::syntax(42, "unexpected token");
        assert!(matches!(err, ColfixError::ScriptSyntax { line: 42, .. }));

        let err = ColfixError::invariant("batch left open");
        assert!(matches!(err, ColfixError::Invariant(msg) if msg == "batch left open"));

        let err = ColfixError::format("json", "eof");
        assert_eq!(err.to_string(), "json error: eof");
    }
}
