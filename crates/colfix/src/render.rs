//! Expected-output formatting.
//!
//! Integers print plainly, floats with two decimals. A `print` of several
//! scalars is one comma-joined line; a `print` of vectors is one line per
//! row with the vectors side by side. Output is grouped: a gap step closes
//! the current group, and groups are separated by one blank line.

use colfix_error::{ColfixError, Result};
use colfix_types::{Scalar, Vector};

/// One argument of a `print`.
#[derive(Debug, Clone, Copy)]
pub enum Printable<'a> {
    Scalar(Scalar),
    Vector(&'a Vector),
}

/// Format a scalar as the engine prints it. Non-finite floats print as
/// `0.00`.
pub fn format_scalar(value: Scalar) -> String {
    match value {
        Scalar::Int(v) => v.to_string(),
        Scalar::Float(v) if v.is_finite() => format!("{v:.2}"),
        Scalar::Float(_) => "0.00".to_owned(),
    }
}

/// Lines produced by one `print`.
///
/// # Errors
///
/// An invariant violation for an empty argument list or for scalars mixed
/// with vectors; `LengthMismatch` for vectors of different lengths.
pub fn print_lines(items: &[Printable<'_>]) -> Result<Vec<String>> {
    let Some(first) = items.first() else {
        return Err(ColfixError::invariant("print needs at least one handle"));
    };
    match first {
        Printable::Scalar(_) => {
            let values = items
                .iter()
                .map(|item| match item {
                    Printable::Scalar(s) => Ok(format_scalar(*s)),
                    Printable::Vector(_) => Err(mixed_print()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(vec![values.join(",")])
        }
        Printable::Vector(v) => {
            let rows = v.len();
            let columns = items
                .iter()
                .map(|item| match item {
                    Printable::Vector(c) if c.len() == rows => Ok(c.as_slice()),
                    Printable::Vector(c) => Err(ColfixError::LengthMismatch {
                        op: "print",
                        left: rows,
                        right: c.len(),
                    }),
                    Printable::Scalar(_) => Err(mixed_print()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((0..rows)
                .map(|r| {
                    columns
                        .iter()
                        .map(|c| c[r].to_string())
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .collect())
        }
    }
}

fn mixed_print() -> ColfixError {
    ColfixError::invariant("print cannot mix scalars and vectors")
}

/// Expected output of one scenario, built group by group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedDocument {
    groups: Vec<Vec<String>>,
    current: Vec<String>,
}

impl ExpectedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_lines(&mut self, lines: impl IntoIterator<Item = String>) {
        self.current.extend(lines);
    }

    /// Close the current group. Empty groups are dropped, so consecutive
    /// gaps produce a single blank line.
    pub fn gap(&mut self) {
        if !self.current.is_empty() {
            self.groups.push(std::mem::take(&mut self.current));
        }
    }

    /// The document text: groups separated by a blank line, with a trailing
    /// newline unless nothing was printed.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let groups = self
            .groups
            .iter()
            .chain(std::iter::once(&self.current))
            .filter(|g| !g.is_empty());
        for (i, group) in groups.enumerate() {
            if i > 0 {
                out.push('\n');
            }
            for line in group {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_use_two_decimals() {
        assert_eq!(format_scalar(Scalar::Float(2.0 / 3.0)), "0.67");
        assert_eq!(format_scalar(Scalar::Float(-1.005)), "-1.00");
        assert_eq!(format_scalar(Scalar::Float(f64::NAN)), "0.00");
        assert_eq!(format_scalar(Scalar::Int(-42)), "-42");
    }

    #[test]
    fn scalars_share_a_line() {
        let lines = print_lines(&[
            Printable::Scalar(Scalar::Int(3)),
            Printable::Scalar(Scalar::Float(1.5)),
        ])
        .expect("scalars");
        assert_eq!(lines, vec!["3,1.50"]);
    }

    #[test]
    fn vectors_print_row_wise() {
        let a = Vector::new(vec![1, 2]);
        let b = Vector::new(vec![10, 20]);
        let lines = print_lines(&[Printable::Vector(&a), Printable::Vector(&b)]).expect("vectors");
        assert_eq!(lines, vec!["1,10", "2,20"]);

        let empty = Vector::default();
        assert!(print_lines(&[Printable::Vector(&empty)])
            .expect("empty")
            .is_empty());
    }

    #[test]
    fn rejects_ragged_or_mixed_prints() {
        let a = Vector::new(vec![1, 2]);
        let b = Vector::new(vec![1]);
        assert!(matches!(
            print_lines(&[Printable::Vector(&a), Printable::Vector(&b)]),
            Err(ColfixError::LengthMismatch { .. })
        ));
        assert!(print_lines(&[Printable::Vector(&a), Printable::Scalar(Scalar::Int(1))]).is_err());
        assert!(print_lines(&[]).is_err());
    }

    #[test]
    fn groups_are_separated_by_one_blank_line() {
        let mut doc = ExpectedDocument::new();
        assert_eq!(doc.render(), "");
        doc.gap();
        doc.push_lines(["a".to_owned()]);
        doc.gap();
        doc.gap();
        doc.push_lines(["b".to_owned(), "c".to_owned()]);
        assert_eq!(doc.render(), "a\n\nb\nc\n");
        doc.gap();
        assert_eq!(doc.render(), "a\n\nb\nc\n");
    }
}
