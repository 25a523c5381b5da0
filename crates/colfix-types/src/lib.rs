//! Data model shared by the oracle and the fixture generator.
//!
//! Values are `i64` throughout so that sums and differences of engine
//! values (stored as 4-byte integers) never need a wider type.

pub mod name;
pub mod table;
pub mod vocab;

pub use name::{ColumnRef, Handle, TableRef};
pub use table::{Column, Database, Table};
pub use vocab::{
    AggregateKind, ArithOp, Clustering, IndexLayout, IndexSpec, JoinStrategy, RangePredicate,
};

/// Ordered row indices that satisfied a predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionSet(Vec<usize>);

impl PositionSet {
    #[inline]
    pub fn new(positions: Vec<usize>) -> Self {
        Self(positions)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

impl From<Vec<usize>> for PositionSet {
    fn from(v: Vec<usize>) -> Self {
        Self(v)
    }
}

impl FromIterator<usize> for PositionSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Values projected from a column; element `i` belongs to position `i` of
/// the position set it was fetched with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vector(Vec<i64>);

impl Vector {
    #[inline]
    pub fn new(values: Vec<i64>) -> Self {
        Self(values)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }
}

impl From<Vec<i64>> for Vector {
    fn from(v: Vec<i64>) -> Self {
        Self(v)
    }
}

impl FromIterator<i64> for Vector {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Matched row pairs of an equi-join. Row `k` of `left` pairs with row `k`
/// of `right`; the order of `k` carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinResult {
    left: PositionSet,
    right: PositionSet,
}

impl JoinResult {
    /// Build from two aligned position lists.
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` if the lists differ in length.
    pub fn new(left: PositionSet, right: PositionSet) -> colfix_error::Result<Self> {
        if left.len() != right.len() {
            return Err(colfix_error::ColfixError::LengthMismatch {
                op: "join",
                left: left.len(),
                right: right.len(),
            });
        }
        Ok(Self { left, right })
    }

    pub fn left(&self) -> &PositionSet {
        &self.left
    }

    pub fn right(&self) -> &PositionSet {
        &self.right
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn into_parts(self) -> (PositionSet, PositionSet) {
        (self.left, self.right)
    }
}

/// Result of an aggregate: `sum`/`min`/`max` are integers, `avg` is a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_result_requires_aligned_sides() {
        let ok = JoinResult::new(vec![0, 1].into(), vec![4, 4].into());
        assert_eq!(ok.map(|j| j.len()).ok(), Some(2));

        let err = JoinResult::new(vec![0].into(), vec![].into());
        assert!(matches!(
            err,
            Err(colfix_error::ColfixError::LengthMismatch { left: 1, right: 0, .. })
        ));
    }

    #[test]
    fn collect_into_sets() {
        let p: PositionSet = (0..4).filter(|i| i % 2 == 0).collect();
        assert_eq!(p.as_slice(), &[0, 2]);
        let v: Vector = p.iter().map(|i| i as i64 * 10).collect();
        assert_eq!(v.as_slice(), &[0, 20]);
    }
}
