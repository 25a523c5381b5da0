//! Statement vocabulary: predicates, aggregate and arithmetic kinds, join
//! strategy labels and index declarations.

use std::fmt;
use std::str::FromStr;

use colfix_error::ColfixError;
use serde::{Deserialize, Serialize};

/// Half-open range predicate `[low, high)`; a missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangePredicate {
    low: Option<i64>,
    high: Option<i64>,
}

impl RangePredicate {
    /// # Errors
    ///
    /// Returns `UnboundedSelect` when both bounds are missing.
    pub fn new(low: Option<i64>, high: Option<i64>) -> Result<Self, ColfixError> {
        if low.is_none() && high.is_none() {
            return Err(ColfixError::UnboundedSelect);
        }
        Ok(Self { low, high })
    }

    /// `[low, high)`
    pub fn between(low: i64, high: i64) -> Self {
        Self {
            low: Some(low),
            high: Some(high),
        }
    }

    /// `value < high`
    pub fn below(high: i64) -> Self {
        Self {
            low: None,
            high: Some(high),
        }
    }

    /// `value >= low`
    pub fn at_least(low: i64) -> Self {
        Self {
            low: Some(low),
            high: None,
        }
    }

    pub const fn low(&self) -> Option<i64> {
        self.low
    }

    pub const fn high(&self) -> Option<i64> {
        self.high
    }

    #[inline]
    pub fn matches(&self, value: i64) -> bool {
        self.low.is_none_or(|l| value >= l) && self.high.is_none_or(|h| value < h)
    }
}

macro_rules! keyword_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal { $($variant:ident => $kw:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "kebab-case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $kw),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ColfixError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($kw => Ok(Self::$variant),)+
                    other => Err(ColfixError::invariant(format!(
                        concat!("unknown ", $what, ": {:?}"),
                        other
                    ))),
                }
            }
        }
    };
}

keyword_enum! {
    /// Aggregate functions of the command language.
    AggregateKind, "aggregate" {
        Sum => "sum",
        Avg => "avg",
        Min => "min",
        Max => "max",
    }
}

keyword_enum! {
    /// Element-wise arithmetic.
    ArithOp, "arithmetic operator" {
        Add => "add",
        Sub => "sub",
    }
}

keyword_enum! {
    /// Join algorithm requested from the engine. Advisory for the oracle.
    JoinStrategy, "join strategy" {
        NestedLoop => "nested-loop",
        Hash => "hash",
        NaiveHash => "naive-hash",
        GraceHash => "grace-hash",
    }
}

keyword_enum! {
    /// Physical form of an index.
    IndexLayout, "index layout" {
        Sorted => "sorted",
        Btree => "btree",
    }
}

keyword_enum! {
    /// Whether the index orders the table itself.
    Clustering, "clustering" {
        Clustered => "clustered",
        Unclustered => "unclustered",
    }
}

/// An index declared on a column. A storage hint for the engine; the oracle
/// only records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    pub layout: IndexLayout,
    pub clustering: Clustering,
}

impl IndexSpec {
    /// Tag stored in the persisted catalog (0 is reserved for "no index").
    pub const fn catalog_tag(self) -> i32 {
        match (self.clustering, self.layout) {
            (Clustering::Unclustered, IndexLayout::Sorted) => 1,
            (Clustering::Unclustered, IndexLayout::Btree) => 2,
            (Clustering::Clustered, IndexLayout::Sorted) => 3,
            (Clustering::Clustered, IndexLayout::Btree) => 4,
        }
    }

    /// Inverse of [`Self::catalog_tag`]; `Ok(None)` for tag 0.
    ///
    /// # Errors
    ///
    /// Returns a format error for tags outside `0..=4`.
    pub fn from_catalog_tag(tag: i32) -> Result<Option<Self>, ColfixError> {
        let spec = |clustering, layout| Some(Self { layout, clustering });
        match tag {
            0 => Ok(None),
            1 => Ok(spec(Clustering::Unclustered, IndexLayout::Sorted)),
            2 => Ok(spec(Clustering::Unclustered, IndexLayout::Btree)),
            3 => Ok(spec(Clustering::Clustered, IndexLayout::Sorted)),
            4 => Ok(spec(Clustering::Clustered, IndexLayout::Btree)),
            other => Err(ColfixError::format(
                "catalog",
                format!("unknown index tag {other}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_requires_a_bound() {
        assert!(matches!(
            RangePredicate::new(None, None),
            Err(ColfixError::UnboundedSelect)
        ));
        assert!(RangePredicate::new(Some(1), None).is_ok());
    }

    #[test]
    fn predicate_is_half_open() {
        let p = RangePredicate::between(10, 20);
        assert!(!p.matches(9));
        assert!(p.matches(10));
        assert!(p.matches(19));
        assert!(!p.matches(20));

        assert!(RangePredicate::below(0).matches(i64::MIN));
        assert!(!RangePredicate::below(0).matches(0));
        assert!(RangePredicate::at_least(0).matches(i64::MAX));
    }

    #[test]
    fn inverted_range_matches_nothing() {
        let p = RangePredicate::between(5, 5);
        assert!((-10..10).all(|v| !p.matches(v)));
    }

    #[test]
    fn keywords_round_trip() {
        for s in JoinStrategy::ALL {
            assert_eq!(s.as_str().parse::<JoinStrategy>().ok(), Some(*s));
        }
        assert_eq!("avg".parse::<AggregateKind>().ok(), Some(AggregateKind::Avg));
        assert!("median".parse::<AggregateKind>().is_err());
        assert_eq!(JoinStrategy::NestedLoop.to_string(), "nested-loop");
    }

    #[test]
    fn catalog_tags_are_bijective() {
        for tag in 1..=4 {
            let spec = IndexSpec::from_catalog_tag(tag)
                .expect("known tag")
                .expect("non-zero tag has a spec");
            assert_eq!(spec.catalog_tag(), tag);
        }
        assert_eq!(IndexSpec::from_catalog_tag(0).ok(), Some(None));
        assert!(IndexSpec::from_catalog_tag(9).is_err());
    }
}
