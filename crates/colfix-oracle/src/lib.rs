//! Reference relational oracle.
//!
//! Every operation is a function of its explicit arguments: no catalog, no
//! hidden state. Query operations borrow their inputs and return fresh
//! results. Mutations take the table by `&mut` and validate everything
//! before writing, so a failed mutation leaves the table exactly as it was
//! and a successful one bumps [`Table::version`].

use std::collections::HashMap;

use colfix_error::{ColfixError, Result};
use colfix_types::{
    AggregateKind, ArithOp, JoinResult, JoinStrategy, PositionSet, RangePredicate, Scalar, Table,
    Vector,
};
use tracing::debug;

const TARGET: &str = "colfix.oracle";

/// Positions of `column` whose value lies in the predicate's half-open range,
/// ascending.
pub fn select(column: &[i64], predicate: RangePredicate) -> PositionSet {
    let out: PositionSet = column
        .iter()
        .enumerate()
        .filter(|&(_, &v)| predicate.matches(v))
        .map(|(i, _)| i)
        .collect();
    debug!(
        target: TARGET,
        rows = column.len(),
        low = ?predicate.low(),
        high = ?predicate.high(),
        matched = out.len(),
        "select"
    );
    out
}

/// Narrow `positions` to those whose aligned `values` entry matches.
///
/// # Errors
///
/// Returns `LengthMismatch` unless `values` has one entry per position.
pub fn select_on(
    positions: &PositionSet,
    values: &Vector,
    predicate: RangePredicate,
) -> Result<PositionSet> {
    if positions.len() != values.len() {
        return Err(ColfixError::LengthMismatch {
            op: "select",
            left: positions.len(),
            right: values.len(),
        });
    }
    let out: PositionSet = positions
        .iter()
        .zip(values.iter())
        .filter(|&(_, v)| predicate.matches(v))
        .map(|(p, _)| p)
        .collect();
    debug!(
        target: TARGET,
        input = positions.len(),
        matched = out.len(),
        "select on positions"
    );
    Ok(out)
}

/// Project `column` onto `positions`, preserving their order.
///
/// # Errors
///
/// Returns `PositionOutOfRange` for a position past the end of the column.
pub fn fetch(column: &[i64], positions: &PositionSet) -> Result<Vector> {
    positions
        .iter()
        .map(|p| {
            column
                .get(p)
                .copied()
                .ok_or(ColfixError::PositionOutOfRange {
                    position: p,
                    rows: column.len(),
                })
        })
        .collect::<Result<Vec<_>>>()
        .map(Vector::new)
}

/// Reduce `values` to one scalar.
///
/// `sum` of nothing is `0` and `avg` of nothing is `0.0`.
///
/// # Errors
///
/// `EmptyAggregate` for `min`/`max` of an empty input, `Overflow` when a sum
/// leaves the `i64` range.
pub fn aggregate(values: &[i64], kind: AggregateKind) -> Result<Scalar> {
    let scalar = match kind {
        AggregateKind::Sum => Scalar::Int(checked_sum(values)?),
        AggregateKind::Avg => Scalar::Float(mean(values)),
        AggregateKind::Min => Scalar::Int(
            values
                .iter()
                .copied()
                .min()
                .ok_or(ColfixError::EmptyAggregate { kind: "min" })?,
        ),
        AggregateKind::Max => Scalar::Int(
            values
                .iter()
                .copied()
                .max()
                .ok_or(ColfixError::EmptyAggregate { kind: "max" })?,
        ),
    };
    debug!(target: TARGET, kind = %kind, rows = values.len(), result = ?scalar, "aggregate");
    Ok(scalar)
}

fn checked_sum(values: &[i64]) -> Result<i64> {
    values.iter().try_fold(0_i64, |acc, &v| {
        acc.checked_add(v).ok_or(ColfixError::Overflow { op: "sum" })
    })
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    // i128 cannot overflow for any slice that fits in memory.
    let total: i128 = values.iter().map(|&v| i128::from(v)).sum();
    total as f64 / values.len() as f64
}

/// Element-wise `a op b`.
///
/// # Errors
///
/// `LengthMismatch` for unequal inputs, `Overflow` if any element leaves the
/// `i64` range.
pub fn elementwise(a: &Vector, b: &Vector, op: ArithOp) -> Result<Vector> {
    if a.len() != b.len() {
        return Err(ColfixError::LengthMismatch {
            op: op.as_str(),
            left: a.len(),
            right: b.len(),
        });
    }
    let f: fn(i64, i64) -> Option<i64> = match op {
        ArithOp::Add => i64::checked_add,
        ArithOp::Sub => i64::checked_sub,
    };
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f(x, y).ok_or(ColfixError::Overflow { op: op.as_str() }))
        .collect::<Result<Vec<_>>>()
        .map(Vector::new)
}

/// Equi-join of two (values, positions) inputs.
///
/// Pairs `(left_positions[i], right_positions[j])` for every `i`, `j` with
/// `left_values[i] == right_values[j]`. Output is left-major: all matches of
/// left element 0 first, each group in ascending right order. `strategy`
/// names the engine algorithm under test; the result never depends on it.
///
/// # Errors
///
/// Returns `LengthMismatch` if either side's values and positions differ in
/// length.
pub fn join(
    left_values: &Vector,
    left_positions: &PositionSet,
    right_values: &Vector,
    right_positions: &PositionSet,
    strategy: JoinStrategy,
) -> Result<JoinResult> {
    if left_values.len() != left_positions.len() {
        return Err(ColfixError::LengthMismatch {
            op: "join",
            left: left_values.len(),
            right: left_positions.len(),
        });
    }
    if right_values.len() != right_positions.len() {
        return Err(ColfixError::LengthMismatch {
            op: "join",
            left: right_values.len(),
            right: right_positions.len(),
        });
    }

    let mut buckets: HashMap<i64, Vec<usize>> = HashMap::with_capacity(right_values.len());
    for (j, v) in right_values.iter().enumerate() {
        buckets.entry(v).or_default().push(j);
    }

    let right_pos = right_positions.as_slice();
    let mut out_left = Vec::new();
    let mut out_right = Vec::new();
    for (lp, v) in left_positions.iter().zip(left_values.iter()) {
        if let Some(matches) = buckets.get(&v) {
            for &j in matches {
                out_left.push(lp);
                out_right.push(right_pos[j]);
            }
        }
    }
    debug!(
        target: TARGET,
        strategy = %strategy,
        left = left_values.len(),
        right = right_values.len(),
        pairs = out_left.len(),
        "join"
    );
    JoinResult::new(out_left.into(), out_right.into())
}

/// Append one row.
///
/// # Errors
///
/// Returns `ArityMismatch` unless `values` has one entry per column.
pub fn insert(table: &mut Table, values: &[i64]) -> Result<()> {
    table.push_row(values)?;
    debug!(
        target: TARGET,
        table = table.name(),
        rows = table.row_count(),
        version = table.version(),
        "insert"
    );
    Ok(())
}

/// Set `column` to `value` at each listed row.
///
/// # Errors
///
/// `NoSuchColumn` or `PositionOutOfRange`; the table is untouched on error.
pub fn update(table: &mut Table, positions: &PositionSet, column: &str, value: i64) -> Result<()> {
    let idx = table.column_position(column)?;
    table.overwrite(idx, positions.as_slice(), value)?;
    debug!(
        target: TARGET,
        table = table.name(),
        column,
        value,
        rows = positions.len(),
        version = table.version(),
        "update"
    );
    Ok(())
}

/// Remove the listed rows. Survivors keep their relative order and are
/// renumbered densely from 0.
///
/// # Errors
///
/// Returns `PositionOutOfRange`; the table is untouched on error.
pub fn delete(table: &mut Table, positions: &PositionSet) -> Result<()> {
    table.remove_rows(positions.as_slice())?;
    debug!(
        target: TARGET,
        table = table.name(),
        removed = positions.len(),
        rows = table.row_count(),
        version = table.version(),
        "delete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use colfix_types::Column;

    fn pset(v: &[usize]) -> PositionSet {
        v.to_vec().into()
    }

    fn vector(v: &[i64]) -> Vector {
        v.to_vec().into()
    }

    #[test]
    fn select_half_open_with_open_ends() {
        let col = [5, 1, 9, 3, 7];
        assert_eq!(select(&col, RangePredicate::between(3, 7)).as_slice(), &[0, 3]);
        assert_eq!(select(&col, RangePredicate::below(4)).as_slice(), &[1, 3]);
        assert_eq!(select(&col, RangePredicate::at_least(7)).as_slice(), &[2, 4]);
        assert!(select(&col, RangePredicate::between(9, 3)).is_empty());
    }

    #[test]
    fn select_on_requires_alignment() {
        let err = select_on(&pset(&[0, 1]), &vector(&[1]), RangePredicate::below(5));
        assert!(matches!(err, Err(ColfixError::LengthMismatch { .. })));

        let out = select_on(&pset(&[2, 4, 6]), &vector(&[10, 20, 30]), RangePredicate::at_least(20))
            .expect("aligned");
        assert_eq!(out.as_slice(), &[4, 6]);
    }

    #[test]
    fn fetch_preserves_position_order() {
        let col = [10, 11, 12, 13];
        let v = fetch(&col, &pset(&[3, 0, 3])).expect("in range");
        assert_eq!(v.as_slice(), &[13, 10, 13]);
        assert!(matches!(
            fetch(&col, &pset(&[4])),
            Err(ColfixError::PositionOutOfRange { position: 4, rows: 4 })
        ));
    }

    #[test]
    fn aggregates_on_empty_input() {
        assert_eq!(aggregate(&[], AggregateKind::Sum).ok(), Some(Scalar::Int(0)));
        assert_eq!(aggregate(&[], AggregateKind::Avg).ok(), Some(Scalar::Float(0.0)));
        assert!(matches!(
            aggregate(&[], AggregateKind::Min),
            Err(ColfixError::EmptyAggregate { kind: "min" })
        ));
        assert!(matches!(
            aggregate(&[], AggregateKind::Max),
            Err(ColfixError::EmptyAggregate { kind: "max" })
        ));
    }

    #[test]
    fn aggregates_on_values() {
        let v = [4, -2, 7, 1];
        assert_eq!(aggregate(&v, AggregateKind::Sum).ok(), Some(Scalar::Int(10)));
        assert_eq!(aggregate(&v, AggregateKind::Avg).ok(), Some(Scalar::Float(2.5)));
        assert_eq!(aggregate(&v, AggregateKind::Min).ok(), Some(Scalar::Int(-2)));
        assert_eq!(aggregate(&v, AggregateKind::Max).ok(), Some(Scalar::Int(7)));
    }

    #[test]
    fn sum_overflow_is_reported() {
        assert!(matches!(
            aggregate(&[i64::MAX, 1], AggregateKind::Sum),
            Err(ColfixError::Overflow { op: "sum" })
        ));
        // avg accumulates wide and does not overflow.
        assert!(aggregate(&[i64::MAX, i64::MAX], AggregateKind::Avg).is_ok());
    }

    #[test]
    fn elementwise_add_sub() {
        let a = vector(&[1, 2, 3]);
        let b = vector(&[10, 20, 30]);
        assert_eq!(elementwise(&a, &b, ArithOp::Add).expect("add").as_slice(), &[11, 22, 33]);
        assert_eq!(elementwise(&a, &b, ArithOp::Sub).expect("sub").as_slice(), &[-9, -18, -27]);
        assert!(matches!(
            elementwise(&a, &vector(&[1]), ArithOp::Add),
            Err(ColfixError::LengthMismatch { op: "add", .. })
        ));
        assert!(matches!(
            elementwise(&vector(&[i64::MIN]), &vector(&[1]), ArithOp::Sub),
            Err(ColfixError::Overflow { op: "sub" })
        ));
    }

    #[test]
    fn join_is_left_major_and_strategy_independent() {
        let lv = vector(&[7, 8, 7]);
        let lp = pset(&[10, 11, 12]);
        let rv = vector(&[7, 9, 7]);
        let rp = pset(&[0, 1, 2]);
        for &s in JoinStrategy::ALL {
            let j = join(&lv, &lp, &rv, &rp, s).expect("aligned");
            assert_eq!(j.left().as_slice(), &[10, 10, 12, 12]);
            assert_eq!(j.right().as_slice(), &[0, 2, 0, 2]);
        }
    }

    #[test]
    fn join_rejects_misaligned_side() {
        let err = join(&vector(&[1]), &pset(&[]), &vector(&[]), &pset(&[]), JoinStrategy::Hash);
        assert!(matches!(err, Err(ColfixError::LengthMismatch { op: "join", .. })));
    }

    fn small_table() -> Table {
        Table::from_columns(
            "tbl",
            vec![
                Column::new("col1", vec![1, 2, 3, 4]),
                Column::new("col2", vec![10, 20, 30, 40]),
            ],
        )
        .expect("aligned")
    }

    #[test]
    fn insert_update_delete() {
        let mut t = small_table();
        insert(&mut t, &[5, 50]).expect("insert");
        assert_eq!(t.row_count(), 5);

        let hits = select(t.column("col1").expect("col1").values(), RangePredicate::at_least(4));
        update(&mut t, &hits, "col2", -1).expect("update");
        assert_eq!(t.column("col2").expect("col2").values(), &[10, 20, 30, -1, -1]);

        delete(&mut t, &pset(&[0, 2])).expect("delete");
        assert_eq!(t.column("col1").expect("col1").values(), &[2, 4, 5]);
        assert_eq!(t.column("col2").expect("col2").values(), &[20, -1, -1]);
        assert_eq!(t.version(), 3);
    }

    #[test]
    fn failed_mutations_leave_table_untouched() {
        let mut t = small_table();
        let before = t.clone();
        assert!(insert(&mut t, &[1]).is_err());
        assert!(update(&mut t, &pset(&[9]), "col1", 0).is_err());
        assert!(update(&mut t, &pset(&[0]), "nope", 0).is_err());
        assert!(delete(&mut t, &pset(&[1, 4])).is_err());
        assert_eq!(t, before);
    }
}
