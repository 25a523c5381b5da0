//! Algebraic properties of the oracle, checked against independent
//! formulations of the same queries.

use std::collections::BTreeMap;

use colfix_oracle::{delete, fetch, insert, join, select, select_on, update};
use colfix_types::{Column, JoinStrategy, PositionSet, RangePredicate, Table, Vector};
use proptest::prelude::*;

fn values() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-50_i64..50, 0..200)
}

fn table_from(rows: &[(i64, i64)]) -> Table {
    Table::from_columns(
        "t",
        vec![
            Column::new("a", rows.iter().map(|r| r.0).collect()),
            Column::new("b", rows.iter().map(|r| r.1).collect()),
        ],
    )
    .expect("aligned columns")
}

#[derive(Debug, Clone)]
enum Mutation {
    Insert(i64, i64),
    Update { below: i64, value: i64 },
    Delete { below: i64 },
}

fn mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        (-20_i64..20, -20_i64..20).prop_map(|(a, b)| Mutation::Insert(a, b)),
        (-20_i64..20, -20_i64..20).prop_map(|(below, value)| Mutation::Update { below, value }),
        (-20_i64..20).prop_map(|below| Mutation::Delete { below }),
    ]
}

proptest! {
    #[test]
    fn prop_select_partitions_rows(col in values(), split in -60_i64..60) {
        let low = select(&col, RangePredicate::below(split));
        let high = select(&col, RangePredicate::at_least(split));
        prop_assert_eq!(low.len() + high.len(), col.len());

        let mut merged: Vec<usize> = low.iter().chain(high.iter()).collect();
        merged.sort_unstable();
        prop_assert_eq!(merged, (0..col.len()).collect::<Vec<_>>());
    }

    #[test]
    fn prop_chained_select_matches_conjunction(
        rows in prop::collection::vec((-50_i64..50, -50_i64..50), 0..200),
        a_lo in -50_i64..50, a_hi in -50_i64..50,
        b_lo in -50_i64..50, b_hi in -50_i64..50,
    ) {
        let a: Vec<i64> = rows.iter().map(|r| r.0).collect();
        let b: Vec<i64> = rows.iter().map(|r| r.1).collect();
        let pa = RangePredicate::between(a_lo, a_hi);
        let pb = RangePredicate::between(b_lo, b_hi);

        let first = select(&a, pa);
        let fetched = fetch(&b, &first).expect("positions come from the same table");
        let chained = select_on(&first, &fetched, pb).expect("aligned");

        let direct: PositionSet = (0..rows.len())
            .filter(|&i| pa.matches(a[i]) && pb.matches(b[i]))
            .collect();
        prop_assert_eq!(chained, direct);
    }

    #[test]
    fn prop_join_agrees_with_group_by(
        left in prop::collection::vec(0_i64..12, 0..60),
        right in prop::collection::vec(0_i64..12, 0..60),
    ) {
        let lp: PositionSet = (0..left.len()).map(|i| i * 3).collect();
        let rp: PositionSet = (0..right.len()).map(|i| i + 100).collect();
        let lv = Vector::new(left.clone());
        let rv = Vector::new(right.clone());

        let mut l_counts: BTreeMap<i64, usize> = BTreeMap::new();
        for &v in &left {
            *l_counts.entry(v).or_default() += 1;
        }
        let mut r_counts: BTreeMap<i64, usize> = BTreeMap::new();
        for &v in &right {
            *r_counts.entry(v).or_default() += 1;
        }
        let expected: usize = l_counts
            .iter()
            .map(|(v, n)| n * r_counts.get(v).copied().unwrap_or(0))
            .sum();

        for &strategy in JoinStrategy::ALL {
            let j = join(&lv, &lp, &rv, &rp, strategy).expect("aligned inputs");
            prop_assert_eq!(j.len(), expected);
            for (l, r) in j.left().iter().zip(j.right().iter()) {
                prop_assert_eq!(left[l / 3], right[r - 100]);
            }
            let seen = j.left().as_slice();
            prop_assert!(seen.windows(2).all(|w| w[0] <= w[1]), "left-major order");
        }
    }

    #[test]
    fn prop_mutations_match_row_model(
        initial in prop::collection::vec((-20_i64..20, -20_i64..20), 0..40),
        ops in prop::collection::vec(mutation(), 0..30),
    ) {
        let mut table = table_from(&initial);
        let mut model = initial.clone();

        for op in &ops {
            match *op {
                Mutation::Insert(a, b) => {
                    insert(&mut table, &[a, b]).expect("arity matches");
                    model.push((a, b));
                }
                Mutation::Update { below, value } => {
                    let hits = select(table.column("a").expect("a").values(), RangePredicate::below(below));
                    update(&mut table, &hits, "b", value).expect("positions in range");
                    for row in model.iter_mut().filter(|r| r.0 < below) {
                        row.1 = value;
                    }
                }
                Mutation::Delete { below } => {
                    let hits = select(table.column("a").expect("a").values(), RangePredicate::below(below));
                    delete(&mut table, &hits).expect("positions in range");
                    model.retain(|r| r.0 >= below);
                }
            }
        }

        // The rebuilt table starts at version 0, so compare contents only.
        let rebuilt = table_from(&model);
        prop_assert_eq!(table.columns(), rebuilt.columns());
        prop_assert_eq!(table.version(), ops.len() as u64);
    }
}
