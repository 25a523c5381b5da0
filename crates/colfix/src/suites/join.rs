//! Join suite (scenarios 45-59): selections on two tables joined on a key,
//! with aggregates over columns fetched through the join positions.
//!
//! Zipf-distributed keys on the fact and first dimension tables make the
//! fact-dim1 joins many-to-many; dim2 has a unique key, so fact-dim2 joins
//! are many-to-one. Scenarios in a strategy pair run the same query.

use colfix_error::Result;
use colfix_types::{AggregateKind, JoinStrategy, RangePredicate, TableRef};

use super::{SuiteContext, create_and_load, numbered_dataset, rows_i64, scaled, table};
use crate::dataset::Dataset;
use crate::synth::{Synthesizer, ZipfianDistribution, sequence};

const FACT_FILE: &str = "data5_fact.csv";
const DIM1_FILE: &str = "data5_dimension1.csv";
const DIM2_FILE: &str = "data5_dimension2.csv";
const SEL1_FILE: &str = "data5_selectivity1.csv";
const SEL2_FILE: &str = "data5_selectivity2.csv";

struct Tables {
    fact: TableRef,
    dim1: TableRef,
    dim2: TableRef,
    sel1: TableRef,
    sel2: TableRef,
}

/// One side of a join: `select(filter < upper)`, then fetch the key.
struct Side<'a> {
    table: &'a TableRef,
    filter: &'static str,
    upper: i64,
    key: &'static str,
}

/// Column fetched through one side's join positions and aggregated.
struct Output {
    left: bool,
    column: &'static str,
    kind: AggregateKind,
}

struct JoinQuery<'a> {
    left: Side<'a>,
    right: Side<'a>,
    outputs: [Output; 2],
}

impl JoinQuery<'_> {
    fn sql(&self) -> String {
        let name = |left: bool| {
            if left {
                &self.left.table.table
            } else {
                &self.right.table.table
            }
        };
        let [o1, o2] = &self.outputs;
        format!(
            "SELECT {}({}.{}), {}({}.{}) FROM {l},{r} WHERE {l}.{}={r}.{} AND {l}.{} < {} AND {r}.{} < {};",
            o1.kind,
            name(o1.left),
            o1.column,
            o2.kind,
            name(o2.left),
            o2.column,
            self.left.key,
            self.right.key,
            self.left.filter,
            self.left.upper,
            self.right.filter,
            self.right.upper,
            l = self.left.table.table,
            r = self.right.table.table,
        )
    }
}

pub(super) fn build(cx: &mut SuiteContext<'_>) -> Result<()> {
    let t = Tables {
        fact: table("tbl5_fact")?,
        dim1: table("tbl5_dim1")?,
        dim2: table("tbl5_dim2")?,
        sel1: table("tbl5_sel1")?,
        sel2: table("tbl5_sel2")?,
    };
    let config = cx.config;
    let sizes = &config.sizes;
    let (fact_rows, dim1_rows, dim2_rows, sel_rows) = (
        sizes.fact_rows,
        sizes.dim1_rows,
        sizes.dim2_rows,
        sizes.selectivity_rows,
    );
    let zipf = ZipfianDistribution::new(sizes.zipf_exponent, sizes.zipf_distinct)?;
    let datasets = datasets(&mut cx.synth, &t, &zipf, [fact_rows, dim1_rows, dim2_rows, sel_rows])?;
    for data in datasets {
        cx.add_dataset(data);
    }
    create(cx, &t)?;

    let (fact, dim1, dim2, sel) = (
        rows_i64(fact_rows)?,
        rows_i64(dim1_rows)?,
        rows_i64(dim2_rows)?,
        rows_i64(sel_rows)?,
    );
    let fact_dim2 = |selectivity: f64, right_output: Output| JoinQuery {
        left: Side {
            table: &t.fact,
            filter: "col2",
            upper: fifth(fact, selectivity),
            key: "col4",
        },
        right: Side {
            table: &t.dim2,
            filter: "col1",
            upper: scaled(dim2, selectivity),
            key: "col1",
        },
        outputs: [
            Output {
                left: true,
                column: "col2",
                kind: AggregateKind::Avg,
            },
            right_output,
        ],
    };
    let fact_dim1 = |selectivity: f64| JoinQuery {
        left: Side {
            table: &t.fact,
            filter: "col2",
            upper: fifth(fact, selectivity),
            key: "col1",
        },
        right: Side {
            table: &t.dim1,
            filter: "col3",
            upper: fifth(dim1, selectivity),
            key: "col1",
        },
        outputs: [
            Output {
                left: true,
                column: "col2",
                kind: AggregateKind::Sum,
            },
            Output {
                left: false,
                column: "col1",
                kind: AggregateKind::Avg,
            },
        ],
    };
    let sel_query = |selectivity: f64| JoinQuery {
        left: Side {
            table: &t.sel1,
            filter: "col1",
            upper: fifth(sel, selectivity),
            key: "col1",
        },
        right: Side {
            table: &t.sel2,
            filter: "col2",
            upper: fifth(sel, selectivity),
            key: "col1",
        },
        outputs: [
            Output {
                left: true,
                column: "col1",
                kind: AggregateKind::Sum,
            },
            Output {
                left: false,
                column: "col2",
                kind: AggregateKind::Avg,
            },
        ],
    };

    // The fact table's col3 is all ones, so the sum counts join pairs.
    let pair_count = Output {
        left: true,
        column: "col3",
        kind: AggregateKind::Sum,
    };
    let many_to_one = fact_dim2(0.15, pair_count);
    for (id, strategy) in [(46, JoinStrategy::NestedLoop), (47, JoinStrategy::Hash)] {
        let header = join_header("First join test", strategy);
        join(cx, id, &header, &many_to_one, strategy, true)?;
    }
    let many_to_many = fact_dim1(0.15);
    for (id, strategy) in [(48, JoinStrategy::NestedLoop), (49, JoinStrategy::Hash)] {
        let header = join_header("Second join test", strategy);
        join(cx, id, &header, &many_to_many, strategy, true)?;
    }
    let dim_sum = Output {
        left: false,
        column: "col2",
        kind: AggregateKind::Sum,
    };
    join(
        cx,
        50,
        &[
            "join test 3 - hashing many-one with larger selectivities.",
            "Select + Join + aggregation",
            "Performs the join using hashing",
        ],
        &fact_dim2(0.8, dim_sum),
        JoinStrategy::Hash,
        true,
    )?;
    join(
        cx,
        51,
        &[
            "join test 4 - hashing many-many with larger selectivities.",
            "Select + Join + aggregation",
        ],
        &fact_dim1(0.8),
        JoinStrategy::Hash,
        true,
    )?;

    let groups = [
        (52, 0.1, [JoinStrategy::NestedLoop, JoinStrategy::NaiveHash]),
        (56, 0.8, [JoinStrategy::NaiveHash, JoinStrategy::GraceHash]),
    ];
    for (first, selectivity, strategies) in groups {
        let query = sel_query(selectivity);
        for (offset, checked) in [(0, true), (2, false)] {
            for (strategy, k) in strategies.into_iter().zip(0..) {
                let title = format!(
                    "join performance test - {strategy} with selectivities {selectivity} and {selectivity}."
                );
                let id = first + offset + k;
                join(
                    cx,
                    id,
                    &[title.as_str(), "Select + Join + aggregation"],
                    &query,
                    strategy,
                    checked,
                )?;
            }
        }
    }
    Ok(())
}

/// `floor(rows / 5 * selectivity)`: the bound that selects about
/// `selectivity` of a column drawn from `[0, rows / 5)`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn fifth(rows: i64, selectivity: f64) -> i64 {
    (rows as f64 / 5.0 * selectivity) as i64
}

fn join_header(title: &str, strategy: JoinStrategy) -> Vec<String> {
    let mut lines = vec![format!("{title} - {strategy}. Select + Join + aggregation")];
    match strategy {
        JoinStrategy::NestedLoop => {
            lines.push("Performs the join using nested loops".to_owned());
            lines.push("Do this only on reasonable sized tables! (O(n^2))".to_owned());
        }
        _ => lines.push("Performs the join using hashing".to_owned()),
    }
    lines
}

/// Columns of the five join tables. `sizes` is `[fact, dim1, dim2, sel]`.
fn datasets(
    synth: &mut Synthesizer,
    t: &Tables,
    zipf: &ZipfianDistribution,
    sizes: [usize; 4],
) -> Result<Vec<Dataset>> {
    let [fact_rows, dim1_rows, dim2_rows, sel_rows] = sizes;
    let (fact, dim1, dim2, sel) = (
        rows_i64(fact_rows)?,
        rows_i64(dim1_rows)?,
        rows_i64(dim2_rows)?,
        rows_i64(sel_rows)?,
    );

    let fact_data = vec![
        synth.generate_zipfian(fact_rows, zipf),
        synth.generate_uniform(fact_rows, 0, fact / 5)?,
        vec![1; fact_rows],
        synth.generate_uniform(fact_rows, 1, dim2)?,
    ];
    let dim1_data = vec![
        synth.generate_zipfian(dim1_rows, zipf),
        synth.generate_uniform(dim1_rows, 1, dim2)?,
        synth.generate_uniform(dim1_rows, 0, dim1 / 5)?,
    ];
    let dim2_data = vec![
        sequence(1, dim2 + 1),
        synth.generate_uniform(dim2_rows, 0, dim2 / 5)?,
    ];
    let mut sel_data = || -> Result<Vec<Vec<i64>>> {
        Ok(vec![
            synth.generate_uniform(sel_rows, 0, sel / 5)?,
            synth.generate_uniform(sel_rows, 0, sel / 5)?,
        ])
    };
    let sel1_data = sel_data()?;
    let sel2_data = sel_data()?;

    Ok(vec![
        numbered_dataset(FACT_FILE, &t.fact, fact_data)?,
        numbered_dataset(DIM1_FILE, &t.dim1, dim1_data)?,
        numbered_dataset(DIM2_FILE, &t.dim2, dim2_data)?,
        numbered_dataset(SEL1_FILE, &t.sel1, sel1_data)?,
        numbered_dataset(SEL2_FILE, &t.sel2, sel2_data)?,
    ])
}

fn create(cx: &mut SuiteContext<'_>, t: &Tables) -> Result<()> {
    let tables = [
        (&t.fact, 4, FACT_FILE),
        (&t.dim1, 3, DIM1_FILE),
        (&t.dim2, 2, DIM2_FILE),
        (&t.sel1, 2, SEL1_FILE),
        (&t.sel2, 2, SEL2_FILE),
    ];
    let paths: Vec<String> = tables.iter().map(|(_, _, f)| cx.load_path(f)).collect();
    let (mut b, _) = cx.scenario(45)?;
    b.comments(&["Creates tables for join tests", "without any indexes"])?;
    for ((tbl, columns, _), path) in tables.into_iter().zip(paths) {
        create_and_load(&mut b, tbl, columns, path)?;
        b.comment("")?;
    }
    b.comment("Testing that the data and their indexes are durable on disk.")?;
    b.shutdown()?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

/// Select both sides, join, and, when `checked`, fetch and aggregate the two
/// outputs. Unchecked scenarios only time the join and print nothing.
fn join<S: AsRef<str>>(
    cx: &mut SuiteContext<'_>,
    id: u32,
    header: &[S],
    q: &JoinQuery<'_>,
    strategy: JoinStrategy,
    checked: bool,
) -> Result<()> {
    let (mut b, _) = cx.scenario(id)?;
    for line in header {
        b.comment(line.as_ref())?;
    }
    b.comments(&["Query in SQL:", &q.sql(), "", ""])?;

    let p1 = b.select_as(
        "p",
        &q.left.table.column(q.left.filter)?,
        RangePredicate::below(q.left.upper),
    )?;
    let p2 = b.select_as(
        "p",
        &q.right.table.column(q.right.filter)?,
        RangePredicate::below(q.right.upper),
    )?;
    let f1 = b.fetch(&q.left.table.column(q.left.key)?, &p1)?;
    let f2 = b.fetch(&q.right.table.column(q.right.key)?, &p2)?;
    let (t1, t2) = b.join((&f1, &p1), (&f2, &p2), strategy)?;

    if checked {
        let mut scalars = Vec::with_capacity(2);
        for out in &q.outputs {
            let (tbl, positions) = if out.left {
                (q.left.table, &t1)
            } else {
                (q.right.table, &t2)
            };
            let f = b.fetch(&tbl.column(out.column)?, positions)?;
            scalars.push(b.aggregate_of(out.kind, &f)?);
        }
        let refs: Vec<_> = scalars.iter().collect();
        b.print(&refs)?;
    }

    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}
