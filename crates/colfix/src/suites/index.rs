//! Index suite (scenarios 20-44): one dataset loaded as three tables, an
//! unindexed control and two differently indexed copies, queried with the
//! same parameters so that their outputs must agree.

use colfix_error::Result;
use colfix_types::{AggregateKind, Clustering, IndexLayout, IndexSpec, RangePredicate, TableRef};

use super::{SuiteContext, draw_many, numbered_dataset, rows_i64, table};
use crate::dataset::Dataset;
use crate::scenario::ScenarioBuilder;
use crate::synth::Synthesizer;

const CTRL_FILE: &str = "data4_ctrl.csv";
const BTREE_FILE: &str = "data4_btree.csv";
const CLUSTERED_BTREE_FILE: &str = "data4_clustered_btree.csv";

/// The three copies of the index dataset.
struct Tables {
    ctrl: TableRef,
    btree: TableRef,
    clustered: TableRef,
}

impl Tables {
    fn all(&self) -> [&TableRef; 3] {
        [&self.ctrl, &self.btree, &self.clustered]
    }
}

/// One `select(col, [v, v + offset)) -> fetch -> aggregate -> print` round.
#[derive(Clone, Copy)]
struct Probe<'a> {
    filter: &'a str,
    project: &'a str,
    kind: AggregateKind,
}

pub(super) fn build(cx: &mut SuiteContext<'_>) -> Result<()> {
    let tables = Tables {
        ctrl: table("tbl4_ctrl")?,
        btree: table("tbl4")?,
        clustered: table("tbl4_clustered_btree")?,
    };
    let rows = cx.config.sizes.index_rows;
    let n = rows_i64(rows)?;
    let (ctrl, freq) = dataset(&mut cx.synth, &tables.ctrl, rows)?;
    cx.add_dataset(ctrl.renamed(BTREE_FILE, tables.btree.clone()));
    cx.add_dataset(ctrl.renamed(CLUSTERED_BTREE_FILE, tables.clustered.clone()));
    cx.add_dataset(ctrl);

    create(
        cx,
        20,
        &tables.ctrl,
        &[
            "Create a control table that is identical to the one in test21.dsl, but",
            "without any indexes",
        ],
        CTRL_FILE,
        None,
    )?;
    create(
        cx,
        21,
        &tables.btree,
        &[
            "Test for creating table with indexes",
            "",
            "Table tbl4 has a clustered index with col3 being the leading column.",
            "The clustered index has the form of a sorted column.",
            "The table also has an unclustered btree index on col2.",
        ],
        BTREE_FILE,
        Some((IndexLayout::Sorted, IndexLayout::Btree)),
    )?;

    let offsets = ((n / 5000).max(1), (n / 2500).max(2));
    let vals = (
        cx.synth.pick(0, n / 5 - offsets.0)?,
        cx.synth.pick(0, n / 5 - offsets.1)?,
    );
    two_ranges(cx, 22, &tables.ctrl, offsets, vals, "")?;
    two_ranges(
        cx,
        23,
        &tables.btree,
        offsets,
        vals,
        "tbl4 has a secondary b-tree tree index on col2, and a clustered index on col3 with the form of a sorted column",
    )?;
    conjunction(cx, &tables.btree, n)?;

    let sums = Probe {
        filter: "col2",
        project: "col3",
        kind: AggregateKind::Sum,
    };
    let offset = (n / 1000).max(2);
    let vals = draw_many(&mut cx.synth, 10, 0, n / 5 - offset)?;
    for (id, t, title) in [
        (
            25,
            &tables.ctrl,
            "Test for a non-clustered index select followed by an aggregate (control-test)",
        ),
        (
            26,
            &tables.btree,
            "Test for a non-clustered index select followed by an aggregate",
        ),
    ] {
        probes(cx, id, t, &[title, ""], sums, &vals, offset)?;
    }
    frequent_values(cx, &tables.btree, freq)?;

    let avgs = Probe {
        kind: AggregateKind::Avg,
        ..sums
    };
    let offset = (n / 500).max(2);
    let vals = draw_many(&mut cx.synth, 100, 0, n / 5 - offset)?;
    for (id, t, title) in [
        (
            28,
            &tables.ctrl,
            &[
                "Test for a non-clustered index select followed by an aggregate (control-test, many queries)",
                "Compare to test 29 for timing differences between B-tree and scan for highly selective queries",
                "",
            ][..],
        ),
        (
            29,
            &tables.btree,
            &[
                "Test for a non-clustered index select followed by an aggregate (many queries)",
                "",
            ][..],
        ),
    ] {
        probes(cx, id, t, title, avgs, &vals, offset)?;
    }

    create(
        cx,
        30,
        &tables.clustered,
        &[
            "Test for creating table with indexes",
            "",
            "Table tbl4_clustered_btree has a clustered index with col3 being the leading column.",
            "The clustered index has the form of a B-Tree.",
            "The table also has a secondary sorted index.",
        ],
        CLUSTERED_BTREE_FILE,
        Some((IndexLayout::Btree, IndexLayout::Sorted)),
    )?;
    let offsets = ((n / 5000).max(1), (n / 2500).max(2));
    let vals = (
        cx.synth.pick(0, n / 5 - offsets.0)?,
        cx.synth.pick(0, n / 5 - offsets.1)?,
    );
    two_ranges(
        cx,
        31,
        &tables.clustered,
        offsets,
        vals,
        "tbl4_clustered_btree has a secondary sorted index on col2, and a clustered b-tree index on col3",
    )?;
    let offset = (n / 1000).max(2);
    let vals = draw_many(&mut cx.synth, 5, 0, n / 5 - offset)?;
    probes(
        cx,
        32,
        &tables.clustered,
        &[
            "Test for a non-clustered index select followed by an aggregate",
            "",
        ],
        sums,
        &vals,
        offset,
    )?;

    selectivity_sweep(
        cx,
        33,
        &tables,
        n,
        Probe {
            filter: "col3",
            project: "col1",
            kind: AggregateKind::Avg,
        },
    )?;
    selectivity_sweep(cx, 39, &tables, n, avgs)
}

/// The shared columns plus the two values planted in `col2` at 5% and 2%.
fn dataset(synth: &mut Synthesizer, tbl: &TableRef, rows: usize) -> Result<(Dataset, [i64; 2])> {
    let n = rows_i64(rows)?;
    let col1 = synth.generate_uniform(rows, 0, 1000)?;
    let mut col2 = synth.generate_uniform(rows, 0, n / 5)?;
    let col3 = synth.generate_uniform(rows, 0, n / 5)?;
    let mut col4 = synth.generate_uniform(rows, 0, 10_000)?;
    let freq1 = synth.pick(0, n / 5)?;
    synth.generate_skewed_duplicates(&mut col2, 0.05, freq1)?;
    let freq2 = synth.pick(0, n / 5)?;
    synth.generate_skewed_duplicates(&mut col2, 0.02, freq2)?;
    for (c4, c1) in col4.iter_mut().zip(&col1) {
        *c4 += c1;
    }
    let data = numbered_dataset(CTRL_FILE, tbl, vec![col1, col2, col3, col4])?;
    Ok((data, [freq1, freq2]))
}

/// Create and load one copy; `indexes` gives the layouts of the clustered
/// `col3` index and the unclustered `col2` index.
fn create(
    cx: &mut SuiteContext<'_>,
    id: u32,
    tbl: &TableRef,
    header: &[&str],
    file: &str,
    indexes: Option<(IndexLayout, IndexLayout)>,
) -> Result<()> {
    let path = cx.load_path(file);
    let (mut b, _) = cx.scenario(id)?;
    b.comments(header)?;
    b.comments(&["", &format!("Loads data from: {file}"), "", "Create Table"])?;
    b.create_table(tbl, &["col1", "col2", "col3", "col4"])?;
    match indexes {
        Some((clustered, secondary)) => {
            b.comment("Create a clustered index on col3")?;
            b.create_index(
                &tbl.column("col3")?,
                IndexSpec {
                    layout: clustered,
                    clustering: Clustering::Clustered,
                },
            )?;
            b.comment(format!("Create an unclustered {secondary} index on col2"))?;
            b.create_index(
                &tbl.column("col2")?,
                IndexSpec {
                    layout: secondary,
                    clustering: Clustering::Unclustered,
                },
            )?;
            b.comments(&["", "", "Load data immediately in the form of a clustered index"])?;
        }
        None => b.comments(&["", "Load data immediately"])?,
    }
    b.load(path)?;
    b.comments(&["", "Testing that the data and their indexes are durable on disk."])?;
    b.shutdown()?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn two_ranges(
    cx: &mut SuiteContext<'_>,
    id: u32,
    tbl: &TableRef,
    offsets: (i64, i64),
    vals: (i64, i64),
    note: &str,
) -> Result<()> {
    let col1 = tbl.column("col1")?;
    let col3 = tbl.column("col3")?;
    let name = &tbl.table;
    let ranges = [
        RangePredicate::between(vals.0, vals.0 + offsets.0),
        RangePredicate::between(vals.1, vals.1 + offsets.1),
    ];
    let (mut b, _) = cx.scenario(id)?;
    b.comment("")?;
    if !note.is_empty() {
        b.comments(&[note, "testing for correctness", ""])?;
    }
    b.comment("Query in SQL:")?;
    for (val, offset) in [(vals.0, offsets.0), (vals.1, offsets.1)] {
        b.comment(format!(
            "SELECT col1 FROM {name} WHERE col3 >= {val} and col3 < {};",
            val + offset
        ))?;
    }
    b.comment("")?;
    if !note.is_empty() {
        b.comment(
            "since col3 has a clustered index, the index is expected to be used by the select operator",
        )?;
    }
    for (i, range) in ranges.into_iter().enumerate() {
        if i > 0 {
            b.gap()?;
        }
        let s = b.select(&col3, range)?;
        let f = b.fetch(&col1, &s)?;
        b.print(&[&f])?;
    }
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

/// Scenario 24: a clustered-index select narrowed by a second predicate.
fn conjunction(cx: &mut SuiteContext<'_>, tbl: &TableRef, n: i64) -> Result<()> {
    let offset1 = (n / 10).max(1);
    let offset2 = 2000;
    let (mut b, synth) = cx.scenario(24)?;
    let val1 = synth.pick(0, n / 5 - offset1)?;
    let val2 = synth.pick(0, 8000)?;
    b.comments(&[
        "Test for a clustered index select followed by a second predicate",
        "",
        "Query in SQL:",
        &format!(
            "SELECT sum(col1) FROM tbl4 WHERE (col3 >= {val1} and col3 < {}) AND (col2 >= {val2} and col2 < {});",
            val1 + offset1,
            val2 + offset2
        ),
        "",
    ])?;
    let s1 = b.select(&tbl.column("col3")?, RangePredicate::between(val1, val1 + offset1))?;
    let f1 = b.fetch(&tbl.column("col2")?, &s1)?;
    let s2 = b.select_on(&s1, &f1, RangePredicate::between(val2, val2 + offset2))?;
    let f2 = b.fetch(&tbl.column("col1")?, &s2)?;
    b.print(&[&f2])?;
    b.gap()?;
    let a = b.aggregate_of(AggregateKind::Sum, &f2)?;
    b.print(&[&a])?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

/// Scenario 27: ranges around the two planted `col2` values.
fn frequent_values(cx: &mut SuiteContext<'_>, tbl: &TableRef, freq: [i64; 2]) -> Result<()> {
    let col1 = tbl.column("col1")?;
    let col2 = tbl.column("col2")?;
    let (mut b, _) = cx.scenario(27)?;
    b.comments(&[
        "Test for a non-clustered index select on frequent values",
        "",
        "Query in SQL:",
    ])?;
    for v in freq {
        b.comment(format!(
            "SELECT sum(col1) FROM tbl4 WHERE (col2 >= {} and col2 < {});",
            v - 1,
            v + 1
        ))?;
    }
    b.comment("")?;
    for v in freq {
        let s = b.select(&col2, RangePredicate::between(v - 1, v + 1))?;
        let f = b.fetch(&col1, &s)?;
        let a = b.aggregate_of(AggregateKind::Sum, &f)?;
        b.print(&[&a])?;
    }
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn probe_round(
    b: &mut ScenarioBuilder<'_>,
    tbl: &TableRef,
    probe: Probe<'_>,
    val: i64,
    offset: i64,
) -> Result<()> {
    let s = b.select(
        &tbl.column(probe.filter)?,
        RangePredicate::between(val, val + offset),
    )?;
    let f = b.fetch(&tbl.column(probe.project)?, &s)?;
    let a = b.aggregate_of(probe.kind, &f)?;
    b.print(&[&a])
}

fn probe_sql(tbl: &TableRef, probe: Probe<'_>) -> String {
    format!(
        "SELECT {}({}) FROM {} WHERE {f} >= _ and {f} < _;",
        probe.kind, probe.project, tbl.table,
        f = probe.filter
    )
}

fn probes(
    cx: &mut SuiteContext<'_>,
    id: u32,
    tbl: &TableRef,
    header: &[&str],
    probe: Probe<'_>,
    vals: &[i64],
    offset: i64,
) -> Result<()> {
    let (mut b, _) = cx.scenario(id)?;
    b.comments(header)?;
    b.comments(&["Query form in SQL:", &probe_sql(tbl, probe), ""])?;
    for &val in vals {
        probe_round(&mut b, tbl, probe, val, offset)?;
    }
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

/// Six scenarios from `first`: 0.1% then 1% selectivity, each over the
/// control, sorted-clustered and btree-clustered tables. Every scenario
/// draws its own 20 parameters.
fn selectivity_sweep(
    cx: &mut SuiteContext<'_>,
    first: u32,
    tables: &Tables,
    n: i64,
    probe: Probe<'_>,
) -> Result<()> {
    let levels = [((n / 5000).max(1), "0.1%"), ((n / 500).max(2), "1%")];
    let mut id = first;
    for (offset, selectivity) in levels {
        for tbl in tables.all() {
            let (mut b, synth) = cx.scenario(id)?;
            let vals = draw_many(synth, 20, 0, n / 5 - offset)?;
            b.comments(&[
                "",
                &format!("selectivity={selectivity}"),
                "Query in SQL:",
                &probe_sql(tbl, probe),
                "",
            ])?;
            for val in vals {
                probe_round(&mut b, tbl, probe, val, offset)?;
            }
            let generated = b.finish()?;
            cx.scenarios.push(generated);
            id += 1;
        }
    }
    Ok(())
}
