//! Batch suite (scenarios 10-19): shared scans over `tbl3_batch`.
//!
//! Pairs of scenarios run identical queries with and without brackets, so
//! their expected outputs are identical and only engine timing differs.

use colfix_error::Result;
use colfix_types::{ColumnRef, Handle, RangePredicate, TableRef};

use super::{SuiteContext, create_and_load, draw_many, numbered_dataset, rows_i64, table};
use crate::dataset::Dataset;
use crate::scenario::ScenarioBuilder;
use crate::synth::Synthesizer;

const FILE: &str = "data3_batch.csv";

/// Queries per timing scenario.
const TIMED_QUERIES: usize = 100;

/// How a query group is bracketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plain,
    Batched,
    SingleCore,
    SingleCoreBatched,
}

pub(super) fn build(cx: &mut SuiteContext<'_>) -> Result<()> {
    let tbl = table("tbl3_batch")?;
    let rows = cx.config.sizes.batch_rows;
    let n = rows_i64(rows)?;
    let data = dataset(&mut cx.synth, &tbl, rows)?;
    cx.add_dataset(data);
    let path = cx.load_path(FILE);

    create(cx, &tbl, path)?;
    let overlaps = [
        (11, "2 queries with NO overlap", (10, 20)),
        (12, "2 queries with partial overlap", (600, 820)),
        (13, "2 queries with full overlap (subsumption)", (810, 820)),
    ];
    for (id, title, first) in overlaps {
        two_queries(cx, &tbl, id, title, first, (800, 830))?;
    }
    ten_queries(cx, &tbl, 14, "Queries with no overlap", |_| Ok(0))?;
    ten_queries(cx, &tbl, 15, "Queries with full overlap (subsumption)", |s| {
        s.pick(1000, 9900)
    })?;

    let offset = (n / 5000).max(1);
    let lowers = draw_many(&mut cx.synth, TIMED_QUERIES, 0, n / 8)?;
    let timed = [
        (
            16,
            Mode::Plain,
            &[
                "",
                "Control timing for without batching",
                "Queries for 16 and 17 are identical.",
                "Query in SQL:",
                "100 Queries of the type:",
                "SELECT col3 FROM tbl3_batch WHERE col2 >= _ AND col2 < _;",
                "",
            ][..],
        ),
        (
            17,
            Mode::Batched,
            &[
                "",
                "Same queries with batching",
                "Queries for 16 and 17 are identical.",
                "",
            ][..],
        ),
        (
            18,
            Mode::SingleCore,
            &[
                "",
                "Queries for 18 and 19 are single-core versions of Queries for 16 and 17.",
                "Query in SQL:",
                "100 Queries of the type:",
                "SELECT col3 FROM tbl3_batch WHERE col2 >= _ AND col2 < _;",
                "",
            ][..],
        ),
        (
            19,
            Mode::SingleCoreBatched,
            &[
                "",
                "Same queries with single-core execution",
                "Queries for 18 and 19 are single-core versions of Queries for 16 and 17.",
                "",
            ][..],
        ),
    ];
    for (id, mode, header) in timed {
        timed_queries(cx, &tbl, id, mode, header, &lowers, offset)?;
    }
    Ok(())
}

/// `col1` in `[0, 1000)`, `col2`/`col3` in `[0, n/5)`, `col4 = col1 +
/// uniform[0, 10000)`.
fn dataset(synth: &mut Synthesizer, tbl: &TableRef, rows: usize) -> Result<Dataset> {
    let n = rows_i64(rows)?;
    let col1 = synth.generate_uniform(rows, 0, 1000)?;
    let col2 = synth.generate_uniform(rows, 0, n / 5)?;
    let col3 = synth.generate_uniform(rows, 0, n / 5)?;
    let mut col4 = synth.generate_uniform(rows, 0, 10_000)?;
    for (c4, c1) in col4.iter_mut().zip(&col1) {
        *c4 += c1;
    }
    numbered_dataset(FILE, tbl, vec![col1, col2, col3, col4])
}

fn create(cx: &mut SuiteContext<'_>, tbl: &TableRef, path: String) -> Result<()> {
    let (mut b, _) = cx.scenario(10)?;
    b.comments(&[
        "Load Test Data 2",
        "Create a table to run batch queries on",
        "",
        &format!("Loads data from: {FILE}"),
        "",
        "Create Table",
    ])?;
    create_and_load(&mut b, tbl, 4, path)?;
    b.comments(&["", "Testing that the data is durable on disk."])?;
    b.shutdown()?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn banner(b: &mut ScenarioBuilder<'_>, title: &str, sql: &[String]) -> Result<()> {
    b.comments(&["", "Testing for batching queries", title, "", "Query in SQL:"])?;
    for line in sql {
        b.comment(line.as_str())?;
    }
    b.comments(&["", ""])
}

/// Print each vector in its own output group.
fn print_groups(b: &mut ScenarioBuilder<'_>, vectors: &[Handle]) -> Result<()> {
    for (i, f) in vectors.iter().enumerate() {
        if i > 0 {
            b.gap()?;
        }
        b.print(&[f])?;
    }
    Ok(())
}

fn two_queries(
    cx: &mut SuiteContext<'_>,
    tbl: &TableRef,
    id: u32,
    title: &str,
    first: (i64, i64),
    second: (i64, i64),
) -> Result<()> {
    let col1 = tbl.column("col1")?;
    let col4 = tbl.column("col4")?;
    let (mut b, _) = cx.scenario(id)?;
    let sql: Vec<String> = [first, second]
        .iter()
        .map(|(lo, hi)| format!("SELECT col4 FROM tbl3_batch WHERE col1 >= {lo} AND col1 < {hi};"))
        .collect();
    banner(&mut b, title, &sql)?;

    b.batch_begin()?;
    let s1 = b.select(&col1, RangePredicate::between(first.0, first.1))?;
    let s2 = b.select(&col1, RangePredicate::between(second.0, second.1))?;
    b.batch_execute()?;
    let f1 = b.fetch(&col4, &s1)?;
    let f2 = b.fetch(&col4, &s2)?;
    print_groups(&mut b, &[f1, f2])?;

    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

/// Ten batched selects on `col4`. Query `i` covers `[base + 1000i, base +
/// 1000i + 30)` when `base` is 0, and the nested `[base + 2i, base + 60 -
/// 2i)` otherwise.
fn ten_queries(
    cx: &mut SuiteContext<'_>,
    tbl: &TableRef,
    id: u32,
    title: &str,
    base: impl FnOnce(&mut Synthesizer) -> Result<i64>,
) -> Result<()> {
    let col1 = tbl.column("col1")?;
    let col4 = tbl.column("col4")?;
    let (mut b, synth) = cx.scenario(id)?;
    let base = base(synth)?;
    let ranges: Vec<RangePredicate> = (0..10)
        .map(|i| {
            if base == 0 {
                RangePredicate::between(1000 * i, 1000 * i + 30)
            } else {
                RangePredicate::between(base + 2 * i, base + 60 - 2 * i)
            }
        })
        .collect();
    banner(
        &mut b,
        title,
        &[
            "10 Queries of the type:".to_owned(),
            "SELECT col1 FROM tbl3_batch WHERE col4 >= _ AND col4 < _;".to_owned(),
        ],
    )?;

    b.batch_begin()?;
    let selects = ranges
        .iter()
        .map(|r| b.select(&col4, *r))
        .collect::<Result<Vec<_>>>()?;
    b.batch_execute()?;
    let fetches = selects
        .iter()
        .map(|s| b.fetch(&col1, s))
        .collect::<Result<Vec<_>>>()?;
    print_groups(&mut b, &fetches)?;

    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn timed_queries(
    cx: &mut SuiteContext<'_>,
    tbl: &TableRef,
    id: u32,
    mode: Mode,
    header: &[&str],
    lowers: &[i64],
    offset: i64,
) -> Result<()> {
    let col2: ColumnRef = tbl.column("col2")?;
    let col3 = tbl.column("col3")?;
    let single_core = matches!(mode, Mode::SingleCore | Mode::SingleCoreBatched);
    let batched = matches!(mode, Mode::Batched | Mode::SingleCoreBatched);

    let (mut b, _) = cx.scenario(id)?;
    b.comments(header)?;
    if single_core {
        b.single_core()?;
    }
    if batched {
        b.batch_begin()?;
    }
    let selects = lowers
        .iter()
        .map(|&lo| b.select(&col2, RangePredicate::between(lo, lo + offset)))
        .collect::<Result<Vec<_>>>()?;
    if batched {
        b.batch_execute()?;
    }
    let fetches = selects
        .iter()
        .map(|s| b.fetch(&col3, s))
        .collect::<Result<Vec<_>>>()?;
    if single_core {
        b.single_core_execute()?;
    }
    print_groups(&mut b, &fetches)?;

    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}
