//! Update suite (scenarios 60-65): inserts, updates and deletes on the
//! indexed table `tbl5`, each driven through a select, with queries between
//! them. Scenario 65 picks its mutation targets from the live table.

use colfix_error::{ColfixError, Result};
use colfix_types::{Clustering, ColumnRef, IndexLayout, IndexSpec, RangePredicate, TableRef};

use super::{SuiteContext, numbered_dataset, rows_i64, scaled, table};
use crate::dataset::Dataset;
use crate::scenario::ScenarioBuilder;
use crate::synth::Synthesizer;

const FILE: &str = "data5.csv";

/// Rows inserted by scenario 60.
const FIRST_INSERTS: [[i64; 4]; 5] = [
    [-1, -11, -111, -1111],
    [-2, -22, -222, -2222],
    [-3, -33, -333, -2222],
    [-4, -44, -444, -2222],
    [-5, -55, -555, -2222],
];

/// `(filter column, [value, value + 1), new col1)` of scenario 62.
const UPDATES: [(&str, i64, i64); 5] = [
    ("col1", -1, -10),
    ("col2", -22, -20),
    ("col1", -3, -30),
    ("col3", -444, -40),
    ("col1", -5, -50),
];

/// `(filter column, [value, value + 1))` of scenario 64.
const DELETES: [(&str, i64); 5] = [
    ("col1", -10),
    ("col2", -22),
    ("col1", -30),
    ("col3", -444),
    ("col1", -50),
];

/// Mutations of each kind in the scalability scenario.
const RANDOM_MUTATIONS: usize = 100;
const RANDOM_QUERIES: usize = 5;

pub(super) fn build(cx: &mut SuiteContext<'_>) -> Result<()> {
    let tbl = table("tbl5")?;
    let rows = cx.config.sizes.update_rows;
    let data = dataset(&mut cx.synth, &tbl, rows)?;
    cx.add_dataset(data);
    let path = cx.load_path(FILE);

    create_and_insert(cx, &tbl, path)?;
    indexed_queries(cx, &tbl)?;
    updates(cx, &tbl)?;
    query_after_updates(cx, &tbl)?;
    deletes(cx, &tbl)?;
    scalability(cx, &tbl)
}

fn dataset(synth: &mut Synthesizer, tbl: &TableRef, rows: usize) -> Result<Dataset> {
    let columns = vec![
        synth.generate_uniform(rows, 0, 1000)?,
        synth.generate_uniform(rows, 0, 1000)?,
        synth.generate_uniform(rows, 0, 10_000)?,
        synth.generate_uniform(rows, 0, 10_000)?,
    ];
    numbered_dataset(FILE, tbl, columns)
}

fn insert_sql(values: &[i64]) -> String {
    let values: Vec<String> = values.iter().map(i64::to_string).collect();
    format!("INSERT INTO tbl5 VALUES ({});", values.join(","))
}

fn create_and_insert(cx: &mut SuiteContext<'_>, tbl: &TableRef, path: String) -> Result<()> {
    let (mut b, _) = cx.scenario(60)?;
    b.comments(&[
        "Correctness test: Do inserts in tbl5.",
        "",
        "Let table tbl5 have a secondary index (col2) and a clustered index (col3), so, all should be maintained when we insert new data.",
        "This means that the table should be always sorted on col3 and the secondary indexes on col2 should be updated",
        "",
        "Create Table",
    ])?;
    b.create_table(tbl, &["col1", "col2", "col3", "col4"])?;
    b.comment("Create a clustered index on col3")?;
    b.create_index(
        &tbl.column("col3")?,
        IndexSpec {
            layout: IndexLayout::Sorted,
            clustering: Clustering::Clustered,
        },
    )?;
    b.comment("Create an unclustered btree index on col2")?;
    b.create_index(
        &tbl.column("col2")?,
        IndexSpec {
            layout: IndexLayout::Btree,
            clustering: Clustering::Unclustered,
        },
    )?;
    b.comments(&["", "", "Load data immediately in the form of a clustered index"])?;
    b.load(path)?;
    b.comment("")?;
    for row in &FIRST_INSERTS {
        b.comment(insert_sql(row))?;
    }
    b.comment("")?;
    for row in &FIRST_INSERTS {
        b.insert(tbl, row)?;
    }
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

/// Select on `filter`, fetch `project`, print.
fn select_print(
    b: &mut ScenarioBuilder<'_>,
    filter: &ColumnRef,
    project: &ColumnRef,
    range: RangePredicate,
) -> Result<()> {
    let s = b.select(filter, range)?;
    let f = b.fetch(project, &s)?;
    b.print(&[&f])
}

fn indexed_queries(cx: &mut SuiteContext<'_>, tbl: &TableRef) -> Result<()> {
    let col1 = tbl.column("col1")?;
    let col2 = tbl.column("col2")?;
    let col3 = tbl.column("col3")?;
    let (mut b, synth) = cx.scenario(61)?;
    let offset = scaled(rows_i64(b.table(tbl)?.row_count())?, 0.1);
    let low1 = synth.pick(-55, -11)?;
    let low2 = synth.pick(-10, 0)?;
    let (high1, high2) = (low1 + offset, low2 + offset);

    b.comments(&[
        "Correctness test: Test for updates on columns with index",
        "",
        &format!("SELECT col1 FROM tbl5 WHERE col2 >= {low1} AND col2 < {high1};"),
        "",
    ])?;
    select_print(&mut b, &col2, &col1, RangePredicate::between(low1, high1))?;
    b.gap()?;
    b.comments(&[
        "",
        &format!("SELECT col3 FROM tbl5 WHERE col1 >= {low2} AND col1 < {high2};"),
        "",
    ])?;
    select_print(&mut b, &col1, &col3, RangePredicate::between(low2, high2))?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn updates(cx: &mut SuiteContext<'_>, tbl: &TableRef) -> Result<()> {
    let col1 = tbl.column("col1")?;
    let (mut b, _) = cx.scenario(62)?;
    b.comments(&["Correctness test: Update values", ""])?;
    for (filter, value, new) in UPDATES {
        b.comment(format!(
            "UPDATE tbl5 SET col1 = {new} WHERE {filter} = {value};"
        ))?;
    }
    b.comment("")?;
    for (filter, value, new) in UPDATES {
        let u = b.select_as(
            "u",
            &tbl.column(filter)?,
            RangePredicate::between(value, value + 1),
        )?;
        b.update(&col1, &u, new)?;
    }
    b.shutdown()?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn query_after_updates(cx: &mut SuiteContext<'_>, tbl: &TableRef) -> Result<()> {
    let (mut b, synth) = cx.scenario(63)?;
    let low = synth.pick(-200, -100)?;
    let high = synth.pick(10, 100)?;
    b.comments(&[
        "Correctness test: Run query after inserts and updates",
        "",
        &format!("SELECT col1 FROM tbl5 WHERE col2 >= {low} AND col2 < {high};"),
        "",
    ])?;
    select_print(
        &mut b,
        &tbl.column("col2")?,
        &tbl.column("col1")?,
        RangePredicate::between(low, high),
    )?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn deletes(cx: &mut SuiteContext<'_>, tbl: &TableRef) -> Result<()> {
    let (mut b, _) = cx.scenario(64)?;
    b.comments(&[
        "Correctness test: Delete values and run queries after inserts, updates, and deletes",
        "",
    ])?;
    for (filter, value) in DELETES {
        b.comment(format!("DELETE FROM tbl5 WHERE {filter} = {value};"))?;
    }
    b.comments(&["SELECT col1 FROM tbl5 WHERE col2 >= -100 AND col2 < 20;", ""])?;
    for (filter, value) in DELETES {
        let d = b.select_as(
            "d",
            &tbl.column(filter)?,
            RangePredicate::between(value, value + 1),
        )?;
        b.delete(tbl, &d)?;
    }
    select_print(
        &mut b,
        &tbl.column("col2")?,
        &tbl.column("col1")?,
        RangePredicate::between(-100, 20),
    )?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

/// `(col1, col2)` of a random row away from both ends of the table.
fn random_row(b: &ScenarioBuilder<'_>, synth: &mut Synthesizer, tbl: &TableRef) -> Result<(i64, i64)> {
    let t = b.table(tbl)?;
    let last = rows_i64(t.row_count())? - 1;
    let pos = usize::try_from(synth.pick(1, last)?)
        .map_err(|_| ColfixError::invariant("negative row position"))?;
    Ok((t.column("col1")?.values()[pos], t.column("col2")?.values()[pos]))
}

fn scalability(cx: &mut SuiteContext<'_>, tbl: &TableRef) -> Result<()> {
    let col1 = tbl.column("col1")?;
    let col2 = tbl.column("col2")?;
    let (mut b, synth) = cx.scenario(65)?;
    b.comments(&[
        "Scalability test: A large number of inserts, deletes and updates, followed by a number of queries",
        "",
    ])?;

    for _ in 0..RANDOM_MUTATIONS {
        let row = [
            synth.pick(0, 1000)?,
            synth.pick(0, 1000)?,
            synth.pick(0, 10_000)?,
            synth.pick(0, 10_000)?,
        ];
        b.comment(insert_sql(&row))?;
        b.insert(tbl, &row)?;
        b.comment("")?;
    }

    for _ in 0..RANDOM_MUTATIONS {
        let (c1, c2) = random_row(&b, synth, tbl)?;
        b.comment(format!(
            "UPDATE tbl5 SET col1 = {} WHERE col2 = {c2};",
            c1 + 1
        ))?;
        let u = b.select_as("u", &col2, RangePredicate::between(c2, c2 + 1))?;
        b.update(&col1, &u, c1 + 1)?;
        b.comment("")?;
    }

    for _ in 0..RANDOM_MUTATIONS {
        let (c1, _) = random_row(&b, synth, tbl)?;
        b.comment(format!("DELETE FROM tbl5 WHERE col1 = {c1};"))?;
        let d = b.select_as("d", &col1, RangePredicate::between(c1, c1 + 1))?;
        b.delete(tbl, &d)?;
        b.comment("")?;
    }

    let (low, high) = {
        let values = b.table(tbl)?.column("col2")?.values();
        let min = values.iter().copied().min();
        let max = values.iter().copied().max();
        min.zip(max)
            .ok_or_else(|| ColfixError::invariant("tbl5 is empty after the random deletes"))?
    };
    for _ in 0..RANDOM_QUERIES {
        let lo = synth.pick(low - 1, high - 1)?;
        let hi = synth.pick(lo, high)?;
        b.comment(format!(
            "SELECT col1 FROM tbl5 WHERE col2 >= {lo} AND col2 < {hi};"
        ))?;
        select_print(&mut b, &col2, &col1, RangePredicate::between(lo, hi))?;
    }

    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}
