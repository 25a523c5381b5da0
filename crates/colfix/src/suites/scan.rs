//! Scan suite (scenarios 1-9): select, fetch, aggregates and arithmetic over
//! the check-in table `tbl1` and the uniform table `tbl2`.

use colfix_error::Result;
use colfix_types::{AggregateKind, ArithOp, RangePredicate, TableRef};

use super::{SuiteContext, create_and_load, draw_until, numbered_dataset, rows_i64, scaled, table};
use crate::dataset::Dataset;
use crate::scenario::Source;
use crate::synth::{Synthesizer, sequence};
use crate::{CHECKIN_SEED, DB_NAME};

const CHECKIN_FILE: &str = "data1_generated.csv";
const TBL2_FILE: &str = "data2_generated.csv";

/// Rows appended to `tbl2` right after its load.
const TBL2_INSERTS: [[i64; 4]; 10] = [
    [-1, -11, -111, -1111],
    [-2, -22, -222, -2222],
    [-3, -33, -333, -2222],
    [-4, -44, -444, -2222],
    [-5, -55, -555, -2222],
    [-6, -66, -666, -2222],
    [-7, -77, -777, -2222],
    [-8, -88, -888, -2222],
    [-9, -99, -999, -2222],
    [-10, -11, 0, -34],
];

pub(super) fn build(cx: &mut SuiteContext<'_>) -> Result<()> {
    let tbl1 = table("tbl1")?;
    let tbl2 = table("tbl2")?;
    let rows = cx.config.sizes.scan_rows;
    let n = rows_i64(rows)?;

    cx.add_dataset(checkin_dataset(&tbl1)?);
    let tbl2_data = tbl2_dataset(&mut cx.synth, &tbl2, rows)?;
    cx.add_dataset(tbl2_data);
    let checkin_path = cx.load_path(CHECKIN_FILE);
    let tbl2_path = cx.load_path(TBL2_FILE);

    create_checkin(cx, &tbl1, checkin_path)?;
    select_fetch(cx, &tbl1)?;
    select_average(cx, &tbl1)?;
    load_and_insert(cx, &tbl2, tbl2_path)?;
    summation(cx, &tbl2, n)?;
    arithmetic(cx, &tbl2, n, 6, ArithOp::Add)?;
    arithmetic(cx, &tbl2, n, 7, ArithOp::Sub)?;
    min_max(cx, &tbl2, n)?;
    boss(cx, &tbl2, n)
}

/// `col1 = 0..1000`, `col2` a fixed shuffle of `10..1010`. Independent of the
/// run seed.
fn checkin_dataset(tbl1: &TableRef) -> Result<Dataset> {
    let mut col2 = sequence(10, 1010);
    Synthesizer::new(CHECKIN_SEED).shuffle(&mut col2);
    numbered_dataset(CHECKIN_FILE, tbl1, vec![sequence(0, 1000), col2])
}

/// Uniform `col1`, `col2 = col1 + uniform`, a low-cardinality `col3` and a
/// `col4` just below the 4-byte limit.
fn tbl2_dataset(synth: &mut Synthesizer, tbl2: &TableRef, rows: usize) -> Result<Dataset> {
    let n = rows_i64(rows)?;
    let half = n / 2;
    let col1 = synth.generate_uniform(rows, half - n, half)?;
    let mut col2 = synth.generate_uniform(rows, half - n, half)?;
    let col3 = synth.generate_uniform(rows, 0, 100)?;
    let col4 = synth.generate_uniform(rows, (1 << 31) - 10_000, 1 << 31)?;
    for (c2, c1) in col2.iter_mut().zip(&col1) {
        *c2 += c1;
    }
    numbered_dataset(TBL2_FILE, tbl2, vec![col1, col2, col3, col4])
}

fn create_checkin(cx: &mut SuiteContext<'_>, tbl1: &TableRef, path: String) -> Result<()> {
    let (mut b, _) = cx.scenario(1)?;
    b.comment("Load+create Data and shut down of tbl1 which has 1 attribute only")?;
    b.create_db(DB_NAME)?;
    create_and_load(&mut b, tbl1, 2, path)?;
    b.shutdown()?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn select_fetch(cx: &mut SuiteContext<'_>, tbl1: &TableRef) -> Result<()> {
    let col1 = tbl1.column("col1")?;
    let col2 = tbl1.column("col2")?;
    let (mut b, _) = cx.scenario(2)?;
    b.comment("Test Select + Fetch")?;

    b.comments(&["", "SELECT col2 FROM tbl1 WHERE col1 < 20;"])?;
    let s = b.select(&col1, RangePredicate::below(20))?;
    let f = b.fetch(&col2, &s)?;
    b.print(&[&f])?;
    b.gap()?;

    b.comments(&["", "SELECT col2 FROM tbl1 WHERE col1 >= 987;"])?;
    let s = b.select(&col1, RangePredicate::at_least(987))?;
    let f = b.fetch(&col2, &s)?;
    b.print(&[&f])?;

    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn select_average(cx: &mut SuiteContext<'_>, tbl1: &TableRef) -> Result<()> {
    let (low, high) = (956, 972);
    let (mut b, _) = cx.scenario(3)?;
    b.comments(&[
        "Test Multiple Selects + Average",
        "",
        &format!("SELECT avg(col2) FROM tbl1 WHERE col1 >= {low} and col1 < {high};"),
    ])?;
    let s = b.select(&tbl1.column("col1")?, RangePredicate::between(low, high))?;
    let f = b.fetch(&tbl1.column("col2")?, &s)?;
    let a = b.aggregate_of(AggregateKind::Avg, &f)?;
    b.print(&[&a])?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn load_and_insert(cx: &mut SuiteContext<'_>, tbl2: &TableRef, path: String) -> Result<()> {
    let (mut b, _) = cx.scenario(4)?;
    b.comments(&[
        "Load Test Data 2",
        "",
        "Load+create+insert Data and shut down of tbl2 which has 4 attributes",
    ])?;
    create_and_load(&mut b, tbl2, 4, path)?;
    for row in &TBL2_INSERTS {
        b.insert(tbl2, row)?;
    }
    b.shutdown()?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

/// Lower bound of a `col1` window of width `offset`, uniform over the
/// windows that fit in the generated range.
fn window(synth: &mut Synthesizer, n: i64, offset: i64) -> Result<i64> {
    synth.pick(-(n / 2), n / 2 - offset)
}

fn summation(cx: &mut SuiteContext<'_>, tbl2: &TableRef, n: i64) -> Result<()> {
    let offset = scaled(n, 0.8);
    let col1 = tbl2.column("col1")?;
    let (mut b, synth) = cx.scenario(5)?;
    let low = window(synth, n, offset)?;
    let high = low + offset;
    b.comments(&[
        "Summation",
        "",
        &format!("SELECT SUM(col3) FROM tbl2 WHERE col1 >= {low} AND col1 < {high};"),
    ])?;
    let s = b.select(&col1, RangePredicate::between(low, high))?;
    let f = b.fetch(&tbl2.column("col3")?, &s)?;
    let a = b.aggregate_of(AggregateKind::Sum, &f)?;
    b.print(&[&a])?;
    b.comments(&["", "SELECT SUM(col1) FROM tbl2;"])?;
    let a = b.aggregate(AggregateKind::Sum, Source::Column(col1))?;
    b.print(&[&a])?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn arithmetic(
    cx: &mut SuiteContext<'_>,
    tbl2: &TableRef,
    n: i64,
    id: u32,
    op: ArithOp,
) -> Result<()> {
    let offset = 20;
    let (mut b, synth) = cx.scenario(id)?;
    let low = window(synth, n, offset)?;
    let high = low + offset;
    let (title, expr) = match op {
        ArithOp::Add => ("Addition", "col2+col3"),
        ArithOp::Sub => ("Subtraction", "col3-col2"),
    };
    b.comments(&[
        title,
        "",
        &format!("SELECT {expr} FROM tbl2 WHERE col1 >= {low} AND col1 < {high};"),
    ])?;
    let s = b.select(&tbl2.column("col1")?, RangePredicate::between(low, high))?;
    let f2 = b.fetch(&tbl2.column("col2")?, &s)?;
    let f3 = b.fetch(&tbl2.column("col3")?, &s)?;
    let v = match op {
        ArithOp::Add => b.arith(op, &f2, &f3)?,
        ArithOp::Sub => b.arith(op, &f3, &f2)?,
    };
    b.print(&[&v])?;
    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

fn min_max(cx: &mut SuiteContext<'_>, tbl2: &TableRef, n: i64) -> Result<()> {
    let offset = scaled(n, 0.1);
    let col1 = tbl2.column("col1")?;
    let col2 = tbl2.column("col2")?;
    let (mut b, synth) = cx.scenario(8)?;
    let low = {
        let values = b.table(tbl2)?.column("col1")?.values();
        draw_until(
            synth,
            |s| window(s, n, offset),
            |&low| values.iter().any(|&v| (low..low + offset).contains(&v)),
        )?
    };
    let high = low + offset;
    let range = RangePredicate::between(low, high);

    b.comments(&["Min,Max", "", "Min", "SELECT min(col1) FROM tbl2;"])?;
    let a = b.aggregate(AggregateKind::Min, Source::Column(col1.clone()))?;
    b.print(&[&a])?;
    b.comments(&[
        "",
        "",
        &format!("SELECT min(col1) FROM tbl2 WHERE col1 >= {low} AND col1 < {high};"),
    ])?;
    let s = b.select(&col1, range)?;
    let f = b.fetch(&col1, &s)?;
    let m = b.aggregate_of(AggregateKind::Min, &f)?;
    b.print(&[&m])?;
    b.comments(&[
        "",
        &format!("SELECT min(col2) FROM tbl2 WHERE col1 >= {low} AND col1 < {high};"),
    ])?;
    let f = b.fetch(&col2, &s)?;
    let m = b.aggregate_of(AggregateKind::Min, &f)?;
    b.print(&[&m])?;

    b.comments(&["", "", "Max", "SELECT max(col1) FROM tbl2;"])?;
    let a = b.aggregate(AggregateKind::Max, Source::Column(col1.clone()))?;
    b.print(&[&a])?;
    b.comments(&[
        "",
        "",
        &format!("SELECT max(col1) FROM tbl2 WHERE col1 >= {low} AND col1 < {high};"),
    ])?;
    let s = b.select(&col1, range)?;
    let f = b.fetch(&col1, &s)?;
    let m = b.aggregate_of(AggregateKind::Max, &f)?;
    b.print(&[&m])?;
    b.comments(&[
        "",
        &format!("SELECT max(col2) FROM tbl2 WHERE col1 >= {low} AND col1 < {high};"),
    ])?;
    let f = b.fetch(&col2, &s)?;
    let m = b.aggregate_of(AggregateKind::Max, &f)?;
    b.print(&[&m])?;

    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}

/// Two conjunctive queries with several scalar outputs each.
fn boss(cx: &mut SuiteContext<'_>, tbl2: &TableRef, n: i64) -> Result<()> {
    let offset = scaled(n, 0.1_f64.sqrt());
    let col1 = tbl2.column("col1")?;
    let col2 = tbl2.column("col2")?;
    let col3 = tbl2.column("col3")?;
    let (mut b, synth) = cx.scenario(9)?;
    let (low1, low2) = {
        let t = b.table(tbl2)?;
        let c1 = t.column("col1")?.values();
        let c2 = t.column("col2")?.values();
        draw_until(
            synth,
            |s| Ok((window(s, n, offset)?, window(s, n, offset)?)),
            |&(l1, l2)| {
                c1.iter().zip(c2).any(|(&v1, &v2)| {
                    (l1..l1 + offset).contains(&v1) && (l2..l2 + offset).contains(&v2)
                })
            },
        )?
    };
    let (high1, high2) = (low1 + offset, low2 + offset);
    let first = RangePredicate::between(low1, high1);
    let second = RangePredicate::between(low2, high2);
    let filter = format!(
        "(col1 >= {low1} AND col1 < {high1}) AND (col2 >= {low2} AND col2 < {high2})"
    );

    b.comments(&[
        "Big Bad Boss Test! Milestone 1",
        "It's basically just the previous tests put together",
        "But also, its.... Boss test!",
        "",
        &format!("SELECT min(col2), max(col3), sum(col3-col2) FROM tbl2 WHERE {filter};"),
    ])?;
    let s1 = b.select(&col1, first)?;
    let sf = b.fetch(&col2, &s1)?;
    let s2 = b.select_on(&s1, &sf, second)?;
    let f2 = b.fetch(&col2, &s2)?;
    let f3 = b.fetch(&col3, &s2)?;
    let out1 = b.aggregate_of(AggregateKind::Min, &f2)?;
    let out2 = b.aggregate_of(AggregateKind::Max, &f3)?;
    let diff = b.arith(ArithOp::Sub, &f3, &f2)?;
    let out3 = b.aggregate_of(AggregateKind::Sum, &diff)?;
    b.print(&[&out1, &out2, &out3])?;

    b.comments(&[
        "",
        &format!(
            "SELECT avg(col1+col2), min(col2), max(col3), avg(col3-col2), sum(col3-col2) FROM tbl2 WHERE {filter};"
        ),
    ])?;
    let s1 = b.select(&col1, first)?;
    let sf = b.fetch(&col2, &s1)?;
    let s2 = b.select_on(&s1, &sf, second)?;
    let f1 = b.fetch(&col1, &s2)?;
    let f2 = b.fetch(&col2, &s2)?;
    let f3 = b.fetch(&col3, &s2)?;
    let sum12 = b.arith(ArithOp::Add, &f1, &f2)?;
    let out1 = b.aggregate_of(AggregateKind::Avg, &sum12)?;
    let out2 = b.aggregate_of(AggregateKind::Min, &f2)?;
    let out3 = b.aggregate_of(AggregateKind::Max, &f3)?;
    let diff = b.arith(ArithOp::Sub, &f3, &f2)?;
    let out4 = b.aggregate_of(AggregateKind::Avg, &diff)?;
    let out5 = b.aggregate_of(AggregateKind::Sum, &diff)?;
    b.print(&[&out1, &out2, &out3, &out4, &out5])?;

    let generated = b.finish()?;
    cx.scenarios.push(generated);
    Ok(())
}
